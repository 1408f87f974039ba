//! Typed input events and the bounded queue between device polling and the loop
//!
//! Producers (window/device callbacks) hold a cloneable [`InputSender`]; the
//! driving loop owns the [`InputReceiver`] and drains it once per tick.
//!
//! The queue is bounded. When it is full the oldest event is dropped so a
//! stalled loop cannot grow memory, and the newest input always gets through.

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};
use log::warn;

use crate::core::player::FRAME_JUMP_STEP;
use crate::entities::view::Channel;

/// Default queue size
pub const DEFAULT_QUEUE_SIZE: usize = 256;

/// Something the user did, already mapped to an intent
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    TogglePlay,
    SetSpeed(i32),
    CueFirst,
    CueLast,
    Cue(i64),
    Step(i64),
    SoloChannel(Channel),
    ExposureUp,
    ExposureDown,
    ExposureReset,
    CycleFitMode,
    ToggleStatistics,
    ToggleMetadata,
    /// Wheel delta, positive zooms in
    Scroll(f32),
    /// Mouse drag in window pixels
    Drag { dx: i32, dy: i32 },
    Resize { width: u32, height: u32 },
    Quit,
}

/// Keys the viewer reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Space,
    Home,
    End,
    Left,
    Right,
    Escape,
}

impl Key {
    /// Map a key press to an event. `ctrl` turns arrow steps into jumps.
    pub fn to_event(self, ctrl: bool) -> Option<InputEvent> {
        let step = if ctrl { FRAME_JUMP_STEP } else { 1 };
        let event = match self {
            Key::Space => InputEvent::TogglePlay,
            Key::Home => InputEvent::CueFirst,
            Key::End => InputEvent::CueLast,
            Key::Left => InputEvent::Step(-step),
            Key::Right => InputEvent::Step(step),
            Key::Escape => InputEvent::Quit,
            Key::Char(c) => match c.to_ascii_lowercase() {
                'r' => InputEvent::SoloChannel(Channel::Red),
                'g' => InputEvent::SoloChannel(Channel::Green),
                'b' => InputEvent::SoloChannel(Channel::Blue),
                'a' => InputEvent::SoloChannel(Channel::Alpha),
                '+' => InputEvent::ExposureUp,
                '-' => InputEvent::ExposureDown,
                '*' => InputEvent::ExposureReset,
                'f' => InputEvent::CycleFitMode,
                's' => InputEvent::ToggleStatistics,
                'm' => InputEvent::ToggleMetadata,
                ' ' => InputEvent::TogglePlay,
                _ => return None,
            },
        };
        Some(event)
    }
}

/// Producer half of the input queue
#[derive(Debug, Clone)]
pub struct InputSender {
    tx: Sender<InputEvent>,
    // Used only to evict the oldest event when full
    overflow: Receiver<InputEvent>,
}

impl InputSender {
    /// Queue `event`, evicting the oldest one if the queue is full.
    pub fn send(&self, event: InputEvent) {
        let mut event = event;
        loop {
            match self.tx.try_send(event) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => return,
                Err(TrySendError::Full(rejected)) => {
                    if let Ok(oldest) = self.overflow.try_recv() {
                        warn!("Input queue full, dropped {:?}", oldest);
                    }
                    event = rejected;
                }
            }
        }
    }

    /// Map and queue a key press. Unmapped keys are ignored.
    pub fn key(&self, key: Key, ctrl: bool) {
        if let Some(event) = key.to_event(ctrl) {
            self.send(event);
        }
    }
}

/// Consumer half, owned by the driving loop
#[derive(Debug)]
pub struct InputReceiver {
    rx: Receiver<InputEvent>,
}

impl InputReceiver {
    /// Everything queued so far, oldest first. Never blocks.
    pub fn drain(&self) -> Vec<InputEvent> {
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        events
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Bounded input queue holding at most `size` events (at least one).
pub fn input_queue(size: usize) -> (InputSender, InputReceiver) {
    let (tx, rx) = bounded(size.max(1));
    let sender = InputSender {
        tx,
        overflow: rx.clone(),
    };
    (sender, InputReceiver { rx })
}
