//! Background thread pool for texture decode and upload
//!
//! Uses work-stealing deques:
//! - Jobs pushed to a global injector, taken in FIFO order
//! - Idle workers steal from each other
//! - No lock contention between workers
//!
//! Cancellation is the job's business: cache jobs re-check that their frame is
//! still wanted when they start, so the pool itself only needs FIFO order.

use crossbeam::deque::{Injector, Stealer, Worker};
use log::trace;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Worker pool with work-stealing.
///
/// # Example
/// ```ignore
/// let workers = Workers::new(4, "decode")?;
/// workers.execute(move || {
///     let _ = stream.decode(frame);
/// });
/// ```
pub struct Workers {
    injector: Arc<Injector<Job>>,         // Global queue for external tasks
    handles: Vec<thread::JoinHandle<()>>, // Thread handles for shutdown
    shutdown: Arc<AtomicBool>,            // Shutdown signal
}

impl Workers {
    /// Spawn `num_threads` workers (at least one), named `{name}-{i}`.
    ///
    /// Recommended: `num_cpus::get() * 3 / 4` (leave room for the display loop).
    pub fn new(num_threads: usize, name: &str) -> std::io::Result<Self> {
        let num_threads = num_threads.max(1);
        let injector: Arc<Injector<Job>> = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let locals: Vec<Worker<Job>> = (0..num_threads).map(|_| Worker::new_fifo()).collect();
        let stealers: Vec<Stealer<Job>> = locals.iter().map(Worker::stealer).collect();
        let mut handles = Vec::with_capacity(num_threads);

        for (worker_id, local) in locals.into_iter().enumerate() {
            let injector = Arc::clone(&injector);
            let worker_shutdown = Arc::clone(&shutdown);
            let stealers = stealers.clone();

            let handle = thread::Builder::new()
                .name(format!("{}-{}", name, worker_id))
                .spawn(move || run_worker(worker_id, local, &injector, &stealers, &worker_shutdown));

            match handle {
                Ok(h) => handles.push(h),
                Err(e) => {
                    // Stop the ones already running before bailing out
                    shutdown.store(true, Ordering::SeqCst);
                    return Err(e);
                }
            }
        }

        trace!("Workers initialized: {} threads (work-stealing)", num_threads);

        Ok(Self {
            injector,
            handles,
            shutdown,
        })
    }

    /// Queue a closure for a worker thread.
    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.injector.push(Box::new(f));
    }

    pub fn threads(&self) -> usize {
        self.handles.len()
    }

    /// Jobs queued in the injector and not yet picked up.
    pub fn queued(&self) -> usize {
        self.injector.len()
    }
}

fn run_worker(
    worker_id: usize,
    local: Worker<Job>,
    injector: &Injector<Job>,
    stealers: &[Stealer<Job>],
    shutdown: &AtomicBool,
) {
    trace!("Worker {} started", worker_id);

    loop {
        // 1. Own queue first
        if let Some(job) = local.pop() {
            job();
            continue;
        }

        // 2. Global injector, moving a batch into the local queue
        if let Some(job) = injector.steal_batch_and_pop(&local).success() {
            job();
            continue;
        }

        // 3. Steal from other workers (oldest tasks first)
        if let Some(job) = stealers.iter().find_map(|s| s.steal().success()) {
            job();
            continue;
        }

        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        // No work: short sleep instead of spinning
        thread::sleep(Duration::from_millis(1));
    }

    trace!("Worker {} stopped", worker_id);
}

impl Drop for Workers {
    fn drop(&mut self) {
        let num_threads = self.handles.len();
        trace!("Workers shutting down ({} threads)...", num_threads);

        self.shutdown.store(true, Ordering::SeqCst);

        // Queued jobs still run; cancelled ones return immediately, so this
        // is normally fast. The deadline is a safety net for stuck decodes.
        let deadline = Instant::now() + Duration::from_millis(500);

        for handle in std::mem::take(&mut self.handles) {
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    trace!("Shutdown timeout reached, detaching remaining workers");
                    return;
                }
                thread::sleep(Duration::from_millis(1));
            }
            let _ = handle.join();
        }

        trace!("All {} workers stopped", num_threads);
    }
}
