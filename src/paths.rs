use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Application directory name under the platform config/data dirs
const APP_DIR: &str = "playhead";

/// Environment override for the config directory
pub const CONFIG_DIR_ENV: &str = "PLAYHEAD_CONFIG_DIR";

/// Files whose presence in the working directory makes it the config dir
const LOCAL_FILES: [&str; 2] = ["playhead.json", "playhead.log"];

/// Configuration for overriding default application paths
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Priority: CLI args → ENV var (PLAYHEAD_CONFIG_DIR) → None (use defaults)
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var(CONFIG_DIR_ENV).ok().map(PathBuf::from));

        Self { config_dir }
    }
}

/// Get path to a configuration file
///
/// Priority:
/// 1. Custom directory (CLI or PLAYHEAD_CONFIG_DIR)
/// 2. Working directory IF it already holds playhead.json or playhead.log
/// 3. Platform-specific config directory from dirs-next
///
/// Platform paths:
/// - Linux: ~/.config/playhead/{name}
/// - macOS: ~/Library/Application Support/playhead/{name}
/// - Windows: %APPDATA%\playhead\{name}
pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    config_dir(config).join(name)
}

/// Get path to a data file (logs), same priority as [`config_file`].
///
/// - Linux: ~/.local/share/playhead/{name}
pub fn data_file(name: &str, config: &PathConfig) -> PathBuf {
    data_dir(config).join(name)
}

/// Create the config and data directories if missing.
pub fn ensure_dirs(config: &PathConfig) -> Result<()> {
    let config_dir = config_dir(config);
    let data_dir = data_dir(config);

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;
    }

    if data_dir != config_dir && !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
    }

    Ok(())
}

fn has_local_files(dir: &Path) -> bool {
    LOCAL_FILES.iter().any(|f| dir.join(f).exists())
}

fn resolve(config: &PathConfig, cwd: Option<PathBuf>, platform: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }
    if let Some(cwd) = cwd
        && has_local_files(&cwd)
    {
        return cwd;
    }
    if let Some(dir) = platform {
        return dir.join(APP_DIR);
    }
    PathBuf::from(".")
}

fn config_dir(config: &PathConfig) -> PathBuf {
    resolve(config, std::env::current_dir().ok(), dirs_next::config_dir())
}

fn data_dir(config: &PathConfig) -> PathBuf {
    resolve(config, std::env::current_dir().ok(), dirs_next::data_dir())
}
