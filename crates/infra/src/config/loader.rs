//! Configuration loader
//!
//! Every [`EngineConfig`] field has a default, so loading is layered
//! rather than all-or-nothing:
//! 1. Start from defaults
//! 2. Merge a config file if one is found (probed paths, JSON or TOML)
//! 3. Apply environment variable overrides on top
//!
//! ## Environment Variables
//! - `OUTPOST_DB_PATH`: Database file path
//! - `OUTPOST_DB_POOL_SIZE`: Connection pool size
//! - `OUTPOST_CACHE_TTL_MS`: Default cache TTL in milliseconds
//! - `OUTPOST_QUEUE_MAX_BATCH_SIZE`: Mutations per sync batch
//! - `OUTPOST_QUEUE_MAX_ATTEMPTS`: Retry budget before dead-lettering
//! - `OUTPOST_SYNC_INTERVAL_SECS`: Periodic sync interval (0 disables)
//! - `OUTPOST_CONNECTIVITY_DEBOUNCE_MS`: Connectivity debounce window
//! - `OUTPOST_REMOTE_BASE_URL`: Remote API base URL
//! - `OUTPOST_REMOTE_BEARER_TOKEN`: Static bearer token
//!
//! ## File Locations
//! The loader probes `config.{json,toml}` and `outpost.{json,toml}` in the
//! working directory, up to two parent directories, and next to the
//! executable.

use std::path::{Path, PathBuf};

use outpost_domain::{EngineConfig, EngineError, Result};
use tracing::{debug, info};

/// Load configuration with the layered strategy described above.
pub fn load() -> Result<EngineConfig> {
    let mut config = match probe_config_paths() {
        Some(path) => load_from_file(Some(path))?,
        None => {
            debug!("no config file found, using defaults");
            EngineConfig::default()
        }
    };

    apply_env_overrides(&mut config)?;
    Ok(config)
}

/// Load configuration from a file.
///
/// If `path` is `None`, probes the standard locations. Format is detected
/// by extension (`.json` or `.toml`).
pub fn load_from_file(path: Option<PathBuf>) -> Result<EngineConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(EngineError::Config(format!(
                    "config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            EngineError::Config("no config file found in any of the standard locations".into())
        })?,
    };

    info!(path = %config_path.display(), "loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| EngineError::Config(format!("failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

fn parse_config(contents: &str, path: &Path) -> Result<EngineConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| EngineError::Config(format!("invalid JSON format: {e}"))),
        _ => Err(EngineError::Config(format!("unsupported config format: {extension}"))),
    }
}

/// Probe the standard locations for a configuration file.
///
/// Returns the first file that exists, or `None`.
pub fn probe_config_paths() -> Option<PathBuf> {
    let names = ["config.json", "config.toml", "outpost.json", "outpost.toml"];
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        for base in [&cwd, &cwd.join(".."), &cwd.join("../..")] {
            for name in names {
                candidates.push(base.join(name));
            }
        }
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            for name in names {
                candidates.push(exe_dir.join(name));
            }
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

fn apply_env_overrides(config: &mut EngineConfig) -> Result<()> {
    if let Ok(path) = std::env::var("OUTPOST_DB_PATH") {
        config.database.path = path;
    }
    if let Some(size) = env_parse::<u32>("OUTPOST_DB_POOL_SIZE")? {
        config.database.pool_size = size;
    }
    if let Some(ttl) = env_parse::<i64>("OUTPOST_CACHE_TTL_MS")? {
        config.cache.ttl_default_ms = ttl;
    }
    if let Some(batch) = env_parse::<usize>("OUTPOST_QUEUE_MAX_BATCH_SIZE")? {
        config.queue.max_batch_size = batch;
    }
    if let Some(attempts) = env_parse::<u32>("OUTPOST_QUEUE_MAX_ATTEMPTS")? {
        config.queue.max_attempts = attempts;
    }
    if let Some(interval) = env_parse::<u64>("OUTPOST_SYNC_INTERVAL_SECS")? {
        config.sync.interval_secs = interval;
    }
    if let Some(debounce) = env_parse::<u64>("OUTPOST_CONNECTIVITY_DEBOUNCE_MS")? {
        config.connectivity.debounce_ms = debounce;
    }
    if let Ok(url) = std::env::var("OUTPOST_REMOTE_BASE_URL") {
        config.remote.base_url = url;
    }
    if let Ok(token) = std::env::var("OUTPOST_REMOTE_BEARER_TOKEN") {
        config.remote.bearer_token = Some(token);
    }
    Ok(())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| EngineError::Config(format!("invalid value for {key}: {e}"))),
        Err(_) => Ok(None),
    }
}
