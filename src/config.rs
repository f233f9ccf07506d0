//! Runtime configuration.
//!
//! The plan file comes from `--db` (or `GANTT_DB`, read by clap), then
//! `$HOME/.gantt/plan.json`. Lock behaviour can be tuned through
//! `GANTT_LOCK_RETRIES` and `GANTT_LOCK_RETRY_MS`.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::StorageError;

const DEFAULT_LOCK_RETRIES: u32 = 20;
const DEFAULT_LOCK_RETRY_MS: u64 = 25;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    pub lock_retries: u32,
    pub lock_retry_delay: Duration,
    /// Number of `-v` flags given on the command line.
    pub verbosity: u8,
}

impl Config {
    /// Resolve from the process environment, creating the default data
    /// directory when it is used.
    pub fn resolve(db: Option<PathBuf>, verbosity: u8) -> Result<Self, StorageError> {
        let config = Self::from_lookup(db, verbosity, |key| std::env::var(key).ok());
        if let Some(dir) = config.db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        Ok(config)
    }

    /// Resolve with an explicit variable lookup, without touching the disk.
    pub fn from_lookup(db: Option<PathBuf>, verbosity: u8, env: impl Fn(&str) -> Option<String>) -> Self {
        let db_path = db
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| {
                let home = env("HOME").unwrap_or_else(|| ".".to_string());
                PathBuf::from(home).join(".gantt").join("plan.json")
            });
        let lock_retries = env("GANTT_LOCK_RETRIES")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_LOCK_RETRIES);
        let retry_ms = env("GANTT_LOCK_RETRY_MS")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_LOCK_RETRY_MS);
        Config {
            db_path,
            lock_retries,
            lock_retry_delay: Duration::from_millis(retry_ms),
            verbosity,
        }
    }

    /// Default log filter for the verbosity level; `RUST_LOG` takes precedence.
    pub fn log_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn explicit_path_then_home() {
        let c = Config::from_lookup(Some("/tmp/a.json".into()), 0, lookup(&[("HOME", "/home/ada")]));
        assert_eq!(c.db_path, PathBuf::from("/tmp/a.json"));
        let c = Config::from_lookup(None, 0, lookup(&[("HOME", "/home/ada")]));
        assert_eq!(c.db_path, PathBuf::from("/home/ada/.gantt/plan.json"));
        let c = Config::from_lookup(Some(PathBuf::new()), 0, lookup(&[("HOME", "/home/ada")]));
        assert_eq!(c.db_path, PathBuf::from("/home/ada/.gantt/plan.json"));
    }

    #[test]
    fn lock_tuning_and_defaults() {
        let c = Config::from_lookup(None, 2, lookup(&[("GANTT_LOCK_RETRIES", "5"), ("GANTT_LOCK_RETRY_MS", "x")]));
        assert_eq!(c.lock_retries, 5);
        assert_eq!(c.lock_retry_delay, Duration::from_millis(DEFAULT_LOCK_RETRY_MS));
        assert_eq!(c.log_filter(), "debug");
    }
}
