//! Configuration for the attribute sync daemon.
//!
//! Layered configuration:
//! - Default values
//! - TOML configuration file (`<root>/.attrsync/settings.toml`)
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `ATTRSYNC_` and use double
//! underscores to separate nested levels:
//! - `ATTRSYNC_WATCH__DEBOUNCE_MS=250` sets `watch.debounce_ms`
//! - `ATTRSYNC_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::watcher::EngineTimings;

/// Name of the directory holding settings and records, relative to the
/// watched root.
pub const STORAGE_DIR_NAME: &str = ".attrsync";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// The watched root directory
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Side-store directory, relative to the root
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Event reconciliation timing
    #[serde(default)]
    pub watch: WatchConfig,

    /// Path filtering
    #[serde(default)]
    pub filter: FilterConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchConfig {
    /// Quiet period collapsing a burst of modify events into one capture
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Wait before a deletion is confirmed and the record retired
    #[serde(default = "default_delete_confirm_ms")]
    pub delete_confirm_ms: u64,

    /// Lifetime of a self-write marker whose echo never arrives
    #[serde(default = "default_self_write_ttl_ms")]
    pub self_write_ttl_ms: u64,

    /// Pause before the single retry of a publish-triggered restore
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FilterConfig {
    /// Glob patterns excluded from watching (matched against the path
    /// relative to the root and against bare file names)
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default log level ("error", "warn", "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module level overrides
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 { 1 }
fn default_root() -> PathBuf { PathBuf::from(".") }
fn default_storage_dir() -> PathBuf { PathBuf::from(STORAGE_DIR_NAME) }
fn default_debounce_ms() -> u64 { 500 }
fn default_delete_confirm_ms() -> u64 { 2000 }
fn default_self_write_ttl_ms() -> u64 { 30_000 }
fn default_retry_delay_ms() -> u64 { 750 }
fn default_log_level() -> String { "warn".to_string() }
fn default_ignore_patterns() -> Vec<String> {
    vec![
        "*.part".to_string(),
        "*.tmp".to_string(),
        "*.swp".to_string(),
        ".git/**".to_string(),
    ]
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            root: default_root(),
            storage_dir: default_storage_dir(),
            watch: WatchConfig::default(),
            filter: FilterConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            delete_confirm_ms: default_delete_confirm_ms(),
            self_write_ttl_ms: default_self_write_ttl_ms(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            ignore_patterns: default_ignore_patterns(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(STORAGE_DIR_NAME).join("settings.toml"));
        Self::load_with_file(config_path.clone()).map(|mut settings| {
            // A discovered config lives at <root>/<storage>/settings.toml;
            // pin an unconfigured root to that location.
            if settings.root == PathBuf::from(".") {
                if let Some(root) = config_path
                    .parent()
                    .and_then(|storage| storage.parent())
                    .filter(|p| !p.as_os_str().is_empty())
                {
                    settings.root = root.to_path_buf();
                }
            }
            settings
        })
    }

    /// Load configuration from a specific file plus env overrides
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, Box<figment::Error>> {
        Self::load_with_file(path.into())
    }

    fn load_with_file(config_path: PathBuf) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(&config_path))
            // Double underscore separates nested levels; single
            // underscores stay inside field names.
            .merge(Env::prefixed("ATTRSYNC_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Find the settings file by walking ancestors for a storage dir
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let storage_dir = ancestor.join(STORAGE_DIR_NAME);
            if storage_dir.is_dir() {
                return Some(storage_dir.join("settings.toml"));
            }
        }

        None
    }

    /// Check if configuration is properly initialized
    pub fn check_init() -> Result<(), String> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(STORAGE_DIR_NAME).join("settings.toml"));
        Self::validate_config_file(&config_path)
    }

    fn validate_config_file(config_path: &std::path::Path) -> Result<(), String> {
        if !config_path.exists() {
            return Err("No configuration file found. Run 'attrsync init' first.".to_string());
        }

        match std::fs::read_to_string(config_path) {
            Ok(content) => {
                if let Err(e) = toml::from_str::<Settings>(&content) {
                    return Err(format!(
                        "Configuration file is corrupted: {e}\nRun 'attrsync init --force' to regenerate."
                    ));
                }
            }
            Err(e) => {
                return Err(format!("Cannot read configuration file: {e}"));
            }
        }

        Ok(())
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Absolute watched root
    pub fn watched_root(&self) -> std::io::Result<PathBuf> {
        self.root.canonicalize()
    }

    /// The storage directory under the root
    pub fn storage_root(&self, root: &std::path::Path) -> PathBuf {
        root.join(&self.storage_dir)
    }

    /// Where records live inside the storage directory
    pub fn records_root(&self, root: &std::path::Path) -> PathBuf {
        self.storage_root(root).join("records")
    }

    /// Timing knobs in the engine's terms
    pub fn engine_timings(&self) -> EngineTimings {
        EngineTimings {
            debounce: Duration::from_millis(self.watch.debounce_ms),
            delete_confirm: Duration::from_millis(self.watch.delete_confirm_ms),
            retry_delay: Duration::from_millis(self.watch.retry_delay_ms),
        }
    }

    /// Self-write marker lifetime
    pub fn self_write_ttl(&self) -> Duration {
        Duration::from_millis(self.watch.self_write_ttl_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.storage_dir, PathBuf::from(".attrsync"));
        assert_eq!(settings.watch.debounce_ms, 500);
        assert_eq!(settings.watch.delete_confirm_ms, 2000);
        assert_eq!(settings.logging.default, "warn");
        assert!(settings.filter.ignore_patterns.contains(&"*.part".to_string()));
    }

    #[test]
    fn test_layout_helpers() {
        let settings = Settings::default();
        let root = std::path::Path::new("/data");
        assert_eq!(settings.storage_root(root), PathBuf::from("/data/.attrsync"));
        assert_eq!(
            settings.records_root(root),
            PathBuf::from("/data/.attrsync/records")
        );
    }

    #[test]
    fn test_engine_timings_conversion() {
        let mut settings = Settings::default();
        settings.watch.debounce_ms = 100;
        settings.watch.retry_delay_ms = 50;
        let timings = settings.engine_timings();
        assert_eq!(timings.debounce, Duration::from_millis(100));
        assert_eq!(timings.retry_delay, Duration::from_millis(50));
        assert_eq!(timings.delete_confirm, Duration::from_millis(2000));
    }

    #[test]
    fn test_validate_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");

        let err = Settings::validate_config_file(&path).unwrap_err();
        assert!(err.contains("No configuration file"));

        Settings::default().save(&path).unwrap();
        assert!(Settings::validate_config_file(&path).is_ok());

        std::fs::write(&path, "watch = 5").unwrap();
        let err = Settings::validate_config_file(&path).unwrap_err();
        assert!(err.contains("corrupted"));
    }

    #[test]
    fn test_round_trips_through_toml() {
        let settings = Settings::default();
        let text = toml::to_string_pretty(&settings).unwrap();
        let parsed: Settings = toml::from_str(&text).unwrap();
        assert_eq!(parsed.watch.debounce_ms, settings.watch.debounce_ms);
        assert_eq!(parsed.filter.ignore_patterns, settings.filter.ignore_patterns);
    }
}
