//! Server configuration loading.
//!
//! TOML is the sole config source; every field has a default, so an absent
//! file or section yields a runnable config.
//!
//! ```toml
//! [server]
//! ip_address = "0.0.0.0"   # display only; the listener binds all interfaces
//! port = 12345
//!
//! [storage]
//! sqlite_path = "./teamradar.sqlite3"
//! photo_dir = "./Photos"
//!
//! [limits]
//! write_queue_cap = 64
//! ```

use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_PORT: u16 = 12345;
pub const DEFAULT_SQLITE_PATH: &str = "./teamradar.sqlite3";
pub const DEFAULT_PHOTO_DIR: &str = "./Photos";
pub const DEFAULT_WRITE_QUEUE_CAP: usize = 64;

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Shown by admin tooling; the listener always binds all interfaces.
    pub ip_address: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub sqlite_path: String,
    pub photo_dir: String,
}

#[derive(Debug, Clone)]
pub struct LimitsConfig {
    /// Outbound frames queued per connection before it is considered a
    /// slow consumer and closed.
    pub write_queue_cap: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig { ip_address: "0.0.0.0".to_owned(), port: DEFAULT_PORT },
            storage: StorageConfig {
                sqlite_path: DEFAULT_SQLITE_PATH.to_owned(),
                photo_dir: DEFAULT_PHOTO_DIR.to_owned(),
            },
            limits: LimitsConfig { write_queue_cap: DEFAULT_WRITE_QUEUE_CAP },
        }
    }
}

// ---------------------------------------------------------------------------
// Raw TOML deserialization types (Option for every optional field)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawConfig {
    server: Option<RawServerConfig>,
    storage: Option<RawStorageConfig>,
    limits: Option<RawLimitsConfig>,
}

#[derive(Debug, Deserialize)]
struct RawServerConfig {
    ip_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct RawStorageConfig {
    sqlite_path: Option<String>,
    photo_dir: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawLimitsConfig {
    write_queue_cap: Option<usize>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Load from an explicit path (errors if unreadable), or defaults when no
/// path is given.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => load_config_from_path(path),
        None => Ok(Config::default()),
    }
}

pub fn load_config_from_path(path: &Path) -> Result<Config, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {}", path.display(), e)))?;
    load_config_from_str(&toml_str)
}

pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
    let defaults = Config::default();

    let server = match raw.server {
        Some(s) => ServerConfig {
            ip_address: s.ip_address.unwrap_or(defaults.server.ip_address),
            port: s.port.unwrap_or(defaults.server.port),
        },
        None => defaults.server,
    };

    let storage = match raw.storage {
        Some(s) => StorageConfig {
            sqlite_path: s.sqlite_path.unwrap_or(defaults.storage.sqlite_path),
            photo_dir: s.photo_dir.unwrap_or(defaults.storage.photo_dir),
        },
        None => defaults.storage,
    };

    let limits = match raw.limits {
        Some(l) => LimitsConfig {
            write_queue_cap: match l.write_queue_cap {
                Some(0) => {
                    return Err(ConfigError::InvalidValue(
                        "limits.write_queue_cap must be at least 1".to_owned(),
                    ));
                }
                Some(cap) => cap,
                None => defaults.limits.write_queue_cap,
            },
        },
        None => defaults.limits,
    };

    Ok(Config { server, storage, limits })
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(s) => write!(f, "IO error: {}", s),
            ConfigError::Parse(s) => write!(f, "Parse error: {}", s),
            ConfigError::InvalidValue(s) => write!(f, "Invalid config value: {}", s),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let cfg = load_config_from_str("").expect("parse");
        assert_eq!(cfg.server.port, DEFAULT_PORT);
        assert_eq!(cfg.storage.photo_dir, DEFAULT_PHOTO_DIR);
        assert_eq!(cfg.limits.write_queue_cap, DEFAULT_WRITE_QUEUE_CAP);
    }

    #[test]
    fn sections_override_field_by_field() {
        let cfg = load_config_from_str(
            r#"
            [server]
            port = 4242

            [storage]
            photo_dir = "/var/lib/teamradar/photos"
            "#,
        )
        .expect("parse");
        assert_eq!(cfg.server.port, 4242);
        assert_eq!(cfg.server.ip_address, "0.0.0.0", "unset field keeps its default");
        assert_eq!(cfg.storage.photo_dir, "/var/lib/teamradar/photos");
        assert_eq!(cfg.storage.sqlite_path, DEFAULT_SQLITE_PATH);
    }

    #[test]
    fn zero_write_queue_cap_is_rejected() {
        let err = load_config_from_str("[limits]\nwrite_queue_cap = 0").expect_err("must fail");
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = load_config_from_str("[server\nport = 1").expect_err("must fail");
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
