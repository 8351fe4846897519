//! Layered settings.
//!
//! Loading flow, later layers win:
//! 1. Compiled [`SwitchboardSettings::default()`]
//! 2. JSON file (`--config`, else `./switchboard.json` if present)
//! 3. `SWITCHBOARD_*` environment variables, nested with `__`
//!    (`SWITCHBOARD_SERVER__PORT=9000`)
//! 4. Command-line flags

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized};
use serde::{Deserialize, Serialize};
use switchboard_core::logging::LogFormat;
use switchboard_server::ServerConfig;
use thiserror::Error;

use crate::engines::EngineKind;

/// Settings file used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "switchboard.json";

/// Environment variable prefix.
const ENV_PREFIX: &str = "SWITCHBOARD_";

/// Errors that can occur when loading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// An explicitly requested settings file does not exist.
    #[error("settings file not found: {}", .0.display())]
    MissingFile(PathBuf),
    /// A layer held a value of the wrong shape.
    #[error("invalid settings: {0}")]
    Invalid(#[from] Box<figment::Error>),
}

/// Top-level settings for the binary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchboardSettings {
    /// Relay server settings.
    pub server: ServerConfig,
    /// Logging settings.
    pub logging: LoggingSettings,
    /// Engine selection.
    pub engine: EngineSettings,
}

impl Default for SwitchboardSettings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".into(),
                port: 8080,
                ..ServerConfig::default()
            },
            logging: LoggingSettings::default(),
            engine: EngineSettings::default(),
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Compact,
        }
    }
}

/// Engine selection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Which built-in engine to run.
    pub kind: EngineKind,
}

/// Values supplied on the command line.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    /// `server.host`
    pub host: Option<String>,
    /// `server.port`
    pub port: Option<u16>,
    /// `engine.kind`
    pub engine: Option<EngineKind>,
    /// `logging.level`
    pub log_level: Option<String>,
    /// `logging.format`
    pub log_format: Option<String>,
}

/// Load settings from `path` (or the default location) plus environment and
/// command-line overrides.
///
/// A missing default file is skipped; a missing explicit file is an error.
pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<SwitchboardSettings, SettingsError> {
    let file = match path {
        Some(path) if !path.exists() => return Err(SettingsError::MissingFile(path.to_path_buf())),
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(DEFAULT_CONFIG_PATH),
    };

    let mut figment = Figment::from(Serialized::defaults(SwitchboardSettings::default()))
        .merge(Json::file(&file))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    figment = merge_some(figment, "server.host", overrides.host.as_ref());
    figment = merge_some(figment, "server.port", overrides.port.as_ref());
    figment = merge_some(figment, "engine.kind", overrides.engine.as_ref());
    figment = merge_some(figment, "logging.level", overrides.log_level.as_ref());
    figment = merge_some(figment, "logging.format", overrides.log_format.as_ref());

    figment.extract().map_err(|e| SettingsError::Invalid(Box::new(e)))
}

fn merge_some<T: Serialize>(figment: Figment, key: &str, value: Option<&T>) -> Figment {
    match value {
        Some(value) => figment.merge(Serialized::default(key, value)),
        None => figment,
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use figment::Jail;

    use super::*;

    fn load_in_jail(path: Option<&Path>, overrides: &Overrides) -> figment::error::Result<SwitchboardSettings> {
        load(path, overrides).map_err(|e| e.to_string().into())
    }

    #[test]
    fn defaults_without_file_or_env() {
        Jail::expect_with(|_jail| {
            let settings = load_in_jail(None, &Overrides::default())?;
            assert_eq!(settings, SwitchboardSettings::default());
            assert_eq!(settings.server.port, 8080);
            assert_eq!(settings.server.host, "0.0.0.0");
            assert_eq!(settings.engine.kind, EngineKind::Echo);
            Ok(())
        });
    }

    #[test]
    fn default_file_is_picked_up() {
        Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_PATH,
                r#"{"server": {"port": 9001, "outbound_queue": 16}, "engine": {"kind": "broadcast"}}"#,
            )?;
            let settings = load_in_jail(None, &Overrides::default())?;
            assert_eq!(settings.server.port, 9001);
            assert_eq!(settings.server.outbound_queue, 16);
            // Untouched keys keep their defaults.
            assert_eq!(settings.server.host, "0.0.0.0");
            assert_eq!(settings.engine.kind, EngineKind::Broadcast);
            Ok(())
        });
    }

    #[test]
    fn env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("custom.json", r#"{"server": {"port": 9001}}"#)?;
            jail.set_env("SWITCHBOARD_SERVER__PORT", "9002");
            jail.set_env("SWITCHBOARD_LOGGING__FORMAT", "json");
            let settings = load_in_jail(Some(Path::new("custom.json")), &Overrides::default())?;
            assert_eq!(settings.server.port, 9002);
            assert_eq!(settings.logging.format, LogFormat::Json);
            Ok(())
        });
    }

    #[test]
    fn cli_overrides_env() {
        Jail::expect_with(|jail| {
            jail.set_env("SWITCHBOARD_SERVER__PORT", "9002");
            jail.set_env("SWITCHBOARD_ENGINE__KIND", "stdio");
            let overrides = Overrides {
                port: Some(9003),
                host: Some("127.0.0.1".into()),
                log_level: Some("debug".into()),
                ..Overrides::default()
            };
            let settings = load_in_jail(None, &overrides)?;
            assert_eq!(settings.server.port, 9003);
            assert_eq!(settings.server.host, "127.0.0.1");
            assert_eq!(settings.logging.level, "debug");
            assert_eq!(settings.engine.kind, EngineKind::Stdio);
            Ok(())
        });
    }

    #[test]
    fn missing_explicit_file_is_error() {
        Jail::expect_with(|_jail| {
            let err = load(Some(Path::new("nope.json")), &Overrides::default()).unwrap_err();
            assert_matches!(err, SettingsError::MissingFile(path) if path == Path::new("nope.json"));
            Ok(())
        });
    }

    #[test]
    fn invalid_value_is_error() {
        Jail::expect_with(|jail| {
            jail.set_env("SWITCHBOARD_SERVER__PORT", "not-a-port");
            let err = load(None, &Overrides::default()).unwrap_err();
            assert_matches!(err, SettingsError::Invalid(_));
            assert!(err.to_string().contains("invalid settings"));
            Ok(())
        });
    }
}
