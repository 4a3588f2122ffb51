//! Multi-tier TOML configuration for Weekender.
//!
//! Reads configuration from multiple sources with precedence:
//! CLI flags > env vars > config file > defaults

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use weekender_mcp::ServerConfig;
use weekender_types::ConfigError;

/// Overrides the interpreter used to launch the server.
pub const ENV_PYTHON: &str = "WEEKENDER_PYTHON";

/// Overrides the per-call timeout in milliseconds.
pub const ENV_CALL_TIMEOUT_MS: &str = "WEEKENDER_CALL_TIMEOUT_MS";

/// Overrides the config directory.
pub const ENV_CONFIG_DIR: &str = "WEEKENDER_CONFIG_DIR";

/// Resolved configuration for a Weekender run.
#[derive(Debug, Clone)]
pub struct WeekenderConfig {
    pub server: ServerConfig,
    pub config_dir: PathBuf,
}

/// Settings that can be read from a TOML config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub server: ServerConfig,
}

/// CLI overrides that take highest precedence.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    /// Path of the server script, passed as its single argument.
    pub server_path: Option<String>,
    pub python: Option<String>,
    pub call_timeout_ms: Option<u64>,
}

impl WeekenderConfig {
    /// Load configuration from all sources, applying precedence rules.
    ///
    /// Precedence (highest to lowest):
    /// 1. CLI flags
    /// 2. Environment variables
    /// 3. Config file (~/.weekender/config.toml)
    /// 4. Defaults
    pub fn load(overrides: CliOverrides) -> Result<Self, ConfigError> {
        let config_dir = config_dir();
        let settings = load_settings_file(&config_dir.join("config.toml"))?;
        Self::resolve(settings, overrides, |key| std::env::var(key).ok(), config_dir)
    }

    /// Apply overrides and environment on top of file settings.
    pub fn resolve(
        settings: SettingsFile,
        overrides: CliOverrides,
        env: impl Fn(&str) -> Option<String>,
        config_dir: PathBuf,
    ) -> Result<Self, ConfigError> {
        let mut server = settings.server;

        // Resolve interpreter: CLI > env > config file
        if let Some(command) = overrides.python.or_else(|| env(ENV_PYTHON)) {
            server.command = command;
        }

        if let Some(path) = overrides.server_path {
            server.args = vec![path];
        }

        // Resolve call timeout: CLI > env > config file > unbounded
        let env_timeout = env(ENV_CALL_TIMEOUT_MS)
            .map(|raw| {
                raw.trim()
                    .parse::<u64>()
                    .map_err(|e| ConfigError::InvalidValue {
                        key: ENV_CALL_TIMEOUT_MS.to_string(),
                        message: format!("'{raw}' is not a number of milliseconds: {e}"),
                    })
            })
            .transpose()?;
        if let Some(timeout) = overrides.call_timeout_ms.or(env_timeout) {
            server.call_timeout_ms = Some(timeout);
        }

        validate(&server)?;
        Ok(Self { server, config_dir })
    }
}

fn validate(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.command.trim().is_empty() {
        return Err(ConfigError::MissingKey {
            key: "server.command".into(),
        });
    }
    let timeouts = [
        ("server.handshake_timeout_ms", Some(server.handshake_timeout_ms)),
        ("server.call_timeout_ms", server.call_timeout_ms),
    ];
    for (key, value) in timeouts {
        if value == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: key.into(),
                message: "must be greater than zero".into(),
            });
        }
    }
    Ok(())
}

/// Get the Weekender config directory path (~/.weekender/).
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        return PathBuf::from(dir);
    }
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".weekender")
}

/// Load and parse a TOML settings file. A missing file yields defaults.
pub fn load_settings_file(path: &Path) -> Result<SettingsFile, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config file at {}", path.display());
            return Ok(SettingsFile::default());
        }
        Err(e) => {
            return Err(ConfigError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
            });
        }
    };
    toml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}
