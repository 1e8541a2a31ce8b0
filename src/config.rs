//! Settings read from an optional `guideresto.toml` and `GUIDERESTO__*`
//! environment variables, plus the logging bootstrap that uses them.

use config::{Config, Environment, File};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use crate::error::{GuideError, Result};

pub const CONFIG_FILE: &str = "guideresto";
pub const ENV_PREFIX: &str = "GUIDERESTO";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// File holding the store; an in-memory store is used when absent.
    pub path: Option<String>,
    pub foreign_keys: bool,
    pub busy_timeout_ms: u64,
}
impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: None,
            foreign_keys: true,
            busy_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// An `EnvFilter` directive such as `info` or `guideresto=debug`.
    pub filter: String,
    pub ansi: bool,
}
impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".into(),
            ansi: true,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::load_from(CONFIG_FILE)
    }
    /// Reads `<name>.toml` (or any format the config crate recognises) if it
    /// exists, then applies environment overrides such as
    /// `GUIDERESTO__DATABASE__PATH=guide.db`.
    pub fn load_from(name: &str) -> Result<Self> {
        Config::builder()
            .add_source(File::with_name(name).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).prefix_separator("__").separator("__"))
            .build()
            .and_then(|c| c.try_deserialize::<Settings>())
            .map_err(|e| GuideError::Config(e.to_string()))
    }
}

/// Installs the global fmt subscriber. Fails if one is already installed.
pub fn init_tracing(settings: &LoggingSettings) -> Result<()> {
    let filter = EnvFilter::try_new(&settings.filter)
        .map_err(|e| GuideError::Config(format!("logging filter '{}': {e}", settings.filter)))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(settings.ansi)
        .with_target(false)
        .try_init()
        .map_err(|e| GuideError::Config(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_a_file() {
        let settings = Settings::load_from("no-such-guideresto-config").unwrap();
        assert!(settings.database.path.is_none());
        assert!(settings.database.foreign_keys);
        assert_eq!(settings.database.busy_timeout_ms, 5_000);
        assert_eq!(settings.logging.filter, "info");
    }

    #[test]
    fn file_values_override_defaults() {
        let base = std::env::temp_dir().join(format!("guideresto-settings-{}", std::process::id()));
        let file = base.with_extension("toml");
        std::fs::write(
            &file,
            "[database]\npath = \"guide.db\"\n\n[logging]\nfilter = \"guideresto=debug\"\n",
        )
        .unwrap();
        let settings = Settings::load_from(base.to_str().unwrap()).unwrap();
        let _ = std::fs::remove_file(&file);
        assert_eq!(settings.database.path.as_deref(), Some("guide.db"));
        assert!(settings.database.foreign_keys);
        assert_eq!(settings.logging.filter, "guideresto=debug");
    }
}
