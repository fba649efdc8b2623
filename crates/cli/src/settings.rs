//! Handles settings for the application. Configuration is read from
//! `settings.toml` (optional) and `SUPPLIER_MERGE__*` environment variables.
//!
//! See `settings.example.toml` for the available keys.
use chrono::TimeDelta;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct App {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    Memory,
    Sqlite(String),
}

impl Database {
    pub fn url(&self) -> String {
        match self {
            Database::Memory => String::from("sqlite::memory:"),
            Database::Sqlite(path) => format!("sqlite:{}?mode=rwc", path),
        }
    }
}

impl Default for Database {
    fn default() -> Self {
        Database::Sqlite("./suppliers.db".to_string())
    }
}

#[derive(Debug, Deserialize)]
pub struct Merge {
    #[serde(default = "default_undo_window_hours")]
    pub undo_window_hours: i64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// How long to wait for a conflicting merge/undo before reporting busy.
    #[serde(default)]
    pub lock_wait_ms: u64,
}

impl Default for Merge {
    fn default() -> Self {
        Self {
            undo_window_hours: default_undo_window_hours(),
            max_retries: default_max_retries(),
            lock_wait_ms: 0,
        }
    }
}

impl Merge {
    /// The configured undo window, rejecting values `TimeDelta` cannot hold.
    pub fn undo_window(&self) -> Result<TimeDelta, ConfigError> {
        TimeDelta::try_hours(self.undo_window_hours).ok_or_else(|| {
            ConfigError::Message(format!(
                "merge.undo_window_hours out of range: {}",
                self.undo_window_hours
            ))
        })
    }
}

fn default_undo_window_hours() -> i64 {
    24
}

fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub app: App,
    #[serde(default)]
    pub database: Database,
    #[serde(default)]
    pub merge: Merge,
}

impl Settings {
    /// Load `path` (or `settings` in the working directory when `None`).
    ///
    /// An explicit path must exist; the default file is optional.
    pub fn new(path: Option<&str>) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name(path.unwrap_or("settings")).required(path.is_some()))
            .add_source(Environment::with_prefix("SUPPLIER_MERGE").separator("__"))
            .build()?;

        settings.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use config::FileFormat;

    use super::*;

    fn parse(raw: &str) -> Settings {
        Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn empty_file_uses_defaults() {
        let settings = parse("");
        assert_eq!(settings.app.level, "info");
        assert_eq!(settings.merge.undo_window_hours, 24);
        assert_eq!(settings.merge.max_retries, 3);
        assert_eq!(settings.merge.lock_wait_ms, 0);
        assert_eq!(settings.database.url(), "sqlite:./suppliers.db?mode=rwc");
    }

    #[test]
    fn reads_every_section() {
        let settings = parse(
            r#"
            database = { sqlite = "/var/lib/suppliers.db" }

            [app]
            level = "debug"

            [merge]
            undo_window_hours = 48
            lock_wait_ms = 250
            "#,
        );
        assert_eq!(settings.app.level, "debug");
        assert_eq!(settings.merge.undo_window_hours, 48);
        assert_eq!(settings.merge.max_retries, 3);
        assert_eq!(settings.merge.lock_wait_ms, 250);
        assert_eq!(
            settings.database.url(),
            "sqlite:/var/lib/suppliers.db?mode=rwc"
        );
    }

    #[test]
    fn out_of_range_undo_window_is_a_config_error() {
        let settings = parse("[merge]\nundo_window_hours = 9223372036854775807");
        assert!(matches!(
            settings.merge.undo_window(),
            Err(ConfigError::Message(_))
        ));
        assert_eq!(
            parse("").merge.undo_window().unwrap(),
            TimeDelta::hours(24)
        );
    }

    #[test]
    fn memory_database() {
        let settings = parse(r#"database = "memory""#);
        assert_eq!(settings.database.url(), "sqlite::memory:");
    }
}
