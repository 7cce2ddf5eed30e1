//! Upkeep configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, UpkeepError};

/// Upper bound for `scheduler.scan_horizon_days` (about a century).
pub const MAX_SCAN_HORIZON_DAYS: u32 = 36_500;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpkeepConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl UpkeepConfig {
    /// Load config from `UPKEEP_CONFIG` or the default path (~/.upkeep/config.toml).
    /// A missing file yields the defaults.
    pub fn load() -> Result<Self> {
        let path = std::env::var("UPKEEP_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default_path());
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| UpkeepError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| UpkeepError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the given path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| UpkeepError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.check_interval_secs == 0 {
            return Err(UpkeepError::Config(
                "scheduler.check_interval_secs must be greater than 0".into(),
            ));
        }
        if self.scheduler.scan_horizon_days > MAX_SCAN_HORIZON_DAYS {
            return Err(UpkeepError::Config(format!(
                "scheduler.scan_horizon_days must be at most {MAX_SCAN_HORIZON_DAYS}, got {}",
                self.scheduler.scan_horizon_days
            )));
        }
        // chrono::FixedOffset accepts strictly less than one day.
        if self.scheduler.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(UpkeepError::Config(format!(
                "scheduler.utc_offset_minutes out of range: {}",
                self.scheduler.utc_offset_minutes
            )));
        }
        if self.scheduler.notify_recipient.trim().is_empty() {
            return Err(UpkeepError::Config(
                "scheduler.notify_recipient must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Upkeep home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".upkeep")
    }
}

/// Due-check scheduling and classification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Lookahead in days for the due-soon category. Global, no per-asset override.
    #[serde(default = "default_due_soon_days")]
    pub due_soon_days: u32,
    /// Seconds between periodic sweeps.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    /// Upper bracket for the scanner's date-range query, in days past today.
    #[serde(default = "default_scan_horizon")]
    pub scan_horizon_days: u32,
    /// Offset used to cut instants into calendar days.
    #[serde(default)]
    pub utc_offset_minutes: i32,
    /// Write the classification back as a denormalized cache during scans.
    #[serde(default = "bool_true")]
    pub write_back_cache: bool,
    /// Create the follow-up record when a recurring record is completed.
    #[serde(default)]
    pub auto_schedule_next: bool,
    /// Who receives maintenance notifications ("user:<id>" or "role:<name>").
    #[serde(default = "default_recipient")]
    pub notify_recipient: String,
}

fn default_due_soon_days() -> u32 { 7 }
fn default_check_interval() -> u64 { 86_400 }
fn default_scan_horizon() -> u32 { 365 }
fn default_recipient() -> String { "role:maintenance".into() }
fn bool_true() -> bool { true }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            due_soon_days: default_due_soon_days(),
            check_interval_secs: default_check_interval(),
            scan_horizon_days: default_scan_horizon(),
            utc_offset_minutes: 0,
            write_back_cache: true,
            auto_schedule_next: false,
            notify_recipient: default_recipient(),
        }
    }
}

/// SQLite database location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String { "~/.upkeep/upkeep.db".into() }

impl DatabaseConfig {
    /// The database path with `~` expanded. `:memory:` is passed through.
    pub fn resolved_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).to_string())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 { 3000 }
fn default_host() -> String { "127.0.0.1".into() }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = UpkeepConfig::default();
        assert_eq!(config.scheduler.due_soon_days, 7);
        assert_eq!(config.scheduler.check_interval_secs, 86_400);
        assert!(config.scheduler.write_back_cache);
        assert!(!config.scheduler.auto_schedule_next);
        assert_eq!(config.gateway.port, 3000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = UpkeepConfig::from_toml(
            r#"
            [scheduler]
            due_soon_days = 14
            utc_offset_minutes = 420
            "#,
        )
        .unwrap();
        assert_eq!(config.scheduler.due_soon_days, 14);
        assert_eq!(config.scheduler.utc_offset_minutes, 420);
        assert_eq!(config.scheduler.notify_recipient, "role:maintenance");
        assert_eq!(config.database.path, "~/.upkeep/upkeep.db");
    }

    #[test]
    fn test_rejects_zero_interval() {
        let err = UpkeepConfig::from_toml("[scheduler]\ncheck_interval_secs = 0\n").unwrap_err();
        assert!(matches!(err, UpkeepError::Config(_)));
    }

    #[test]
    fn test_rejects_out_of_range_offset() {
        let err =
            UpkeepConfig::from_toml("[scheduler]\nutc_offset_minutes = 1440\n").unwrap_err();
        assert!(matches!(err, UpkeepError::Config(_)));
    }

    #[test]
    fn test_rejects_oversized_scan_horizon() {
        let err = UpkeepConfig::from_toml("[scheduler]\nscan_horizon_days = 3000000\n").unwrap_err();
        assert!(matches!(err, UpkeepError::Config(msg) if msg.contains("scan_horizon_days")));
        assert!(UpkeepConfig::from_toml("[scheduler]\nscan_horizon_days = 36500\n").is_ok());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(UpkeepConfig::from_toml("scheduler = 5").is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = std::env::temp_dir().join("upkeep-config-test");
        let path = dir.join("config.toml");
        let mut config = UpkeepConfig::default();
        config.gateway.port = 8088;
        config.save_to(&path).unwrap();

        let loaded = UpkeepConfig::load_from(&path).unwrap();
        assert_eq!(loaded.gateway.port, 8088);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_memory_path_passthrough() {
        let db = DatabaseConfig { path: ":memory:".into() };
        assert_eq!(db.resolved_path(), PathBuf::from(":memory:"));
    }
}
