use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Data directory path
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Run the staleness batch and job worker from the daemon
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between staleness batch runs (daily by default)
    #[serde(default = "default_batch_interval")]
    pub batch_interval_secs: u64,
    /// Seconds between job worker runs
    #[serde(default = "default_work_interval")]
    pub work_interval_secs: u64,
    /// Delivery attempts before a job is marked failed
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before a failed delivery is retried
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    /// Maximum jobs claimed per worker run
    #[serde(default = "default_work_batch_size")]
    pub work_batch_size: u32,
    /// Running jobs untouched for this long are put back in the queue
    #[serde(default = "default_stall_timeout")]
    pub stall_timeout_secs: u64,
}

impl NotificationConfig {
    /// `retry_delay_secs` as a duration
    pub fn retry_delay(&self) -> crate::Result<chrono::Duration> {
        seconds("retry_delay_secs", self.retry_delay_secs)
    }

    /// `stall_timeout_secs` as a duration
    pub fn stall_timeout(&self) -> crate::Result<chrono::Duration> {
        seconds("stall_timeout_secs", self.stall_timeout_secs)
    }
}

fn seconds(field: &str, value: u64) -> crate::Result<chrono::Duration> {
    i64::try_from(value)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or_else(|| crate::Error::Config(format!("{} is out of range: {}", field, value)))
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            batch_interval_secs: default_batch_interval(),
            work_interval_secs: default_work_interval(),
            max_attempts: default_max_attempts(),
            retry_delay_secs: default_retry_delay(),
            work_batch_size: default_work_batch_size(),
            stall_timeout_secs: default_stall_timeout(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gazette")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_batch_interval() -> u64 {
    86400 // 1 day
}

fn default_work_interval() -> u64 {
    3600 // 1 hour
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    3600
}

fn default_work_batch_size() -> u32 {
    50
}

fn default_stall_timeout() -> u64 {
    3600
}

/// Expand tilde (~) in path to user's home directory
fn expand_tilde(path: &std::path::Path) -> PathBuf {
    if let Some(path_str) = path.to_str() {
        if let Some(stripped) = path_str.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(stripped);
            }
        } else if path_str == "~" {
            if let Some(home) = dirs::home_dir() {
                return home;
            }
        }
    }
    path.to_path_buf()
}

impl AppConfig {
    /// Load configuration from file or return defaults
    pub fn load() -> crate::Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_toml(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Save configuration to file
    pub fn save(&self) -> crate::Result<()> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(&config_path, content)?;

        Ok(())
    }

    /// Get the configuration file path
    /// Always uses ~/.config/gazette/config.toml on all platforms
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("gazette")
            .join("config.toml")
    }

    /// Get the database file path
    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join("gazette.db")
    }

    /// Get the data directory (with tilde expansion)
    pub fn data_dir(&self) -> PathBuf {
        expand_tilde(&self.general.data_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_sections_missing() {
        let config = AppConfig::from_toml("").unwrap();
        assert!(config.notifications.enabled);
        assert_eq!(config.notifications.batch_interval_secs, 86400);
        assert_eq!(config.notifications.max_attempts, 3);
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn test_partial_notifications_section() {
        let config = AppConfig::from_toml(
            r#"
            [notifications]
            enabled = false
            max_attempts = 5
            "#,
        )
        .unwrap();
        assert!(!config.notifications.enabled);
        assert_eq!(config.notifications.max_attempts, 5);
        assert_eq!(config.notifications.work_interval_secs, 3600);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = AppConfig::from_toml("[notifications\n").unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }

    #[test]
    fn test_out_of_range_durations_are_config_errors() {
        let mut config = NotificationConfig::default();
        assert_eq!(config.retry_delay().unwrap(), chrono::Duration::hours(1));

        config.retry_delay_secs = u64::MAX;
        assert!(matches!(config.retry_delay(), Err(crate::Error::Config(_))));

        config.stall_timeout_secs = i64::MAX as u64;
        assert!(matches!(config.stall_timeout(), Err(crate::Error::Config(_))));
    }

    #[test]
    fn test_database_path_expands_tilde() {
        let mut config = AppConfig::default();
        config.general.data_dir = PathBuf::from("~/gazette-data");
        let path = config.database_path();
        assert!(path.ends_with("gazette-data/gazette.db"));
        if dirs::home_dir().is_some() {
            assert!(!path.starts_with("~"));
        }
    }
}
