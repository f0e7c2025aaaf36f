use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Host-tunable settings of the plan executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Timeout applied to steps that do not declare one, in seconds
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: f64,

    /// Upper bound on tool calls in flight at once; unset means unlimited
    #[serde(default)]
    pub max_concurrency: Option<usize>,
}

fn default_timeout_secs() -> f64 {
    60.0
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_timeout_secs(),
            max_concurrency: None,
        }
    }
}

impl ExecutorConfig {
    /// Load configuration from a TOML file, falling back to defaults when the
    /// file does not exist
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            tracing::info!("Configuration file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path)
            .context("Failed to read configuration file")?;

        Self::from_toml_str(&content).context("Failed to parse configuration file")
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_timeout_secs <= 0.0
            || Duration::try_from_secs_f64(self.default_timeout_secs).is_err()
        {
            bail!(
                "default_timeout_secs must be a positive number, got {}",
                self.default_timeout_secs
            );
        }

        if self.max_concurrency == Some(0) {
            bail!("max_concurrency must be at least 1");
        }

        Ok(())
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout_secs = timeout.as_secs_f64();
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = Some(max);
        self
    }

    /// Default step timeout as a `Duration`. Values too large to represent
    /// saturate; anything else invalid falls back to the built-in default.
    pub fn default_timeout(&self) -> Duration {
        match Duration::try_from_secs_f64(self.default_timeout_secs) {
            Ok(timeout) => timeout,
            Err(_) if self.default_timeout_secs > 0.0 => Duration::MAX,
            Err(_) => Duration::from_secs_f64(default_timeout_secs()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ExecutorConfig::default();
        assert_eq!(config.default_timeout(), Duration::from_secs(60));
        assert_eq!(config.max_concurrency, None);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = ExecutorConfig::from_toml_str("max_concurrency = 4").unwrap();
        assert_eq!(config.max_concurrency, Some(4));
        assert_eq!(config.default_timeout_secs, 60.0);

        let config = ExecutorConfig::from_toml_str("default_timeout_secs = 2.5").unwrap();
        assert_eq!(config.default_timeout(), Duration::from_millis(2500));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(ExecutorConfig::from_toml_str("default_timeout_secs = 0.0").is_err());
        assert!(ExecutorConfig::from_toml_str("default_timeout_secs = -3.0").is_err());
        assert!(ExecutorConfig::from_toml_str("default_timeout_secs = 1e20").is_err());
        assert!(ExecutorConfig::from_toml_str("max_concurrency = 0").is_err());
        assert!(ExecutorConfig::from_toml_str("default_timeout_secs = \"soon\"").is_err());
    }

    #[test]
    fn test_oversized_timeout_saturates_instead_of_defaulting() {
        let config = ExecutorConfig {
            default_timeout_secs: 1e20,
            max_concurrency: None,
        };
        assert_eq!(config.default_timeout(), Duration::MAX);

        let config = ExecutorConfig {
            default_timeout_secs: f64::NAN,
            max_concurrency: None,
        };
        assert_eq!(config.default_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_timeout_secs = 5.0\nmax_concurrency = 2").unwrap();

        let config = ExecutorConfig::load(file.path()).unwrap();
        assert_eq!(config.default_timeout(), Duration::from_secs(5));
        assert_eq!(config.max_concurrency, Some(2));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExecutorConfig::load(&dir.path().join("planrunner.toml")).unwrap();
        assert_eq!(config, ExecutorConfig::default());
    }

    #[test]
    fn test_unreadable_config_reports_context() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_timeout_secs = [").unwrap();

        let err = ExecutorConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse configuration file"));
    }
}
