//! Configuration traits and utilities.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::LoggingConfig;
use crate::error::{AgentError, Result};

/// Trait for agent configuration types.
///
/// Implement this trait for your agent's configuration struct to get
/// automatic loading, environment overrides and validation.
///
/// # Example
///
/// ```ignore
/// use serde::Deserialize;
/// use fieldlink_agent_framework::{AgentConfig, AgentError, LoggingConfig};
///
/// #[derive(Debug, Deserialize)]
/// pub struct MyAgentConfig {
///     pub logging: LoggingConfig,
///     pub interval_secs: u64,
/// }
///
/// impl AgentConfig for MyAgentConfig {
///     fn logging(&self) -> &LoggingConfig {
///         &self.logging
///     }
///
///     fn validate(&self) -> Result<(), AgentError> {
///         if self.interval_secs == 0 {
///             return Err(AgentError::validation("interval_secs must be > 0"));
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait AgentConfig: Sized + DeserializeOwned {
    /// Get the logging configuration.
    fn logging(&self) -> &LoggingConfig;

    /// Apply overrides from the process environment.
    ///
    /// Called after parsing and before validation.
    fn apply_env_overrides(&mut self) {}

    /// Validate the configuration.
    ///
    /// Called automatically after loading. Override to add custom validation.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Parse configuration from a JSON5 string, apply overrides and validate.
    fn from_json5(content: &str) -> Result<Self> {
        let mut config: Self = json5::from_str(content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file path.
    ///
    /// Supports JSON5 format. Calls [`validate`](Self::validate) after loading.
    fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(AgentError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        Self::from_json5(&content)
    }
}

/// Read a trimmed, non-empty environment variable.
pub fn env_override(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct TestConfig {
        #[serde(default)]
        logging: LoggingConfig,
        interval_secs: u64,
    }

    impl AgentConfig for TestConfig {
        fn logging(&self) -> &LoggingConfig {
            &self.logging
        }

        fn validate(&self) -> Result<()> {
            if self.interval_secs == 0 {
                return Err(AgentError::validation("interval_secs must be > 0"));
            }
            Ok(())
        }
    }

    #[test]
    fn test_config_not_found() {
        let result = TestConfig::load("/nonexistent/path.json5");
        assert!(matches!(result, Err(AgentError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let result = TestConfig::from_json5("{ interval_secs: 0 }");
        assert!(matches!(result, Err(AgentError::ConfigValidation(_))));

        let config = TestConfig::from_json5("{ interval_secs: 5 }").unwrap();
        assert_eq!(config.interval_secs, 5);
        assert_eq!(config.logging().level, "info");
    }

    #[test]
    fn test_env_override_ignores_unset() {
        assert_eq!(env_override("FIELDLINK_TEST_SURELY_UNSET_VARIABLE"), None);
    }
}
