//! Runtime configuration for the [`Abingo`](crate::Abingo) facade.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Salt used when none is configured.
///
/// Changing it reshuffles every user's assignment in every experiment.
pub const DEFAULT_SALT: &str = "Not really necessary.";

/// Namespace prepended to every cache key.
pub const DEFAULT_KEY_PREFIX: &str = "abingo";

/// Facade configuration.
///
/// All fields have defaults, so partial JSON documents are accepted:
///
/// ```rust
/// use abingo::AbingoConfig;
///
/// let config = AbingoConfig::from_json_str(r#"{ "salt": "spring-2024" }"#).unwrap();
/// assert_eq!(config.salt, "spring-2024");
/// assert_eq!(config.key_prefix, "abingo");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbingoConfig {
    /// Salt mixed into every bucketing hash.
    pub salt: String,
    /// Cache key namespace, lets several facades share one cache.
    pub key_prefix: String,
    /// Cache the weight-flattened alternative list per experiment.
    pub cache_alternatives: bool,
}

impl Default for AbingoConfig {
    fn default() -> Self {
        Self {
            salt: DEFAULT_SALT.to_string(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            cache_alternatives: true,
        }
    }
}

impl AbingoConfig {
    /// Parse a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the document is malformed or fails validation.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("invalid JSON configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from `ABINGO_SALT` and `ABINGO_KEY_PREFIX`,
    /// falling back to defaults for unset variables.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the resulting configuration is invalid.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(salt) = std::env::var("ABINGO_SALT") {
            config.salt = salt;
        }
        if let Ok(prefix) = std::env::var("ABINGO_KEY_PREFIX") {
            config.key_prefix = prefix;
        }
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the key prefix is empty or contains `::`.
    pub fn validate(&self) -> Result<()> {
        if self.key_prefix.is_empty() {
            return Err(Error::Config("key_prefix must not be empty".to_string()));
        }
        if self.key_prefix.contains("::") {
            return Err(Error::Config(format!(
                "key_prefix '{}' must not contain the '::' separator",
                self.key_prefix
            )));
        }
        Ok(())
    }
}
