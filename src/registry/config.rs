use crate::core::{EntityError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What `destroy` does while handles on the entity are still open.
///
/// The default is [`DestroyPolicy::Relaxed`]: a held reference does not
/// block destroy, and parties waiting inside the entity are woken by its
/// teardown hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestroyPolicy {
    /// Fail immediately with `Busy`.
    Strict,
    /// Wait for the open handles to be closed, up to the drain timeout.
    Permissive,
    /// Destroy right away and detach the open handles.
    #[default]
    Relaxed,
}

/// Entity registry configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Behavior of destroy against an entity with open handles
    pub destroy_policy: DestroyPolicy,

    /// Upper bound on a permissive destroy waiting for handles to close
    pub drain_timeout_ms: u64,
}

impl RegistryConfig {
    pub fn new() -> Self {
        Self {
            destroy_policy: DestroyPolicy::Relaxed,
            drain_timeout_ms: 30_000,
        }
    }

    /// Shorthand for `destroy_policy(DestroyPolicy::Strict)`
    pub fn strict() -> Self {
        Self::new().destroy_policy(DestroyPolicy::Strict)
    }

    /// Shorthand for `destroy_policy(DestroyPolicy::Permissive)`
    pub fn permissive() -> Self {
        Self::new().destroy_policy(DestroyPolicy::Permissive)
    }

    /// Set the destroy policy
    pub fn destroy_policy(mut self, policy: DestroyPolicy) -> Self {
        self.destroy_policy = policy;
        self
    }

    /// Set the drain timeout
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn drain_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Parse from a JSON document; missing fields take their defaults.
    ///
    /// ```
    /// # use entityhost::{RegistryConfig, DestroyPolicy};
    /// let config = RegistryConfig::from_json(r#"{ "destroy_policy": "strict" }"#).unwrap();
    /// assert_eq!(config.destroy_policy, DestroyPolicy::Strict);
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.destroy_policy == DestroyPolicy::Permissive && self.drain_timeout_ms == 0 {
            return Err(EntityError::Config(
                "drain_timeout_ms must be > 0 for permissive destroy".into(),
            ));
        }

        Ok(())
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();
        assert_eq!(config.destroy_policy, DestroyPolicy::Relaxed);
        assert_eq!(config.drain_timeout_duration(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = RegistryConfig::new()
            .destroy_policy(DestroyPolicy::Strict)
            .drain_timeout(Duration::from_millis(250));

        assert_eq!(config.destroy_policy, DestroyPolicy::Strict);
        assert_eq!(config.drain_timeout_ms, 250);
        assert_eq!(RegistryConfig::strict().destroy_policy, DestroyPolicy::Strict);
        assert_eq!(RegistryConfig::permissive().destroy_policy, DestroyPolicy::Permissive);
    }

    #[test]
    fn test_huge_drain_timeout_saturates() {
        let config = RegistryConfig::permissive().drain_timeout(Duration::MAX);
        assert_eq!(config.drain_timeout_ms, u64::MAX);
        assert!(config.validate().is_ok());

        let config = RegistryConfig::permissive()
            .drain_timeout(Duration::from_millis(u64::MAX) + Duration::from_secs(1));
        assert_eq!(config.drain_timeout_ms, u64::MAX);
    }

    #[test]
    fn test_from_json() {
        let config = RegistryConfig::from_json(
            r#"{ "destroy_policy": "permissive", "drain_timeout_ms": 500 }"#,
        )
        .unwrap();
        assert_eq!(config.drain_timeout_ms, 500);

        let defaults = RegistryConfig::from_json("{}").unwrap();
        assert_eq!(defaults, RegistryConfig::default());
    }

    #[test]
    fn test_invalid_config() {
        let zero = RegistryConfig::permissive().drain_timeout(Duration::ZERO);
        assert!(matches!(zero.validate(), Err(EntityError::Config(_))));

        // Only permissive destroy waits, so the timeout is irrelevant otherwise.
        assert!(RegistryConfig::strict().drain_timeout(Duration::ZERO).validate().is_ok());
        assert!(RegistryConfig::new().drain_timeout(Duration::ZERO).validate().is_ok());

        assert!(matches!(
            RegistryConfig::from_json(r#"{ "destroy_policy": "lenient" }"#),
            Err(EntityError::Config(_))
        ));
    }
}
