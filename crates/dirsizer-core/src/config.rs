//! Sizer configuration types.

use std::num::NonZeroUsize;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

/// Where the concurrency ceiling applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LimitScope {
    /// Each expanded container runs at most `max_workers` child subtrees at
    /// once. Peak parallelism across the whole tree can grow with depth.
    #[default]
    PerContainer,
    /// At most `max_workers` list/measure calls are in flight across the
    /// whole invocation, regardless of depth.
    Global,
}

/// Configuration for sizing operations.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct SizerConfig {
    /// Concurrency ceiling (0 = number of available execution units).
    #[builder(default = "0")]
    #[serde(default)]
    pub max_workers: usize,

    /// Scope of the concurrency ceiling.
    #[builder(default)]
    #[serde(default)]
    pub limit_scope: LimitScope,
}

impl SizerConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(workers) = self.max_workers {
            if workers > Semaphore::MAX_PERMITS {
                return Err(format!(
                    "max_workers must not exceed {}, got {workers}",
                    Semaphore::MAX_PERMITS
                ));
            }
        }
        Ok(())
    }
}

impl SizerConfig {
    /// Create a new sizer config builder.
    pub fn builder() -> SizerConfigBuilder {
        SizerConfigBuilder::default()
    }

    /// Create a config with an auto-detected, per-container ceiling.
    pub fn new() -> Self {
        Self {
            max_workers: 0,
            limit_scope: LimitScope::PerContainer,
        }
    }

    /// Create a config with an explicit ceiling.
    pub fn with_workers(max_workers: usize) -> Self {
        Self {
            max_workers,
            ..Self::new()
        }
    }

    /// Resolve the ceiling, replacing 0 with the host's parallelism.
    ///
    /// Always at least 1 and at most [`Semaphore::MAX_PERMITS`].
    pub fn effective_workers(&self) -> usize {
        match self.max_workers {
            0 => std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            n => n.min(Semaphore::MAX_PERMITS),
        }
    }
}

impl Default for SizerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = SizerConfig::builder()
            .max_workers(4usize)
            .limit_scope(LimitScope::Global)
            .build()
            .unwrap();

        assert_eq!(config.max_workers, 4);
        assert_eq!(config.limit_scope, LimitScope::Global);
        assert_eq!(config.effective_workers(), 4);
    }

    #[test]
    fn test_config_defaults() {
        let config = SizerConfig::builder().build().unwrap();
        assert_eq!(config.max_workers, 0);
        assert_eq!(config.limit_scope, LimitScope::PerContainer);
        assert!(config.effective_workers() >= 1);
    }

    #[test]
    fn test_rejects_oversized_ceiling() {
        let result = SizerConfig::builder()
            .max_workers(Semaphore::MAX_PERMITS + 1)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: SizerConfig = serde_json::from_str(r#"{"limit_scope":"global"}"#).unwrap();
        assert_eq!(config.max_workers, 0);
        assert_eq!(config.limit_scope, LimitScope::Global);

        let config: SizerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.limit_scope, LimitScope::PerContainer);
    }
}
