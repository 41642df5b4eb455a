//! Run configuration for the dump orchestrator

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::config::DumpConfig;
use crate::error::{ConfigError, Result};

use super::observer::{DumpObserver, TracingObserver};

/// Immutable settings of one dump run
#[derive(Clone)]
pub struct DumpOptions {
    /// Maximum records per batch
    pub batch_size: usize,
    /// Maximum number of units exported at the same time
    pub max_concurrent_units: usize,
    /// Gzip the artifact
    pub compress: bool,
    /// Unit names skipped by exact match
    pub exclude: HashSet<String>,
    /// Receives per-unit events
    pub observer: Arc<dyn DumpObserver>,
}

impl DumpOptions {
    /// Replace the observer
    pub fn with_observer(mut self, observer: Arc<dyn DumpObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Add unit names to the exclusion set
    pub fn with_exclude<I, S>(mut self, units: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(units.into_iter().map(Into::into));
        self
    }

    /// Reject settings a run cannot make progress with
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "batch_size".to_string(),
                value: "0".to_string(),
            }
            .into());
        }
        if self.max_concurrent_units == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_concurrent_units".to_string(),
                value: "0".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self::from(&DumpConfig::default())
    }
}

impl From<&DumpConfig> for DumpOptions {
    fn from(config: &DumpConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            max_concurrent_units: config.max_concurrent_units,
            compress: config.compress,
            exclude: config.exclude.iter().cloned().collect(),
            observer: Arc::new(TracingObserver),
        }
    }
}

impl fmt::Debug for DumpOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DumpOptions")
            .field("batch_size", &self.batch_size)
            .field("max_concurrent_units", &self.max_concurrent_units)
            .field("compress", &self.compress)
            .field("exclude", &self.exclude)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_config() {
        let options = DumpOptions::default();
        assert_eq!(options.batch_size, 5000);
        assert_eq!(options.max_concurrent_units, 5);
        assert!(!options.compress);
        assert!(options.exclude.is_empty());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_from_config_collects_exclusions() {
        let config = DumpConfig {
            exclude: vec!["audit".to_string(), "audit".to_string(), "tmp".to_string()],
            compress: true,
            ..DumpConfig::default()
        };
        let options = DumpOptions::from(&config);
        assert_eq!(options.exclude.len(), 2);
        assert!(options.compress);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let options = DumpOptions {
            batch_size: 0,
            ..DumpOptions::default()
        };
        assert!(options.validate().is_err());

        let options = DumpOptions {
            max_concurrent_units: 0,
            ..DumpOptions::default()
        };
        let err = options.validate().unwrap_err();
        assert!(err.to_string().contains("max_concurrent_units"));
    }

    #[test]
    fn test_with_exclude() {
        let options = DumpOptions::default().with_exclude(["a", "b"]);
        assert!(options.exclude.contains("a"));
        assert!(options.exclude.contains("b"));
    }
}
