//! Cache configuration handles.
//!
//! The registry treats a configuration as opaque: it keeps a shared reference
//! and only asks for a one-line summary when a name is rendered for display.

use std::fmt;
use std::num::NonZeroU64;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// A configuration owned by an external configuration subsystem.
pub trait CacheConfiguration: fmt::Debug + Send + Sync {
    /// Short parameter summary shown in parentheses after the cache name.
    fn summary(&self) -> String;
}

/// Shared handle to a cache configuration.
pub type ConfigurationRef = Arc<dyn CacheConfiguration>;

/// Clustering mode a cache is declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    #[default]
    Local,
    ReplSync,
    ReplAsync,
    DistSync,
    DistAsync,
    InvalidationSync,
}

impl CacheMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::ReplSync => "repl_sync",
            Self::ReplAsync => "repl_async",
            Self::DistSync => "dist_sync",
            Self::DistAsync => "dist_async",
            Self::InvalidationSync => "invalidation_sync",
        }
    }
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "repl_sync" => Ok(Self::ReplSync),
            "repl_async" => Ok(Self::ReplAsync),
            "dist_sync" => Ok(Self::DistSync),
            "dist_async" => Ok(Self::DistAsync),
            "invalidation_sync" => Ok(Self::InvalidationSync),
            other => Err(format!("unknown cache mode `{other}`")),
        }
    }
}

/// Built-in configuration used for implicit definitions and for caches
/// declared in the settings file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BasicConfiguration {
    pub mode: CacheMode,
    /// Entry ceiling; `None` means unbounded.
    pub max_entries: Option<NonZeroU64>,
    /// Entry lifespan; `None` means entries never expire.
    pub lifespan: Option<Duration>,
}

impl BasicConfiguration {
    pub fn into_ref(self) -> ConfigurationRef {
        Arc::new(self)
    }
}

impl CacheConfiguration for BasicConfiguration {
    fn summary(&self) -> String {
        let max_entries = match self.max_entries {
            Some(limit) => limit.to_string(),
            None => "unbounded".to_string(),
        };
        let lifespan = match self.lifespan {
            Some(lifespan) => format!("{}ms", lifespan.as_millis()),
            None => "none".to_string(),
        };
        format!(
            "mode={}, max_entries={max_entries}, lifespan={lifespan}",
            self.mode
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_summary() {
        let config = BasicConfiguration::default();
        assert_eq!(
            config.summary(),
            "mode=local, max_entries=unbounded, lifespan=none"
        );
    }

    #[test]
    fn bounded_summary() {
        let config = BasicConfiguration {
            mode: CacheMode::DistSync,
            max_entries: NonZeroU64::new(1000),
            lifespan: Some(Duration::from_secs(2)),
        };
        assert_eq!(
            config.summary(),
            "mode=dist_sync, max_entries=1000, lifespan=2000ms"
        );
    }

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("REPL_SYNC".parse::<CacheMode>(), Ok(CacheMode::ReplSync));
        assert!("scattered".parse::<CacheMode>().is_err());
    }
}
