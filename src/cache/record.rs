//! Cache names, lifecycle states and registry records.

use std::fmt;

use super::config::ConfigurationRef;

/// Rendered form of the default cache's name.
pub const DEFAULT_CACHE_NAME: &str = "___defaultcache";

/// Identifies a cache within one manager.
///
/// The default cache is distinct from every user-defined name; constructing a
/// named cache from [`DEFAULT_CACHE_NAME`] yields [`CacheName::Default`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheName {
    Default,
    Named(String),
}

impl CacheName {
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        if name == DEFAULT_CACHE_NAME {
            Self::Default
        } else {
            Self::Named(name)
        }
    }

    /// Map an optional management argument to a cache name; absence selects
    /// the default cache.
    pub fn from_argument(argument: Option<&str>) -> Self {
        match argument {
            Some(name) => Self::named(name),
            None => Self::Default,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Default => DEFAULT_CACHE_NAME,
            Self::Named(name) => name,
        }
    }
}

impl fmt::Display for CacheName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for CacheName {
    fn from(value: &str) -> Self {
        Self::named(value)
    }
}

impl From<String> for CacheName {
    fn from(value: String) -> Self {
        Self::named(value)
    }
}

/// Readiness of a named cache. `Undefined` is implicit: it has no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Undefined,
    Defined,
    Running,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Defined => "defined",
            Self::Running => "running",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time copy of one registry entry.
#[derive(Debug, Clone)]
pub struct CacheEntryRecord {
    pub name: CacheName,
    pub state: LifecycleState,
    pub configuration: ConfigurationRef,
}
