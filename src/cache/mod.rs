//! Named-cache registry.
//!
//! Owns the lifecycle table of one manager:
//!
//! - **Undefined**: the name has no record
//! - **Defined**: a configuration is attached, the cache is not running
//! - **Running**: the cache has been started and hands out a [`CacheHandle`]
//!
//! Configurations are opaque [`CacheConfiguration`] references supplied by the
//! caller; only their summary is used, for display.

mod config;
mod record;
mod registry;
pub mod render;

pub use config::{BasicConfiguration, CacheConfiguration, CacheMode, ConfigurationRef};
pub use record::{CacheEntryRecord, CacheName, DEFAULT_CACHE_NAME, LifecycleState};
pub use registry::{CacheHandle, CacheRegistry, RegistrySnapshot};
pub(crate) use registry::{
    METRIC_CACHE_CREATED, METRIC_CACHE_START, METRIC_CACHE_STOP, METRIC_RUNNING_CACHES,
};
