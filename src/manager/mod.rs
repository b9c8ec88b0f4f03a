//! The administrative facade applications hold.
//!
//! A [`CacheManager`] owns a [`CacheRegistry`], a [`MembershipView`] and the
//! [`ExposureGateway`] registered for it in the management server. Its own
//! teardown ([`CacheManager::stop`]) is an in-process API only; the gateway
//! has no path to it, and once it has run the gateway's operations fail too.

mod builder;
mod lifecycle;

use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::{
    CacheHandle, CacheName, CacheRegistry, ConfigurationRef, LifecycleState, RegistrySnapshot,
};
use crate::cluster::MembershipView;
use crate::management::{
    ExposureGateway, ManagementError, ManagementServer, ManagerIdentity, ObjectName,
};

pub use builder::ManagerBuilder;
pub use lifecycle::{ManagerLifecycle, ManagerStatus};

pub struct CacheManager {
    identity: ManagerIdentity,
    object_name: ObjectName,
    registry: Arc<CacheRegistry>,
    membership: Arc<MembershipView>,
    gateway: Arc<ExposureGateway>,
    server: Arc<ManagementServer>,
    /// Shared with the gateway.
    lifecycle: Arc<ManagerLifecycle>,
}

impl CacheManager {
    pub fn builder() -> ManagerBuilder {
        ManagerBuilder::new()
    }

    pub fn identity(&self) -> &ManagerIdentity {
        &self.identity
    }

    pub fn object_name(&self) -> &ObjectName {
        &self.object_name
    }

    /// Membership view; the cluster membership protocol pushes updates here.
    pub fn membership(&self) -> &Arc<MembershipView> {
        &self.membership
    }

    pub fn gateway(&self) -> Arc<ExposureGateway> {
        Arc::clone(&self.gateway)
    }

    pub fn status(&self) -> ManagerStatus {
        self.lifecycle.status()
    }

    pub fn define_configuration(
        &self,
        name: impl Into<CacheName>,
        configuration: ConfigurationRef,
    ) -> Result<(), ManagementError> {
        self.lifecycle.with_running(&self.object_name, "define", || {
            self.registry.define(name.into(), configuration)
        })
    }

    pub fn start_cache(&self, name: impl Into<CacheName>) -> Result<CacheHandle, ManagementError> {
        self.lifecycle
            .with_running(&self.object_name, "start", || self.registry.start(name.into()))
    }

    pub fn start_default_cache(&self) -> Result<CacheHandle, ManagementError> {
        self.start_cache(CacheName::Default)
    }

    /// Returns `Ok(false)` when the cache was not running.
    pub fn stop_cache(&self, name: impl Into<CacheName>) -> Result<bool, ManagementError> {
        self.lifecycle
            .with_running(&self.object_name, "stop", || self.registry.stop(&name.into()))
    }

    pub fn cache_state(&self, name: impl Into<CacheName>) -> LifecycleState {
        self.registry.state(&name.into())
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        self.registry.snapshot()
    }

    /// Tear the manager down: unregister its gateway, stop its caches, drop
    /// every cache record and release its identity. Calling it again is a no-op.
    pub fn stop(&self) {
        let stopped = self.lifecycle.terminate(|| {
            self.server.unregister(&self.object_name);
            let stopped_caches = self.registry.stop_all();
            self.registry.clear();
            stopped_caches
        });

        match stopped {
            Some(stopped_caches) => info!(
                object_name = %self.object_name,
                stopped_caches,
                "Cache manager stopped"
            ),
            None => debug!(object_name = %self.object_name, "Cache manager already stopped"),
        }
    }
}

impl Drop for CacheManager {
    fn drop(&mut self) {
        self.stop();
    }
}
