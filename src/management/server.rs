//! Process-scoped table of registered management gateways.
//!
//! This is the lookup surface a management transport talks to: it resolves an
//! object name to a gateway and forwards the attribute read or operation.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use once_cell::sync::Lazy;
use tracing::{debug, info};

use super::error::ManagementError;
use super::gateway::{AttributeValue, ExposureGateway};
use super::identity::ObjectName;

static GLOBAL_SERVER: Lazy<Arc<ManagementServer>> = Lazy::new(|| Arc::new(ManagementServer::new()));

#[derive(Default)]
pub struct ManagementServer {
    bindings: DashMap<ObjectName, Arc<ExposureGateway>>,
}

impl ManagementServer {
    pub fn new() -> Self {
        Self {
            bindings: DashMap::new(),
        }
    }

    /// The server shared by every manager in this process.
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL_SERVER)
    }

    pub fn register(&self, gateway: Arc<ExposureGateway>) -> Result<ObjectName, ManagementError> {
        let object_name = gateway.object_name();
        match self.bindings.entry(object_name.clone()) {
            Entry::Occupied(_) => Err(ManagementError::duplicate_identity(&object_name)),
            Entry::Vacant(vacant) => {
                vacant.insert(gateway);
                info!(object_name = %object_name, "Management gateway registered");
                Ok(object_name)
            }
        }
    }

    /// Returns `false` when nothing was registered under `object_name`.
    pub fn unregister(&self, object_name: &ObjectName) -> bool {
        let removed = self.bindings.remove(object_name).is_some();
        if removed {
            info!(object_name = %object_name, "Management gateway unregistered");
        }
        removed
    }

    pub fn is_registered(&self, object_name: &ObjectName) -> bool {
        self.bindings.contains_key(object_name)
    }

    pub fn object_names(&self) -> Vec<ObjectName> {
        let mut names: Vec<_> = self.bindings.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn lookup(&self, object_name: &ObjectName) -> Result<Arc<ExposureGateway>, ManagementError> {
        self.bindings
            .get(object_name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| {
                debug!(object_name = %object_name, "Lookup of unregistered object name");
                ManagementError::unknown_target(object_name)
            })
    }

    pub fn get_attribute(
        &self,
        object_name: &ObjectName,
        attribute: &str,
    ) -> Result<AttributeValue, ManagementError> {
        self.lookup(object_name)?.get_attribute(attribute)
    }

    pub fn invoke(
        &self,
        object_name: &ObjectName,
        operation: &str,
        args: &[&str],
    ) -> Result<AttributeValue, ManagementError> {
        self.lookup(object_name)?.invoke(operation, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{BasicConfiguration, CacheRegistry};
    use crate::cluster::MembershipView;
    use crate::management::gateway::{ExposurePolicy, ManagedState};
    use crate::management::identity::ManagerIdentity;
    use crate::manager::ManagerLifecycle;

    fn gateway(domain: &str) -> Arc<ExposureGateway> {
        let identity = ManagerIdentity::new(domain, "DefaultCacheManager").expect("valid");
        Arc::new(ExposureGateway::new(
            ManagedState::new(
                identity,
                Arc::new(CacheRegistry::new(BasicConfiguration::default().into_ref())),
                Arc::new(MembershipView::local()),
                Arc::new(ManagerLifecycle::detached()),
            ),
            ExposurePolicy::baseline(),
        ))
    }

    #[test]
    fn registered_gateway_is_reachable() {
        let server = ManagementServer::new();
        let name = server.register(gateway("srv")).expect("registered");

        assert!(server.is_registered(&name));
        assert_eq!(
            server.get_attribute(&name, "CreatedCacheCount"),
            Ok(AttributeValue::Integer(0))
        );
        server.invoke(&name, "startCache", &[]).expect("exposed");
        assert_eq!(
            server.get_attribute(&name, "RunningCacheCount"),
            Ok(AttributeValue::Integer(1))
        );
    }

    #[test]
    fn unregistered_name_is_unknown_target() {
        let server = ManagementServer::new();
        let name = server.register(gateway("srv")).expect("registered");
        assert!(server.unregister(&name));
        assert!(!server.unregister(&name));

        let err = server
            .get_attribute(&name, "CreatedCacheCount")
            .expect_err("gone");
        assert!(err.is_unknown_target());
    }

    #[test]
    fn double_registration_is_refused() {
        let server = ManagementServer::new();
        server.register(gateway("srv")).expect("first");
        let err = server.register(gateway("srv")).expect_err("second");
        assert!(matches!(err, ManagementError::DuplicateIdentity { .. }));
        assert_eq!(server.object_names().len(), 1);
    }

    #[test]
    fn not_exposed_passes_through_unchanged() {
        let server = ManagementServer::new();
        let name = server.register(gateway("srv")).expect("registered");
        let err = server.invoke(&name, "stop", &[]).expect_err("refused");
        assert!(err.is_not_exposed());
    }
}
