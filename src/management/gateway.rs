//! Allow-listed management surface of one manager.
//!
//! The exposure policy is a fixed table from attribute/operation name to a
//! typed handler, built when the gateway is constructed. A request is checked
//! against the table before anything is dispatched, so methods the manager
//! implements internally (for example stopping the whole manager) stay
//! unreachable from management clients.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::{CacheName, CacheRegistry};
use crate::cluster::MembershipView;
use crate::manager::ManagerLifecycle;

use super::error::ManagementError;
use super::identity::{ManagerIdentity, ObjectName};

pub(crate) const METRIC_GATEWAY_REJECTED: &str = "cachemgr_gateway_rejected_total";

/// Value returned by an attribute read or an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Void,
    Integer(i64),
    Text(String),
}

impl AttributeValue {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    fn count(value: impl TryInto<i64>) -> Self {
        Self::Integer(value.try_into().unwrap_or(i64::MAX))
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => Ok(()),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

/// State the gateway reads on every call. Never cached between calls.
///
/// `lifecycle` is the owning manager's; operations stop working once the
/// manager is terminated, even through a gateway reference held elsewhere.
pub struct ManagedState {
    identity: ManagerIdentity,
    registry: Arc<CacheRegistry>,
    membership: Arc<MembershipView>,
    lifecycle: Arc<ManagerLifecycle>,
}

impl ManagedState {
    pub fn new(
        identity: ManagerIdentity,
        registry: Arc<CacheRegistry>,
        membership: Arc<MembershipView>,
        lifecycle: Arc<ManagerLifecycle>,
    ) -> Self {
        Self {
            identity,
            registry,
            membership,
            lifecycle,
        }
    }
}

pub type AttributeReader = fn(&ManagedState) -> AttributeValue;
pub type OperationHandler = fn(&ManagedState, Option<&str>) -> Result<AttributeValue, ManagementError>;

/// The set of attributes and operations management clients may use.
#[derive(Clone)]
pub struct ExposurePolicy {
    attributes: BTreeMap<&'static str, AttributeReader>,
    operations: BTreeMap<&'static str, OperationHandler>,
}

impl ExposurePolicy {
    pub fn empty() -> Self {
        Self {
            attributes: BTreeMap::new(),
            operations: BTreeMap::new(),
        }
    }

    /// Counts, names and address information, plus `startCache`.
    pub fn baseline() -> Self {
        Self::empty()
            .with_attribute("CreatedCacheCount", |state| {
                AttributeValue::count(state.registry.snapshot().created_count)
            })
            .with_attribute("DefinedCacheCount", |state| {
                AttributeValue::count(state.registry.snapshot().defined_count())
            })
            .with_attribute("RunningCacheCount", |state| {
                AttributeValue::count(state.registry.snapshot().running_count)
            })
            .with_attribute("DefinedCacheNames", |state| {
                AttributeValue::Text(state.registry.snapshot().rendered_defined_names())
            })
            .with_attribute("NodeAddress", |state| {
                AttributeValue::Text(state.membership.current().local_address().to_string())
            })
            .with_attribute("ClusterMembers", |state| {
                AttributeValue::Text(state.membership.current().render_members())
            })
            .with_attribute("PhysicalAddresses", |state| {
                AttributeValue::Text(state.membership.current().render_physical_addresses())
            })
            .with_attribute("ClusterSize", |state| {
                AttributeValue::count(state.membership.current().cluster_size())
            })
            .with_attribute("Name", |state| {
                AttributeValue::Text(state.identity.instance_name().to_string())
            })
            .with_attribute("Version", |_| {
                AttributeValue::Text(env!("CARGO_PKG_VERSION").to_string())
            })
            .with_operation("startCache", start_cache)
    }

    pub fn with_attribute(mut self, name: &'static str, reader: AttributeReader) -> Self {
        self.attributes.insert(name, reader);
        self
    }

    pub fn with_operation(mut self, name: &'static str, handler: OperationHandler) -> Self {
        self.operations.insert(name, handler);
        self
    }

    pub fn exposes_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn exposes_operation(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    pub fn attribute_names(&self) -> Vec<&'static str> {
        self.attributes.keys().copied().collect()
    }

    pub fn operation_names(&self) -> Vec<&'static str> {
        self.operations.keys().copied().collect()
    }
}

impl Default for ExposurePolicy {
    fn default() -> Self {
        Self::baseline()
    }
}

fn start_cache(
    state: &ManagedState,
    name: Option<&str>,
) -> Result<AttributeValue, ManagementError> {
    if name.is_some_and(|name| name.trim().is_empty()) {
        return Err(ManagementError::unknown_target(format!(
            "{}/<blank cache name>",
            state.identity.object_name()
        )));
    }
    state
        .lifecycle
        .with_running(&state.identity.object_name(), "start", || {
            state.registry.start(CacheName::from_argument(name));
        })?;
    Ok(AttributeValue::Void)
}

/// Published shape of a gateway, for transports that list the surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExposureDescription {
    pub object_name: String,
    pub attributes: Vec<&'static str>,
    pub operations: Vec<&'static str>,
}

pub struct ExposureGateway {
    state: ManagedState,
    policy: ExposurePolicy,
}

impl ExposureGateway {
    pub fn new(state: ManagedState, policy: ExposurePolicy) -> Self {
        Self { state, policy }
    }

    pub fn identity(&self) -> &ManagerIdentity {
        &self.state.identity
    }

    pub fn object_name(&self) -> ObjectName {
        self.state.identity.object_name()
    }

    pub fn policy(&self) -> &ExposurePolicy {
        &self.policy
    }

    pub fn get_attribute(&self, name: &str) -> Result<AttributeValue, ManagementError> {
        let Some(reader) = self.policy.attributes.get(name) else {
            return Err(self.reject("attribute", name));
        };
        Ok(reader(&self.state))
    }

    /// Invoke an operation with zero or one string argument. Any other arity
    /// names an operation that is not exposed.
    pub fn invoke(&self, operation: &str, args: &[&str]) -> Result<AttributeValue, ManagementError> {
        let handler = match (self.policy.operations.get(operation), args) {
            (Some(handler), [] | [_]) => handler,
            _ => return Err(self.reject("operation", operation)),
        };

        debug!(
            object_name = %self.object_name(),
            operation,
            argument = args.first().copied(),
            "Dispatching management operation"
        );
        handler(&self.state, args.first().copied())
    }

    /// Read every exposed attribute.
    pub fn attributes(&self) -> BTreeMap<&'static str, AttributeValue> {
        self.policy
            .attributes
            .iter()
            .map(|(name, reader)| (*name, reader(&self.state)))
            .collect()
    }

    pub fn describe(&self) -> ExposureDescription {
        ExposureDescription {
            object_name: self.object_name().to_string(),
            attributes: self.policy.attribute_names(),
            operations: self.policy.operation_names(),
        }
    }

    fn reject(&self, kind: &'static str, name: &str) -> ManagementError {
        counter!(METRIC_GATEWAY_REJECTED, "kind" => kind).increment(1);
        warn!(
            object_name = %self.object_name(),
            kind,
            name,
            "Rejected call outside the exposure policy"
        );
        ManagementError::not_exposed(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{BasicConfiguration, LifecycleState};
    use crate::management::identity::DEFAULT_INSTANCE_NAME;

    fn gateway() -> (ExposureGateway, Arc<CacheRegistry>) {
        let registry = Arc::new(CacheRegistry::new(BasicConfiguration::default().into_ref()));
        let identity = ManagerIdentity::new("gateway-test", DEFAULT_INSTANCE_NAME).expect("valid");
        let state = ManagedState::new(
            identity,
            Arc::clone(&registry),
            Arc::new(MembershipView::local()),
            Arc::new(ManagerLifecycle::detached()),
        );
        (ExposureGateway::new(state, ExposurePolicy::baseline()), registry)
    }

    fn integer(gateway: &ExposureGateway, name: &str) -> i64 {
        gateway
            .get_attribute(name)
            .expect("exposed attribute")
            .as_integer()
            .expect("integer attribute")
    }

    #[test]
    fn start_cache_without_argument_starts_default() {
        let (gateway, registry) = gateway();

        let value = gateway.invoke("startCache", &[]).expect("exposed");

        assert_eq!(value, AttributeValue::Void);
        assert_eq!(registry.state(&CacheName::Default), LifecycleState::Running);
        assert_eq!(integer(&gateway, "CreatedCacheCount"), 1);
        assert_eq!(integer(&gateway, "DefinedCacheCount"), 0);
        assert_eq!(integer(&gateway, "RunningCacheCount"), 1);
        assert_eq!(
            gateway.get_attribute("DefinedCacheNames").expect("exposed"),
            AttributeValue::Text("[]".to_string())
        );
    }

    #[test]
    fn start_cache_with_name() {
        let (gateway, registry) = gateway();

        gateway.invoke("startCache", &["a"]).expect("exposed");

        assert_eq!(registry.state(&CacheName::named("a")), LifecycleState::Running);
        let names = gateway.get_attribute("DefinedCacheNames").expect("exposed");
        assert!(names.as_text().expect("text").contains("a("));
    }

    #[test]
    fn stop_is_not_exposed() {
        let (gateway, registry) = gateway();
        registry.start(CacheName::Default);

        let err = gateway.invoke("stop", &[]).expect_err("stop must be refused");

        assert!(err.is_not_exposed());
        assert_eq!(registry.state(&CacheName::Default), LifecycleState::Running);
    }

    #[test]
    fn unknown_attribute_is_not_exposed() {
        let (gateway, _) = gateway();
        let err = gateway.get_attribute("Status").expect_err("not listed");
        assert!(err.is_not_exposed());
    }

    #[test]
    fn extra_arguments_are_not_exposed() {
        let (gateway, registry) = gateway();
        let err = gateway
            .invoke("startCache", &["a", "b"])
            .expect_err("no two-argument form");

        assert!(err.is_not_exposed());
        assert_eq!(registry.state(&CacheName::named("a")), LifecycleState::Undefined);
    }

    #[test]
    fn blank_cache_name_is_unknown_target() {
        let (gateway, _) = gateway();
        let err = gateway
            .invoke("startCache", &["  "])
            .expect_err("blank name");

        assert!(err.is_unknown_target());
        assert!(!err.is_not_exposed());
    }

    #[test]
    fn local_address_attributes() {
        let (gateway, _) = gateway();
        let local = AttributeValue::Text("local".to_string());

        assert_eq!(gateway.get_attribute("NodeAddress"), Ok(local.clone()));
        assert_eq!(gateway.get_attribute("ClusterMembers"), Ok(local.clone()));
        assert_eq!(gateway.get_attribute("PhysicalAddresses"), Ok(local));
        assert_eq!(integer(&gateway, "ClusterSize"), 1);
    }

    #[test]
    fn describe_lists_policy() {
        let (gateway, _) = gateway();
        let description = gateway.describe();

        assert_eq!(description.object_name, "gateway-test:type=CacheManager");
        assert_eq!(description.operations, vec!["startCache"]);
        assert!(description.attributes.contains(&"ClusterSize"));
        assert!(!description.attributes.contains(&"stop"));
        assert_eq!(gateway.attributes().len(), description.attributes.len());
    }

    #[test]
    fn custom_policy_narrows_surface() {
        let registry = Arc::new(CacheRegistry::new(BasicConfiguration::default().into_ref()));
        let identity = ManagerIdentity::new("narrow", DEFAULT_INSTANCE_NAME).expect("valid");
        let policy = ExposurePolicy::empty().with_attribute("RunningCacheCount", |state| {
            AttributeValue::count(state.registry.snapshot().running_count)
        });
        let gateway = ExposureGateway::new(
            ManagedState::new(
                identity,
                registry,
                Arc::new(MembershipView::local()),
                Arc::new(ManagerLifecycle::detached()),
            ),
            policy,
        );

        assert!(gateway.invoke("startCache", &[]).unwrap_err().is_not_exposed());
        assert_eq!(integer(&gateway, "RunningCacheCount"), 0);
    }

    #[test]
    fn terminated_lifecycle_refuses_start() {
        let registry = Arc::new(CacheRegistry::new(BasicConfiguration::default().into_ref()));
        let identity = ManagerIdentity::new("ended", DEFAULT_INSTANCE_NAME).expect("valid");
        let lifecycle = Arc::new(ManagerLifecycle::detached());
        let gateway = ExposureGateway::new(
            ManagedState::new(
                identity,
                Arc::clone(&registry),
                Arc::new(MembershipView::local()),
                Arc::clone(&lifecycle),
            ),
            ExposurePolicy::baseline(),
        );
        lifecycle.terminate(|| ());

        let err = gateway.invoke("startCache", &[]).expect_err("terminated");

        assert_eq!(
            err,
            ManagementError::invalid_transition("ended:type=CacheManager", "terminated", "start")
        );
        assert_eq!(registry.state(&CacheName::Default), LifecycleState::Undefined);
        assert_eq!(integer(&gateway, "RunningCacheCount"), 0);
    }
}
