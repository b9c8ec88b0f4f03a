//! Manager identities and collision-free domain resolution.
//!
//! Every live manager holds an [`IdentityLease`] from an [`IdentityTable`].
//! The lease is taken explicitly when the manager is built and given back
//! when it is torn down (or dropped), so the table always reflects exactly the
//! identities in use.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use once_cell::sync::Lazy;
use tracing::{debug, info, warn};

use super::error::ManagementError;

/// Domain used when the caller does not request one.
pub const DEFAULT_DOMAIN: &str = "org.cachemgr";
/// Instance name used when the caller does not override it.
pub const DEFAULT_INSTANCE_NAME: &str = "DefaultCacheManager";
/// `type` key of every manager object name.
pub const MANAGER_TYPE: &str = "CacheManager";

static GLOBAL_IDENTITIES: Lazy<Arc<IdentityTable>> = Lazy::new(|| Arc::new(IdentityTable::new()));

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ManagerIdentity {
    domain: String,
    instance_name: String,
}

impl ManagerIdentity {
    pub fn new(
        domain: impl Into<String>,
        instance_name: impl Into<String>,
    ) -> Result<Self, ManagementError> {
        let domain = domain.into();
        let instance_name = instance_name.into();

        if domain.trim().is_empty() {
            return Err(ManagementError::invalid_identity(domain, "domain must not be empty"));
        }
        if domain.contains([':', ',', '=', '"']) {
            return Err(ManagementError::invalid_identity(
                domain,
                "domain must not contain `:`, `,`, `=` or `\"`",
            ));
        }
        if instance_name.trim().is_empty() {
            return Err(ManagementError::invalid_identity(
                instance_name,
                "instance name must not be empty",
            ));
        }
        if instance_name.contains([',', '=', '"']) {
            return Err(ManagementError::invalid_identity(
                instance_name,
                "instance name must not contain `,`, `=` or `\"`",
            ));
        }

        Ok(Self {
            domain,
            instance_name,
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    pub fn is_default_instance(&self) -> bool {
        self.instance_name == DEFAULT_INSTANCE_NAME
    }

    pub fn object_name(&self) -> ObjectName {
        ObjectName {
            identity: self.clone(),
        }
    }
}

/// Address of a manager in the management server:
/// `{domain}:type=CacheManager[,name="{instance}"]`.
///
/// The `name` key is present only for a non-default instance name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectName {
    identity: ManagerIdentity,
}

impl ObjectName {
    pub fn identity(&self) -> &ManagerIdentity {
        &self.identity
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:type={MANAGER_TYPE}", self.identity.domain)?;
        if !self.identity.is_default_instance() {
            write!(f, ",name=\"{}\"", self.identity.instance_name)?;
        }
        Ok(())
    }
}

impl FromStr for ObjectName {
    type Err = ManagementError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let malformed = || ManagementError::unknown_target(value);

        let (domain, properties) = value.split_once(':').ok_or_else(malformed)?;
        let mut manager_type = None;
        let mut instance_name = None;
        for property in properties.split(',') {
            let (key, raw) = property.split_once('=').ok_or_else(malformed)?;
            match key.trim() {
                "type" => manager_type = Some(raw.trim()),
                "name" => instance_name = Some(raw.trim().trim_matches('"')),
                _ => return Err(malformed()),
            }
        }

        if manager_type != Some(MANAGER_TYPE) {
            return Err(malformed());
        }

        let identity = ManagerIdentity::new(
            domain,
            instance_name.unwrap_or(DEFAULT_INSTANCE_NAME),
        )
        .map_err(|_| malformed())?;
        Ok(identity.object_name())
    }
}

/// Process-scoped set of live manager identities.
#[derive(Debug, Default)]
pub struct IdentityTable {
    live: DashMap<ManagerIdentity, ()>,
}

impl IdentityTable {
    pub fn new() -> Self {
        Self {
            live: DashMap::new(),
        }
    }

    /// The table shared by every manager in this process.
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL_IDENTITIES)
    }

    pub fn is_live(&self, identity: &ManagerIdentity) -> bool {
        self.live.contains_key(identity)
    }

    pub fn live_identities(&self) -> Vec<ManagerIdentity> {
        let mut identities: Vec<_> = self.live.iter().map(|entry| entry.key().clone()).collect();
        identities.sort();
        identities
    }

    fn try_reserve(self: &Arc<Self>, identity: ManagerIdentity) -> Option<IdentityLease> {
        match self.live.entry(identity) {
            Entry::Occupied(_) => None,
            Entry::Vacant(vacant) => {
                let identity = vacant.key().clone();
                vacant.insert(());
                Some(IdentityLease {
                    identity,
                    table: Arc::clone(self),
                })
            }
        }
    }
}

/// Proof that an identity is reserved. Releasing or dropping it frees the
/// identity for reuse.
#[derive(Debug)]
pub struct IdentityLease {
    identity: ManagerIdentity,
    table: Arc<IdentityTable>,
}

impl IdentityLease {
    pub fn identity(&self) -> &ManagerIdentity {
        &self.identity
    }

    pub fn release(self) {
        drop(self);
    }
}

impl Drop for IdentityLease {
    fn drop(&mut self) {
        self.table.live.remove(&self.identity);
        debug!(
            object_name = %self.identity.object_name(),
            "Manager identity released"
        );
    }
}

/// Resolves the identity a manager registers under.
#[derive(Debug, Clone)]
pub struct DomainNamer {
    table: Arc<IdentityTable>,
    cluster_name: Option<String>,
}

impl DomainNamer {
    pub fn new(table: Arc<IdentityTable>) -> Self {
        Self {
            table,
            cluster_name: None,
        }
    }

    /// Salt derived domains with a logical cluster/container name.
    pub fn with_cluster_name(mut self, cluster_name: impl Into<String>) -> Self {
        let cluster_name = cluster_name.into();
        self.cluster_name = (!cluster_name.trim().is_empty()).then_some(cluster_name);
        self
    }

    /// Domain used when none is requested.
    pub fn derived_domain(&self) -> String {
        match &self.cluster_name {
            Some(cluster) => format!("{DEFAULT_DOMAIN}.{cluster}"),
            None => DEFAULT_DOMAIN.to_string(),
        }
    }

    /// Reserve an identity.
    ///
    /// With `enforce_uniqueness`, a live `(domain, instance_name)` pair fails
    /// with `DuplicateIdentity`. Without it, the first free domain among
    /// `domain`, `domain2`, `domain3`, ... is taken.
    pub fn resolve(
        &self,
        requested_domain: Option<&str>,
        instance_name: Option<&str>,
        enforce_uniqueness: bool,
    ) -> Result<IdentityLease, ManagementError> {
        let domain = requested_domain
            .map(str::trim)
            .filter(|domain| !domain.is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| self.derived_domain());
        let instance_name = instance_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_INSTANCE_NAME)
            .to_owned();

        let identity = ManagerIdentity::new(domain.clone(), instance_name.clone())?;
        if let Some(lease) = self.table.try_reserve(identity.clone()) {
            info!(object_name = %identity.object_name(), "Manager identity acquired");
            return Ok(lease);
        }

        if enforce_uniqueness {
            warn!(
                object_name = %identity.object_name(),
                "Manager identity already in use"
            );
            return Err(ManagementError::duplicate_identity(identity.object_name()));
        }

        let mut suffix: u64 = 2;
        loop {
            let candidate = ManagerIdentity::new(format!("{domain}{suffix}"), instance_name.clone())?;
            if let Some(lease) = self.table.try_reserve(candidate) {
                info!(
                    requested = %identity.object_name(),
                    object_name = %lease.identity().object_name(),
                    "Manager identity acquired under alternate domain"
                );
                return Ok(lease);
            }
            suffix += 1;
        }
    }
}
