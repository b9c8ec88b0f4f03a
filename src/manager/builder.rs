use std::sync::Arc;

use tracing::info;

use crate::cache::{BasicConfiguration, CacheName, CacheRegistry, ConfigurationRef};
use crate::cluster::MembershipView;
use crate::config::Settings;
use crate::management::{
    DomainNamer, ExposureGateway, ExposurePolicy, IdentityTable, ManagedState, ManagementError,
    ManagementServer,
};

use super::{CacheManager, ManagerLifecycle};

/// Assembles a [`CacheManager`].
///
/// Unless overridden, the manager registers in the process-wide
/// [`IdentityTable`] and [`ManagementServer`], runs in local membership mode
/// and refuses to share its identity with another live manager.
pub struct ManagerBuilder {
    domain: Option<String>,
    instance_name: Option<String>,
    enforce_unique_domain: bool,
    cluster_name: Option<String>,
    default_configuration: ConfigurationRef,
    definitions: Vec<(CacheName, ConfigurationRef)>,
    membership: Option<MembershipView>,
    identities: Option<Arc<IdentityTable>>,
    server: Option<Arc<ManagementServer>>,
    policy: Option<ExposurePolicy>,
}

impl ManagerBuilder {
    pub fn new() -> Self {
        Self {
            domain: None,
            instance_name: None,
            enforce_unique_domain: true,
            cluster_name: None,
            default_configuration: BasicConfiguration::default().into_ref(),
            definitions: Vec::new(),
            membership: None,
            identities: None,
            server: None,
            policy: None,
        }
    }

    /// Seed a builder from loaded settings, including the caches they declare.
    pub fn from_settings(settings: &Settings) -> Self {
        let mut builder = Self::new()
            .enforce_unique_domain(settings.manager.enforce_unique_domain)
            .default_configuration(settings.default_cache.clone().into_ref())
            .membership(settings.membership.build_view());

        if let Some(domain) = &settings.manager.domain {
            builder = builder.domain(domain.clone());
        }
        if let Some(name) = &settings.manager.instance_name {
            builder = builder.instance_name(name.clone());
        }
        if let Some(cluster) = &settings.manager.cluster_name {
            builder = builder.cluster_name(cluster.clone());
        }
        for (name, configuration) in &settings.caches {
            builder = builder.define(name.as_str(), configuration.clone().into_ref());
        }
        builder
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn instance_name(mut self, name: impl Into<String>) -> Self {
        self.instance_name = Some(name.into());
        self
    }

    pub fn enforce_unique_domain(mut self, enforce: bool) -> Self {
        self.enforce_unique_domain = enforce;
        self
    }

    pub fn cluster_name(mut self, name: impl Into<String>) -> Self {
        self.cluster_name = Some(name.into());
        self
    }

    pub fn default_configuration(mut self, configuration: ConfigurationRef) -> Self {
        self.default_configuration = configuration;
        self
    }

    /// Define a cache as soon as the manager is built.
    pub fn define(mut self, name: impl Into<CacheName>, configuration: ConfigurationRef) -> Self {
        self.definitions.push((name.into(), configuration));
        self
    }

    pub fn membership(mut self, membership: MembershipView) -> Self {
        self.membership = Some(membership);
        self
    }

    pub fn identity_table(mut self, table: Arc<IdentityTable>) -> Self {
        self.identities = Some(table);
        self
    }

    pub fn management_server(mut self, server: Arc<ManagementServer>) -> Self {
        self.server = Some(server);
        self
    }

    pub fn exposure_policy(mut self, policy: ExposurePolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn build(self) -> Result<CacheManager, ManagementError> {
        let identities = self.identities.unwrap_or_else(IdentityTable::global);
        let server = self.server.unwrap_or_else(ManagementServer::global);

        let mut namer = DomainNamer::new(identities);
        if let Some(cluster) = self.cluster_name {
            namer = namer.with_cluster_name(cluster);
        }
        let lease = namer.resolve(
            self.domain.as_deref(),
            self.instance_name.as_deref(),
            self.enforce_unique_domain,
        )?;
        let identity = lease.identity().clone();
        let lifecycle = Arc::new(ManagerLifecycle::new(lease));

        let registry = Arc::new(CacheRegistry::new(self.default_configuration));
        for (name, configuration) in self.definitions {
            registry.define(name, configuration);
        }
        let membership = Arc::new(self.membership.unwrap_or_default());

        let gateway = Arc::new(ExposureGateway::new(
            ManagedState::new(
                identity.clone(),
                Arc::clone(&registry),
                Arc::clone(&membership),
                Arc::clone(&lifecycle),
            ),
            self.policy.unwrap_or_default(),
        ));
        // On failure the lifecycle drops here and the identity is freed again.
        let object_name = server.register(Arc::clone(&gateway))?;

        info!(
            object_name = %object_name,
            membership = membership.mode().as_str(),
            defined = registry.snapshot().defined_count(),
            "Cache manager started"
        );

        Ok(CacheManager {
            identity,
            object_name,
            registry,
            membership,
            gateway,
            server,
            lifecycle,
        })
    }
}

impl Default for ManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
