//! Management surface: identities, the exposure gateway and the server that
//! management transports query.

mod error;
mod gateway;
mod identity;
mod server;

pub use error::ManagementError;
pub use gateway::{
    AttributeReader, AttributeValue, ExposureDescription, ExposureGateway, ExposurePolicy,
    ManagedState, OperationHandler,
};
pub(crate) use gateway::METRIC_GATEWAY_REJECTED;
pub use identity::{
    DEFAULT_DOMAIN, DEFAULT_INSTANCE_NAME, DomainNamer, IdentityLease, IdentityTable,
    MANAGER_TYPE, ManagerIdentity, ObjectName,
};
pub use server::ManagementServer;
