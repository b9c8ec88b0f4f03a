//! Named-cache lifecycle management with an allow-listed management surface.
//!
//! - [`cache`]: the per-manager registry of named caches and their lifecycle
//! - [`cluster`]: node address and cluster membership view
//! - [`management`]: identities, the exposure gateway and the management server
//! - [`manager`]: the [`manager::CacheManager`] facade applications use

pub mod cache;
pub mod cluster;
pub mod config;
pub mod infra;
pub mod management;
pub mod manager;
