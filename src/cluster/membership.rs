//! Cluster membership view.
//!
//! Readers always receive a complete, immutable snapshot; the membership
//! protocol installs replacements wholesale.

use std::collections::BTreeSet;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::cache::render;
use crate::management::ManagementError;

/// Textual form of the local-mode address sentinel.
pub const LOCAL_ADDRESS: &str = "local";

/// Logical address of a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Address {
    /// The sentinel used when the manager is not clustered.
    Local,
    Node(String),
}

impl Address {
    /// A clustered node. `local` is reserved for [`Address::Local`]; a node
    /// given that name would render the same as the sentinel, and settings
    /// refuse it.
    pub fn node(name: impl Into<String>) -> Self {
        Self::Node(name.into())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str(LOCAL_ADDRESS),
            Self::Node(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipSnapshot {
    local_address: Address,
    peers: BTreeSet<Address>,
    physical_addresses: Vec<SocketAddr>,
}

impl MembershipSnapshot {
    /// The fixed snapshot of a non-clustered node.
    pub fn local() -> Self {
        Self {
            local_address: Address::Local,
            peers: BTreeSet::from([Address::Local]),
            physical_addresses: Vec::new(),
        }
    }

    /// Build a clustered snapshot. The local address is always a member.
    pub fn clustered(
        local_address: Address,
        peers: impl IntoIterator<Item = Address>,
        physical_addresses: Vec<SocketAddr>,
    ) -> Self {
        let mut peers: BTreeSet<Address> = peers.into_iter().collect();
        peers.insert(local_address.clone());
        Self {
            local_address,
            peers,
            physical_addresses,
        }
    }

    pub fn local_address(&self) -> &Address {
        &self.local_address
    }

    pub fn peers(&self) -> &BTreeSet<Address> {
        &self.peers
    }

    pub fn physical_addresses(&self) -> &[SocketAddr] {
        &self.physical_addresses
    }

    pub fn cluster_size(&self) -> usize {
        self.peers.len()
    }

    pub fn is_local(&self) -> bool {
        self.local_address == Address::Local
    }

    /// `local` for a non-clustered node, otherwise `[a, b, ...]`.
    pub fn render_members(&self) -> String {
        if self.is_local() {
            return LOCAL_ADDRESS.to_string();
        }
        render::bracketed(self.peers.iter().map(ToString::to_string))
    }

    /// `local` for a non-clustered node, otherwise `[ip:port, ...]`.
    pub fn render_physical_addresses(&self) -> String {
        if self.is_local() {
            return LOCAL_ADDRESS.to_string();
        }
        render::bracketed(self.physical_addresses.iter().map(ToString::to_string))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipMode {
    Local,
    Clustered,
}

impl MembershipMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Clustered => "clustered",
        }
    }
}

pub struct MembershipView {
    mode: MembershipMode,
    current: watch::Sender<Arc<MembershipSnapshot>>,
}

impl MembershipView {
    /// A view that never changes.
    pub fn local() -> Self {
        Self::with_mode(MembershipMode::Local, MembershipSnapshot::local())
    }

    /// A view refreshed by an external membership protocol.
    pub fn clustered(initial: MembershipSnapshot) -> Self {
        Self::with_mode(MembershipMode::Clustered, initial)
    }

    fn with_mode(mode: MembershipMode, initial: MembershipSnapshot) -> Self {
        let (current, _) = watch::channel(Arc::new(initial));
        Self { mode, current }
    }

    pub fn mode(&self) -> MembershipMode {
        self.mode
    }

    /// The most recently installed snapshot.
    pub fn current(&self) -> Arc<MembershipSnapshot> {
        Arc::clone(&self.current.borrow())
    }

    /// Install a new snapshot. Local views reject updates.
    pub fn update(&self, snapshot: MembershipSnapshot) -> Result<(), ManagementError> {
        if self.mode == MembershipMode::Local {
            warn!(
                mode = self.mode.as_str(),
                "Rejected membership update on a local view"
            );
            return Err(ManagementError::invalid_transition(
                "membership",
                MembershipMode::Local.as_str(),
                MembershipMode::Clustered.as_str(),
            ));
        }

        let cluster_size = snapshot.cluster_size();
        let local_address = snapshot.local_address().to_string();
        self.current.send_replace(Arc::new(snapshot));
        info!(cluster_size, local_address, "Membership view updated");
        Ok(())
    }

    /// Receive every snapshot installed after this call.
    pub fn subscribe(&self) -> watch::Receiver<Arc<MembershipSnapshot>> {
        self.current.subscribe()
    }
}

impl Default for MembershipView {
    fn default() -> Self {
        Self::local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(value: &str) -> SocketAddr {
        value.parse().expect("valid socket address")
    }

    #[test]
    fn local_view_reports_sentinel() {
        let view = MembershipView::local();
        let snapshot = view.current();

        assert_eq!(snapshot.local_address().to_string(), "local");
        assert_eq!(snapshot.render_members(), "local");
        assert_eq!(snapshot.render_physical_addresses(), "local");
        assert_eq!(snapshot.cluster_size(), 1);
        assert_eq!(view.mode(), MembershipMode::Local);
    }

    #[test]
    fn local_view_rejects_updates() {
        let view = MembershipView::local();
        let err = view
            .update(MembershipSnapshot::clustered(
                Address::node("a"),
                [],
                Vec::new(),
            ))
            .expect_err("local view must not change");

        assert!(matches!(err, ManagementError::InvalidStateTransition { .. }));
        assert!(view.current().is_local());
    }

    #[test]
    fn clustered_snapshot_includes_local_member() {
        let snapshot = MembershipSnapshot::clustered(
            Address::node("node-a"),
            [Address::node("node-b"), Address::node("node-c")],
            vec![addr("10.0.0.1:7800")],
        );

        assert_eq!(snapshot.cluster_size(), 3);
        assert!(snapshot.peers().contains(&Address::node("node-a")));
        assert_eq!(snapshot.render_members(), "[node-a, node-b, node-c]");
        assert_eq!(snapshot.render_physical_addresses(), "[10.0.0.1:7800]");
    }

    #[test]
    fn update_replaces_whole_snapshot() {
        let view = MembershipView::clustered(MembershipSnapshot::clustered(
            Address::node("node-a"),
            [],
            Vec::new(),
        ));
        let before = view.current();

        view.update(MembershipSnapshot::clustered(
            Address::node("node-a"),
            [Address::node("node-b")],
            vec![addr("10.0.0.1:7800")],
        ))
        .expect("clustered view accepts updates");

        assert_eq!(before.cluster_size(), 1);
        assert_eq!(view.current().cluster_size(), 2);
    }

    #[tokio::test]
    async fn subscribers_observe_updates() {
        let view = MembershipView::clustered(MembershipSnapshot::clustered(
            Address::node("node-a"),
            [],
            Vec::new(),
        ));
        let mut receiver = view.subscribe();

        view.update(MembershipSnapshot::clustered(
            Address::node("node-a"),
            [Address::node("node-b"), Address::node("node-c")],
            Vec::new(),
        ))
        .expect("clustered view accepts updates");

        receiver.changed().await.expect("sender alive");
        assert_eq!(receiver.borrow_and_update().cluster_size(), 3);
    }
}
