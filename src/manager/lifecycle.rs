//! Running/terminated state shared by a manager and its management gateway.

use std::sync::{LockResult, RwLock};

use tracing::warn;

use crate::management::{IdentityLease, ManagementError, ObjectName};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerStatus {
    Running,
    Terminated,
}

impl ManagerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Terminated => "terminated",
        }
    }
}

enum Phase {
    /// The lease is absent for gateways hosted without an identity reservation.
    Running { _lease: Option<IdentityLease> },
    Terminated,
}

/// Gate every cache operation passes through.
///
/// Operations hold the lock shared for their whole duration; teardown holds
/// it exclusively, so no operation can interleave with it or follow it.
pub struct ManagerLifecycle {
    phase: RwLock<Phase>,
}

impl ManagerLifecycle {
    /// Running, holding `lease` until terminated.
    pub fn new(lease: IdentityLease) -> Self {
        Self {
            phase: RwLock::new(Phase::Running { _lease: Some(lease) }),
        }
    }

    /// Running, without an identity reservation.
    pub fn detached() -> Self {
        Self {
            phase: RwLock::new(Phase::Running { _lease: None }),
        }
    }

    pub fn status(&self) -> ManagerStatus {
        match *recover(self.phase.read(), "status", "rwlock.read") {
            Phase::Running { .. } => ManagerStatus::Running,
            Phase::Terminated => ManagerStatus::Terminated,
        }
    }

    /// Run `op` if the manager is running. Fails with `InvalidStateTransition`
    /// naming `target` once it has been terminated.
    pub fn with_running<T>(
        &self,
        target: &ObjectName,
        to: &'static str,
        op: impl FnOnce() -> T,
    ) -> Result<T, ManagementError> {
        let phase = recover(self.phase.read(), to, "rwlock.read");
        match *phase {
            Phase::Running { .. } => Ok(op()),
            Phase::Terminated => Err(ManagementError::invalid_transition(
                target,
                ManagerStatus::Terminated.as_str(),
                to,
            )),
        }
    }

    /// Run `teardown` exclusively, then terminate and release the identity.
    /// Returns `None` when already terminated.
    pub fn terminate<T>(&self, teardown: impl FnOnce() -> T) -> Option<T> {
        let mut phase = recover(self.phase.write(), "terminate", "rwlock.write");
        if matches!(*phase, Phase::Terminated) {
            return None;
        }

        let outcome = teardown();
        // The lease drops here, after the teardown, still under the lock.
        *phase = Phase::Terminated;
        Some(outcome)
    }
}

fn recover<G>(result: LockResult<G>, op: &'static str, lock_kind: &'static str) -> G {
    result.unwrap_or_else(|poisoned| {
        warn!(
            op,
            lock_kind,
            result = "poisoned_recovered",
            "Recovered from poisoned manager lifecycle lock"
        );
        poisoned.into_inner()
    })
}
