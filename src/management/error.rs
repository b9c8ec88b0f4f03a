use thiserror::Error;

/// Errors surfaced by the manager and its management surface.
///
/// `OperationNotExposed` means the caller asked for something outside the
/// exposure policy; every other variant comes from a call the policy allows.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ManagementError {
    #[error("management identity `{object_name}` is already registered")]
    DuplicateIdentity { object_name: String },
    #[error("operation `{operation}` is not exposed to management clients")]
    OperationNotExposed { operation: String },
    #[error("management target `{target}` not found")]
    UnknownTarget { target: String },
    #[error("`{target}` cannot move from {from} to {to}")]
    InvalidStateTransition {
        target: String,
        from: &'static str,
        to: &'static str,
    },
    #[error("invalid management identity `{value}`: {reason}")]
    InvalidIdentity { value: String, reason: &'static str },
}

impl ManagementError {
    pub fn duplicate_identity(object_name: impl ToString) -> Self {
        Self::DuplicateIdentity {
            object_name: object_name.to_string(),
        }
    }

    pub fn not_exposed(operation: impl Into<String>) -> Self {
        Self::OperationNotExposed {
            operation: operation.into(),
        }
    }

    pub fn unknown_target(target: impl ToString) -> Self {
        Self::UnknownTarget {
            target: target.to_string(),
        }
    }

    pub fn invalid_transition(
        target: impl ToString,
        from: &'static str,
        to: &'static str,
    ) -> Self {
        Self::InvalidStateTransition {
            target: target.to_string(),
            from,
            to,
        }
    }

    pub fn invalid_identity(value: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidIdentity {
            value: value.into(),
            reason,
        }
    }

    /// True when the call was refused by the exposure policy.
    pub fn is_not_exposed(&self) -> bool {
        matches!(self, Self::OperationNotExposed { .. })
    }

    pub fn is_unknown_target(&self) -> bool {
        matches!(self, Self::UnknownTarget { .. })
    }
}
