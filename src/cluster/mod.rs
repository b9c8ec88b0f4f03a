//! Node addressing and cluster membership.

mod membership;

pub use membership::{
    Address, LOCAL_ADDRESS, MembershipMode, MembershipSnapshot, MembershipView,
};
