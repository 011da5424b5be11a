//! Quartermaster - RBAC policy store
//!
//! Persists policy rules in a relational table, manages roles and their
//! permissions on top of it, moves policy in and out as CSV lines and gates
//! feature flags on role membership.

pub mod authz;
pub mod entities;
pub mod errors;
pub mod settings;
pub mod storage;
