//! Kind-independent resource model.
//!
//! This module provides:
//! - Identity, condition and reconcile-result types
//! - Late-initialization helpers
//! - Condition derivation from remote status
//! - Classification of client errors

mod classify;
mod condition;
mod late_init;
mod types;

pub use classify::{ErrorClass, INVALID_ID_PATTERN, classify, ignore_not_found, is_ignorable};
pub use condition::derive_condition;
pub use late_init::LateInitializer;
pub use types::{
    Condition, ConnectionDetails, Identity, LastOperation, ReconcileResult, ResourceKind,
};
