// ============================================================================
// Linting
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![warn(missing_docs)]                // Public items should be documented
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(nonstandard_style)]           // Non-standard code style is forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![allow(clippy::module_name_repetitions)]

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Reefline
//!
//! A declarative reconciliation engine for managed DigitalOcean resources.
//!
//! ## Overview
//!
//! Reefline keeps remote resources in line with a YAML manifest. Each
//! resource is driven by a tick:
//!
//! 1. **Observe**: fetch the remote object by its server-assigned identity
//! 2. **Late-initialize**: copy server defaults into unset spec fields
//! 3. **Decide**: create, update, delete, or nothing
//! 4. **Derive**: map the remote status onto a coarse condition
//!
//! Supported kinds are droplets, managed databases, load balancers,
//! Kubernetes clusters, the container registry and Spaces buckets.
//!
//! ## Modules
//!
//! - [`engine`]: The per-kind tick
//! - [`adapter`]: Per-kind translation between specs and API objects
//! - [`resource`]: Kind-independent types, late-init, conditions, error classes
//! - [`cloud`]: REST and Spaces clients
//! - [`config`]: Manifest parsing and validation
//! - [`state`]: Local state, locking and published connection details
//! - [`reconciler`]: Pass over a whole manifest
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! project:
//!   name: shop
//!
//! resources:
//!   - name: db
//!     publish_connection: true
//!     spec:
//!       kind: database
//!       engine: pg
//!       num_nodes: 1
//!       size: db-s-1vcpu-1gb
//!       region: nyc1
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod adapter;
pub mod cli;
pub mod cloud;
pub mod config;
pub mod engine;
pub mod error;
pub mod reconciler;
pub mod resource;
pub mod state;

#[cfg(test)]
mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use adapter::{DriftCheck, ResourceAdapter};
pub use cli::{Cli, Commands, OutputFormatter};
pub use cloud::{ClientSet, CloudClients, DigitalOceanClient, ExternalClient, SpacesClient};
pub use config::{ConfigHasher, ConfigParser, ConfigValidator, Manifest};
pub use engine::{Engine, TickAction, TickOutcome, TickRequest};
pub use error::{ReeflineError, Result};
pub use reconciler::{DriftReport, ReconciliationResult, Reconciler};
pub use resource::{Condition, Identity, ReconcileResult, ResourceKind};
pub use state::{LocalStateStore, ProviderState, StateStore};
