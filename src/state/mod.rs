//! State persistence.
//!
//! The engine is stateless; this module keeps what it hands back between
//! ticks: one record per resource with its identity, spec and last
//! observation, plus a lock so only one pass runs at a time.

mod local;
mod lock;
mod store;
mod types;

pub use local::LocalStateStore;
pub use lock::{DEFAULT_LOCK_TTL_SECS, LockInfo, generate_holder_id};
#[cfg(test)]
pub use store::MockStateStore;
pub use store::StateStore;
pub use types::{HistoryEntry, ProviderState, ResourceRecord, STATE_VERSION};
