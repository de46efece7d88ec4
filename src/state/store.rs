//! State store trait definition.

use async_trait::async_trait;

use super::lock::LockInfo;
use super::types::ProviderState;
use crate::error::Result;
use crate::resource::ConnectionDetails;

/// Trait for state storage backends.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Loads the state.
    ///
    /// Returns `None` if no state exists yet.
    async fn load(&self) -> Result<Option<ProviderState>>;

    /// Saves the state.
    async fn save(&self, state: &ProviderState) -> Result<()>;

    /// Deletes the state, lock and published connection details.
    async fn delete(&self) -> Result<()>;

    /// Checks if state exists.
    async fn exists(&self) -> Result<bool>;

    /// Acquires the lock. Fails while another holder has an unexpired lock.
    async fn acquire_lock(&self, holder: &str) -> Result<LockInfo>;

    /// Releases the lock if `lock_id` still holds it.
    async fn release_lock(&self, lock_id: &str) -> Result<()>;

    /// Removes the lock whoever holds it.
    async fn force_unlock(&self) -> Result<()>;

    /// Gets current lock information if locked.
    async fn get_lock_info(&self) -> Result<Option<LockInfo>>;

    /// Checks if the state is locked.
    async fn is_locked(&self) -> Result<bool>;

    /// Publishes the connection details of a resource.
    async fn save_connection_details(&self, name: &str, details: &ConnectionDetails) -> Result<()>;

    /// Removes the published connection details of a resource.
    async fn delete_connection_details(&self, name: &str) -> Result<()>;

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}
