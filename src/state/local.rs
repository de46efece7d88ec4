//! Local file-based state storage.
//!
//! Layout under the state directory:
//! - `state.json` holds the [`ProviderState`]
//! - `state.lock` holds the current [`LockInfo`]
//! - `connections/<name>.json` holds published connection details,
//!   readable by the owner only on Unix

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{ReeflineError, Result, StateError};
use crate::resource::ConnectionDetails;

use super::lock::{DEFAULT_LOCK_TTL_SECS, LockInfo, generate_holder_id};
use super::store::StateStore;
use super::types::{ProviderState, STATE_VERSION};

/// State file name.
const STATE_FILE: &str = "state.json";

/// Lock file name.
const LOCK_FILE: &str = "state.lock";

/// Connection details directory name.
const CONNECTIONS_DIR: &str = "connections";

/// Local file-based state store.
#[derive(Debug)]
pub struct LocalStateStore {
    /// Base directory for state files.
    base_dir: PathBuf,
    /// Path to the state file.
    state_path: PathBuf,
    /// Path to the lock file.
    lock_path: PathBuf,
    /// Lock TTL in seconds.
    lock_ttl_secs: u64,
}

fn write_error(what: &str, e: &std::io::Error) -> ReeflineError {
    ReeflineError::State(StateError::WriteFailed {
        message: format!("{what}: {e}"),
    })
}

fn lock_failed(e: ReeflineError) -> ReeflineError {
    ReeflineError::State(StateError::LockFailed {
        message: e.to_string(),
    })
}

fn lock_json(lock_info: &LockInfo) -> Result<String> {
    serde_json::to_string_pretty(lock_info).map_err(|e| {
        ReeflineError::State(StateError::serialization(format!(
            "Failed to serialize lock: {e}"
        )))
    })
}

impl LocalStateStore {
    /// Creates a store rooted at `base_dir`.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            state_path: base_dir.join(STATE_FILE),
            lock_path: base_dir.join(LOCK_FILE),
            base_dir,
            lock_ttl_secs: DEFAULT_LOCK_TTL_SECS,
        }
    }

    /// Sets the lock TTL.
    #[must_use]
    pub const fn with_lock_ttl(mut self, secs: u64) -> Self {
        self.lock_ttl_secs = secs;
        self
    }

    /// Returns the state directory.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Returns the file connection details of `name` are written to.
    #[must_use]
    pub fn connection_path(&self, name: &str) -> PathBuf {
        self.base_dir.join(CONNECTIONS_DIR).join(format!("{name}.json"))
    }

    async fn ensure_dir(dir: &Path) -> Result<()> {
        if !dir.exists() {
            debug!("Creating state directory: {}", dir.display());
            fs::create_dir_all(dir)
                .await
                .map_err(|e| write_error("Failed to create state directory", &e))?;
        }
        Ok(())
    }

    /// Writes through a temporary file and renames it into place.
    async fn write_atomic(path: &Path, content: &str, private: bool) -> Result<()> {
        if let Some(parent) = path.parent() {
            Self::ensure_dir(parent).await?;
        }
        let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
        temp_name.push(".tmp");
        let temp_path = path.with_file_name(temp_name);

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| write_error("Failed to create temp file", &e))?;
        if private {
            restrict_permissions(&temp_path).await?;
        }
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| write_error("Failed to write file", &e))?;
        file.sync_all()
            .await
            .map_err(|e| write_error("Failed to sync file", &e))?;

        fs::rename(&temp_path, path)
            .await
            .map_err(|e| write_error("Failed to rename file", &e))
    }

    async fn read_lock_file(&self) -> Result<Option<LockInfo>> {
        if !self.lock_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.lock_path).await.map_err(|e| {
            ReeflineError::State(StateError::Corrupted {
                message: format!("Failed to read lock file: {e}"),
            })
        })?;

        let lock_info = serde_json::from_str(&content).map_err(|e| {
            ReeflineError::State(StateError::Corrupted {
                message: format!("Failed to parse lock file: {e}"),
            })
        })?;

        Ok(Some(lock_info))
    }

    /// Creates the lock file, failing if it already exists.
    ///
    /// Returns false when another holder's file is in place.
    async fn create_lock_file(&self, lock_info: &LockInfo) -> Result<bool> {
        Self::ensure_dir(&self.base_dir).await?;
        let content = lock_json(lock_info)?;

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lock_path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(lock_failed(write_error("Failed to create lock file", &e))),
        };
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| lock_failed(write_error("Failed to write lock file", &e)))?;
        file.sync_all()
            .await
            .map_err(|e| lock_failed(write_error("Failed to sync lock file", &e)))?;
        Ok(true)
    }

    async fn delete_lock_file(&self) -> Result<()> {
        if self.lock_path.exists() {
            fs::remove_file(&self.lock_path).await.map_err(|e| {
                ReeflineError::State(StateError::LockFailed {
                    message: format!("Failed to delete lock file: {e}"),
                })
            })?;
        }
        Ok(())
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .await
        .map_err(|e| write_error("Failed to restrict permissions", &e))
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[async_trait]
impl StateStore for LocalStateStore {
    async fn load(&self) -> Result<Option<ProviderState>> {
        if !self.state_path.exists() {
            debug!("State file does not exist: {}", self.state_path.display());
            return Ok(None);
        }

        info!("Loading state from: {}", self.state_path.display());

        let content = fs::read_to_string(&self.state_path).await.map_err(|e| {
            ReeflineError::State(StateError::Corrupted {
                message: format!("Failed to read state file: {e}"),
            })
        })?;

        let state: ProviderState = serde_json::from_str(&content).map_err(|e| {
            ReeflineError::State(StateError::Corrupted {
                message: format!("Failed to parse state file: {e}"),
            })
        })?;

        if state.version != STATE_VERSION {
            return Err(ReeflineError::State(StateError::VersionMismatch {
                expected: STATE_VERSION.to_string(),
                found: state.version,
            }));
        }

        Ok(Some(state))
    }

    async fn save(&self, state: &ProviderState) -> Result<()> {
        debug!("Saving state to: {}", self.state_path.display());

        let content = serde_json::to_string_pretty(state).map_err(|e| {
            ReeflineError::State(StateError::serialization(format!(
                "Failed to serialize state: {e}"
            )))
        })?;

        Self::write_atomic(&self.state_path, &content, false).await
    }

    async fn delete(&self) -> Result<()> {
        if self.state_path.exists() {
            info!("Deleting state file: {}", self.state_path.display());
            fs::remove_file(&self.state_path)
                .await
                .map_err(|e| write_error("Failed to delete state file", &e))?;
        }

        let connections = self.base_dir.join(CONNECTIONS_DIR);
        if connections.exists() {
            fs::remove_dir_all(&connections)
                .await
                .map_err(|e| write_error("Failed to delete connection details", &e))?;
        }

        self.delete_lock_file().await
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.state_path.exists())
    }

    async fn acquire_lock(&self, holder: &str) -> Result<LockInfo> {
        let holder_id = if holder.is_empty() {
            generate_holder_id()
        } else {
            holder.to_string()
        };
        let lock_info = LockInfo::new(&holder_id, self.lock_ttl_secs);

        // One retry covers a lock released or taken over between the calls.
        for _ in 0..2 {
            if self.create_lock_file(&lock_info).await? {
                info!(
                    "Acquired state lock: {} (expires in {}s)",
                    lock_info.lock_id, self.lock_ttl_secs
                );
                return Ok(lock_info);
            }

            match self.read_lock_file().await? {
                None => {}
                Some(mut existing) if !existing.is_expired() => {
                    if existing.holder != holder_id {
                        return Err(ReeflineError::State(StateError::LockedByOther {
                            holder: existing.holder,
                            since: existing.acquired_at.to_rfc3339(),
                        }));
                    }
                    debug!("Refreshing lock held by {holder_id}");
                    existing.refresh(self.lock_ttl_secs);
                    let content = lock_json(&existing)?;
                    Self::write_atomic(&self.lock_path, &content, false)
                        .await
                        .map_err(lock_failed)?;
                    return Ok(existing);
                }
                Some(stale) => {
                    let current = self.read_lock_file().await?;
                    if current.is_some_and(|c| c.lock_id == stale.lock_id) {
                        warn!("Taking over expired lock held by {}", stale.holder);
                        self.delete_lock_file().await?;
                    }
                }
            }
        }

        Err(ReeflineError::State(StateError::LockFailed {
            message: String::from("lock file changed while acquiring"),
        }))
    }

    async fn release_lock(&self, lock_id: &str) -> Result<()> {
        if let Some(existing) = self.read_lock_file().await? {
            if existing.lock_id == lock_id {
                self.delete_lock_file().await?;
                info!("Released state lock: {lock_id}");
            } else {
                debug!(
                    "Lock ID mismatch: expected {lock_id}, found {}",
                    existing.lock_id
                );
            }
        }
        Ok(())
    }

    async fn force_unlock(&self) -> Result<()> {
        if let Some(existing) = self.read_lock_file().await? {
            warn!("Force-releasing lock held by {}", existing.holder);
        }
        self.delete_lock_file().await
    }

    async fn get_lock_info(&self) -> Result<Option<LockInfo>> {
        self.read_lock_file().await
    }

    async fn is_locked(&self) -> Result<bool> {
        Ok(self
            .read_lock_file()
            .await?
            .is_some_and(|lock| !lock.is_expired()))
    }

    async fn save_connection_details(&self, name: &str, details: &ConnectionDetails) -> Result<()> {
        let path = self.connection_path(name);
        let content = serde_json::to_string_pretty(details).map_err(|e| {
            ReeflineError::State(StateError::serialization(format!(
                "Failed to serialize connection details: {e}"
            )))
        })?;

        Self::write_atomic(&path, &content, true).await?;
        debug!("Published {} connection keys to {}", details.len(), path.display());
        Ok(())
    }

    async fn delete_connection_details(&self, name: &str) -> Result<()> {
        let path = self.connection_path(name);
        if path.exists() {
            fs::remove_file(&path)
                .await
                .map_err(|e| write_error("Failed to delete connection details", &e))?;
        }
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (LocalStateStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = LocalStateStore::with_base_dir(temp_dir.path().join(".reefline"));
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (store, _temp) = create_test_store();

        assert!(store.load().await.expect("load").is_none());
        assert!(!store.exists().await.expect("exists"));

        store.save(&ProviderState::new("shop")).await.expect("save");

        let loaded = store.load().await.expect("load").expect("state");
        assert_eq!(loaded.project, "shop");
        assert!(store.exists().await.expect("exists"));
    }

    #[tokio::test]
    async fn test_version_mismatch() {
        let (store, _temp) = create_test_store();
        let mut state = ProviderState::new("shop");
        state.version = String::from("0");
        store.save(&state).await.expect("save");

        let err = store.load().await.expect_err("old format");
        assert!(matches!(
            err,
            ReeflineError::State(StateError::VersionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_lock_acquire_release() {
        let (store, _temp) = create_test_store();

        let lock = store.acquire_lock("holder-1").await.expect("acquire");
        assert!(store.is_locked().await.expect("is_locked"));

        let conflict = store.acquire_lock("holder-2").await;
        assert!(matches!(
            conflict,
            Err(ReeflineError::State(StateError::LockedByOther { ref holder, .. })) if holder == "holder-1"
        ));

        store.release_lock("someone-else").await.expect("mismatch is ignored");
        assert!(store.is_locked().await.expect("is_locked"));

        store.release_lock(&lock.lock_id).await.expect("release");
        assert!(!store.is_locked().await.expect("is_locked"));
    }

    #[tokio::test]
    async fn test_expired_lock_is_taken_over() {
        let (store, _temp) = create_test_store();
        let store = store.with_lock_ttl(0);

        store.acquire_lock("holder-1").await.expect("first");
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let second = store.acquire_lock("holder-2").await.expect("take over");
        assert_eq!(second.holder, "holder-2");
    }

    #[tokio::test]
    async fn test_same_holder_refreshes_lock() {
        let (store, _temp) = create_test_store();

        let first = store.acquire_lock("holder-1").await.expect("first");
        let second = store.acquire_lock("holder-1").await.expect("refresh");
        assert_eq!(second.lock_id, first.lock_id);
        assert!(second.expires_at >= first.expires_at);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_acquire_has_one_winner() {
        let (store, _temp) = create_test_store();
        let store = std::sync::Arc::new(store);

        let attempts: Vec<_> = (0..8)
            .map(|i| {
                let store = std::sync::Arc::clone(&store);
                tokio::spawn(async move { store.acquire_lock(&format!("holder-{i}")).await })
            })
            .collect();

        let mut winners = 0;
        for attempt in attempts {
            if attempt.await.expect("join").is_ok() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert!(store.is_locked().await.expect("is_locked"));
    }

    #[tokio::test]
    async fn test_force_unlock() {
        let (store, _temp) = create_test_store();
        store.acquire_lock("holder-1").await.expect("acquire");
        store.force_unlock().await.expect("force");
        assert!(store.get_lock_info().await.expect("info").is_none());
    }

    #[tokio::test]
    async fn test_connection_details_are_private() {
        let (store, _temp) = create_test_store();
        let details: ConnectionDetails = [(String::from("public-password"), String::from("s3cret"))]
            .into_iter()
            .collect();

        store
            .save_connection_details("db", &details)
            .await
            .expect("publish");

        let path = store.connection_path("db");
        let written: ConnectionDetails =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("json");
        assert_eq!(written, details);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).expect("metadata").permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        store.delete_connection_details("db").await.expect("remove");
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_delete_removes_everything() {
        let (store, _temp) = create_test_store();
        store.save(&ProviderState::new("shop")).await.expect("save");
        store.acquire_lock("holder").await.expect("lock");
        store
            .save_connection_details("db", &ConnectionDetails::new())
            .await
            .expect("publish");

        store.delete().await.expect("delete");
        assert!(!store.exists().await.expect("exists"));
        assert!(!store.is_locked().await.expect("is_locked"));
        assert!(!store.connection_path("db").exists());
    }
}
