//! The database manager.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{Config, MAX_CACHE_LIMIT, MIN_CACHE_LIMIT};
use crate::error::{Error, Result};
use crate::storage::{DatabaseDir, DatabaseFiles, ManagerPrefs, NodeDatabase};

use super::eviction::{cleanup_legacy, is_reserved, select_eviction_victims, LegacyCleanup};
use super::{anonymize_address, anonymize_db_name, build_db_name, DB_PREFIX};

/// An open node database shared between the manager and its users.
pub type SharedDatabase = Arc<Mutex<NodeDatabase>>;

/// A database file as seen by [`DatabaseManager::list_databases`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseInfo {
    /// Database name.
    pub name: String,
    /// Last activation time in epoch milliseconds.
    pub last_used_ms: i64,
    /// Whether this is the active database.
    pub active: bool,
    /// Whether the name is the legacy or default database.
    pub reserved: bool,
}

/// Open handles plus the databases a switch is still opening.
#[derive(Debug, Default)]
struct Handles {
    open: HashMap<String, SharedDatabase>,
    opening: HashSet<String>,
}

/// State shared with background housekeeping.
#[derive(Debug)]
struct Shared {
    files: Arc<dyn DatabaseFiles>,
    prefs: Mutex<ManagerPrefs>,
    // Eviction decides and deletes under this lock; switches register and
    // activate under it.
    handles: Mutex<Handles>,
    active_name: RwLock<Option<String>>,
    cache_limit: usize,
    housekeeping: tokio::sync::Mutex<()>,
}

impl Shared {
    fn active_name(&self) -> Option<String> {
        self.active_name.read().clone()
    }

    fn set_active_name(&self, name: &str) {
        *self.active_name.write() = Some(name.to_string());
    }

    fn mark_last_used(&self, name: &str) {
        let now = Utc::now().timestamp_millis();
        if let Err(e) = self.prefs.lock().set_last_used(name, now) {
            warn!(db = %anonymize_db_name(name), error = %e, "Failed to record last use");
        }
    }

    /// Recorded last use, else file modification time, else 0.
    fn last_used(&self, name: &str) -> i64 {
        let recorded = match self.prefs.lock().last_used(name) {
            Ok(value) => value,
            Err(e) => {
                debug!(db = %anonymize_db_name(name), error = %e, "Could not read last use");
                None
            }
        };
        recorded
            .or_else(|| self.files.last_modified_ms(name))
            .unwrap_or(0)
    }

    fn housekeep(&self) {
        match cleanup_legacy(self.files.as_ref(), &self.prefs) {
            Ok(LegacyCleanup::Deleted) => info!("Legacy database cleanup complete"),
            Ok(LegacyCleanup::AlreadyDone | LegacyCleanup::NothingToClean) => {}
            Err(e) => log_housekeeping_failure("Legacy database cleanup", &e),
        }

        match self.enforce_cache_limit() {
            Ok(evicted) if !evicted.is_empty() => {
                debug!(count = evicted.len(), "Cache limit enforced");
            }
            Ok(_) => {}
            Err(e) => log_housekeeping_failure("Cache limit enforcement", &e),
        }
    }

    fn enforce_cache_limit(&self) -> Result<Vec<String>> {
        let active = self.active_name().unwrap_or_default();
        let names = self.files.list_database_names(DB_PREFIX)?;
        let last_used: HashMap<String, i64> = names
            .iter()
            .map(|name| (name.clone(), self.last_used(name)))
            .collect();

        let victims = select_eviction_victims(&names, &active, self.cache_limit, &last_used);
        let mut evicted = Vec::with_capacity(victims.len());
        for name in victims {
            match self.evict(&name) {
                Ok(true) => evicted.push(name),
                Ok(false) => {}
                Err(e) => log_housekeeping_failure("Eviction", &e),
            }
        }
        Ok(evicted)
    }

    /// Close and delete one database. Skipped if it became active or is being
    /// opened by a switch.
    fn evict(&self, name: &str) -> Result<bool> {
        let mut handles = self.handles.lock();
        if handles.opening.contains(name) || self.active_name().as_deref() == Some(name) {
            debug!(db = %anonymize_db_name(name), "Skipping eviction of database in use");
            return Ok(false);
        }
        drop(handles.open.remove(name));

        self.files
            .delete_database(name)
            .map_err(|source| Error::DatabaseDelete {
                name: name.to_string(),
                source,
            })?;
        self.prefs.lock().remove_last_used(name)?;
        info!(db = %anonymize_db_name(name), "Evicted cached database");
        Ok(true)
    }
}

/// File system trouble is retried on the next switch; anything else is
/// unexpected.
fn log_housekeeping_failure(what: &str, e: &Error) {
    if e.is_transient_io() {
        warn!(error = %e, "{what} failed, will retry on next switch");
    } else {
        error!(error = %e, "{what} failed");
    }
}

/// Keeps a name in [`Handles::opening`] until dropped.
struct Opening<'a> {
    shared: &'a Shared,
    name: String,
}

impl<'a> Opening<'a> {
    fn register(shared: &'a Shared, handles: &mut Handles, name: &str) -> Self {
        handles.opening.insert(name.to_string());
        Self {
            shared,
            name: name.to_string(),
        }
    }
}

impl Drop for Opening<'_> {
    fn drop(&mut self) {
        self.shared.handles.lock().opening.remove(&self.name);
    }
}

#[derive(Debug)]
struct Active {
    name: String,
    db: SharedDatabase,
}

/// Opens the node database for the selected radio and keeps the set of
/// per-device databases on disk bounded.
#[derive(Debug)]
pub struct DatabaseManager {
    shared: Arc<Shared>,
    active: tokio::sync::Mutex<Option<Active>>,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl DatabaseManager {
    /// Create a manager over `files`. The cache limit is clamped to the
    /// supported range.
    #[must_use]
    pub fn new(files: Arc<dyn DatabaseFiles>, prefs: ManagerPrefs, cache_limit: usize) -> Self {
        let cache_limit = cache_limit.clamp(MIN_CACHE_LIMIT, MAX_CACHE_LIMIT);
        Self {
            shared: Arc::new(Shared {
                files,
                prefs: Mutex::new(prefs),
                handles: Mutex::new(Handles::default()),
                active_name: RwLock::new(None),
                cache_limit,
                housekeeping: tokio::sync::Mutex::new(()),
            }),
            active: tokio::sync::Mutex::new(None),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Create a manager storing databases and its bookkeeping in `data_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the preference store cannot be opened.
    pub fn open(data_dir: &Path, cache_limit: usize) -> Result<Self> {
        let prefs = ManagerPrefs::open(data_dir)?;
        Ok(Self::new(
            Arc::new(DatabaseDir::new(data_dir)),
            prefs,
            cache_limit,
        ))
    }

    /// Create a manager from the storage section of `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the preference store cannot be opened.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::open(&config.data_dir(), config.storage.cache_limit)
    }

    /// Effective number of per-device databases kept on disk.
    #[must_use]
    pub fn cache_limit(&self) -> usize {
        self.shared.cache_limit
    }

    /// Make the database for `address` active, creating it if needed.
    ///
    /// Without an address the default database is used. Legacy cleanup and
    /// eviction run afterwards in the background; their failures are logged
    /// and retried on the next switch. A database is protected from eviction
    /// from the moment its open starts.
    ///
    /// Returns the name of the now active database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub async fn switch_active_database(&self, address: Option<&str>) -> Result<String> {
        let name = build_db_name(address);
        let mut active = self.active.lock().await;

        if active.as_ref().is_some_and(|a| a.name == name) {
            self.shared.mark_last_used(&name);
            debug!(db = %anonymize_db_name(&name), "Database already active");
            return Ok(name);
        }

        let (cached, opening) = {
            let mut handles = self.shared.handles.lock();
            match handles.open.get(&name).cloned() {
                Some(db) => {
                    self.shared.set_active_name(&name);
                    (Some(db), None)
                }
                None => (
                    None,
                    Some(Opening::register(&self.shared, &mut handles, &name)),
                ),
            }
        };

        let db = if let Some(db) = cached {
            db
        } else {
            let path = self.shared.files.path_for(&name);
            let db = tokio::task::spawn_blocking(move || NodeDatabase::open(path)).await??;
            let db = Arc::new(Mutex::new(db));

            let mut handles = self.shared.handles.lock();
            handles.open.insert(name.clone(), Arc::clone(&db));
            self.shared.set_active_name(&name);
            db
        };
        drop(opening);

        *active = Some(Active {
            name: name.clone(),
            db,
        });
        self.shared.mark_last_used(&name);
        self.spawn_housekeeping();

        info!(
            db = %anonymize_db_name(&name),
            address = %anonymize_address(address),
            "Switched active database"
        );
        Ok(name)
    }

    fn spawn_housekeeping(&self) {
        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move {
            let _guard = shared.housekeeping.lock().await;
            let pass = Arc::clone(&shared);
            if let Err(e) = tokio::task::spawn_blocking(move || pass.housekeep()).await {
                warn!(error = %e, "Housekeeping task failed");
            }
        });

        let mut pending = self.pending.lock();
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    /// Wait until all background housekeeping started so far has finished.
    pub async fn wait_for_housekeeping(&self) {
        let handles = std::mem::take(&mut *self.pending.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Housekeeping task failed");
            }
        }
    }

    /// Name of the active database, if any.
    pub async fn current_db_name(&self) -> Option<String> {
        self.active.lock().await.as_ref().map(|a| a.name.clone())
    }

    /// Handle to the active database, if any.
    pub async fn current_db(&self) -> Option<SharedDatabase> {
        self.active.lock().await.as_ref().map(|a| Arc::clone(&a.db))
    }

    /// Run `f` against the active database, activating the default database
    /// first if none is active.
    ///
    /// # Errors
    ///
    /// Returns an error if activation fails or `f` fails.
    pub async fn with_db<T>(&self, f: impl FnOnce(&NodeDatabase) -> Result<T>) -> Result<T> {
        let db = match self.current_db().await {
            Some(db) => db,
            None => {
                self.switch_active_database(None).await?;
                self.current_db()
                    .await
                    .ok_or_else(|| Error::internal("no active database after switch"))?
            }
        };
        let guard = db.lock();
        f(&*guard)
    }

    /// All database files with their last use, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database directory cannot be read.
    pub fn list_databases(&self) -> Result<Vec<DatabaseInfo>> {
        let active = self.shared.active_name();
        let names = self.shared.files.list_database_names(DB_PREFIX)?;
        Ok(names
            .into_iter()
            .map(|name| DatabaseInfo {
                last_used_ms: self.shared.last_used(&name),
                active: active.as_deref() == Some(name.as_str()),
                reserved: is_reserved(&name),
                name,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{DEFAULT_DB_NAME, LEGACY_DB_NAME};

    fn seed(dir: &Path, entries: &[(&str, i64)]) {
        let prefs = ManagerPrefs::open(dir).unwrap();
        for (name, stamp) in entries {
            std::fs::write(dir.join(name), b"").unwrap();
            prefs.set_last_used(name, *stamp).unwrap();
        }
    }

    #[tokio::test]
    async fn test_switch_without_address_uses_default() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = DatabaseManager::open(tmp.path(), 3).unwrap();

        let name = manager.switch_active_database(None).await.unwrap();
        assert_eq!(name, DEFAULT_DB_NAME);
        assert!(tmp.path().join(DEFAULT_DB_NAME).exists());
        assert_eq!(manager.current_db_name().await.as_deref(), Some(DEFAULT_DB_NAME));

        assert_eq!(
            manager.switch_active_database(Some("  ")).await.unwrap(),
            DEFAULT_DB_NAME
        );
        manager.wait_for_housekeeping().await;
    }

    #[tokio::test]
    async fn test_switch_same_address_is_fast_path() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = DatabaseManager::open(tmp.path(), 3).unwrap();

        let first = manager
            .switch_active_database(Some("01:23:45:67:89:AB"))
            .await
            .unwrap();
        let before = manager.shared.last_used(&first);
        let second = manager
            .switch_active_database(Some("0123456789ab"))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert!(manager.shared.last_used(&second) >= before);
        manager.wait_for_housekeeping().await;
    }

    #[tokio::test]
    async fn test_cache_limit_is_clamped() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(DatabaseManager::open(tmp.path(), 0).unwrap().cache_limit(), 1);
        assert_eq!(DatabaseManager::open(tmp.path(), 50).unwrap().cache_limit(), 10);
        assert_eq!(DatabaseManager::open(tmp.path(), 4).unwrap().cache_limit(), 4);
    }

    #[tokio::test]
    async fn test_switch_evicts_oldest_databases() {
        crate::logging::init_test_logging();
        let tmp = tempfile::tempdir().unwrap();
        let a = build_db_name(Some("AA:AA"));
        let b = build_db_name(Some("BB:BB"));
        let c = build_db_name(Some("CC:CC"));
        seed(
            tmp.path(),
            &[
                (a.as_str(), 10),
                (b.as_str(), 20),
                (c.as_str(), 30),
                (DEFAULT_DB_NAME, 0),
            ],
        );

        let manager = DatabaseManager::open(tmp.path(), 2).unwrap();
        let d = manager.switch_active_database(Some("DD:DD")).await.unwrap();
        manager.wait_for_housekeeping().await;

        let remaining: Vec<String> = manager
            .list_databases()
            .unwrap()
            .into_iter()
            .map(|info| info.name)
            .collect();
        assert!(!remaining.contains(&a));
        assert!(!remaining.contains(&b));
        assert!(remaining.contains(&c));
        assert!(remaining.contains(&d));
        assert!(remaining.contains(&DEFAULT_DB_NAME.to_string()));

        let prefs = manager.shared.prefs.lock();
        assert_eq!(prefs.last_used(&a).unwrap(), None);
        assert_eq!(prefs.last_used(&c).unwrap(), Some(30));
    }

    #[tokio::test]
    async fn test_switching_back_reuses_cached_handle() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = DatabaseManager::open(tmp.path(), 3).unwrap();

        manager.switch_active_database(Some("AA:AA")).await.unwrap();
        manager
            .with_db(|db| db.insert_message("0^all", "!0001", "hello", 1, false))
            .await
            .unwrap();
        manager.switch_active_database(Some("BB:BB")).await.unwrap();
        manager.switch_active_database(Some("AA:AA")).await.unwrap();

        let count = manager.with_db(NodeDatabase::message_count).await.unwrap();
        assert_eq!(count, 1);
        manager.wait_for_housekeeping().await;
    }

    #[tokio::test]
    async fn test_with_db_activates_default() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = DatabaseManager::open(tmp.path(), 3).unwrap();

        let count = manager.with_db(NodeDatabase::node_count).await.unwrap();
        assert_eq!(count, 0);
        assert_eq!(manager.current_db_name().await.as_deref(), Some(DEFAULT_DB_NAME));
        manager.wait_for_housekeeping().await;
    }

    #[tokio::test]
    async fn test_list_databases_marks_active_and_reserved() {
        let tmp = tempfile::tempdir().unwrap();
        seed(tmp.path(), &[(LEGACY_DB_NAME, 5)]);
        let manager = DatabaseManager::open(tmp.path(), 3).unwrap();

        let name = manager.switch_active_database(Some("AA:AA")).await.unwrap();
        let listed = manager.list_databases().unwrap();

        let active: Vec<_> = listed.iter().filter(|i| i.active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, name);
        assert!(!active[0].reserved);
        assert!(active[0].last_used_ms > 0);

        manager.wait_for_housekeeping().await;
        let listed = manager.list_databases().unwrap();
        assert!(listed.iter().all(|i| i.name != LEGACY_DB_NAME));
    }

    #[tokio::test]
    async fn test_last_used_falls_back_to_mtime() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("meshtastic_database_feedbeef00"), b"").unwrap();
        let manager = DatabaseManager::open(tmp.path(), 3).unwrap();

        assert!(manager.shared.last_used("meshtastic_database_feedbeef00") > 0);
        assert_eq!(manager.shared.last_used("meshtastic_database_missing"), 0);
    }

    /// Directory-backed files whose first listing waits until `target`
    /// exists, so that a housekeeping pass lists a database a switch is
    /// still opening.
    #[derive(Debug)]
    struct ListsDuringOpen {
        inner: DatabaseDir,
        target: String,
        armed: std::sync::atomic::AtomicBool,
    }

    impl DatabaseFiles for ListsDuringOpen {
        fn path_for(&self, name: &str) -> std::path::PathBuf {
            self.inner.path_for(name)
        }

        fn list_database_names(&self, prefix: &str) -> std::io::Result<Vec<String>> {
            if self.armed.swap(false, std::sync::atomic::Ordering::SeqCst) {
                let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
                while !self.inner.exists(&self.target) && std::time::Instant::now() < deadline {
                    std::thread::sleep(std::time::Duration::from_millis(1));
                }
            }
            self.inner.list_database_names(prefix)
        }

        fn exists(&self, name: &str) -> bool {
            self.inner.exists(name)
        }

        fn delete_database(&self, name: &str) -> std::io::Result<bool> {
            self.inner.delete_database(name)
        }

        fn last_modified_ms(&self, name: &str) -> Option<i64> {
            self.inner.last_modified_ms(name)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pending_eviction_spares_database_being_opened() {
        let tmp = tempfile::tempdir().unwrap();
        let a = build_db_name(Some("AA:AA"));
        let b = build_db_name(Some("BB:BB"));
        let files = Arc::new(ListsDuringOpen {
            inner: DatabaseDir::new(tmp.path()),
            target: b.clone(),
            armed: std::sync::atomic::AtomicBool::new(true),
        });
        let manager = DatabaseManager::new(files, ManagerPrefs::open(tmp.path()).unwrap(), 1);

        manager.switch_active_database(Some("AA:AA")).await.unwrap();
        // The first pass is now waiting to list until B's file appears.
        let name = manager.switch_active_database(Some("BB:BB")).await.unwrap();
        assert_eq!(name, b);

        manager
            .with_db(|db| db.insert_message("0^all", "!0002", "still here", 1, false))
            .await
            .unwrap();
        manager.wait_for_housekeeping().await;

        assert!(tmp.path().join(&b).exists());
        assert!(!tmp.path().join(&a).exists());
        assert_eq!(manager.with_db(NodeDatabase::message_count).await.unwrap(), 1);
    }

    /// Directory-backed files that record how many listings overlap.
    #[derive(Debug, Default)]
    struct OverlapCounter {
        inner: Option<DatabaseDir>,
        in_flight: std::sync::atomic::AtomicUsize,
        max_in_flight: std::sync::atomic::AtomicUsize,
        listings: std::sync::atomic::AtomicUsize,
    }

    impl OverlapCounter {
        fn dir(&self) -> &DatabaseDir {
            self.inner.as_ref().unwrap()
        }
    }

    impl DatabaseFiles for OverlapCounter {
        fn path_for(&self, name: &str) -> std::path::PathBuf {
            self.dir().path_for(name)
        }

        fn list_database_names(&self, prefix: &str) -> std::io::Result<Vec<String>> {
            use std::sync::atomic::Ordering;

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.listings.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(20));
            let names = self.dir().list_database_names(prefix);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            names
        }

        fn exists(&self, name: &str) -> bool {
            self.dir().exists(name)
        }

        fn delete_database(&self, name: &str) -> std::io::Result<bool> {
            self.dir().delete_database(name)
        }

        fn last_modified_ms(&self, name: &str) -> Option<i64> {
            self.dir().last_modified_ms(name)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_housekeeping_passes_run_one_at_a_time() {
        use std::sync::atomic::Ordering;

        let tmp = tempfile::tempdir().unwrap();
        let files = Arc::new(OverlapCounter {
            inner: Some(DatabaseDir::new(tmp.path())),
            ..Default::default()
        });
        let manager = DatabaseManager::new(
            Arc::clone(&files) as Arc<dyn DatabaseFiles>,
            ManagerPrefs::open(tmp.path()).unwrap(),
            2,
        );

        let addresses = ["AA:AA", "BB:BB", "CC:CC", "DD:DD", "EE:EE"];
        for address in addresses {
            manager.switch_active_database(Some(address)).await.unwrap();
        }
        manager.wait_for_housekeeping().await;

        assert_eq!(files.listings.load(Ordering::SeqCst), addresses.len());
        assert_eq!(files.max_in_flight.load(Ordering::SeqCst), 1);

        let remaining: Vec<String> = manager
            .list_databases()
            .unwrap()
            .into_iter()
            .map(|info| info.name)
            .collect();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.contains(&build_db_name(Some("EE:EE"))));
        assert!(remaining.contains(&build_db_name(Some("DD:DD"))));
    }
}
