pub mod atom;
pub mod codec;
pub mod commit;
pub mod config;
pub mod error;
pub mod query;
pub mod repository;
pub mod storage;

pub use crate::atom::types::{Arithmetic, DslValue, Value, ValueType};
pub use crate::atom::{Atom, AtomMeta, IndexField, ObjectKey};
pub use crate::commit::tx::TransactionContext;
pub use crate::commit::{ChangeRequest, ChangeRequestType, PersistenceToolbox, UpdatedObject};
pub use crate::config::{DurabilityMode, JournalMode, WorkspaceConfig};
pub use crate::error::{AtomError, AtomErrorCode};
pub use crate::query::executor::FetchedResult;
pub use crate::query::expr::{Evaluable, Expr, Field, IndexUsefulness, Operand, Truth, lit};
pub use crate::query::plan::{Order, OrderBy, Query};
pub use crate::query::planner::{IndexCoverage, IndexSurvey, ScanPlan};
pub use crate::query::union::{Narrowed, SumType, UnionField, Variant};
pub use crate::storage::schema::ReindexReport;

use crate::query::executor::{execute, explain};
use crate::storage::pool::{ConnectionPool, open_writer};
use crate::storage::schema;
use parking_lot::Mutex;
use rusqlite::{Connection, TransactionBehavior};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use tracing::{info, warn};

/// Creates a directory with restrictive permissions (0o700 on Unix) to prevent
/// unauthorized access to database files on multi-user systems.
fn create_private_dir_all(path: &Path) -> Result<(), AtomError> {
    #[cfg(unix)]
    {
        use std::fs::DirBuilder;
        use std::os::unix::fs::DirBuilderExt;

        DirBuilder::new().recursive(true).mode(0o700).create(path)?;
    }
    #[cfg(not(unix))]
    {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// An open database: one serialized writer plus a pool of readers.
pub struct Workspace {
    path: PathBuf,
    config: WorkspaceConfig,
    writer: Mutex<Connection>,
    readers: ConnectionPool,
    /// Last committed logical clock value.
    clock: AtomicI64,
    /// Tables whose schema a committed transaction has set up.
    set_up: Mutex<HashSet<&'static str>>,
    /// Fast-path shutdown check.
    shut_down: AtomicBool,
}

impl Workspace {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AtomError> {
        Self::open_with_config(path, WorkspaceConfig::default())
    }

    pub fn open_with_config(path: impl AsRef<Path>, config: WorkspaceConfig) -> Result<Self, AtomError> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            create_private_dir_all(parent)?;
        }
        let writer = open_writer(&path, &config)?;
        schema::ensure_meta(&writer)?;
        let clock = schema::read_clock(&writer)?;
        info!(
            path = %path.display(),
            max_readers = config.max_readers,
            journal_mode = ?config.journal_mode,
            durability_mode = ?config.durability_mode,
            busy_timeout_ms = config.busy_timeout_ms,
            changes_timestamp = clock,
            "workspace opened"
        );
        Ok(Self {
            readers: ConnectionPool::new(path.clone(), config.clone()),
            path,
            config,
            writer: Mutex::new(writer),
            clock: AtomicI64::new(clock),
            set_up: Mutex::new(HashSet::new()),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    /// Logical clock of the last committed write transaction.
    pub fn changes_timestamp(&self) -> i64 {
        self.clock.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<(), AtomError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(AtomError::ShutDown);
        }
        Ok(())
    }

    /// Runs `handler` inside one write transaction, holding the write lock.
    ///
    /// An `Err` from the handler rolls everything back. When storage reports
    /// contention the whole handler is run again, up to
    /// `WorkspaceConfig::busy_retries` times.
    pub fn perform_changes<T, F>(&self, mut handler: F) -> Result<T, AtomError>
    where
        F: FnMut(&mut TransactionContext<'_>) -> Result<T, AtomError>,
    {
        self.ensure_open()?;
        let mut writer = self.writer.lock();
        self.ensure_open()?;
        let mut attempt = 0;
        loop {
            match self.run_transaction(&mut writer, &mut handler) {
                Err(err) if err.is_busy() && attempt < self.config.busy_retries => {
                    attempt += 1;
                    warn!(attempt, error = %err, "transaction hit busy storage, retrying");
                }
                outcome => return outcome,
            }
        }
    }

    fn run_transaction<T, F>(&self, conn: &mut Connection, handler: &mut F) -> Result<T, AtomError>
    where
        F: FnMut(&mut TransactionContext<'_>) -> Result<T, AtomError>,
    {
        let published = self.set_up.lock().clone();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let timestamp = schema::read_clock(&tx)? + 1;
        let mut ctx = TransactionContext::new(tx, published, timestamp);
        let value = handler(&mut ctx)?;
        let (set_up, advanced) = ctx.finish()?;
        if advanced {
            self.clock.store(timestamp, Ordering::Release);
        }
        if !set_up.is_empty() {
            self.set_up.lock().extend(set_up);
        }
        Ok(value)
    }

    pub fn fetch<E: Atom>(&self, query: &Query<E>) -> Result<FetchedResult<E>, AtomError> {
        self.ensure_open()?;
        let timestamp = self.changes_timestamp();
        let conn = self.readers.borrow()?;
        let items = execute(&conn, query, timestamp, None)?;
        Ok(FetchedResult::new(items, query.clone(), timestamp))
    }

    pub fn fetch_all<E: Atom>(&self) -> Result<FetchedResult<E>, AtomError> {
        self.fetch(&Query::all())
    }

    /// Re-runs the query behind `previous` against current state.
    pub fn refetch<E: Atom>(&self, previous: &FetchedResult<E>) -> Result<FetchedResult<E>, AtomError> {
        self.fetch(previous.query())
    }

    pub fn object<E: Atom>(&self, key: ObjectKey) -> Result<Option<E>, AtomError> {
        self.ensure_open()?;
        let timestamp = self.changes_timestamp();
        let conn = self.readers.borrow()?;
        schema::load::<E>(&conn, &key, timestamp)
    }

    /// The scan `fetch` would run right now; `None` before the first write.
    pub fn explain<E: Atom>(&self, query: &Query<E>) -> Result<Option<ScanPlan>, AtomError> {
        self.ensure_open()?;
        let conn = self.readers.borrow()?;
        explain(&conn, query)
    }

    /// Recreates missing index tables of `E` and resynchronizes their rows.
    pub fn reindex<E: Atom>(&self) -> Result<ReindexReport, AtomError> {
        self.perform_changes(|txn| txn.reindex::<E>())
    }

    /// Stops accepting work, waits for lent read connections and any running
    /// transaction, then closes the reader pool.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.readers.shutdown();
        drop(self.writer.lock());
        info!(path = %self.path.display(), "workspace shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.shutdown();
    }
}
