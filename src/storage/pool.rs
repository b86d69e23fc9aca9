use crate::config::WorkspaceConfig;
use crate::error::AtomError;
use parking_lot::{Condvar, Mutex};
use rusqlite::{Connection, OpenFlags};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Opens the single read-write connection a workspace serializes writes on.
pub(crate) fn open_writer(path: &Path, config: &WorkspaceConfig) -> Result<Connection, AtomError> {
    let conn = Connection::open(path)?;
    conn.execute_batch(&format!(
        "PRAGMA journal_mode={};
         PRAGMA synchronous={};
         PRAGMA busy_timeout={};",
        config.journal_mode.as_pragma(),
        config.durability_mode.as_pragma(),
        config.busy_timeout_ms,
    ))?;
    conn.set_prepared_statement_cache_capacity(config.statement_cache_capacity);
    Ok(conn)
}

fn open_reader(path: &Path, config: &WorkspaceConfig) -> Result<Connection, AtomError> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.execute_batch(&format!("PRAGMA busy_timeout={};", config.busy_timeout_ms))?;
    conn.set_prepared_statement_cache_capacity(config.statement_cache_capacity);
    Ok(conn)
}

struct PoolState {
    idle: Vec<Connection>,
    opened: usize,
    lent: usize,
    shut_down: bool,
}

/// Read connections, opened lazily up to `max_readers` and lent out as
/// [`Borrowed`] guards.
pub struct ConnectionPool {
    path: PathBuf,
    config: WorkspaceConfig,
    state: Mutex<PoolState>,
    returned: Condvar,
}

impl ConnectionPool {
    pub(crate) fn new(path: PathBuf, config: WorkspaceConfig) -> Self {
        Self {
            path,
            config,
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                opened: 0,
                lent: 0,
                shut_down: false,
            }),
            returned: Condvar::new(),
        }
    }

    /// Blocks while every connection is lent and the pool is at capacity.
    pub fn borrow(&self) -> Result<Borrowed<'_>, AtomError> {
        let mut state = self.state.lock();
        loop {
            if state.shut_down {
                return Err(AtomError::ShutDown);
            }
            if let Some(conn) = state.idle.pop() {
                state.lent += 1;
                return Ok(Borrowed {
                    pool: self,
                    conn: Some(conn),
                });
            }
            if state.opened < self.config.max_readers {
                state.opened += 1;
                state.lent += 1;
                drop(state);
                return match open_reader(&self.path, &self.config) {
                    Ok(conn) => {
                        debug!(path = %self.path.display(), "opened read connection");
                        Ok(Borrowed {
                            pool: self,
                            conn: Some(conn),
                        })
                    }
                    Err(err) => {
                        let mut state = self.state.lock();
                        state.opened -= 1;
                        state.lent -= 1;
                        self.returned.notify_one();
                        Err(err)
                    }
                };
            }
            self.returned.wait(&mut state);
        }
    }

    fn give_back(&self, conn: Connection) {
        let mut state = self.state.lock();
        state.lent -= 1;
        if state.shut_down {
            state.opened -= 1;
            drop(conn);
        } else {
            state.idle.push(conn);
        }
        self.returned.notify_all();
    }

    /// Refuses new borrows, waits for every lent connection to come back and
    /// closes them all.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shut_down = true;
        while state.lent > 0 {
            self.returned.wait(&mut state);
        }
        let closed = state.idle.len();
        state.opened -= closed;
        state.idle.clear();
        self.returned.notify_all();
        debug!(closed, "read pool drained");
    }

    pub fn lent(&self) -> usize {
        self.state.lock().lent
    }

    pub fn opened(&self) -> usize {
        self.state.lock().opened
    }
}

/// A read connection on loan from the pool, returned on drop.
pub struct Borrowed<'p> {
    pool: &'p ConnectionPool,
    conn: Option<Connection>,
}

impl Deref for Borrowed<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        // Only `Drop` takes the connection out.
        match &self.conn {
            Some(conn) => conn,
            None => unreachable!("borrowed connection used after return"),
        }
    }
}

impl Drop for Borrowed<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.give_back(conn);
        }
    }
}
