use crate::error::AtomError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalMode {
    /// Write-ahead log. Readers never block the writer.
    Wal,
    Delete,
}

impl JournalMode {
    pub(crate) fn as_pragma(self) -> &'static str {
        match self {
            JournalMode::Wal => "WAL",
            JournalMode::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurabilityMode {
    Full,
    Normal,
    OsBuffered,
}

impl DurabilityMode {
    pub(crate) fn as_pragma(self) -> &'static str {
        match self {
            DurabilityMode::Full => "FULL",
            DurabilityMode::Normal => "NORMAL",
            DurabilityMode::OsBuffered => "OFF",
        }
    }
}

/// Runtime configuration for a workspace.
#[derive(Debug, Clone)]
pub struct WorkspaceConfig {
    /// Upper bound on concurrently lent read connections.
    pub max_readers: usize,
    pub busy_timeout_ms: u64,
    pub journal_mode: JournalMode,
    pub durability_mode: DurabilityMode,
    /// Prepared statements cached per connection.
    pub statement_cache_capacity: usize,
    /// How many times a transaction handler is re-run after SQLITE_BUSY.
    pub busy_retries: usize,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            max_readers: std::thread::available_parallelism()
                .map(|n| n.get().clamp(2, 8))
                .unwrap_or(4),
            busy_timeout_ms: 5_000,
            journal_mode: JournalMode::Wal,
            durability_mode: DurabilityMode::Normal,
            statement_cache_capacity: 64,
            busy_retries: 3,
        }
    }
}

impl WorkspaceConfig {
    pub fn production() -> Self {
        Self {
            durability_mode: DurabilityMode::Full,
            ..Self::default()
        }
    }

    pub fn development() -> Self {
        Self {
            durability_mode: DurabilityMode::OsBuffered,
            busy_retries: 0,
            ..Self::default()
        }
    }

    /// Profile for interactive workloads: short busy waits and a larger
    /// statement cache so hot queries skip re-preparation.
    pub fn low_latency() -> Self {
        Self {
            busy_timeout_ms: 250,
            statement_cache_capacity: 256,
            ..Self::default()
        }
    }

    pub fn with_max_readers(mut self, max_readers: usize) -> Self {
        self.max_readers = max_readers;
        self
    }

    pub fn with_journal_mode(mut self, journal_mode: JournalMode) -> Self {
        self.journal_mode = journal_mode;
        self
    }

    pub fn validate(&self) -> Result<(), AtomError> {
        if self.max_readers == 0 {
            return Err(AtomError::InvalidConfig {
                message: "max_readers must be at least 1".into(),
            });
        }
        if self.statement_cache_capacity == 0 {
            return Err(AtomError::InvalidConfig {
                message: "statement_cache_capacity must be at least 1".into(),
            });
        }
        Ok(())
    }
}
