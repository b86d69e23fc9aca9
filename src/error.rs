use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomErrorCode {
    Io,
    Storage,
    Encode,
    Decode,
    InvalidConfig,
    InvalidQuery,
    UniqueViolation,
    NotFound,
    AlreadyCommitted,
    Aborted,
    ShutDown,
}

impl AtomErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            AtomErrorCode::Io => "io",
            AtomErrorCode::Storage => "storage",
            AtomErrorCode::Encode => "encode",
            AtomErrorCode::Decode => "decode",
            AtomErrorCode::InvalidConfig => "invalid_config",
            AtomErrorCode::InvalidQuery => "invalid_query",
            AtomErrorCode::UniqueViolation => "unique_violation",
            AtomErrorCode::NotFound => "not_found",
            AtomErrorCode::AlreadyCommitted => "already_committed",
            AtomErrorCode::Aborted => "aborted",
            AtomErrorCode::ShutDown => "shut_down",
        }
    }
}

#[derive(Debug, Error)]
pub enum AtomError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },
    #[error("invalid query: {reason}")]
    InvalidQuery { reason: String },
    #[error("unique constraint violation in table '{table}'")]
    UniqueViolation { table: String },
    #[error("row {rowid} not found in table '{table}'")]
    NotFound { table: String, rowid: i64 },
    /// A change request reached its terminal state and was submitted again.
    #[error("change request for table '{table}' was already committed")]
    AlreadyCommitted { table: String },
    #[error("transaction aborted")]
    Aborted,
    #[error("workspace is shut down")]
    ShutDown,
}

impl AtomError {
    pub fn code(&self) -> AtomErrorCode {
        match self {
            AtomError::Io(_) => AtomErrorCode::Io,
            AtomError::Storage(_) => AtomErrorCode::Storage,
            AtomError::Encode(_) => AtomErrorCode::Encode,
            AtomError::Decode(_) => AtomErrorCode::Decode,
            AtomError::InvalidConfig { .. } => AtomErrorCode::InvalidConfig,
            AtomError::InvalidQuery { .. } => AtomErrorCode::InvalidQuery,
            AtomError::UniqueViolation { .. } => AtomErrorCode::UniqueViolation,
            AtomError::NotFound { .. } => AtomErrorCode::NotFound,
            AtomError::AlreadyCommitted { .. } => AtomErrorCode::AlreadyCommitted,
            AtomError::Aborted => AtomErrorCode::Aborted,
            AtomError::ShutDown => AtomErrorCode::ShutDown,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }

    /// True when SQLite reported lock contention from another connection or
    /// process. The whole transaction handler may be retried.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            AtomError::Storage(rusqlite::Error::SqliteFailure(err, _))
                if matches!(
                    err.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                )
        )
    }

    pub(crate) fn from_write(err: rusqlite::Error, table: &str) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, _)
                if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                AtomError::UniqueViolation {
                    table: table.to_string(),
                }
            }
            _ => AtomError::Storage(err),
        }
    }
}
