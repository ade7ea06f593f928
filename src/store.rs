use rusqlite::{ffi, Connection, ErrorCode, Transaction, TransactionBehavior};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open store {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("{label}: failed to begin transaction: {source}")]
    Begin {
        label: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("{label}: commit failed: {source}")]
    Commit {
        label: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("{label}: rollback failed after `{cause}`: {source}")]
    RollbackFailed {
        label: String,
        cause: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("stale transaction could not be rolled back: {0}")]
    StaleReset(#[source] rusqlite::Error),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StoreError::Open { .. } | StoreError::RollbackFailed { .. } | StoreError::StaleReset(_)
        )
    }

    pub fn sqlite(&self) -> Option<&rusqlite::Error> {
        match self {
            StoreError::Sqlite(e) => Some(e),
            _ => None,
        }
    }
}

// Store errors that mean "someone already did this".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    DuplicateColumn,
    DuplicateObject,
    DuplicateKey,
}

impl FailureClass {
    pub const ALL: &'static [FailureClass] = &[
        FailureClass::DuplicateColumn,
        FailureClass::DuplicateObject,
        FailureClass::DuplicateKey,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FailureClass::DuplicateColumn => "duplicate_column",
            FailureClass::DuplicateObject => "duplicate_object",
            FailureClass::DuplicateKey => "duplicate_key",
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn classify(e: &rusqlite::Error) -> Option<FailureClass> {
    match e {
        rusqlite::Error::SqliteFailure(code, message) => {
            classify_failure(code, message.as_deref())
        }
        // Raised while preparing, e.g. "table x already exists".
        rusqlite::Error::SqlInputError { error, msg, .. } => {
            classify_failure(error, Some(msg.as_str()))
        }
        _ => None,
    }
}

fn classify_failure(code: &ffi::Error, message: Option<&str>) -> Option<FailureClass> {
    if code.code == ErrorCode::ConstraintViolation {
        return match code.extended_code {
            ffi::SQLITE_CONSTRAINT_PRIMARYKEY | ffi::SQLITE_CONSTRAINT_UNIQUE => {
                Some(FailureClass::DuplicateKey)
            }
            _ => None,
        };
    }
    let message = message?;
    if message.starts_with("duplicate column name") {
        return Some(FailureClass::DuplicateColumn);
    }
    if message.contains("already exists") {
        return Some(FailureClass::DuplicateObject);
    }
    None
}

pub struct Store {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Store {
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, StoreError> {
        let open_err = |source| StoreError::Open {
            path: path.to_string_lossy().to_string(),
            source,
        };
        let conn = Connection::open(path).map_err(open_err)?;
        conn.busy_timeout(busy_timeout).map_err(open_err)?;
        conn.execute("PRAGMA foreign_keys = ON", []).map_err(open_err)?;
        let mut store = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        store.reset_if_in_transaction()?;
        Ok(store)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self { conn, path: None })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn reset_if_in_transaction(&mut self) -> Result<bool, StoreError> {
        if self.conn.is_autocommit() {
            return Ok(false);
        }
        warn!(
            component = "store",
            event = "transaction.stale",
            path = ?self.path,
            "rolling back transaction left open by an earlier unit of work"
        );
        self.conn
            .execute_batch("ROLLBACK")
            .map_err(StoreError::StaleReset)?;
        Ok(true)
    }

    pub fn run_in_transaction<T, E, F>(&mut self, label: &str, work: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<StoreError> + fmt::Display,
    {
        self.reset_if_in_transaction()?;
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|source| StoreError::Begin {
                label: label.to_string(),
                source,
            })?;

        match work(&tx) {
            Ok(value) => {
                tx.commit().map_err(|source| StoreError::Commit {
                    label: label.to_string(),
                    source,
                })?;
                debug!(component = "store", event = "transaction.committed", label);
                Ok(value)
            }
            Err(e) => {
                if let Err(source) = tx.rollback() {
                    error!(
                        component = "store",
                        event = "transaction.rollback_failed",
                        label,
                        cause = %e,
                        error = %source,
                        "rollback failed; connection is unusable"
                    );
                    return Err(StoreError::RollbackFailed {
                        label: label.to_string(),
                        cause: e.to_string(),
                        source,
                    }
                    .into());
                }
                debug!(
                    component = "store",
                    event = "transaction.rolled_back",
                    label,
                    cause = %e
                );
                Err(e)
            }
        }
    }
}
