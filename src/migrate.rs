use crate::ledger;
use crate::store::{classify, FailureClass, Store, StoreError};
use chrono::Utc;
use std::fmt;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Clone, Copy)]
pub struct MigrationOperation {
    pub id: &'static str,
    pub sql: &'static str,
    pub tolerated: &'static [FailureClass],
}

impl MigrationOperation {
    pub const fn new(id: &'static str, sql: &'static str) -> Self {
        Self {
            id,
            sql,
            tolerated: FailureClass::ALL,
        }
    }

    pub const fn tolerating(mut self, classes: &'static [FailureClass]) -> Self {
        self.tolerated = classes;
        self
    }

    fn tolerates(&self, class: FailureClass) -> bool {
        self.tolerated.contains(&class)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    Applied,
    AlreadyApplied,
    // No ledger row is written.
    Tolerated(FailureClass),
}

impl MigrationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationOutcome::Applied => "applied",
            MigrationOutcome::AlreadyApplied => "already_applied",
            MigrationOutcome::Tolerated(_) => "tolerated",
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub steps: Vec<(&'static str, MigrationOutcome)>,
}

impl RunReport {
    pub fn applied_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|(_, o)| *o == MigrationOutcome::Applied)
            .count()
    }

    pub fn outcome(&self, id: &str) -> Option<MigrationOutcome> {
        self.steps.iter().find(|(i, _)| *i == id).map(|(_, o)| *o)
    }
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("migration ledger unavailable: {0}")]
    Ledger(#[source] StoreError),
    #[error("migration `{id}` failed: {source}")]
    Failed {
        id: String,
        #[source]
        source: StoreError,
    },
}

impl MigrationError {
    pub fn migration_id(&self) -> Option<&str> {
        match self {
            MigrationError::Ledger(_) => None,
            MigrationError::Failed { id, .. } => Some(id),
        }
    }

    pub fn is_fatal(&self) -> bool {
        match self {
            MigrationError::Ledger(e) | MigrationError::Failed { source: e, .. } => e.is_fatal(),
        }
    }
}

enum StepError {
    Store(StoreError),
    // Another runner recorded this id first.
    LedgerConflict,
}

impl From<StoreError> for StepError {
    fn from(e: StoreError) -> Self {
        StepError::Store(e)
    }
}

impl From<rusqlite::Error> for StepError {
    fn from(e: rusqlite::Error) -> Self {
        StepError::Store(StoreError::Sqlite(e))
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepError::Store(e) => write!(f, "{e}"),
            StepError::LedgerConflict => f.write_str("ledger row written by another runner"),
        }
    }
}

pub fn run(store: &mut Store, operations: &[MigrationOperation]) -> Result<RunReport, MigrationError> {
    store
        .run_in_transaction("migration ledger", |tx| -> Result<(), StoreError> {
            ledger::ensure_table(tx)?;
            Ok(())
        })
        .map_err(MigrationError::Ledger)?;

    let mut report = RunReport::default();
    for op in operations {
        let outcome = apply_one(store, op)?;
        report.steps.push((op.id, outcome));
    }

    info!(
        component = "migrations",
        event = "migrations.complete",
        total = operations.len(),
        applied = report.applied_count(),
        "migration run complete"
    );
    Ok(report)
}

fn apply_one(store: &mut Store, op: &MigrationOperation) -> Result<MigrationOutcome, MigrationError> {
    let attempt = store.run_in_transaction(op.id, |tx| -> Result<MigrationOutcome, StepError> {
        if ledger::has_applied(tx, op.id)? {
            return Ok(MigrationOutcome::AlreadyApplied);
        }
        tx.execute_batch(op.sql)?;
        if let Err(e) = ledger::mark_applied(tx, op.id, Utc::now()) {
            return Err(match classify(&e) {
                Some(FailureClass::DuplicateKey) => StepError::LedgerConflict,
                _ => StepError::from(e),
            });
        }
        Ok(MigrationOutcome::Applied)
    });

    match attempt {
        Ok(outcome) => {
            if outcome == MigrationOutcome::Applied {
                info!(
                    component = "migrations",
                    event = "migration.applied",
                    migration_id = op.id,
                    "applied migration"
                );
            }
            Ok(outcome)
        }
        Err(StepError::LedgerConflict) => {
            info!(
                component = "migrations",
                event = "migration.raced",
                migration_id = op.id,
                "another runner recorded this migration first"
            );
            Ok(MigrationOutcome::Tolerated(FailureClass::DuplicateKey))
        }
        Err(StepError::Store(e)) => {
            if let Some(class) = e.sqlite().and_then(classify).filter(|c| op.tolerates(*c)) {
                info!(
                    component = "migrations",
                    event = "migration.tolerated",
                    migration_id = op.id,
                    class = %class,
                    error = %e,
                    "change already present"
                );
                return Ok(MigrationOutcome::Tolerated(class));
            }
            error!(
                component = "migrations",
                event = "migration.failed",
                migration_id = op.id,
                error = %e,
                "migration failed"
            );
            Err(MigrationError::Failed {
                id: op.id.to_string(),
                source: e,
            })
        }
    }
}

pub fn pending(
    store: &Store,
    operations: &[MigrationOperation],
) -> rusqlite::Result<Vec<&'static str>> {
    let mut out = Vec::new();
    for op in operations {
        if !ledger::has_applied(store.conn(), op.id)? {
            out.push(op.id);
        }
    }
    Ok(out)
}
