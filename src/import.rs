use crate::credential;
use crate::store::{Store, StoreError};
use rusqlite::Transaction;
use serde::Serialize;
use std::io::Read;
use thiserror::Error;
use tracing::{debug, info, warn};

// Input column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Usn,
    Name,
    Email,
    Dob,
    Branch,
    Credential,
}

impl Column {
    fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Column::Usn => "usn",
            Column::Name => "student_name",
            Column::Email => "email",
            Column::Dob => "dob",
            Column::Branch => "branch",
            Column::Credential => "password",
        }
    }
}

pub const REQUIRED: &[Column] = &[Column::Usn, Column::Name, Column::Email];

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub has_header: bool,
    pub default_credential: String,
    pub hash_iterations: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RowWarning {
    pub line: usize,
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Default, Clone, Serialize, PartialEq, Eq)]
pub struct ImportSummary {
    pub accepted: usize,
    pub skipped: usize,
    pub warnings: Vec<RowWarning>,
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("import batch failed at line {line}: {source}")]
    Row {
        line: usize,
        #[source]
        source: StoreError,
    },
    #[error("import batch failed reading line {line}: {source}")]
    Read {
        line: usize,
        #[source]
        source: csv::Error,
    },
    #[error("import batch failed: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct ImportRow {
    pub line: usize,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct StudentRow {
    usn: String,
    student_name: String,
    email: String,
    dob: Option<String>,
    branch: String,
    credential: String,
}

impl ImportRow {
    fn field(&self, col: Column) -> &str {
        self.fields
            .get(col.index())
            .map(|s| s.trim())
            .unwrap_or("")
    }

    fn normalize(&self, default_credential: &str) -> Result<StudentRow, RowWarning> {
        let missing: Vec<&str> = REQUIRED
            .iter()
            .filter(|c| self.field(**c).is_empty())
            .map(|c| c.name())
            .collect();
        if !missing.is_empty() {
            return Err(RowWarning {
                line: self.line,
                code: "missing_required",
                message: format!("missing required field(s): {}", missing.join(", ")),
            });
        }
        let dob = Some(self.field(Column::Dob))
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let credential = match self.field(Column::Credential) {
            "" => default_credential,
            v => v,
        };
        Ok(StudentRow {
            usn: self.field(Column::Usn).to_string(),
            student_name: self.field(Column::Name).to_string(),
            email: self.field(Column::Email).to_string(),
            dob,
            branch: self.field(Column::Branch).to_string(),
            credential: credential.to_string(),
        })
    }
}

pub fn import_students<R: Read>(
    store: &mut Store,
    source: R,
    options: &ImportOptions,
) -> Result<ImportSummary, ImportError> {
    let summary = store.run_in_transaction("import batch", |tx| {
        import_rows(tx, source, options)
    });
    match &summary {
        Ok(s) => info!(
            component = "import",
            event = "import.committed",
            accepted = s.accepted,
            skipped = s.skipped,
            "student import committed"
        ),
        Err(e) => warn!(
            component = "import",
            event = "import.aborted",
            error = %e,
            "student import rolled back"
        ),
    }
    summary
}

fn import_rows<R: Read>(
    tx: &Transaction<'_>,
    source: R,
    options: &ImportOptions,
) -> Result<ImportSummary, ImportError> {
    let mut insert = tx
        .prepare(
            "INSERT INTO students(usn, student_name, email, dob, branch, password)
             VALUES(?, ?, ?, ?, ?, ?)
             ON CONFLICT(usn) DO NOTHING",
        )
        .map_err(StoreError::from)?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(source);

    let mut summary = ImportSummary::default();
    let mut last_line = 0usize;
    for (idx, record) in reader.byte_records().enumerate() {
        let record = record.map_err(|source| ImportError::Read {
            line: source
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(last_line + 1),
            source,
        })?;
        let line_no = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(last_line + 1);
        last_line = line_no;
        if idx == 0 && options.has_header {
            continue;
        }
        if record.len() == 1 && record[0].iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let fields = match record
            .iter()
            .map(|f| String::from_utf8(f.to_vec()))
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(fields) => fields,
            Err(_) => {
                debug!(component = "import", line = line_no, "row is not valid UTF-8");
                summary.skipped += 1;
                summary.warnings.push(RowWarning {
                    line: line_no,
                    code: "invalid_encoding",
                    message: "row is not valid UTF-8".to_string(),
                });
                continue;
            }
        };

        let row = ImportRow {
            line: line_no,
            fields,
        };
        let student = match row.normalize(&options.default_credential) {
            Ok(s) => s,
            Err(w) => {
                debug!(component = "import", line = line_no, reason = %w.message, "row skipped");
                summary.skipped += 1;
                summary.warnings.push(w);
                continue;
            }
        };

        let hashed = credential::hash(&student.credential, options.hash_iterations);
        let written = insert
            .execute((
                &student.usn,
                &student.student_name,
                &student.email,
                &student.dob,
                &student.branch,
                &hashed,
            ))
            .map_err(|e| ImportError::Row {
                line: line_no,
                source: StoreError::from(e),
            })?;

        if written > 0 {
            summary.accepted += 1;
        } else {
            summary.skipped += 1;
            summary.warnings.push(RowWarning {
                line: line_no,
                code: "duplicate_key",
                message: format!("usn {} already exists", student.usn),
            });
        }
    }
    Ok(summary)
}
