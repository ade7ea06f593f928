use crate::store::{Store, StoreError};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("{0}")]
    Invalid(String),
    #[error("batch failed: {0}")]
    Store(#[from] StoreError),
}

impl From<rusqlite::Error> for BatchError {
    fn from(e: rusqlite::Error) -> Self {
        BatchError::Store(StoreError::Sqlite(e))
    }
}

#[derive(Debug, Clone)]
pub struct NewSubject {
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone)]
pub struct SubjectBatch {
    pub branch: String,
    pub semester: i64,
    pub year: i64,
    pub subjects: Vec<NewSubject>,
}

impl SubjectBatch {
    fn validate(&self) -> Result<(), BatchError> {
        if self.subjects.is_empty() {
            return Err(BatchError::Invalid("at least one subject is required".into()));
        }
        if self.branch.trim().is_empty() {
            return Err(BatchError::Invalid("branch is required".into()));
        }
        if self.semester <= 0 || self.year <= 0 {
            return Err(BatchError::Invalid(
                "semester and year must be positive integers".into(),
            ));
        }
        Ok(())
    }
}

pub fn add_subjects(store: &mut Store, batch: &SubjectBatch) -> Result<usize, BatchError> {
    batch.validate()?;
    let branch = batch.branch.trim();
    let added = store.run_in_transaction("subject batch", |tx| -> Result<usize, BatchError> {
        let mut stmt = tx.prepare(
            "INSERT INTO subjects(name, subject_code, branch, semester, year)
             VALUES(?, ?, ?, ?, ?)
             ON CONFLICT(subject_code) DO NOTHING",
        )?;
        let mut added = 0usize;
        for s in &batch.subjects {
            let (name, code) = (s.name.trim(), s.code.trim());
            if name.is_empty() || code.is_empty() {
                continue;
            }
            added += stmt.execute((name, code, branch, batch.semester, batch.year))?;
        }
        Ok(added)
    })?;
    info!(
        component = "batch",
        event = "subjects.added",
        submitted = batch.subjects.len(),
        added,
        "subject batch committed"
    );
    Ok(added)
}

pub fn assign_subject(
    store: &mut Store,
    subject_id: i64,
    student_ids: &[i64],
) -> Result<usize, BatchError> {
    if subject_id <= 0 {
        return Err(BatchError::Invalid("subject id must be positive".into()));
    }
    if !student_ids.iter().any(|id| *id > 0) {
        return Err(BatchError::Invalid("select at least one student".into()));
    }
    let assigned = store.run_in_transaction("subject assignment", |tx| -> Result<usize, BatchError> {
        let mut stmt = tx.prepare(
            "INSERT INTO student_subject_allocation(student_id, subject_id)
             VALUES(?, ?)
             ON CONFLICT(student_id, subject_id) DO NOTHING",
        )?;
        let mut assigned = 0usize;
        for student_id in student_ids.iter().copied().filter(|id| *id > 0) {
            assigned += stmt.execute((student_id, subject_id))?;
        }
        Ok(assigned)
    })?;
    info!(
        component = "batch",
        event = "subject.assigned",
        subject_id,
        assigned,
        "subject assignment committed"
    );
    Ok(assigned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrated_store;

    fn subject(name: &str, code: &str) -> NewSubject {
        NewSubject {
            name: name.to_string(),
            code: code.to_string(),
        }
    }

    fn batch(subjects: Vec<NewSubject>) -> SubjectBatch {
        SubjectBatch {
            branch: "CSE".to_string(),
            semester: 3,
            year: 2024,
            subjects,
        }
    }

    fn add_student(store: &Store, usn: &str) -> i64 {
        store
            .conn()
            .execute(
                "INSERT INTO students(usn, student_name, email) VALUES(?, ?, ?)",
                (usn, usn, format!("{usn}@x.com")),
            )
            .expect("insert student");
        store.conn().last_insert_rowid()
    }

    #[test]
    fn existing_codes_and_blank_rows_are_not_counted() {
        let mut store = migrated_store();
        let first = add_subjects(
            &mut store,
            &batch(vec![subject("Maths", "MA101"), subject("Physics", "PH101")]),
        )
        .expect("first batch");
        assert_eq!(first, 2);

        let second = add_subjects(
            &mut store,
            &batch(vec![
                subject("Maths again", "MA101"),
                subject("", "XX000"),
                subject("Chemistry", "CH101"),
            ]),
        )
        .expect("second batch");
        assert_eq!(second, 1);

        let name: String = store
            .conn()
            .query_row("SELECT name FROM subjects WHERE subject_code = 'MA101'", [], |r| r.get(0))
            .expect("name");
        assert_eq!(name, "Maths");
    }

    #[test]
    fn invalid_request_is_rejected_before_writing() {
        let mut store = migrated_store();
        let mut b = batch(vec![subject("Maths", "MA101")]);
        b.year = 0;
        assert!(matches!(add_subjects(&mut store, &b), Err(BatchError::Invalid(_))));
        assert!(matches!(
            add_subjects(&mut store, &batch(vec![])),
            Err(BatchError::Invalid(_))
        ));
    }

    #[test]
    fn reassigning_counts_only_new_pairs() {
        let mut store = migrated_store();
        add_subjects(&mut store, &batch(vec![subject("Maths", "MA101")])).expect("subject");
        let subject_id: i64 = store
            .conn()
            .query_row("SELECT id FROM subjects WHERE subject_code = 'MA101'", [], |r| r.get(0))
            .expect("subject id");
        let a = add_student(&store, "S1");
        let b = add_student(&store, "S2");

        assert_eq!(assign_subject(&mut store, subject_id, &[a, -1]).expect("assign"), 1);
        assert_eq!(assign_subject(&mut store, subject_id, &[a, b]).expect("assign"), 1);
    }

    #[test]
    fn unknown_student_aborts_whole_assignment() {
        let mut store = migrated_store();
        add_subjects(&mut store, &batch(vec![subject("Maths", "MA101")])).expect("subject");
        let subject_id: i64 = store
            .conn()
            .query_row("SELECT id FROM subjects WHERE subject_code = 'MA101'", [], |r| r.get(0))
            .expect("subject id");
        let a = add_student(&store, "S1");

        let err = assign_subject(&mut store, subject_id, &[a, 9_999]).expect_err("foreign key");
        assert!(matches!(err, BatchError::Store(_)));
        let n: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM student_subject_allocation", [], |r| r.get(0))
            .expect("count");
        assert_eq!(n, 0);
    }
}
