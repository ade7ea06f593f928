use crate::config::Config;
use crate::migrate::{self, MigrationOperation, RunReport};
use crate::store::{FailureClass, Store, StoreError};
use anyhow::Context;
use std::path::Path;

pub const DB_FILE: &str = "admission.sqlite3";

const ADD_COLUMN: &[FailureClass] = &[FailureClass::DuplicateColumn];

// Order matters. Shipped ids are never renamed.
pub const DECLARED_MIGRATIONS: &[MigrationOperation] = &[
    MigrationOperation::new(
        "add_subjects_branch",
        "ALTER TABLE subjects ADD COLUMN branch TEXT",
    )
    .tolerating(ADD_COLUMN),
    MigrationOperation::new(
        "add_subjects_semester",
        "ALTER TABLE subjects ADD COLUMN semester INTEGER",
    )
    .tolerating(ADD_COLUMN),
    MigrationOperation::new("add_subjects_year", "ALTER TABLE subjects ADD COLUMN year INTEGER")
        .tolerating(ADD_COLUMN),
    MigrationOperation::new(
        "add_students_father_name",
        "ALTER TABLE students ADD COLUMN father_name TEXT",
    )
    .tolerating(ADD_COLUMN),
    MigrationOperation::new(
        "add_students_mother_name",
        "ALTER TABLE students ADD COLUMN mother_name TEXT",
    )
    .tolerating(ADD_COLUMN),
    MigrationOperation::new(
        "add_students_mobile_number",
        "ALTER TABLE students ADD COLUMN mobile_number TEXT",
    )
    .tolerating(ADD_COLUMN),
    MigrationOperation::new(
        "add_students_parent_mobile",
        "ALTER TABLE students ADD COLUMN parent_mobile_number TEXT",
    )
    .tolerating(ADD_COLUMN),
    MigrationOperation::new(
        "add_students_category",
        "ALTER TABLE students ADD COLUMN category TEXT",
    )
    .tolerating(ADD_COLUMN),
    MigrationOperation::new(
        "add_students_branch_kea",
        "ALTER TABLE students ADD COLUMN allotted_branch_kea TEXT",
    )
    .tolerating(ADD_COLUMN),
    MigrationOperation::new(
        "add_students_branch_mgmt",
        "ALTER TABLE students ADD COLUMN allotted_branch_management TEXT",
    )
    .tolerating(ADD_COLUMN),
    // The bulk roster import writes the branch column.
    MigrationOperation::new("add_students_branch", "ALTER TABLE students ADD COLUMN branch TEXT")
        .tolerating(ADD_COLUMN),
    MigrationOperation::new(
        "seed_default_semesters",
        "INSERT OR IGNORE INTO semesters(name) VALUES
            ('Semester 1'), ('Semester 2'), ('Semester 3'), ('Semester 4'),
            ('Semester 5'), ('Semester 6'), ('Semester 7'), ('Semester 8')",
    )
    .tolerating(&[FailureClass::DuplicateKey]),
];

pub fn open_db(workspace: &Path, config: &Config) -> anyhow::Result<(Store, RunReport)> {
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("failed to create workspace {}", workspace.to_string_lossy()))?;
    let mut store = Store::open(&workspace.join(DB_FILE), config.busy_timeout())?;
    bootstrap_schema(&mut store).context("schema bootstrap failed")?;
    let report = migrate::run(&mut store, DECLARED_MIGRATIONS)?;
    Ok((store, report))
}

pub fn bootstrap_schema(store: &mut Store) -> Result<(), StoreError> {
    store.run_in_transaction("schema bootstrap", |tx| -> Result<(), StoreError> {
        tx.execute_batch(BASE_SCHEMA)?;
        Ok(())
    })
}

const BASE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS semesters(
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS classes(
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    semester_id INTEGER REFERENCES semesters(id)
);

CREATE TABLE IF NOT EXISTS students(
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    usn TEXT UNIQUE,
    student_name TEXT,
    email TEXT UNIQUE,
    password TEXT,
    dob TEXT,
    semester INTEGER,
    class_id INTEGER REFERENCES classes(id)
);

CREATE TABLE IF NOT EXISTS users(
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    first_name TEXT,
    surname TEXT,
    email TEXT NOT NULL UNIQUE,
    password TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'student'
);

CREATE TABLE IF NOT EXISTS subjects(
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    subject_code TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS subject_allocation(
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    staff_id INTEGER NOT NULL REFERENCES users(id),
    subject_id INTEGER NOT NULL REFERENCES subjects(id),
    UNIQUE(staff_id, subject_id)
);

CREATE TABLE IF NOT EXISTS student_subject_allocation(
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    student_id INTEGER NOT NULL REFERENCES students(id),
    subject_id INTEGER NOT NULL REFERENCES subjects(id),
    UNIQUE(student_id, subject_id)
);
CREATE INDEX IF NOT EXISTS idx_student_subject_allocation_subject
    ON student_subject_allocation(subject_id);

CREATE TABLE IF NOT EXISTS question_papers(
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    content TEXT,
    subject_id INTEGER REFERENCES subjects(id)
);

CREATE TABLE IF NOT EXISTS test_allocation(
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    class_id INTEGER NOT NULL REFERENCES classes(id),
    qp_id INTEGER NOT NULL REFERENCES question_papers(id),
    UNIQUE(class_id, qp_id)
);

CREATE TABLE IF NOT EXISTS ia_results(
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    student_id INTEGER NOT NULL REFERENCES students(id),
    qp_id INTEGER NOT NULL REFERENCES question_papers(id),
    marks REAL,
    max_marks REAL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_ia_results_student ON ia_results(student_id);
";

#[cfg(test)]
pub fn migrated_store() -> Store {
    let mut store = Store::open_in_memory().expect("open store");
    bootstrap_schema(&mut store).expect("bootstrap");
    migrate::run(&mut store, DECLARED_MIGRATIONS).expect("migrate");
    store
}
