mod test_support;

use serde_json::json;
use test_support::{count, open_db, request_ok, spawn_sidecar, table_has_column, temp_dir};

#[test]
fn first_open_applies_every_declared_migration_and_reopen_applies_none() {
    let workspace = temp_dir("admissiond-migrations");

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let declared = opened["migrations"]["steps"]
        .as_array()
        .expect("steps")
        .len();
    assert!(declared > 0);
    assert_eq!(opened["migrations"]["applied"].as_u64(), Some(declared as u64));

    let status = request_ok(&mut stdin, &mut reader, "2", "migrations.status", json!({}));
    assert_eq!(status["declared"].as_u64(), Some(declared as u64));
    assert_eq!(status["pending"].as_array().map(|a| a.len()), Some(0));
    assert_eq!(status["applied"].as_array().map(|a| a.len()), Some(declared));
    drop(stdin);

    // A fresh process replays the same list against the same ledger.
    let (_child2, mut stdin2, mut reader2) = spawn_sidecar();
    let reopened = request_ok(
        &mut stdin2,
        &mut reader2,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(reopened["migrations"]["applied"].as_u64(), Some(0));
    assert!(reopened["migrations"]["steps"]
        .as_array()
        .expect("steps")
        .iter()
        .all(|s| s["outcome"] == "already_applied"));

    let rerun = request_ok(&mut stdin2, &mut reader2, "2", "migrations.run", json!({}));
    assert_eq!(rerun["applied"].as_u64(), Some(0));

    let conn = open_db(&workspace);
    assert_eq!(
        count(&conn, "SELECT COUNT(*) FROM schema_migrations"),
        declared as i64
    );
    assert_eq!(
        count(&conn, "SELECT COUNT(DISTINCT migration_id) FROM schema_migrations"),
        declared as i64
    );
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM semesters"), 8);
    assert!(table_has_column(&conn, "students", "branch"));
    assert!(table_has_column(&conn, "students", "allotted_branch_management"));
    assert!(table_has_column(&conn, "subjects", "year"));
}

#[test]
fn manually_added_column_is_tolerated_on_open() {
    let workspace = temp_dir("admissiond-migrations-tolerated");

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    drop(stdin);

    {
        let conn = open_db(&workspace);
        conn.execute(
            "DELETE FROM schema_migrations WHERE migration_id = 'add_students_category'",
            [],
        )
        .expect("forget one ledger row");
    }

    let (_child2, mut stdin2, mut reader2) = spawn_sidecar();
    let reopened = request_ok(
        &mut stdin2,
        &mut reader2,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let step = reopened["migrations"]["steps"]
        .as_array()
        .expect("steps")
        .iter()
        .find(|s| s["id"] == "add_students_category")
        .cloned()
        .expect("category step");
    assert_eq!(step["outcome"], "tolerated");
    assert_eq!(step["class"], "duplicate_column");

    let status = request_ok(&mut stdin2, &mut reader2, "2", "migrations.status", json!({}));
    assert_eq!(status["pending"], json!(["add_students_category"]));
}
