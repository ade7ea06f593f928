use crate::db::DECLARED_MIGRATIONS;
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::store_mut;
use crate::ipc::types::{AppState, Request};
use crate::ledger;
use crate::migrate::{self, MigrationOutcome, RunReport};
use serde_json::{json, Value};

pub fn report_json(report: &RunReport) -> Value {
    let steps = report
        .steps
        .iter()
        .map(|(id, outcome)| {
            let mut step = json!({ "id": id, "outcome": outcome.as_str() });
            if let MigrationOutcome::Tolerated(class) = outcome {
                step["class"] = json!(class.as_str());
            }
            step
        })
        .collect::<Vec<_>>();
    json!({
        "applied": report.applied_count(),
        "steps": steps,
    })
}

fn handle_status(state: &mut AppState, req: &Request) -> Value {
    let store = match store_mut(state) {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };
    let pending = match migrate::pending(store, DECLARED_MIGRATIONS) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let records = match ledger::list(store.conn()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let applied = records
        .iter()
        .map(|r| json!({ "id": r.id, "appliedAt": r.applied_at.to_rfc3339() }))
        .collect::<Vec<_>>();
    ok(
        &req.id,
        json!({
            "declared": DECLARED_MIGRATIONS.len(),
            "applied": applied,
            "pending": pending,
        }),
    )
}

fn handle_run(state: &mut AppState, req: &Request) -> Value {
    let store = match store_mut(state) {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };
    match migrate::run(store, DECLARED_MIGRATIONS) {
        Ok(report) => ok(&req.id, report_json(&report)),
        Err(e) => HandlerErr::from(e).response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "migrations.status" => Some(handle_status(state, req)),
        "migrations.run" => Some(handle_run(state, req)),
        _ => None,
    }
}
