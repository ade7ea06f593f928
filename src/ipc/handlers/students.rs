use crate::import::{self, ImportOptions};
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{get_optional_bool, get_required_str, store_mut};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};
use std::fs::File;
use std::io::BufReader;

fn import_csv(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let in_path = get_required_str(&req.params, "inPath")?;
    let has_header = get_optional_bool(&req.params, "hasHeader", true)?;
    let options = ImportOptions {
        has_header,
        default_credential: state.config.default_credential.clone(),
        hash_iterations: state.config.hash_iterations,
    };
    let store = store_mut(state)?;

    let file = File::open(&in_path).map_err(|e| {
        HandlerErr::new("bad_params", format!("cannot open {}: {}", in_path, e))
            .with_details(json!({ "path": in_path }))
    })?;
    let summary = import::import_students(store, BufReader::new(file), &options)?;

    Ok(json!({
        "path": in_path,
        "accepted": summary.accepted,
        "skipped": summary.skipped,
        "warnings": summary.warnings,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "students.importCsv" => Some(match import_csv(state, req) {
            Ok(result) => ok(&req.id, result),
            Err(e) => e.response(&req.id),
        }),
        _ => None,
    }
}
