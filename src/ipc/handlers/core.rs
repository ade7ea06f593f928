use crate::db;
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::handlers::migrations::report_json;
use crate::ipc::helpers::get_required_str;
use crate::ipc::types::{AppState, Request};
use crate::migrate::MigrationError;
use serde_json::json;
use std::path::PathBuf;
use tracing::{error, info};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let path = match get_required_str(&req.params, "path") {
        Ok(v) => PathBuf::from(v),
        Err(e) => return e.response(&req.id),
    };

    // Release the previous connection before opening another store.
    state.store = None;
    state.workspace = None;

    match db::open_db(&path, &state.config) {
        Ok((store, report)) => {
            info!(
                component = "workspace",
                event = "workspace.opened",
                path = %path.to_string_lossy(),
                applied = report.applied_count(),
                "workspace opened"
            );
            state.store = Some(store);
            state.workspace = Some(path.clone());
            ok(
                &req.id,
                json!({
                    "workspacePath": path.to_string_lossy(),
                    "migrations": report_json(&report),
                }),
            )
        }
        Err(e) => {
            let message = format!("{e:#}");
            error!(
                component = "workspace",
                event = "workspace.open_failed",
                path = %path.to_string_lossy(),
                error = %message,
                "workspace open failed"
            );
            match e.downcast::<MigrationError>() {
                Ok(m) => HandlerErr::from(m).response(&req.id),
                Err(_) => err(&req.id, "db_open_failed", message, None),
            }
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
