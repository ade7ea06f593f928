mod batch;
mod config;
mod credential;
mod db;
mod import;
mod ipc;
mod ledger;
mod migrate;
mod store;

use serde_json::json;
use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

fn init_tracing(cfg: &config::Config) {
    // stdout carries IPC responses; logs go to stderr only.
    let filter = EnvFilter::try_from_env(config::LOG_ENV)
        .or_else(|_| EnvFilter::try_new(&cfg.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn main() {
    let cfg = match config::Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("admissiond: {e:#}");
            std::process::exit(2);
        }
    };
    init_tracing(&cfg);
    tracing::info!(
        component = "main",
        event = "startup",
        version = env!("CARGO_PKG_VERSION"),
        "admissiond ready"
    );

    let mut state = ipc::AppState::new(cfg);

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                let _ = writeln!(
                    stdout,
                    "{}",
                    json!({ "ok": false, "error": { "code": "bad_json", "message": e.to_string() } })
                );
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }

    // Closing stdin ends the session; dropping the store releases the connection.
    drop(state);
    tracing::info!(component = "main", event = "shutdown", "stdin closed");
}
