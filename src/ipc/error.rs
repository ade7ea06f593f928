use crate::batch::BatchError;
use crate::import::ImportError;
use crate::migrate::MigrationError;
use serde_json::{json, Value};

pub fn ok(id: &str, result: Value) -> Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(id: &str, code: &str, message: impl Into<String>, details: Option<Value>) -> Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<MigrationError> for HandlerErr {
    fn from(e: MigrationError) -> Self {
        let details = json!({
            "migrationId": e.migration_id(),
            "fatal": e.is_fatal(),
        });
        HandlerErr::new("migration_failed", e.to_string()).with_details(details)
    }
}

impl From<ImportError> for HandlerErr {
    fn from(e: ImportError) -> Self {
        let line = match &e {
            ImportError::Row { line, .. } | ImportError::Read { line, .. } => Some(*line),
            ImportError::Store(_) => None,
        };
        HandlerErr::new("import_failed", e.to_string())
            .with_details(json!({ "operation": "import batch", "line": line }))
    }
}

impl From<BatchError> for HandlerErr {
    fn from(e: BatchError) -> Self {
        match e {
            BatchError::Invalid(message) => HandlerErr::new("bad_params", message),
            BatchError::Store(_) => HandlerErr::new("batch_failed", e.to_string()),
        }
    }
}
