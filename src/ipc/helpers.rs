use crate::ipc::error::HandlerErr;
use crate::ipc::types::AppState;
use crate::store::Store;
use serde_json::Value;

pub fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", key)))
}

// Form posts send numbers as strings.
pub fn as_int(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn get_required_int(params: &Value, key: &str) -> Result<i64, HandlerErr> {
    params
        .get(key)
        .and_then(as_int)
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing or invalid {}", key)))
}

pub fn get_optional_bool(params: &Value, key: &str, default: bool) -> Result<bool, HandlerErr> {
    let parsed = match params.get(key) {
        None | Some(Value::Null) => return Ok(default),
        Some(Value::Bool(b)) => Some(*b),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        Some(_) => None,
    };
    parsed.ok_or_else(|| HandlerErr::new("bad_params", format!("invalid {}", key)))
}

pub fn store_mut(state: &mut AppState) -> Result<&mut Store, HandlerErr> {
    state
        .store
        .as_mut()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}
