use crate::batch::{self, NewSubject, SubjectBatch};
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{as_int, get_required_int, get_required_str, store_mut};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};

fn parse_subjects(params: &Value) -> Result<Vec<NewSubject>, HandlerErr> {
    let Some(items) = params.get("subjects").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::new("bad_params", "missing subjects"));
    };
    Ok(items
        .iter()
        .map(|item| NewSubject {
            name: item
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            code: item
                .get("code")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
        })
        .collect())
}

fn add_batch(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let batch = SubjectBatch {
        branch: get_required_str(&req.params, "branch")?,
        semester: get_required_int(&req.params, "semester")?,
        year: get_required_int(&req.params, "year")?,
        subjects: parse_subjects(&req.params)?,
    };
    let store = store_mut(state)?;
    let added = batch::add_subjects(store, &batch)?;
    Ok(json!({ "added": added, "submitted": batch.subjects.len() }))
}

fn assign_students(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let subject_id = get_required_int(&req.params, "subjectId")?;
    let student_ids = req
        .params
        .get("studentIds")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(as_int).collect::<Vec<_>>())
        .unwrap_or_default();
    let store = store_mut(state)?;
    let assigned = batch::assign_subject(store, subject_id, &student_ids)?;
    Ok(json!({ "subjectId": subject_id, "assigned": assigned }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "subjects.addBatch" => add_batch(state, req),
        "subjects.assignStudents" => assign_students(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
