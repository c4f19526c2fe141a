//! Per-(session, view) visible-column preferences for the list screens.

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;

const STUDENT_COLUMNS: [&str; 20] = [
    "SrNo",
    "StudentName",
    "Username",
    "AdmissionNo",
    "School",
    "Standard",
    "Division",
    "DOB",
    "Email",
    "FatherName",
    "FatherMobile",
    "MotherName",
    "MotherMobile",
    "Address",
    "City",
    "District",
    "State",
    "Mobile",
    "Edit",
    "Delete",
];
const STUDENT_DEFAULTS: [&str; 6] = [
    "StudentName",
    "Username",
    "Standard",
    "Mobile",
    "Edit",
    "Delete",
];

const TEACHER_COLUMNS: [&str; 14] = [
    "SrNo",
    "TeacherName",
    "Username",
    "School",
    "DOB",
    "Email",
    "Mobile",
    "WhatsApp",
    "Address",
    "City",
    "District",
    "State",
    "Edit",
    "Delete",
];
const TEACHER_DEFAULTS: [&str; 6] = [
    "TeacherName",
    "Username",
    "School",
    "Mobile",
    "Edit",
    "Delete",
];

fn view_columns(view: &str) -> Option<(&'static [&'static str], &'static [&'static str])> {
    match view {
        "students" => Some((&STUDENT_COLUMNS, &STUDENT_DEFAULTS)),
        "teachers" => Some((&TEACHER_COLUMNS, &TEACHER_DEFAULTS)),
        _ => None,
    }
}

fn handle_columns_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let session_id = match required_str(req, "sessionId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let view = match required_str(req, "view") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some((_, defaults)) = view_columns(&view) else {
        return err(&req.id, "bad_params", "view must be one of: students, teachers", None);
    };

    let stored: Option<String> = match conn
        .query_row(
            "SELECT columns FROM column_prefs WHERE session_id = ? AND view = ?",
            [&session_id, &view],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let columns: Vec<String> = match stored {
        Some(csv) => csv.split(',').map(|s| s.to_string()).collect(),
        None => defaults.iter().map(|s| s.to_string()).collect(),
    };

    ok(&req.id, json!({ "view": view, "columns": columns }))
}

fn handle_columns_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let session_id = match required_str(req, "sessionId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let view = match required_str(req, "view") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let raw = match required_str(req, "columns") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some((known, _)) = view_columns(&view) else {
        return err(&req.id, "bad_params", "view must be one of: students, teachers", None);
    };

    // Unknown names are dropped rather than stored.
    let accepted: Vec<&str> = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| known.contains(s))
        .collect();
    if accepted.is_empty() {
        return err(
            &req.id,
            "bad_params",
            "no recognized column names submitted",
            Some(json!({ "submitted": raw })),
        );
    }
    let joined = accepted.join(",");

    if let Err(e) = conn.execute(
        "INSERT INTO column_prefs(session_id, view, columns)
         VALUES(?, ?, ?)
         ON CONFLICT(session_id, view) DO UPDATE SET
           columns = excluded.columns",
        [&session_id, &view, &joined],
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }

    tracing::info!(view = %view, columns = %joined, "column visibility updated");
    ok(&req.id, json!({ "view": view, "columns": accepted }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "columns.get" => Some(handle_columns_get(state, req)),
        "columns.update" => Some(handle_columns_update(state, req)),
        _ => None,
    }
}
