use crate::ipc::error::{err, ok};
use crate::ipc::helpers::db_conn;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_dashboard_stats(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let counts: Result<(i64, i64, i64), rusqlite::Error> = conn.query_row(
        "SELECT
           (SELECT COUNT(*) FROM students),
           (SELECT COUNT(*) FROM teachers),
           (SELECT COUNT(*) FROM schools)",
        [],
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
    );

    match counts {
        Ok((students, teachers, schools)) => ok(
            &req.id,
            json!({
                "totalStudents": students,
                "totalTeachers": teachers,
                "totalSchools": schools
            }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "dashboard.stats" => Some(handle_dashboard_stats(state, req)),
        _ => None,
    }
}
