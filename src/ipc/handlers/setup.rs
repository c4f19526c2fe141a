//! Standards and divisions: the dropdown reference data every student form
//! and import depends on. The two entity types are structurally identical.

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, opt_i64, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;

struct GroupKind {
    table: &'static str,
    id_key: &'static str,
    result_key: &'static str,
}

const STANDARDS: GroupKind = GroupKind {
    table: "standards",
    id_key: "standardId",
    result_key: "standards",
};

const DIVISIONS: GroupKind = GroupKind {
    table: "divisions",
    id_key: "divisionId",
    result_key: "divisions",
};

fn handle_group_list(state: &mut AppState, req: &Request, kind: &GroupKind) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let sql = format!("SELECT id, name FROM {} ORDER BY name", kind.table);
    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: i64 = row.get(0)?;
            let name: String = row.get(1)?;
            Ok(json!({ "id": id, "name": name }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(items) => ok(&req.id, json!({ kind.result_key: items })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_group_create(state: &mut AppState, req: &Request, kind: &GroupKind) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let name = match required_str(req, "name") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e,
    };
    if name.is_empty() {
        return err(&req.id, "bad_params", "name must not be empty", None);
    }

    let sql = format!("INSERT INTO {}(name) VALUES(?)", kind.table);
    if let Err(e) = conn.execute(&sql, [&name]) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": kind.table })),
        );
    }

    ok(
        &req.id,
        json!({ kind.id_key: conn.last_insert_rowid(), "name": name }),
    )
}

fn handle_group_delete(state: &mut AppState, req: &Request, kind: &GroupKind) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let group_id = match opt_i64(req, kind.id_key) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", format!("missing {}", kind.id_key), None),
    };

    let sql = format!("SELECT 1 FROM {} WHERE id = ?", kind.table);
    let exists: Option<i64> = match conn.query_row(&sql, [group_id], |r| r.get(0)).optional() {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", format!("{} row not found", kind.table), None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Owned students go with the group, credentials first.
    let fk = match kind.table {
        "standards" => "standard_id",
        _ => "division_id",
    };
    let del_users = format!(
        "DELETE FROM school_users
         WHERE student_id IN (SELECT id FROM students WHERE {} = ?)",
        fk
    );
    if let Err(e) = tx.execute(&del_users, [group_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "school_users" })),
        );
    }
    let del_students = format!("DELETE FROM students WHERE {} = ?", fk);
    if let Err(e) = tx.execute(&del_students, [group_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }
    let del_group = format!("DELETE FROM {} WHERE id = ?", kind.table);
    if let Err(e) = tx.execute(&del_group, [group_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": kind.table })),
        );
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "standards.list" => Some(handle_group_list(state, req, &STANDARDS)),
        "standards.create" => Some(handle_group_create(state, req, &STANDARDS)),
        "standards.delete" => Some(handle_group_delete(state, req, &STANDARDS)),
        "divisions.list" => Some(handle_group_list(state, req, &DIVISIONS)),
        "divisions.create" => Some(handle_group_create(state, req, &DIVISIONS)),
        "divisions.delete" => Some(handle_group_delete(state, req, &DIVISIONS)),
        _ => None,
    }
}
