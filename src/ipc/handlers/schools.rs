use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, is_constraint_violation, opt_i64, opt_str, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;

fn handle_schools_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let mut stmt = match conn.prepare(
        "SELECT id, code, name, address, city, district, state, email, contact_person, website
         FROM schools
         ORDER BY name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: i64 = row.get(0)?;
            let code: String = row.get(1)?;
            let name: String = row.get(2)?;
            let address: Option<String> = row.get(3)?;
            let city: Option<String> = row.get(4)?;
            let district: Option<String> = row.get(5)?;
            let state_name: Option<String> = row.get(6)?;
            let email: Option<String> = row.get(7)?;
            let contact_person: Option<String> = row.get(8)?;
            let website: Option<String> = row.get(9)?;
            Ok(json!({
                "id": id,
                "code": code,
                "name": name,
                "address": address.unwrap_or_default(),
                "city": city.unwrap_or_default(),
                "district": district.unwrap_or_default(),
                "state": state_name.unwrap_or_default(),
                "email": email.unwrap_or_default(),
                "contactPerson": contact_person.unwrap_or_default(),
                "website": website.unwrap_or_default()
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(schools) => ok(&req.id, json!({ "schools": schools })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_schools_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let code = match required_str(req, "code") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e,
    };
    if code.is_empty() || name.is_empty() {
        return err(&req.id, "bad_params", "code and name must not be empty", None);
    }

    let res = conn.execute(
        "INSERT INTO schools(code, name, address, city, district, state,
                             office_number, whatsapp_number, email,
                             contact_person, contact_number, website)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            code,
            name,
            opt_str(req, "address"),
            opt_str(req, "city"),
            opt_str(req, "district"),
            opt_str(req, "state"),
            opt_i64(req, "officeNumber"),
            opt_i64(req, "whatsappNumber"),
            opt_str(req, "email"),
            opt_str(req, "contactPerson"),
            opt_i64(req, "contactNumber"),
            opt_str(req, "website"),
        ],
    );

    match res {
        Ok(_) => {
            let school_id = conn.last_insert_rowid();
            tracing::info!(school_id, code = %code, "school created");
            ok(&req.id, json!({ "schoolId": school_id, "code": code, "name": name }))
        }
        Err(e) if is_constraint_violation(&e) => err(
            &req.id,
            "school_code_conflict",
            format!("school code '{}' is already in use", code),
            Some(json!({ "code": code })),
        ),
        Err(e) => err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "schools" })),
        ),
    }
}

fn handle_schools_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let school_id = match opt_i64(req, "schoolId") {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing schoolId", None),
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM schools WHERE id = ?", [school_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "school not found", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Explicitly delete in dependency order: credentials, then people, then
    // the school row itself.
    if let Err(e) = tx.execute("DELETE FROM school_users WHERE school_id = ?", [school_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "school_users" })),
        );
    }
    if let Err(e) = tx.execute("DELETE FROM students WHERE school_id = ?", [school_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }
    if let Err(e) = tx.execute("DELETE FROM teachers WHERE school_id = ?", [school_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "teachers" })),
        );
    }
    if let Err(e) = tx.execute("DELETE FROM schools WHERE id = ?", [school_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "schools" })),
        );
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    tracing::info!(school_id, "school deleted with dependents");
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schools.list" => Some(handle_schools_list(state, req)),
        "schools.create" => Some(handle_schools_create(state, req)),
        "schools.delete" => Some(handle_schools_delete(state, req)),
        _ => None,
    }
}
