use crate::identity;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_conn, display_date, is_constraint_violation, now_timestamp, opt_i64, opt_str, required_str,
    school_filter,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{params_from_iter, types::Value, OptionalExtension};
use serde::Serialize;
use serde_json::json;

use super::students::{parse_dob, PAGE_SIZE};

struct TeacherContent {
    name: String,
    date_of_birth: Option<String>,
    email: Option<String>,
    address: Option<String>,
    city: Option<String>,
    district: Option<String>,
    state: Option<String>,
    mobile_no: Option<i64>,
    whatsapp_no: Option<i64>,
}

fn content_from_params(req: &Request) -> Result<TeacherContent, serde_json::Value> {
    let name = required_str(req, "name")?.trim().to_string();
    if name.is_empty() {
        return Err(err(&req.id, "bad_params", "name must not be empty", None));
    }
    Ok(TeacherContent {
        name,
        date_of_birth: opt_str(req, "dateOfBirth").as_deref().and_then(parse_dob),
        email: opt_str(req, "email"),
        address: opt_str(req, "address"),
        city: opt_str(req, "city"),
        district: opt_str(req, "district"),
        state: opt_str(req, "state"),
        mobile_no: opt_i64(req, "mobileNo"),
        whatsapp_no: opt_i64(req, "whatsappNo"),
    })
}

fn handle_teachers_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let school_id = match opt_i64(req, "schoolId") {
        Some(v) if v > 0 => v,
        _ => return err(&req.id, "bad_params", "please select a school", None),
    };
    let content = match content_from_params(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let school_code: Option<String> = match conn
        .query_row("SELECT code FROM schools WHERE id = ?", [school_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(school_code) = school_code else {
        return err(&req.id, "not_found", "school not found", None);
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    if let Err(e) = tx.execute(
        "INSERT INTO teachers(school_id, name, date_of_birth, email, address,
                              city, district, state, mobile_no, whatsapp_no)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            school_id,
            content.name,
            content.date_of_birth,
            content.email,
            content.address,
            content.city,
            content.district,
            content.state,
            content.mobile_no,
            content.whatsapp_no,
        ],
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "teachers" })),
        );
    }
    let teacher_id = tx.last_insert_rowid();

    let phone = content
        .mobile_no
        .map(|n| n.to_string())
        .unwrap_or_else(|| "0000".to_string());
    let username = identity::derive_username(&content.name, &phone);

    if let Err(e) = tx.execute(
        "INSERT INTO school_users(school_id, school_code, teacher_id, username, password, role, created_date)
         VALUES(?, ?, ?, ?, ?, 'Teacher', ?)",
        rusqlite::params![
            school_id,
            school_code,
            teacher_id,
            username,
            identity::DEFAULT_PASSWORD,
            now_timestamp(),
        ],
    ) {
        let _ = tx.rollback();
        if is_constraint_violation(&e) {
            return err(
                &req.id,
                "username_conflict",
                format!("username '{}' is already in use", username),
                Some(json!({ "username": username })),
            );
        }
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "school_users" })),
        );
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    tracing::info!(teacher_id, username = %username, "teacher created");
    ok(
        &req.id,
        json!({
            "teacherId": teacher_id,
            "username": username,
            "password": identity::DEFAULT_PASSWORD,
            "message": format!(
                "Teacher '{}' has been created successfully! Username: {}, Password: {}",
                content.name, username, identity::DEFAULT_PASSWORD
            )
        }),
    )
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TeacherRow {
    sr_no: i64,
    teacher_id: i64,
    teacher_name: String,
    username: String,
    school: String,
    dob: String,
    email: String,
    teacher_mobile_no: String,
    teacher_whatsapp_no: String,
    address: String,
    city: String,
    district: String,
    state: String,
}

fn handle_teachers_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let school_id = school_filter(req);
    let search_term = opt_str(req, "searchTerm").unwrap_or_default();
    let mut page = opt_i64(req, "page").unwrap_or(1);

    let mut clauses: Vec<&str> = Vec::new();
    let mut binds: Vec<Value> = Vec::new();
    if let Some(sid) = school_id {
        clauses.push("t.school_id = ?");
        binds.push(Value::Integer(sid));
    }
    if !search_term.is_empty() {
        clauses.push(
            "(instr(t.name, ?) > 0 OR instr(COALESCE(t.email, ''), ?) > 0)",
        );
        for _ in 0..2 {
            binds.push(Value::Text(search_term.clone()));
        }
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM teachers t{}", where_sql);
    let total_count: i64 = match conn.query_row(
        &count_sql,
        params_from_iter(binds.clone()),
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let total_pages = (total_count + PAGE_SIZE - 1) / PAGE_SIZE;
    if page < 1 {
        page = 1;
    }
    if total_pages > 0 && page > total_pages {
        page = total_pages;
    }
    let offset = (page - 1) * PAGE_SIZE;

    let data_sql = format!(
        "SELECT t.id, t.name, t.date_of_birth, t.email, t.address, t.city,
                t.district, t.state, t.mobile_no, t.whatsapp_no,
                sc.name, su.username
         FROM teachers t
         LEFT JOIN schools sc ON sc.id = t.school_id
         LEFT JOIN school_users su ON su.teacher_id = t.id
         {}
         ORDER BY t.id DESC
         LIMIT {} OFFSET {}",
        where_sql, PAGE_SIZE, offset
    );

    let mut stmt = match conn.prepare(&data_sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map(params_from_iter(binds), |row| {
            let id: i64 = row.get(0)?;
            let name: String = row.get(1)?;
            let dob: Option<String> = row.get(2)?;
            let email: Option<String> = row.get(3)?;
            let address: Option<String> = row.get(4)?;
            let city: Option<String> = row.get(5)?;
            let district: Option<String> = row.get(6)?;
            let state_name: Option<String> = row.get(7)?;
            let mobile_no: Option<i64> = row.get(8)?;
            let whatsapp_no: Option<i64> = row.get(9)?;
            let school: Option<String> = row.get(10)?;
            let username: Option<String> = row.get(11)?;
            Ok(TeacherRow {
                sr_no: 0,
                teacher_id: id,
                teacher_name: name,
                username: username.unwrap_or_default(),
                school: school.unwrap_or_default(),
                dob: display_date(dob.as_deref()),
                email: email.unwrap_or_default(),
                teacher_mobile_no: mobile_no.map(|n| n.to_string()).unwrap_or_default(),
                teacher_whatsapp_no: whatsapp_no.map(|n| n.to_string()).unwrap_or_default(),
                address: address.unwrap_or_default(),
                city: city.unwrap_or_default(),
                district: district.unwrap_or_default(),
                state: state_name.unwrap_or_default(),
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    let mut teachers = match rows {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    for (i, t) in teachers.iter_mut().enumerate() {
        t.sr_no = offset + i as i64 + 1;
    }

    ok(
        &req.id,
        json!({
            "teachers": teachers,
            "page": page,
            "totalPages": total_pages,
            "totalCount": total_count,
            "pageSize": PAGE_SIZE
        }),
    )
}

fn handle_teachers_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let teacher_id = match opt_i64(req, "teacherId") {
        Some(v) if v > 0 => v,
        _ => return err(&req.id, "bad_params", "invalid teacher id", None),
    };
    let content = match content_from_params(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM teachers WHERE id = ?", [teacher_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "teacher not found", None);
    }

    if let Err(e) = conn.execute(
        "UPDATE teachers SET name = ?, date_of_birth = ?, email = ?, address = ?,
                             city = ?, district = ?, state = ?, mobile_no = ?, whatsapp_no = ?
         WHERE id = ?",
        rusqlite::params![
            content.name,
            content.date_of_birth,
            content.email,
            content.address,
            content.city,
            content.district,
            content.state,
            content.mobile_no,
            content.whatsapp_no,
            teacher_id,
        ],
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    tracing::info!(teacher_id, "teacher updated");
    ok(
        &req.id,
        json!({
            "teacherId": teacher_id,
            "message": format!("Teacher '{}' has been updated successfully!", content.name)
        }),
    )
}

fn handle_teachers_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let teacher_id = match opt_i64(req, "teacherId") {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing teacherId", None),
    };

    let name: Option<String> = match conn
        .query_row("SELECT name FROM teachers WHERE id = ?", [teacher_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(name) = name else {
        return err(&req.id, "not_found", "teacher not found", None);
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    if let Err(e) = tx.execute("DELETE FROM school_users WHERE teacher_id = ?", [teacher_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "school_users" })),
        );
    }
    if let Err(e) = tx.execute("DELETE FROM teachers WHERE id = ?", [teacher_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "teachers" })),
        );
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    tracing::info!(teacher_id, "teacher deleted with credentials");
    ok(
        &req.id,
        json!({ "message": format!("Teacher '{}' has been deleted successfully!", name) }),
    )
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TeacherDetails {
    teacher_id: i64,
    teacher_name: String,
    username: String,
    school: String,
    dob: String,
    email: String,
    address: String,
    city: String,
    district: String,
    state: String,
    teacher_mobile_no: Option<i64>,
    teacher_whatsapp_no: Option<i64>,
}

fn handle_teachers_details(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let teacher_id = match opt_i64(req, "teacherId") {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing teacherId", None),
    };

    let details = conn
        .query_row(
            "SELECT t.id, t.name, t.date_of_birth, t.email, t.address, t.city,
                    t.district, t.state, t.mobile_no, t.whatsapp_no,
                    sc.name, su.username
             FROM teachers t
             LEFT JOIN schools sc ON sc.id = t.school_id
             LEFT JOIN school_users su ON su.teacher_id = t.id
             WHERE t.id = ?",
            [teacher_id],
            |row| {
                let dob: Option<String> = row.get(2)?;
                Ok(TeacherDetails {
                    teacher_id: row.get(0)?,
                    teacher_name: row.get(1)?,
                    dob: dob.unwrap_or_default(),
                    email: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    address: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                    city: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                    district: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
                    state: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
                    teacher_mobile_no: row.get(8)?,
                    teacher_whatsapp_no: row.get(9)?,
                    school: row.get::<_, Option<String>>(10)?.unwrap_or_default(),
                    username: row.get::<_, Option<String>>(11)?.unwrap_or_default(),
                })
            },
        )
        .optional();

    match details {
        Ok(Some(d)) => ok(&req.id, json!(d)),
        Ok(None) => err(&req.id, "not_found", "teacher not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "teachers.create" => Some(handle_teachers_create(state, req)),
        "teachers.list" => Some(handle_teachers_list(state, req)),
        "teachers.update" => Some(handle_teachers_update(state, req)),
        "teachers.delete" => Some(handle_teachers_delete(state, req)),
        "teachers.details" => Some(handle_teachers_details(state, req)),
        _ => None,
    }
}
