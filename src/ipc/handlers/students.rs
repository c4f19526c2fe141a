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

pub const PAGE_SIZE: i64 = 10;

/// Content fields shared by the create and edit paths. School, standard and
/// division are deliberately absent: relationships are fixed at creation.
struct StudentContent {
    name: String,
    admission_no: Option<i64>,
    date_of_birth: Option<String>,
    email: Option<String>,
    address: Option<String>,
    city: Option<String>,
    district: Option<String>,
    state: Option<String>,
    father_name: Option<String>,
    father_number: Option<i64>,
    father_whatsapp: Option<i64>,
    mother_name: Option<String>,
    mother_number: Option<i64>,
    mother_whatsapp: Option<i64>,
}

fn content_from_params(req: &Request) -> Result<StudentContent, serde_json::Value> {
    let name = required_str(req, "name")?.trim().to_string();
    if name.is_empty() {
        return Err(err(&req.id, "bad_params", "name must not be empty", None));
    }
    Ok(StudentContent {
        name,
        admission_no: opt_i64(req, "admissionNo"),
        date_of_birth: opt_str(req, "dateOfBirth").as_deref().and_then(parse_dob),
        email: opt_str(req, "email"),
        address: opt_str(req, "address"),
        city: opt_str(req, "city"),
        district: opt_str(req, "district"),
        state: opt_str(req, "state"),
        father_name: opt_str(req, "fatherName"),
        father_number: opt_i64(req, "fatherNumber"),
        father_whatsapp: opt_i64(req, "fatherWhatsapp"),
        mother_name: opt_str(req, "motherName"),
        mother_number: opt_i64(req, "motherNumber"),
        mother_whatsapp: opt_i64(req, "motherWhatsapp"),
    })
}

// Dates are stored ISO; the form may post either ISO or day-first. An
// unparseable date becomes absent rather than an error.
pub fn parse_dob(raw: &str) -> Option<String> {
    let raw = raw.trim();
    for fmt in ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"] {
        if let Ok(d) = chrono::NaiveDate::parse_from_str(raw, fmt) {
            return Some(d.format("%Y-%m-%d").to_string());
        }
    }
    None
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let school_id = match opt_i64(req, "schoolId") {
        Some(v) if v > 0 => v,
        _ => return err(&req.id, "bad_params", "please select a school", None),
    };
    let standard_id = match opt_i64(req, "standardId") {
        Some(v) if v > 0 => v,
        _ => return err(&req.id, "bad_params", "please select a standard", None),
    };
    let division_id = match opt_i64(req, "divisionId") {
        Some(v) if v > 0 => v,
        _ => return err(&req.id, "bad_params", "please select a division", None),
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
    for (table, id, field) in [
        ("standards", standard_id, "standardId"),
        ("divisions", division_id, "divisionId"),
    ] {
        let sql = format!("SELECT 1 FROM {} WHERE id = ?", table);
        match conn.query_row(&sql, [id], |r| r.get::<_, i64>(0)).optional() {
            Ok(Some(_)) => {}
            Ok(None) => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("unknown {}", field),
                    Some(json!({ field: id })),
                )
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }

    // Entity and credential commit together or not at all.
    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    if let Err(e) = tx.execute(
        "INSERT INTO students(school_id, standard_id, division_id, name, admission_no,
                              date_of_birth, email, address, city, district, state,
                              father_name, father_number, father_whatsapp,
                              mother_name, mother_number, mother_whatsapp)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            school_id,
            standard_id,
            division_id,
            content.name,
            content.admission_no,
            content.date_of_birth,
            content.email,
            content.address,
            content.city,
            content.district,
            content.state,
            content.father_name,
            content.father_number,
            content.father_whatsapp,
            content.mother_name,
            content.mother_number,
            content.mother_whatsapp,
        ],
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }
    let student_id = tx.last_insert_rowid();

    let phone = content
        .father_number
        .map(|n| n.to_string())
        .unwrap_or_else(|| "0000".to_string());
    let username = identity::derive_username(&content.name, &phone);

    if let Err(e) = tx.execute(
        "INSERT INTO school_users(school_id, school_code, student_id, username, password, role, created_date)
         VALUES(?, ?, ?, ?, ?, 'Student', ?)",
        rusqlite::params![
            school_id,
            school_code,
            student_id,
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

    tracing::info!(student_id, username = %username, "student created");
    ok(
        &req.id,
        json!({
            "studentId": student_id,
            "username": username,
            "password": identity::DEFAULT_PASSWORD,
            "message": format!(
                "Student '{}' has been created successfully! Username: {}, Password: {}",
                content.name, username, identity::DEFAULT_PASSWORD
            )
        }),
    )
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StudentRow {
    sr_no: i64,
    student_id: i64,
    student_name: String,
    username: String,
    admission_no: String,
    school: String,
    standard: String,
    division: String,
    dob: String,
    email: String,
    father_name: String,
    father_mobile: String,
    mother_name: String,
    mother_mobile: String,
    address: String,
    city: String,
    district: String,
    state: String,
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
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
        clauses.push("s.school_id = ?");
        binds.push(Value::Integer(sid));
    }
    if !search_term.is_empty() {
        // Case-sensitive substring match, as the screens implement it.
        clauses.push(
            "(instr(s.name, ?) > 0
              OR instr(COALESCE(CAST(s.admission_no AS TEXT), ''), ?) > 0
              OR instr(COALESCE(s.email, ''), ?) > 0)",
        );
        for _ in 0..3 {
            binds.push(Value::Text(search_term.clone()));
        }
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM students s{}", where_sql);
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
        "SELECT s.id, s.name, s.admission_no, s.date_of_birth, s.email,
                s.address, s.city, s.district, s.state,
                s.father_name, s.father_number, s.mother_name, s.mother_number,
                sc.name, st.name, d.name, su.username
         FROM students s
         LEFT JOIN schools sc ON sc.id = s.school_id
         LEFT JOIN standards st ON st.id = s.standard_id
         LEFT JOIN divisions d ON d.id = s.division_id
         LEFT JOIN school_users su ON su.student_id = s.id
         {}
         ORDER BY s.id DESC
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
            let admission_no: Option<i64> = row.get(2)?;
            let dob: Option<String> = row.get(3)?;
            let email: Option<String> = row.get(4)?;
            let address: Option<String> = row.get(5)?;
            let city: Option<String> = row.get(6)?;
            let district: Option<String> = row.get(7)?;
            let state_name: Option<String> = row.get(8)?;
            let father_name: Option<String> = row.get(9)?;
            let father_number: Option<i64> = row.get(10)?;
            let mother_name: Option<String> = row.get(11)?;
            let mother_number: Option<i64> = row.get(12)?;
            let school: Option<String> = row.get(13)?;
            let standard: Option<String> = row.get(14)?;
            let division: Option<String> = row.get(15)?;
            let username: Option<String> = row.get(16)?;
            Ok(StudentRow {
                sr_no: 0,
                student_id: id,
                student_name: name,
                username: username.unwrap_or_default(),
                admission_no: admission_no.map(|n| n.to_string()).unwrap_or_default(),
                school: school.unwrap_or_default(),
                standard: standard.unwrap_or_default(),
                division: division.unwrap_or_default(),
                dob: display_date(dob.as_deref()),
                email: email.unwrap_or_default(),
                father_name: father_name.unwrap_or_default(),
                father_mobile: father_number.map(|n| n.to_string()).unwrap_or_default(),
                mother_name: mother_name.unwrap_or_default(),
                mother_mobile: mother_number.map(|n| n.to_string()).unwrap_or_default(),
                address: address.unwrap_or_default(),
                city: city.unwrap_or_default(),
                district: district.unwrap_or_default(),
                state: state_name.unwrap_or_default(),
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    let mut students = match rows {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    for (i, s) in students.iter_mut().enumerate() {
        s.sr_no = offset + i as i64 + 1;
    }

    ok(
        &req.id,
        json!({
            "students": students,
            "page": page,
            "totalPages": total_pages,
            "totalCount": total_count,
            "pageSize": PAGE_SIZE
        }),
    )
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let student_id = match opt_i64(req, "studentId") {
        Some(v) if v > 0 => v,
        _ => return err(&req.id, "bad_params", "invalid student id", None),
    };
    let content = match content_from_params(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "student not found", None);
    }

    // Content fields only; school/standard/division stay as created.
    if let Err(e) = conn.execute(
        "UPDATE students SET name = ?, admission_no = ?, date_of_birth = ?, email = ?,
                             address = ?, city = ?, district = ?, state = ?,
                             father_name = ?, father_number = ?, father_whatsapp = ?,
                             mother_name = ?, mother_number = ?, mother_whatsapp = ?
         WHERE id = ?",
        rusqlite::params![
            content.name,
            content.admission_no,
            content.date_of_birth,
            content.email,
            content.address,
            content.city,
            content.district,
            content.state,
            content.father_name,
            content.father_number,
            content.father_whatsapp,
            content.mother_name,
            content.mother_number,
            content.mother_whatsapp,
            student_id,
        ],
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    tracing::info!(student_id, "student updated");
    ok(
        &req.id,
        json!({
            "studentId": student_id,
            "message": format!("Student '{}' has been updated successfully!", content.name)
        }),
    )
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let student_id = match opt_i64(req, "studentId") {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing studentId", None),
    };

    let name: Option<String> = match conn
        .query_row("SELECT name FROM students WHERE id = ?", [student_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(name) = name else {
        return err(&req.id, "not_found", "student not found", None);
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Credentials must never outlive the person they log in.
    if let Err(e) = tx.execute("DELETE FROM school_users WHERE student_id = ?", [student_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "school_users" })),
        );
    }
    if let Err(e) = tx.execute("DELETE FROM students WHERE id = ?", [student_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    tracing::info!(student_id, "student deleted with credentials");
    ok(
        &req.id,
        json!({ "message": format!("Student '{}' has been deleted successfully!", name) }),
    )
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StudentDetails {
    student_id: i64,
    student_name: String,
    username: String,
    admission_no: Option<i64>,
    school: String,
    standard: String,
    division: String,
    dob: String,
    email: String,
    father_name: String,
    father_number: Option<i64>,
    father_whatsapp: Option<i64>,
    mother_name: String,
    mother_number: Option<i64>,
    mother_whatsapp: Option<i64>,
    address: String,
    city: String,
    district: String,
    state: String,
}

fn handle_students_details(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let student_id = match opt_i64(req, "studentId") {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing studentId", None),
    };

    let details = conn
        .query_row(
            "SELECT s.id, s.name, s.admission_no, s.date_of_birth, s.email,
                    s.address, s.city, s.district, s.state,
                    s.father_name, s.father_number, s.father_whatsapp,
                    s.mother_name, s.mother_number, s.mother_whatsapp,
                    sc.name, st.name, d.name, su.username
             FROM students s
             LEFT JOIN schools sc ON sc.id = s.school_id
             LEFT JOIN standards st ON st.id = s.standard_id
             LEFT JOIN divisions d ON d.id = s.division_id
             LEFT JOIN school_users su ON su.student_id = s.id
             WHERE s.id = ?",
            [student_id],
            |row| {
                let dob: Option<String> = row.get(3)?;
                Ok(StudentDetails {
                    student_id: row.get(0)?,
                    student_name: row.get(1)?,
                    admission_no: row.get(2)?,
                    dob: dob.unwrap_or_default(),
                    email: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                    address: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                    city: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
                    district: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
                    state: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
                    father_name: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
                    father_number: row.get(10)?,
                    father_whatsapp: row.get(11)?,
                    mother_name: row.get::<_, Option<String>>(12)?.unwrap_or_default(),
                    mother_number: row.get(13)?,
                    mother_whatsapp: row.get(14)?,
                    school: row.get::<_, Option<String>>(15)?.unwrap_or_default(),
                    standard: row.get::<_, Option<String>>(16)?.unwrap_or_default(),
                    division: row.get::<_, Option<String>>(17)?.unwrap_or_default(),
                    username: row.get::<_, Option<String>>(18)?.unwrap_or_default(),
                })
            },
        )
        .optional();

    match details {
        Ok(Some(d)) => ok(&req.id, json!(d)),
        Ok(None) => err(&req.id, "not_found", "student not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.create" => Some(handle_students_create(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        "students.details" => Some(handle_students_details(state, req)),
        _ => None,
    }
}
