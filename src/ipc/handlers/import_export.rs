//! Bulk spreadsheet import and document export for students and teachers.
//!
//! Imports are row-tolerant: each worksheet row is parsed, resolved, and
//! committed on its own, and a failure skips that row only. Exports fetch the
//! full filtered set and write a date-stamped file under the workspace (or a
//! caller-supplied directory), returning the path.

use crate::identity::{self, CollisionPolicy};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_conn, display_date, now_timestamp, opt_i64, opt_str, required_str, school_filter,
};
use crate::ipc::types::{AppState, Request};
use crate::pdf;
use crate::xlsx::{self, Cell};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::path::{Path, PathBuf};

const STUDENT_TEMPLATE_COLUMNS: [&str; 16] = [
    "Name",
    "AdmissionNo",
    "StandardName",
    "DivisionName",
    "DOB",
    "Email",
    "Address",
    "City",
    "District",
    "State",
    "FatherName",
    "FatherNumber",
    "FatherWhatsapp",
    "MotherName",
    "MotherNumber",
    "MotherWhatsapp",
];

const TEACHER_TEMPLATE_COLUMNS: [&str; 9] = [
    "Name", "Email", "DOB", "Address", "City", "District", "State", "MobileNo", "WhatsappNo",
];

enum RowOutcome {
    Imported { username: String },
    Skipped(String),
}

fn handle_students_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let school_id = match opt_i64(req, "schoolId") {
        Some(v) if v > 0 => v,
        _ => return err(&req.id, "bad_params", "please select a school", None),
    };
    let file_path = match required_str(req, "filePath") {
        Ok(v) => PathBuf::from(v),
        Err(e) => return e,
    };
    let policy = match CollisionPolicy::parse(opt_str(req, "onCollision").as_deref()) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
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

    let rows = match xlsx::read_workbook(&file_path) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "import_read_failed",
                format!("{e:#}"),
                Some(json!({ "filePath": file_path.to_string_lossy() })),
            )
        }
    };

    let mut imported = 0usize;
    let mut skipped = 0usize;
    // Header row first; every data row stands or falls alone.
    for (idx, row) in rows.iter().enumerate().skip(1) {
        let row_no = idx + 1;
        match import_student_row(conn, school_id, &school_code, policy, row) {
            Ok(RowOutcome::Imported { username }) => {
                imported += 1;
                tracing::info!(row = row_no, username = %username, "student row imported");
            }
            Ok(RowOutcome::Skipped(reason)) => {
                skipped += 1;
                tracing::warn!(row = row_no, reason = %reason, "student row skipped");
            }
            Err(e) => {
                skipped += 1;
                tracing::warn!(row = row_no, error = %format!("{e:#}"), "student row failed");
            }
        }
    }

    let message = if imported > 0 {
        format!("{} students imported successfully!", imported)
    } else {
        "No students were imported. Please check the file format and data.".to_string()
    };
    ok(
        &req.id,
        json!({ "imported": imported, "skipped": skipped, "message": message }),
    )
}

fn import_student_row(
    conn: &Connection,
    school_id: i64,
    school_code: &str,
    policy: CollisionPolicy,
    row: &[Cell],
) -> anyhow::Result<RowOutcome> {
    let cell = |i: usize| row.get(i).cloned().unwrap_or(Cell::Empty);

    let name = cell(0).text().trim().to_string();
    let admission_no = cell(1).integer();
    let standard_id = lookup_id(conn, "standards", cell(2).text().trim())?;
    let division_id = lookup_id(conn, "divisions", cell(3).text().trim())?;
    if standard_id == 0 || division_id == 0 {
        return Ok(RowOutcome::Skipped("unresolved standard or division".into()));
    }
    let dob = cell(4).date().map(|d| d.format("%Y-%m-%d").to_string());
    let father_number = cell(11).integer();

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO students(school_id, standard_id, division_id, name, admission_no,
                              date_of_birth, email, address, city, district, state,
                              father_name, father_number, father_whatsapp,
                              mother_name, mother_number, mother_whatsapp)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            school_id,
            standard_id,
            division_id,
            name,
            admission_no,
            dob,
            nonempty(cell(5).text()),
            nonempty(cell(6).text()),
            nonempty(cell(7).text()),
            nonempty(cell(8).text()),
            nonempty(cell(9).text()),
            nonempty(cell(10).text()),
            father_number,
            cell(12).integer(),
            nonempty(cell(13).text()),
            cell(14).integer(),
            cell(15).integer(),
        ],
    )?;
    let student_id = tx.last_insert_rowid();

    let phone = father_number
        .map(|n| n.to_string())
        .unwrap_or_else(|| "0000".to_string());
    let mut username = identity::derive_username(&name, &phone);

    let taken: Option<i64> = tx
        .query_row(
            "SELECT 1 FROM school_users WHERE username = ?",
            [&username],
            |r| r.get(0),
        )
        .optional()?;
    if taken.is_some() {
        match policy {
            CollisionPolicy::Skip => {
                tx.rollback()?;
                return Ok(RowOutcome::Skipped(format!(
                    "duplicate username '{}'",
                    username
                )));
            }
            CollisionPolicy::Disambiguate => {
                username = format!("{}{}", username, student_id);
            }
        }
    }

    tx.execute(
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
    )?;
    tx.commit()?;

    Ok(RowOutcome::Imported { username })
}

fn handle_teachers_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let school_id = match opt_i64(req, "schoolId") {
        Some(v) if v > 0 => v,
        _ => return err(&req.id, "bad_params", "please select a school", None),
    };
    let file_path = match required_str(req, "filePath") {
        Ok(v) => PathBuf::from(v),
        Err(e) => return e,
    };
    let policy = match CollisionPolicy::parse(opt_str(req, "onCollision").as_deref()) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
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

    let rows = match xlsx::read_workbook(&file_path) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "import_read_failed",
                format!("{e:#}"),
                Some(json!({ "filePath": file_path.to_string_lossy() })),
            )
        }
    };

    let mut imported = 0usize;
    let mut skipped = 0usize;
    for (idx, row) in rows.iter().enumerate().skip(1) {
        let row_no = idx + 1;
        match import_teacher_row(conn, school_id, &school_code, policy, row) {
            Ok(RowOutcome::Imported { username }) => {
                imported += 1;
                tracing::info!(row = row_no, username = %username, "teacher row imported");
            }
            Ok(RowOutcome::Skipped(reason)) => {
                skipped += 1;
                tracing::warn!(row = row_no, reason = %reason, "teacher row skipped");
            }
            Err(e) => {
                skipped += 1;
                tracing::warn!(row = row_no, error = %format!("{e:#}"), "teacher row failed");
            }
        }
    }

    let message = if imported > 0 {
        format!(
            "{} teachers imported successfully! Each teacher has been assigned a username and password ({}).",
            imported,
            identity::DEFAULT_PASSWORD
        )
    } else {
        "No teachers were imported. Please check the file format and data.".to_string()
    };
    ok(
        &req.id,
        json!({ "imported": imported, "skipped": skipped, "message": message }),
    )
}

fn import_teacher_row(
    conn: &Connection,
    school_id: i64,
    school_code: &str,
    policy: CollisionPolicy,
    row: &[Cell],
) -> anyhow::Result<RowOutcome> {
    let cell = |i: usize| row.get(i).cloned().unwrap_or(Cell::Empty);

    let name = cell(0).text().trim().to_string();
    let dob = cell(2).date().map(|d| d.format("%Y-%m-%d").to_string());
    let mobile_no = cell(7).integer();

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO teachers(school_id, name, date_of_birth, email, address,
                              city, district, state, mobile_no, whatsapp_no)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            school_id,
            name,
            dob,
            nonempty(cell(1).text()),
            nonempty(cell(3).text()),
            nonempty(cell(4).text()),
            nonempty(cell(5).text()),
            nonempty(cell(6).text()),
            mobile_no,
            cell(8).integer(),
        ],
    )?;
    let teacher_id = tx.last_insert_rowid();

    let phone = mobile_no
        .map(|n| n.to_string())
        .unwrap_or_else(|| "0000".to_string());
    let mut username = identity::derive_username(&name, &phone);

    let taken: Option<i64> = tx
        .query_row(
            "SELECT 1 FROM school_users WHERE username = ?",
            [&username],
            |r| r.get(0),
        )
        .optional()?;
    if taken.is_some() {
        match policy {
            CollisionPolicy::Skip => {
                tx.rollback()?;
                return Ok(RowOutcome::Skipped(format!(
                    "duplicate username '{}'",
                    username
                )));
            }
            CollisionPolicy::Disambiguate => {
                username = format!("{}{}", username, teacher_id);
            }
        }
    }

    tx.execute(
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
    )?;
    tx.commit()?;

    Ok(RowOutcome::Imported { username })
}

fn lookup_id(conn: &Connection, table: &str, name: &str) -> anyhow::Result<i64> {
    if name.is_empty() {
        return Ok(0);
    }
    let sql = format!("SELECT id FROM {} WHERE name = ?", table);
    let id: Option<i64> = conn.query_row(&sql, [name], |r| r.get(0)).optional()?;
    Ok(id.unwrap_or(0))
}

fn nonempty(s: String) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

struct StudentExportRow {
    name: String,
    username: String,
    admission_no: Option<i64>,
    school: String,
    standard: String,
    division: String,
    dob: String,
    email: String,
    address: String,
    city: String,
    district: String,
    state: String,
    father_name: String,
    father_number: Option<i64>,
    mother_name: String,
    mother_number: Option<i64>,
}

fn fetch_student_export_rows(
    conn: &Connection,
    school_id: Option<i64>,
) -> Result<Vec<StudentExportRow>, rusqlite::Error> {
    let where_sql = if school_id.is_some() {
        " WHERE s.school_id = ?"
    } else {
        ""
    };
    let sql = format!(
        "SELECT s.name, s.admission_no, s.date_of_birth, s.email, s.address,
                s.city, s.district, s.state, s.father_name, s.father_number,
                s.mother_name, s.mother_number,
                sc.name, st.name, d.name, su.username
         FROM students s
         LEFT JOIN schools sc ON sc.id = s.school_id
         LEFT JOIN standards st ON st.id = s.standard_id
         LEFT JOIN divisions d ON d.id = s.division_id
         LEFT JOIN school_users su ON su.student_id = s.id
         {}
         ORDER BY s.id",
        where_sql
    );
    let mut stmt = conn.prepare(&sql)?;
    let map_row = |row: &rusqlite::Row<'_>| {
        let dob: Option<String> = row.get(2)?;
        Ok(StudentExportRow {
            name: row.get(0)?,
            admission_no: row.get(1)?,
            dob: display_date(dob.as_deref()),
            email: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            address: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            city: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            district: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
            state: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
            father_name: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
            father_number: row.get(9)?,
            mother_name: row.get::<_, Option<String>>(10)?.unwrap_or_default(),
            mother_number: row.get(11)?,
            school: row.get::<_, Option<String>>(12)?.unwrap_or_default(),
            standard: row.get::<_, Option<String>>(13)?.unwrap_or_default(),
            division: row.get::<_, Option<String>>(14)?.unwrap_or_default(),
            username: row.get::<_, Option<String>>(15)?.unwrap_or_default(),
        })
    };
    let rows = if let Some(sid) = school_id {
        stmt.query_map([sid], map_row)?
            .collect::<Result<Vec<_>, _>>()?
    } else {
        stmt.query_map([], map_row)?
            .collect::<Result<Vec<_>, _>>()?
    };
    Ok(rows)
}

fn handle_students_export_excel(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let out_dir = match resolve_out_dir(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let students = match fetch_student_export_rows(conn, school_filter(req)) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "export_failed", e.to_string(), None),
    };

    let mut wb = xlsx::Workbook::new("Students");
    wb.header(&[
        "Sr No.",
        "Student Name",
        "Username",
        "Admission No.",
        "School",
        "Standard",
        "Division",
        "DOB",
        "Email",
        "Address",
        "City",
        "District",
        "State",
        "Father Name",
        "Father Mobile",
        "Mother Name",
        "Mother Mobile",
    ]);
    for (i, s) in students.iter().enumerate() {
        wb.push_row(vec![
            Cell::Number((i + 1) as f64),
            Cell::Text(s.name.clone()),
            Cell::Text(s.username.clone()),
            number_or_empty(s.admission_no),
            Cell::Text(s.school.clone()),
            Cell::Text(s.standard.clone()),
            Cell::Text(s.division.clone()),
            Cell::Text(s.dob.clone()),
            Cell::Text(s.email.clone()),
            Cell::Text(s.address.clone()),
            Cell::Text(s.city.clone()),
            Cell::Text(s.district.clone()),
            Cell::Text(s.state.clone()),
            Cell::Text(s.father_name.clone()),
            number_or_empty(s.father_number),
            Cell::Text(s.mother_name.clone()),
            number_or_empty(s.mother_number),
        ]);
    }

    let file_name = stamped_file_name("Students", "xlsx");
    let path = out_dir.join(&file_name);
    if let Err(e) = wb.save(&path) {
        return err(&req.id, "export_failed", format!("{e:#}"), None);
    }

    tracing::info!(count = students.len(), path = %path.to_string_lossy(), "exported students to excel");
    ok(
        &req.id,
        json!({
            "path": path.to_string_lossy(),
            "fileName": file_name,
            "count": students.len()
        }),
    )
}

fn handle_students_export_pdf(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let out_dir = match resolve_out_dir(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let students = match fetch_student_export_rows(conn, school_filter(req)) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "export_failed", e.to_string(), None),
    };

    let report = pdf::TableReport {
        title: "Student List Report".to_string(),
        generated_on: chrono::Local::now()
            .format("%d/%m/%Y %H:%M:%S")
            .to_string(),
        headers: vec![
            "Sr No.".into(),
            "Student Name".into(),
            "Username".into(),
            "Admission No.".into(),
            "Standard".into(),
            "Division".into(),
            "Email".into(),
            "Father Mobile".into(),
            "Mother Mobile".into(),
        ],
        widths: vec![5.0, 15.0, 12.0, 12.0, 10.0, 10.0, 12.0, 12.0, 12.0],
        rows: students
            .iter()
            .enumerate()
            .map(|(i, s)| {
                vec![
                    (i + 1).to_string(),
                    s.name.clone(),
                    s.username.clone(),
                    s.admission_no.map(|n| n.to_string()).unwrap_or_default(),
                    s.standard.clone(),
                    s.division.clone(),
                    s.email.clone(),
                    s.father_number.map(|n| n.to_string()).unwrap_or_default(),
                    s.mother_number.map(|n| n.to_string()).unwrap_or_default(),
                ]
            })
            .collect(),
    };

    let file_name = stamped_file_name("Students", "pdf");
    let path = out_dir.join(&file_name);
    if let Err(e) = write_pdf(&report, &path) {
        return err(&req.id, "export_failed", format!("{e:#}"), None);
    }

    tracing::info!(count = students.len(), path = %path.to_string_lossy(), "exported students to pdf");
    ok(
        &req.id,
        json!({
            "path": path.to_string_lossy(),
            "fileName": file_name,
            "count": students.len()
        }),
    )
}

fn handle_students_export_template(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = db_conn(state, req) {
        return e;
    }
    let out_dir = match resolve_out_dir(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let mut wb = xlsx::Workbook::new("StudentsTemplate");
    wb.header(&STUDENT_TEMPLATE_COLUMNS);

    let file_name = "StudentsTemplate.xlsx".to_string();
    let path = out_dir.join(&file_name);
    if let Err(e) = wb.save(&path) {
        return err(&req.id, "export_failed", format!("{e:#}"), None);
    }

    ok(
        &req.id,
        json!({ "path": path.to_string_lossy(), "fileName": file_name }),
    )
}

struct TeacherExportRow {
    name: String,
    username: String,
    school: String,
    dob: String,
    email: String,
    address: String,
    city: String,
    district: String,
    state: String,
    mobile_no: Option<i64>,
    whatsapp_no: Option<i64>,
}

fn fetch_teacher_export_rows(
    conn: &Connection,
    school_id: Option<i64>,
) -> Result<Vec<TeacherExportRow>, rusqlite::Error> {
    let where_sql = if school_id.is_some() {
        " WHERE t.school_id = ?"
    } else {
        ""
    };
    let sql = format!(
        "SELECT t.name, t.date_of_birth, t.email, t.address, t.city, t.district,
                t.state, t.mobile_no, t.whatsapp_no, sc.name, su.username
         FROM teachers t
         LEFT JOIN schools sc ON sc.id = t.school_id
         LEFT JOIN school_users su ON su.teacher_id = t.id
         {}
         ORDER BY t.id",
        where_sql
    );
    let mut stmt = conn.prepare(&sql)?;
    let map_row = |row: &rusqlite::Row<'_>| {
        let dob: Option<String> = row.get(1)?;
        Ok(TeacherExportRow {
            name: row.get(0)?,
            dob: display_date(dob.as_deref()),
            email: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            address: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            city: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            district: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            state: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
            mobile_no: row.get(7)?,
            whatsapp_no: row.get(8)?,
            school: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
            username: row.get::<_, Option<String>>(10)?.unwrap_or_default(),
        })
    };
    let rows = if let Some(sid) = school_id {
        stmt.query_map([sid], map_row)?
            .collect::<Result<Vec<_>, _>>()?
    } else {
        stmt.query_map([], map_row)?
            .collect::<Result<Vec<_>, _>>()?
    };
    Ok(rows)
}

fn handle_teachers_export_excel(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let out_dir = match resolve_out_dir(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let teachers = match fetch_teacher_export_rows(conn, school_filter(req)) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "export_failed", e.to_string(), None),
    };

    let mut wb = xlsx::Workbook::new("Teachers");
    wb.header(&[
        "Sr No.",
        "Teacher Name",
        "Username",
        "School",
        "DOB",
        "Email",
        "Address",
        "City",
        "District",
        "State",
        "Mobile No.",
        "WhatsApp No.",
    ]);
    for (i, t) in teachers.iter().enumerate() {
        wb.push_row(vec![
            Cell::Number((i + 1) as f64),
            Cell::Text(t.name.clone()),
            Cell::Text(t.username.clone()),
            Cell::Text(t.school.clone()),
            Cell::Text(t.dob.clone()),
            Cell::Text(t.email.clone()),
            Cell::Text(t.address.clone()),
            Cell::Text(t.city.clone()),
            Cell::Text(t.district.clone()),
            Cell::Text(t.state.clone()),
            number_or_empty(t.mobile_no),
            number_or_empty(t.whatsapp_no),
        ]);
    }

    let file_name = stamped_file_name("Teachers", "xlsx");
    let path = out_dir.join(&file_name);
    if let Err(e) = wb.save(&path) {
        return err(&req.id, "export_failed", format!("{e:#}"), None);
    }

    tracing::info!(count = teachers.len(), path = %path.to_string_lossy(), "exported teachers to excel");
    ok(
        &req.id,
        json!({
            "path": path.to_string_lossy(),
            "fileName": file_name,
            "count": teachers.len()
        }),
    )
}

fn handle_teachers_export_pdf(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let out_dir = match resolve_out_dir(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let teachers = match fetch_teacher_export_rows(conn, school_filter(req)) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "export_failed", e.to_string(), None),
    };

    let report = pdf::TableReport {
        title: "Teacher List Report".to_string(),
        generated_on: chrono::Local::now()
            .format("%d/%m/%Y %H:%M:%S")
            .to_string(),
        headers: vec![
            "Sr No.".into(),
            "Teacher Name".into(),
            "Username".into(),
            "School".into(),
            "Email".into(),
            "Mobile".into(),
            "DOB".into(),
            "City".into(),
        ],
        widths: vec![5.0, 20.0, 12.0, 15.0, 10.0, 10.0, 12.0, 12.0],
        rows: teachers
            .iter()
            .enumerate()
            .map(|(i, t)| {
                vec![
                    (i + 1).to_string(),
                    t.name.clone(),
                    t.username.clone(),
                    t.school.clone(),
                    t.email.clone(),
                    t.mobile_no.map(|n| n.to_string()).unwrap_or_default(),
                    t.dob.clone(),
                    t.city.clone(),
                ]
            })
            .collect(),
    };

    let file_name = stamped_file_name("Teachers", "pdf");
    let path = out_dir.join(&file_name);
    if let Err(e) = write_pdf(&report, &path) {
        return err(&req.id, "export_failed", format!("{e:#}"), None);
    }

    tracing::info!(count = teachers.len(), path = %path.to_string_lossy(), "exported teachers to pdf");
    ok(
        &req.id,
        json!({
            "path": path.to_string_lossy(),
            "fileName": file_name,
            "count": teachers.len()
        }),
    )
}

fn handle_teachers_export_template(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = db_conn(state, req) {
        return e;
    }
    let out_dir = match resolve_out_dir(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let mut wb = xlsx::Workbook::new("TeachersTemplate");
    wb.header(&TEACHER_TEMPLATE_COLUMNS);

    let file_name = "TeachersTemplate.xlsx".to_string();
    let path = out_dir.join(&file_name);
    if let Err(e) = wb.save(&path) {
        return err(&req.id, "export_failed", format!("{e:#}"), None);
    }

    ok(
        &req.id,
        json!({ "path": path.to_string_lossy(), "fileName": file_name }),
    )
}

fn resolve_out_dir(state: &AppState, req: &Request) -> Result<PathBuf, serde_json::Value> {
    if let Some(dir) = opt_str(req, "outDir") {
        return Ok(PathBuf::from(dir));
    }
    state
        .workspace
        .as_ref()
        .map(|w| w.join("exports"))
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn stamped_file_name(prefix: &str, ext: &str) -> String {
    format!(
        "{}_{}.{}",
        prefix,
        chrono::Local::now().format("%d%m%Y"),
        ext
    )
}

fn number_or_empty(n: Option<i64>) -> Cell {
    n.map(|v| Cell::Number(v as f64)).unwrap_or(Cell::Empty)
}

fn write_pdf(report: &pdf::TableReport, path: &Path) -> anyhow::Result<()> {
    let bytes = pdf::render(report)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    Ok(())
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.import" => Some(handle_students_import(state, req)),
        "students.exportExcel" => Some(handle_students_export_excel(state, req)),
        "students.exportPdf" => Some(handle_students_export_pdf(state, req)),
        "students.exportTemplate" => Some(handle_students_export_template(state, req)),
        "teachers.import" => Some(handle_teachers_import(state, req)),
        "teachers.exportExcel" => Some(handle_teachers_export_excel(state, req)),
        "teachers.exportPdf" => Some(handle_teachers_export_pdf(state, req)),
        "teachers.exportTemplate" => Some(handle_teachers_export_template(state, req)),
        _ => None,
    }
}
