use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_rosterd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn rosterd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false));
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .expect("error code")
}

#[test]
fn student_create_details_update_conflict_delete_flow() {
    let workspace = temp_dir("rosterd-student-lifecycle");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let school = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "schools.create",
        json!({ "code": "GHS01", "name": "Green Hill School", "city": "Pune" }),
    );
    let school_id = school.get("schoolId").and_then(|v| v.as_i64()).expect("schoolId");
    let standard = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "standards.create",
        json!({ "name": "5th" }),
    );
    let standard_id = standard
        .get("standardId")
        .and_then(|v| v.as_i64())
        .expect("standardId");
    let division = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "divisions.create",
        json!({ "name": "A" }),
    );
    let division_id = division
        .get("divisionId")
        .and_then(|v| v.as_i64())
        .expect("divisionId");

    // Missing required selections never persist anything.
    let no_standard = request(
        &mut stdin,
        &mut reader,
        "5",
        "students.create",
        json!({ "schoolId": school_id, "divisionId": division_id, "name": "Anjali Sharma" }),
    );
    assert_eq!(error_code(&no_standard), "bad_params");

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "students.create",
        json!({
            "schoolId": school_id,
            "standardId": standard_id,
            "divisionId": division_id,
            "name": "Anjali Sharma",
            "admissionNo": 1042,
            "dateOfBirth": "14/06/2011",
            "email": "anjali@example.com",
            "fatherName": "Suresh Sharma",
            "fatherNumber": 9876543210i64
        }),
    );
    let student_id = created
        .get("studentId")
        .and_then(|v| v.as_i64())
        .expect("studentId");
    assert_eq!(created.get("username").and_then(|v| v.as_str()), Some("anja9876"));
    assert_eq!(created.get("password").and_then(|v| v.as_str()), Some("1111"));

    let details = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "students.details",
        json!({ "studentId": student_id }),
    );
    assert_eq!(
        details.get("studentName").and_then(|v| v.as_str()),
        Some("Anjali Sharma")
    );
    assert_eq!(details.get("username").and_then(|v| v.as_str()), Some("anja9876"));
    assert_eq!(details.get("school").and_then(|v| v.as_str()), Some("Green Hill School"));
    assert_eq!(details.get("standard").and_then(|v| v.as_str()), Some("5th"));
    assert_eq!(details.get("division").and_then(|v| v.as_str()), Some("A"));
    // Day-first form input is stored ISO.
    assert_eq!(details.get("dob").and_then(|v| v.as_str()), Some("2011-06-14"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "students.update",
        json!({
            "studentId": student_id,
            "name": "Anjali S. Sharma",
            "admissionNo": 1042,
            "email": "anjali.sharma@example.com",
            "city": "Pune"
        }),
    );
    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "students.details",
        json!({ "studentId": student_id }),
    );
    assert_eq!(
        updated.get("studentName").and_then(|v| v.as_str()),
        Some("Anjali S. Sharma")
    );
    assert_eq!(
        updated.get("email").and_then(|v| v.as_str()),
        Some("anjali.sharma@example.com")
    );
    // Relationships are fixed at creation; the edit path cannot move them.
    assert_eq!(updated.get("standard").and_then(|v| v.as_str()), Some("5th"));
    assert_eq!(updated.get("division").and_then(|v| v.as_str()), Some("A"));

    // Same name and father number derive the same username; the whole create
    // rolls back, so no entity row is left behind.
    let conflict = request(
        &mut stdin,
        &mut reader,
        "10",
        "students.create",
        json!({
            "schoolId": school_id,
            "standardId": standard_id,
            "divisionId": division_id,
            "name": "Anjana Verma",
            "fatherNumber": 9876501234i64
        }),
    );
    assert_eq!(error_code(&conflict), "username_conflict");
    let list = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "students.list",
        json!({ "page": 1 }),
    );
    assert_eq!(list.get("totalCount").and_then(|v| v.as_i64()), Some(1));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "students.delete",
        json!({ "studentId": student_id }),
    );
    let after_delete = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "students.list",
        json!({ "page": 1 }),
    );
    assert_eq!(after_delete.get("totalCount").and_then(|v| v.as_i64()), Some(0));

    // The delete took the credential row with it, so the username is free
    // again and the rejected create now goes through.
    let recreated = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "students.create",
        json!({
            "schoolId": school_id,
            "standardId": standard_id,
            "divisionId": division_id,
            "name": "Anjana Verma",
            "fatherNumber": 9876501234i64
        }),
    );
    assert_eq!(
        recreated.get("username").and_then(|v| v.as_str()),
        Some("anja9876")
    );

    let missing = request(
        &mut stdin,
        &mut reader,
        "15",
        "students.delete",
        json!({ "studentId": 9999 }),
    );
    assert_eq!(error_code(&missing), "not_found");
}

#[test]
fn standard_delete_cascades_students_and_credentials() {
    let workspace = temp_dir("rosterd-standard-cascade");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let school = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "schools.create",
        json!({ "code": "STD01", "name": "Standard School" }),
    );
    let school_id = school.get("schoolId").and_then(|v| v.as_i64()).expect("schoolId");
    let standard = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "standards.create",
        json!({ "name": "10th" }),
    );
    let standard_id = standard
        .get("standardId")
        .and_then(|v| v.as_i64())
        .expect("standardId");
    let division = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "divisions.create",
        json!({ "name": "A" }),
    );
    let division_id = division
        .get("divisionId")
        .and_then(|v| v.as_i64())
        .expect("divisionId");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "students.create",
        json!({
            "schoolId": school_id,
            "standardId": standard_id,
            "divisionId": division_id,
            "name": "Lata Gokhale",
            "fatherNumber": 9555512345i64
        }),
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "standards.delete",
        json!({ "standardId": standard_id }),
    );
    let list = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "students.list",
        json!({ "page": 1 }),
    );
    assert_eq!(list.get("totalCount").and_then(|v| v.as_i64()), Some(0));

    // The cascade removed the credential too: the same derivation is free.
    let standard2 = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "standards.create",
        json!({ "name": "10th" }),
    );
    let standard2_id = standard2
        .get("standardId")
        .and_then(|v| v.as_i64())
        .expect("standardId");
    let recreated = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "students.create",
        json!({
            "schoolId": school_id,
            "standardId": standard2_id,
            "divisionId": division_id,
            "name": "Lata Gokhale",
            "fatherNumber": 9555512345i64
        }),
    );
    assert_eq!(
        recreated.get("username").and_then(|v| v.as_str()),
        Some("lata9555")
    );
}

#[test]
fn operations_without_a_workspace_are_rejected() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "students.list",
        json!({ "page": 1 }),
    );
    assert_eq!(error_code(&resp), "no_workspace");
}
