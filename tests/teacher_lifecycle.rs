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
fn teacher_create_update_conflict_delete_flow() {
    let workspace = temp_dir("rosterd-teacher-lifecycle");
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
        json!({ "code": "SVM02", "name": "Shanti Vidya Mandir" }),
    );
    let school_id = school.get("schoolId").and_then(|v| v.as_i64()).expect("schoolId");

    let no_school = request(
        &mut stdin,
        &mut reader,
        "3",
        "teachers.create",
        json!({ "name": "Ravi Kumar" }),
    );
    assert_eq!(error_code(&no_school), "bad_params");

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "teachers.create",
        json!({
            "schoolId": school_id,
            "name": "Ravi Kumar",
            "dateOfBirth": "1988-03-21",
            "email": "ravi@example.com",
            "mobileNo": 9123456789i64,
            "whatsappNo": 9123456789i64
        }),
    );
    let teacher_id = created
        .get("teacherId")
        .and_then(|v| v.as_i64())
        .expect("teacherId");
    assert_eq!(created.get("username").and_then(|v| v.as_str()), Some("ravi9123"));
    assert_eq!(created.get("password").and_then(|v| v.as_str()), Some("1111"));

    let details = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "teachers.details",
        json!({ "teacherId": teacher_id }),
    );
    assert_eq!(
        details.get("teacherName").and_then(|v| v.as_str()),
        Some("Ravi Kumar")
    );
    assert_eq!(
        details.get("school").and_then(|v| v.as_str()),
        Some("Shanti Vidya Mandir")
    );
    assert_eq!(details.get("username").and_then(|v| v.as_str()), Some("ravi9123"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "teachers.update",
        json!({
            "teacherId": teacher_id,
            "name": "Ravi Kumar",
            "email": "ravi.kumar@example.com",
            "city": "Nashik",
            "mobileNo": 9123456789i64
        }),
    );
    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "teachers.details",
        json!({ "teacherId": teacher_id }),
    );
    assert_eq!(
        updated.get("email").and_then(|v| v.as_str()),
        Some("ravi.kumar@example.com")
    );
    assert_eq!(updated.get("city").and_then(|v| v.as_str()), Some("Nashik"));

    // Colliding derived username rolls the whole create back.
    let conflict = request(
        &mut stdin,
        &mut reader,
        "8",
        "teachers.create",
        json!({
            "schoolId": school_id,
            "name": "Ravindra Patil",
            "mobileNo": 9123998877i64
        }),
    );
    assert_eq!(error_code(&conflict), "username_conflict");
    let list = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "teachers.list",
        json!({ "page": 1 }),
    );
    assert_eq!(list.get("totalCount").and_then(|v| v.as_i64()), Some(1));

    let stats = request_ok(&mut stdin, &mut reader, "10", "dashboard.stats", json!({}));
    assert_eq!(stats.get("totalTeachers").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(stats.get("totalStudents").and_then(|v| v.as_i64()), Some(0));
    assert_eq!(stats.get("totalSchools").and_then(|v| v.as_i64()), Some(1));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "teachers.delete",
        json!({ "teacherId": teacher_id }),
    );
    let after_delete = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "teachers.list",
        json!({ "page": 1 }),
    );
    assert_eq!(after_delete.get("totalCount").and_then(|v| v.as_i64()), Some(0));

    // Credential went with the teacher, so the colliding name is accepted now.
    let recreated = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "teachers.create",
        json!({
            "schoolId": school_id,
            "name": "Ravindra Patil",
            "mobileNo": 9123998877i64
        }),
    );
    assert_eq!(
        recreated.get("username").and_then(|v| v.as_str()),
        Some("ravi9123")
    );
}

#[test]
fn school_delete_cascades_teachers_and_credentials() {
    let workspace = temp_dir("rosterd-school-cascade");
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
        json!({ "code": "CAS01", "name": "Cascade School" }),
    );
    let school_id = school.get("schoolId").and_then(|v| v.as_i64()).expect("schoolId");

    let dup_code = request(
        &mut stdin,
        &mut reader,
        "3",
        "schools.create",
        json!({ "code": "CAS01", "name": "Copycat School" }),
    );
    assert_eq!(error_code(&dup_code), "school_code_conflict");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "teachers.create",
        json!({ "schoolId": school_id, "name": "Meena Joshi", "mobileNo": 9001122334i64 }),
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "schools.delete",
        json!({ "schoolId": school_id }),
    );

    let stats = request_ok(&mut stdin, &mut reader, "6", "dashboard.stats", json!({}));
    assert_eq!(stats.get("totalSchools").and_then(|v| v.as_i64()), Some(0));
    assert_eq!(stats.get("totalTeachers").and_then(|v| v.as_i64()), Some(0));

    // Orphan-free: the cascade freed the teacher's username too.
    let school2 = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "schools.create",
        json!({ "code": "CAS02", "name": "Cascade School II" }),
    );
    let school2_id = school2.get("schoolId").and_then(|v| v.as_i64()).expect("schoolId");
    let recreated = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "teachers.create",
        json!({ "schoolId": school2_id, "name": "Meena Joshi", "mobileNo": 9001122334i64 }),
    );
    assert_eq!(
        recreated.get("username").and_then(|v| v.as_str()),
        Some("meen9001")
    );
}
