use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("roster.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schools(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            address TEXT,
            city TEXT,
            district TEXT,
            state TEXT,
            office_number INTEGER,
            whatsapp_number INTEGER,
            email TEXT,
            contact_person TEXT,
            contact_number INTEGER,
            website TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS standards(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS divisions(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            school_id INTEGER NOT NULL,
            standard_id INTEGER NOT NULL,
            division_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            admission_no INTEGER,
            date_of_birth TEXT,
            email TEXT,
            address TEXT,
            city TEXT,
            district TEXT,
            state TEXT,
            father_name TEXT,
            father_number INTEGER,
            father_whatsapp INTEGER,
            mother_name TEXT,
            mother_number INTEGER,
            mother_whatsapp INTEGER,
            FOREIGN KEY(school_id) REFERENCES schools(id),
            FOREIGN KEY(standard_id) REFERENCES standards(id),
            FOREIGN KEY(division_id) REFERENCES divisions(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_school ON students(school_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_standard ON students(standard_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_division ON students(division_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            school_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            date_of_birth TEXT,
            email TEXT,
            address TEXT,
            city TEXT,
            district TEXT,
            state TEXT,
            mobile_no INTEGER,
            whatsapp_no INTEGER,
            FOREIGN KEY(school_id) REFERENCES schools(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_teachers_school ON teachers(school_id)",
        [],
    )?;

    // A credential row belongs to exactly one student or one teacher.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS school_users(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            school_id INTEGER NOT NULL,
            school_code TEXT NOT NULL,
            student_id INTEGER,
            teacher_id INTEGER,
            username TEXT NOT NULL UNIQUE,
            password TEXT NOT NULL,
            role TEXT NOT NULL,
            created_date TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES schools(id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(teacher_id) REFERENCES teachers(id),
            CHECK((student_id IS NULL) <> (teacher_id IS NULL))
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_school_users_school ON school_users(school_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_school_users_student ON school_users(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_school_users_teacher ON school_users(teacher_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS column_prefs(
            session_id TEXT NOT NULL,
            view TEXT NOT NULL,
            columns TEXT NOT NULL,
            PRIMARY KEY(session_id, view)
        )",
        [],
    )?;

    Ok(conn)
}
