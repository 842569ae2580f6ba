use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "asistencia.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS departments(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            is_operations INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS staff(
            id TEXT PRIMARY KEY,
            department_id TEXT,
            name TEXT NOT NULL,
            id_number TEXT,
            role TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY(department_id) REFERENCES departments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_staff_department ON staff(department_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sections(
            id TEXT PRIMARY KEY,
            department_id TEXT,
            name TEXT NOT NULL,
            FOREIGN KEY(department_id) REFERENCES departments(id)
        )",
        [],
    )?;
    // Early workspaces carried a free-text department name on sections. The
    // column migration runs once here; queries never branch on schema shape.
    ensure_sections_department_id(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sections_department ON sections(department_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            section_id TEXT NOT NULL,
            list_number INTEGER NOT NULL,
            name TEXT NOT NULL,
            gender TEXT NOT NULL,
            id_number TEXT,
            FOREIGN KEY(section_id) REFERENCES sections(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_section ON students(section_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_section_list ON students(section_id, list_number)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_blocks(
            id TEXT PRIMARY KEY,
            section_id TEXT NOT NULL,
            subject_id TEXT,
            teacher_id TEXT NOT NULL,
            weekday TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            description TEXT,
            FOREIGN KEY(section_id) REFERENCES sections(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            FOREIGN KEY(teacher_id) REFERENCES staff(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_class_blocks_section ON class_blocks(section_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_class_blocks_teacher ON class_blocks(teacher_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_class_blocks_weekday ON class_blocks(weekday)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_records(
            id TEXT PRIMARY KEY,
            block_id TEXT NOT NULL,
            date TEXT NOT NULL,
            topic TEXT NOT NULL,
            incident_notes TEXT,
            count_female INTEGER NOT NULL,
            count_male INTEGER NOT NULL,
            count_total INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(block_id) REFERENCES class_blocks(id),
            UNIQUE(block_id, date)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_records_date ON attendance_records(date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_records_block ON attendance_records(block_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS absence_entries(
            id TEXT PRIMARY KEY,
            record_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            note TEXT,
            FOREIGN KEY(record_id) REFERENCES attendance_records(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_absence_entries_record ON absence_entries(record_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_absence_entries_student ON absence_entries(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS personnel_attendance(
            id TEXT PRIMARY KEY,
            staff_id TEXT NOT NULL,
            recorder_id TEXT,
            date TEXT NOT NULL,
            present INTEGER NOT NULL,
            reason_code TEXT,
            note TEXT,
            FOREIGN KEY(staff_id) REFERENCES staff(id),
            UNIQUE(staff_id, date)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_personnel_attendance_date ON personnel_attendance(date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_personnel_attendance_staff ON personnel_attendance(staff_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

fn ensure_sections_department_id(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "sections", "department_id")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE sections ADD COLUMN department_id TEXT", [])?;

    // Old workspaces stored the department as free text in department_name.
    // Resolve each distinct name to a departments row once, then stop reading
    // the legacy column.
    if table_has_column(conn, "sections", "department_name")? {
        let mut stmt = conn.prepare(
            "SELECT DISTINCT department_name FROM sections
             WHERE department_name IS NOT NULL AND TRIM(department_name) != ''",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        for name in names {
            let trimmed = name.trim().to_string();
            let existing: Option<String> = conn
                .query_row(
                    "SELECT id FROM departments WHERE name = ?",
                    [&trimmed],
                    |r| r.get(0),
                )
                .optional()?;
            let dep_id = match existing {
                Some(id) => id,
                None => {
                    let id = uuid::Uuid::new_v4().to_string();
                    conn.execute(
                        "INSERT INTO departments(id, name, is_operations) VALUES(?, ?, 0)",
                        (&id, &trimmed),
                    )?;
                    id
                }
            };
            conn.execute(
                "UPDATE sections SET department_id = ? WHERE TRIM(department_name) = ?",
                (&dep_id, &trimmed),
            )?;
        }
    }
    Ok(())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    match raw {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    let text = serde_json::to_string(value)?;
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        (key, &text),
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
