use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("eskola.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS school_years(
            id TEXT PRIMARY KEY,
            label TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            description TEXT,
            total_hours INTEGER
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            year INTEGER NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            weekly_slots INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY(course_id) REFERENCES courses(id),
            UNIQUE(course_id, year, name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subjects_course ON subjects(course_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            school_year_id TEXT NOT NULL,
            year INTEGER NOT NULL,
            period TEXT NOT NULL,
            room TEXT,
            label TEXT NOT NULL DEFAULT '',
            FOREIGN KEY(course_id) REFERENCES courses(id),
            FOREIGN KEY(school_year_id) REFERENCES school_years(id),
            UNIQUE(course_id, school_year_id, year, label)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classes_course ON classes(course_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classes_school_year ON classes(school_year_id)",
        [],
    )?;

    // A class_subjects row is a "pairing": one subject offered within one class.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_subjects(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            UNIQUE(class_id, subject_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_class_subjects_class ON class_subjects(class_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_class_subjects_subject ON class_subjects(subject_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT
        )",
        [],
    )?;

    // Validity interval: end_date IS NULL marks the currently open assignment.
    // The assign operation closes the open row before inserting a new one, so
    // at most one open assignment exists per pairing.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS teaching_assignments(
            id TEXT PRIMARY KEY,
            class_subject_id TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT,
            FOREIGN KEY(class_subject_id) REFERENCES class_subjects(id),
            FOREIGN KEY(teacher_id) REFERENCES teachers(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_teaching_assignments_pairing
         ON teaching_assignments(class_subject_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_teaching_assignments_teacher
         ON teaching_assignments(teacher_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schedule_entries(
            class_id TEXT NOT NULL,
            weekday INTEGER NOT NULL,
            slot INTEGER NOT NULL,
            class_subject_id TEXT NOT NULL,
            PRIMARY KEY(class_id, weekday, slot),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(class_subject_id) REFERENCES class_subjects(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_schedule_entries_pairing
         ON schedule_entries(class_subject_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_schedule_entries_day_slot
         ON schedule_entries(weekday, slot)",
        [],
    )?;

    Ok(conn)
}
