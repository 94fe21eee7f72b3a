use crate::ipc::handlers::catalog::valid_class_year;
use crate::ipc::helpers::{bad_params, opt_str, required_i64, required_str, run, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::slots;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

/// Links every subject of the class's course and year that is not yet
/// offered in the class. Returns how many pairings were created.
fn link_course_subjects(
    conn: &Connection,
    class_id: &str,
    course_id: &str,
    year: i64,
) -> Result<i64, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT s.id
             FROM subjects s
             WHERE s.course_id = ? AND s.year = ?
               AND NOT EXISTS (
                 SELECT 1 FROM class_subjects cs
                 WHERE cs.class_id = ? AND cs.subject_id = s.id
               )",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let subject_ids = stmt
        .query_map((&course_id, &year, &class_id), |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    for subject_id in &subject_ids {
        let pairing_id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO class_subjects(id, class_id, subject_id) VALUES(?, ?, ?)",
            (&pairing_id, &class_id, subject_id),
        )
        .map_err(|e| HandlerErr::db("db_insert_failed", e))?;
    }

    Ok(subject_ids.len() as i64)
}

fn classes_create(conn: &Connection, params: &JsonValue) -> Result<JsonValue, HandlerErr> {
    let course_id = required_str(params, "courseId")?;
    let school_year_id = required_str(params, "schoolYearId")?;
    let year = required_i64(params, "year")?;
    let period = required_str(params, "period")?;
    let room = opt_str(params, "room");
    let label = opt_str(params, "label").unwrap_or_default();

    if !valid_class_year(year) {
        return Err(bad_params("year must be between 10 and 12"));
    }
    if !slots::valid_period(&period) {
        return Err(bad_params(
            "period must be one of: morning, afternoon, evening",
        ));
    }

    let course: Option<i64> = conn
        .query_row("SELECT 1 FROM courses WHERE id = ?", [&course_id], |r| {
            r.get(0)
        })
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if course.is_none() {
        return Err(HandlerErr::new("not_found", "course not found"));
    }

    let school_year: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM school_years WHERE id = ?",
            [&school_year_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if school_year.is_none() {
        return Err(HandlerErr::new("not_found", "school year not found"));
    }

    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM classes
             WHERE course_id = ? AND school_year_id = ? AND year = ? AND label = ?",
            (&course_id, &school_year_id, &year, &label),
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if existing.is_some() {
        return Err(HandlerErr::new("conflict", "class already exists"));
    }

    let class_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classes(id, course_id, school_year_id, year, period, room, label)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &class_id,
            &course_id,
            &school_year_id,
            &year,
            &period,
            &room,
            &label,
        ),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e))?;

    // New classes start with the course/year subjects already offered.
    let linked = link_course_subjects(conn, &class_id, &course_id, year)?;

    Ok(json!({ "classId": class_id, "linkedSubjects": linked }))
}

fn classes_list(conn: &Connection, _params: &JsonValue) -> Result<JsonValue, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT
               cl.id,
               cl.year,
               cl.period,
               cl.room,
               cl.label,
               c.name AS course_name,
               sy.label AS school_year,
               (SELECT COUNT(*) FROM class_subjects cs WHERE cs.class_id = cl.id) AS subject_count,
               (SELECT COUNT(*) FROM schedule_entries se WHERE se.class_id = cl.id) AS entry_count
             FROM classes cl
             JOIN courses c ON c.id = cl.course_id
             JOIN school_years sy ON sy.id = cl.school_year_id
             ORDER BY c.name, cl.year, sy.label DESC, cl.label",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let rows = stmt
        .query_map([], |r| {
            let id: String = r.get(0)?;
            let year: i64 = r.get(1)?;
            let period: String = r.get(2)?;
            let room: Option<String> = r.get(3)?;
            let label: String = r.get(4)?;
            let course_name: String = r.get(5)?;
            let school_year: String = r.get(6)?;
            let subject_count: i64 = r.get(7)?;
            let entry_count: i64 = r.get(8)?;
            Ok(json!({
                "id": id,
                "year": year,
                "period": period,
                "room": room,
                "label": label,
                "courseName": course_name,
                "schoolYear": school_year,
                "subjectCount": subject_count,
                "entryCount": entry_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    Ok(json!({ "classes": rows }))
}

fn classes_sync_subjects(conn: &Connection, params: &JsonValue) -> Result<JsonValue, HandlerErr> {
    let class_id = required_str(params, "classId")?;

    let class: Option<(String, i64)> = conn
        .query_row(
            "SELECT course_id, year FROM classes WHERE id = ?",
            [&class_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let Some((course_id, year)) = class else {
        return Err(HandlerErr::new("not_found", "class not found"));
    };

    let linked = link_course_subjects(conn, &class_id, &course_id, year)?;

    Ok(json!({ "classId": class_id, "linkedSubjects": linked }))
}

fn classes_delete(conn: &Connection, params: &JsonValue) -> Result<JsonValue, HandlerErr> {
    let class_id = required_str(params, "classId")?;

    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM classes WHERE id = ?", [&class_id], |r| {
            r.get(0)
        })
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if exists.is_none() {
        return Err(HandlerErr::new("not_found", "class not found"));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;

    // Explicit dependency order; no ON DELETE CASCADE in the schema.
    tx.execute(
        "DELETE FROM schedule_entries WHERE class_id = ?",
        [&class_id],
    )
    .map_err(|e| HandlerErr::db("db_delete_failed", e))?;
    tx.execute(
        "DELETE FROM teaching_assignments
         WHERE class_subject_id IN (SELECT id FROM class_subjects WHERE class_id = ?)",
        [&class_id],
    )
    .map_err(|e| HandlerErr::db("db_delete_failed", e))?;
    tx.execute("DELETE FROM class_subjects WHERE class_id = ?", [&class_id])
        .map_err(|e| HandlerErr::db("db_delete_failed", e))?;
    tx.execute("DELETE FROM classes WHERE id = ?", [&class_id])
        .map_err(|e| HandlerErr::db("db_delete_failed", e))?;

    tx.commit().map_err(|e| HandlerErr::db("db_commit_failed", e))?;

    Ok(json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.create" => Some(run(state, req, classes_create)),
        "classes.list" => Some(run(state, req, classes_list)),
        "classes.syncSubjects" => Some(run(state, req, classes_sync_subjects)),
        "classes.delete" => Some(run(state, req, classes_delete)),
        _ => None,
    }
}
