use crate::ipc::helpers::{required_str, run, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

fn teaching_open(conn: &Connection, params: &JsonValue) -> Result<JsonValue, HandlerErr> {
    let class_id = required_str(params, "classId")?;

    let class: Option<(String, i64)> = conn
        .query_row(
            "SELECT label, year FROM classes WHERE id = ?",
            [&class_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let Some((label, year)) = class else {
        return Err(HandlerErr::new("not_found", "class not found"));
    };

    let mut stmt = conn
        .prepare(
            "SELECT
               cs.id AS class_subject_id,
               s.name AS subject_name,
               t.id AS teacher_id,
               t.name AS teacher_name
             FROM class_subjects cs
             JOIN subjects s ON s.id = cs.subject_id
             LEFT JOIN teaching_assignments ta
               ON ta.class_subject_id = cs.id AND ta.end_date IS NULL
             LEFT JOIN teachers t ON t.id = ta.teacher_id
             WHERE cs.class_id = ?
             ORDER BY s.name",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let pairings = stmt
        .query_map([&class_id], |r| {
            let class_subject_id: String = r.get(0)?;
            let subject_name: String = r.get(1)?;
            let teacher_id: Option<String> = r.get(2)?;
            let teacher_name: Option<String> = r.get(3)?;
            Ok(json!({
                "classSubjectId": class_subject_id,
                "subjectName": subject_name,
                "teacherId": teacher_id,
                "teacherName": teacher_name
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    let mut teacher_stmt = conn
        .prepare("SELECT id, name FROM teachers ORDER BY name")
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let teachers = teacher_stmt
        .query_map([], |r| {
            let id: String = r.get(0)?;
            let name: String = r.get(1)?;
            Ok(json!({ "id": id, "name": name }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    let assigned = pairings
        .iter()
        .filter(|p| !p["teacherId"].is_null())
        .count();

    Ok(json!({
        "class": { "id": class_id, "label": label, "year": year },
        "pairings": pairings,
        "teachers": teachers,
        "totalSubjects": pairings.len(),
        "assignedSubjects": assigned
    }))
}

fn teaching_assign(conn: &Connection, params: &JsonValue) -> Result<JsonValue, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    let class_subject_id = required_str(params, "classSubjectId")?;
    let teacher_id = required_str(params, "teacherId")?;

    let pairing: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM class_subjects WHERE id = ? AND class_id = ?",
            (&class_subject_id, &class_id),
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if pairing.is_none() {
        return Err(HandlerErr::new(
            "not_in_class",
            "subject is not offered in this class",
        ));
    }

    let teacher: Option<i64> = conn
        .query_row("SELECT 1 FROM teachers WHERE id = ?", [&teacher_id], |r| {
            r.get(0)
        })
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if teacher.is_none() {
        return Err(HandlerErr::new("not_found", "teacher not found"));
    }

    let current: Option<String> = conn
        .query_row(
            "SELECT teacher_id FROM teaching_assignments
             WHERE class_subject_id = ? AND end_date IS NULL",
            [&class_subject_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if current.as_deref() == Some(teacher_id.as_str()) {
        return Err(HandlerErr::new(
            "already_assigned",
            "teacher is already assigned to this subject",
        ));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;

    // Close the open interval before starting the new one; history stays.
    tx.execute(
        "UPDATE teaching_assignments SET end_date = date('now')
         WHERE class_subject_id = ? AND end_date IS NULL",
        [&class_subject_id],
    )
    .map_err(|e| HandlerErr::db("db_update_failed", e))?;

    let assignment_id = Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO teaching_assignments(id, class_subject_id, teacher_id, start_date)
         VALUES(?, ?, ?, date('now'))",
        (&assignment_id, &class_subject_id, &teacher_id),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e))?;

    tx.commit().map_err(|e| HandlerErr::db("db_commit_failed", e))?;

    Ok(json!({ "assignmentId": assignment_id, "teacherId": teacher_id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "teaching.open" => Some(run(state, req, teaching_open)),
        "teaching.assign" => Some(run(state, req, teaching_assign)),
        _ => None,
    }
}
