use crate::ipc::helpers::{
    bad_params, opt_i64, opt_str, required_i64, required_str, run, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

const MIN_CLASS_YEAR: i64 = 10;
const MAX_CLASS_YEAR: i64 = 12;
const MIN_WEEKLY_SLOTS: i64 = 1;
const MAX_WEEKLY_SLOTS: i64 = 15;

pub fn valid_class_year(year: i64) -> bool {
    (MIN_CLASS_YEAR..=MAX_CLASS_YEAR).contains(&year)
}

fn school_years_create(conn: &Connection, params: &JsonValue) -> Result<JsonValue, HandlerErr> {
    let label = required_str(params, "label")?;

    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM school_years WHERE label = ?",
            [&label],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if existing.is_some() {
        return Err(HandlerErr::new("conflict", "school year already exists"));
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO school_years(id, label) VALUES(?, ?)",
        (&id, &label),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e))?;

    Ok(json!({ "schoolYearId": id, "label": label }))
}

fn school_years_list(conn: &Connection, _params: &JsonValue) -> Result<JsonValue, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT id, label FROM school_years ORDER BY label DESC")
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let rows = stmt
        .query_map([], |r| {
            let id: String = r.get(0)?;
            let label: String = r.get(1)?;
            Ok(json!({ "id": id, "label": label }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    Ok(json!({ "schoolYears": rows }))
}

fn courses_create(conn: &Connection, params: &JsonValue) -> Result<JsonValue, HandlerErr> {
    let name = required_str(params, "name")?;
    let description = opt_str(params, "description");
    let total_hours = opt_i64(params, "totalHours");

    let existing: Option<String> = conn
        .query_row("SELECT id FROM courses WHERE name = ?", [&name], |r| {
            r.get(0)
        })
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if existing.is_some() {
        return Err(HandlerErr::new("conflict", "course already exists"));
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO courses(id, name, description, total_hours) VALUES(?, ?, ?, ?)",
        (&id, &name, &description, &total_hours),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e))?;

    Ok(json!({ "courseId": id, "name": name }))
}

fn courses_list(conn: &Connection, _params: &JsonValue) -> Result<JsonValue, HandlerErr> {
    // Correlated subqueries keep the counts join-free.
    let mut stmt = conn
        .prepare(
            "SELECT
               c.id,
               c.name,
               c.description,
               c.total_hours,
               (SELECT COUNT(*) FROM subjects s WHERE s.course_id = c.id) AS subject_count,
               (SELECT COUNT(*) FROM classes cl WHERE cl.course_id = c.id) AS class_count
             FROM courses c
             ORDER BY c.name",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let rows = stmt
        .query_map([], |r| {
            let id: String = r.get(0)?;
            let name: String = r.get(1)?;
            let description: Option<String> = r.get(2)?;
            let total_hours: Option<i64> = r.get(3)?;
            let subject_count: i64 = r.get(4)?;
            let class_count: i64 = r.get(5)?;
            Ok(json!({
                "id": id,
                "name": name,
                "description": description,
                "totalHours": total_hours,
                "subjectCount": subject_count,
                "classCount": class_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    Ok(json!({ "courses": rows }))
}

fn courses_delete(conn: &Connection, params: &JsonValue) -> Result<JsonValue, HandlerErr> {
    let course_id = required_str(params, "courseId")?;

    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM courses WHERE id = ?", [&course_id], |r| {
            r.get(0)
        })
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if exists.is_none() {
        return Err(HandlerErr::new("not_found", "course not found"));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;

    // Explicit dependency order; no ON DELETE CASCADE in the schema.
    tx.execute(
        "DELETE FROM schedule_entries
         WHERE class_id IN (SELECT id FROM classes WHERE course_id = ?)",
        [&course_id],
    )
    .map_err(|e| HandlerErr::db("db_delete_failed", e))?;
    tx.execute(
        "DELETE FROM teaching_assignments
         WHERE class_subject_id IN (
           SELECT cs.id
           FROM class_subjects cs
           JOIN classes cl ON cl.id = cs.class_id
           WHERE cl.course_id = ?
         )",
        [&course_id],
    )
    .map_err(|e| HandlerErr::db("db_delete_failed", e))?;
    tx.execute(
        "DELETE FROM class_subjects
         WHERE class_id IN (SELECT id FROM classes WHERE course_id = ?)",
        [&course_id],
    )
    .map_err(|e| HandlerErr::db("db_delete_failed", e))?;
    tx.execute("DELETE FROM classes WHERE course_id = ?", [&course_id])
        .map_err(|e| HandlerErr::db("db_delete_failed", e))?;
    tx.execute("DELETE FROM subjects WHERE course_id = ?", [&course_id])
        .map_err(|e| HandlerErr::db("db_delete_failed", e))?;
    tx.execute("DELETE FROM courses WHERE id = ?", [&course_id])
        .map_err(|e| HandlerErr::db("db_delete_failed", e))?;

    tx.commit().map_err(|e| HandlerErr::db("db_commit_failed", e))?;

    Ok(json!({ "deleted": true }))
}

fn subjects_create(conn: &Connection, params: &JsonValue) -> Result<JsonValue, HandlerErr> {
    let course_id = required_str(params, "courseId")?;
    let year = required_i64(params, "year")?;
    let name = required_str(params, "name")?;
    let description = opt_str(params, "description");
    let weekly_slots = opt_i64(params, "weeklySlots").unwrap_or(MIN_WEEKLY_SLOTS);

    if !valid_class_year(year) {
        return Err(bad_params("year must be between 10 and 12"));
    }
    if !(MIN_WEEKLY_SLOTS..=MAX_WEEKLY_SLOTS).contains(&weekly_slots) {
        return Err(bad_params("weeklySlots must be between 1 and 15"));
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

    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM subjects WHERE course_id = ? AND year = ? AND name = ?",
            (&course_id, &year, &name),
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if existing.is_some() {
        return Err(HandlerErr::new(
            "conflict",
            "subject already exists for this course and year",
        ));
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO subjects(id, course_id, year, name, description, weekly_slots)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&id, &course_id, &year, &name, &description, &weekly_slots),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e))?;

    Ok(json!({ "subjectId": id, "name": name, "weeklySlots": weekly_slots }))
}

fn subjects_list(conn: &Connection, _params: &JsonValue) -> Result<JsonValue, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT s.id, s.year, s.name, s.description, s.weekly_slots, c.name AS course_name
             FROM subjects s
             JOIN courses c ON c.id = s.course_id
             ORDER BY c.name, s.year, s.name",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let rows = stmt
        .query_map([], |r| {
            let id: String = r.get(0)?;
            let year: i64 = r.get(1)?;
            let name: String = r.get(2)?;
            let description: Option<String> = r.get(3)?;
            let weekly_slots: i64 = r.get(4)?;
            let course_name: String = r.get(5)?;
            Ok(json!({
                "id": id,
                "year": year,
                "name": name,
                "description": description,
                "weeklySlots": weekly_slots,
                "courseName": course_name
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    Ok(json!({ "subjects": rows }))
}

fn subjects_set_weekly_slots(conn: &Connection, params: &JsonValue) -> Result<JsonValue, HandlerErr> {
    let subject_id = required_str(params, "subjectId")?;
    let weekly_slots = required_i64(params, "weeklySlots")?;

    if !(MIN_WEEKLY_SLOTS..=MAX_WEEKLY_SLOTS).contains(&weekly_slots) {
        return Err(bad_params("weeklySlots must be between 1 and 15"));
    }

    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM subjects WHERE id = ?", [&subject_id], |r| {
            r.get(0)
        })
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if exists.is_none() {
        return Err(HandlerErr::new("not_found", "subject not found"));
    }

    conn.execute(
        "UPDATE subjects SET weekly_slots = ? WHERE id = ?",
        (&weekly_slots, &subject_id),
    )
    .map_err(|e| HandlerErr::db("db_update_failed", e))?;

    Ok(json!({ "subjectId": subject_id, "weeklySlots": weekly_slots }))
}

fn subjects_delete(conn: &Connection, params: &JsonValue) -> Result<JsonValue, HandlerErr> {
    let subject_id = required_str(params, "subjectId")?;

    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM subjects WHERE id = ?", [&subject_id], |r| {
            r.get(0)
        })
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if exists.is_none() {
        return Err(HandlerErr::new("not_found", "subject not found"));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;

    tx.execute(
        "DELETE FROM schedule_entries
         WHERE class_subject_id IN (SELECT id FROM class_subjects WHERE subject_id = ?)",
        [&subject_id],
    )
    .map_err(|e| HandlerErr::db("db_delete_failed", e))?;
    tx.execute(
        "DELETE FROM teaching_assignments
         WHERE class_subject_id IN (SELECT id FROM class_subjects WHERE subject_id = ?)",
        [&subject_id],
    )
    .map_err(|e| HandlerErr::db("db_delete_failed", e))?;
    tx.execute(
        "DELETE FROM class_subjects WHERE subject_id = ?",
        [&subject_id],
    )
    .map_err(|e| HandlerErr::db("db_delete_failed", e))?;
    tx.execute("DELETE FROM subjects WHERE id = ?", [&subject_id])
        .map_err(|e| HandlerErr::db("db_delete_failed", e))?;

    tx.commit().map_err(|e| HandlerErr::db("db_commit_failed", e))?;

    Ok(json!({ "deleted": true }))
}

fn teachers_create(conn: &Connection, params: &JsonValue) -> Result<JsonValue, HandlerErr> {
    let name = required_str(params, "name")?;
    let email = opt_str(params, "email");

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO teachers(id, name, email) VALUES(?, ?, ?)",
        (&id, &name, &email),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e))?;

    Ok(json!({ "teacherId": id, "name": name }))
}

fn teachers_list(conn: &Connection, _params: &JsonValue) -> Result<JsonValue, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT
               t.id,
               t.name,
               t.email,
               (SELECT COUNT(*) FROM teaching_assignments ta
                WHERE ta.teacher_id = t.id AND ta.end_date IS NULL) AS open_assignments
             FROM teachers t
             ORDER BY t.name",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let rows = stmt
        .query_map([], |r| {
            let id: String = r.get(0)?;
            let name: String = r.get(1)?;
            let email: Option<String> = r.get(2)?;
            let open_assignments: i64 = r.get(3)?;
            Ok(json!({
                "id": id,
                "name": name,
                "email": email,
                "openAssignments": open_assignments
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    Ok(json!({ "teachers": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schoolYears.create" => Some(run(state, req, school_years_create)),
        "schoolYears.list" => Some(run(state, req, school_years_list)),
        "courses.create" => Some(run(state, req, courses_create)),
        "courses.list" => Some(run(state, req, courses_list)),
        "courses.delete" => Some(run(state, req, courses_delete)),
        "subjects.create" => Some(run(state, req, subjects_create)),
        "subjects.list" => Some(run(state, req, subjects_list)),
        "subjects.setWeeklySlots" => Some(run(state, req, subjects_set_weekly_slots)),
        "subjects.delete" => Some(run(state, req, subjects_delete)),
        "teachers.create" => Some(run(state, req, teachers_create)),
        "teachers.list" => Some(run(state, req, teachers_list)),
        _ => None,
    }
}
