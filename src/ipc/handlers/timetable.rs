use crate::ipc::helpers::{bad_params, required_i64, required_str, run, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::slots::{self, AssignError, AssignmentContext};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value as JsonValue};

fn class_period(conn: &Connection, class_id: &str) -> Result<String, HandlerErr> {
    conn.query_row(
        "SELECT period FROM classes WHERE id = ?",
        [class_id],
        |r| r.get(0),
    )
    .optional()
    .map_err(|e| HandlerErr::db("db_query_failed", e))?
    .ok_or_else(|| HandlerErr::new("not_found", "class not found"))
}

fn assign_error(e: AssignError) -> HandlerErr {
    match e {
        AssignError::SlotOutOfRange => {
            HandlerErr::new("invalid_slot", "slot out of range for the class period")
        }
        AssignError::NotInClass => {
            HandlerErr::new("not_in_class", "subject is not offered in this class")
        }
        AssignError::QuotaExceeded { weekly_slots } => HandlerErr::with_details(
            "quota_exceeded",
            format!(
                "weekly limit reached for this subject ({} per week)",
                weekly_slots
            ),
            json!({ "weeklySlots": weekly_slots }),
        ),
        AssignError::TeacherBusy => HandlerErr::new(
            "teacher_conflict",
            "teacher already has a lesson at this weekday and slot in another class",
        ),
    }
}

/// Snapshot of the rows the assignment decision depends on.
fn load_assignment_context(
    conn: &Connection,
    class_id: &str,
    class_subject_id: &str,
    weekday: i64,
    slot: i64,
    slot_count: usize,
) -> Result<AssignmentContext, HandlerErr> {
    let pairing_in_class: bool = conn
        .query_row(
            "SELECT 1 FROM class_subjects WHERE id = ? AND class_id = ?",
            (&class_subject_id, &class_id),
            |r| r.get::<_, i64>(0),
        )
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .is_some();

    let weekly_slots: i64 = conn
        .query_row(
            "SELECT s.weekly_slots
             FROM class_subjects cs
             JOIN subjects s ON s.id = cs.subject_id
             WHERE cs.id = ?",
            [&class_subject_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .unwrap_or(0);

    let used_slots: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM schedule_entries
             WHERE class_id = ? AND class_subject_id = ?",
            (&class_id, &class_subject_id),
            |r| r.get(0),
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    // Double-booking is checked against the pairing's open teacher: any
    // entry of theirs at the same (weekday, slot) in a different class.
    let teacher: Option<String> = conn
        .query_row(
            "SELECT teacher_id FROM teaching_assignments
             WHERE class_subject_id = ? AND end_date IS NULL",
            [&class_subject_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let teacher_busy = match teacher {
        None => false,
        Some(teacher_id) => conn
            .query_row(
                "SELECT 1
                 FROM schedule_entries e
                 JOIN teaching_assignments ta
                   ON ta.class_subject_id = e.class_subject_id
                  AND ta.end_date IS NULL
                 WHERE e.weekday = ? AND e.slot = ?
                   AND ta.teacher_id = ?
                   AND e.class_id != ?
                 LIMIT 1",
                (&weekday, &slot, &teacher_id, &class_id),
                |r| r.get::<_, i64>(0),
            )
            .optional()
            .map_err(|e| HandlerErr::db("db_query_failed", e))?
            .is_some(),
    };

    Ok(AssignmentContext {
        slot_count,
        pairing_in_class,
        weekly_slots,
        used_slots,
        teacher_busy,
    })
}

fn timetable_open(conn: &Connection, params: &JsonValue) -> Result<JsonValue, HandlerErr> {
    let class_id = required_str(params, "classId")?;

    let class: Option<(String, i64, String, Option<String>, String, String)> = conn
        .query_row(
            "SELECT cl.label, cl.year, cl.period, cl.room, c.name, sy.label
             FROM classes cl
             JOIN courses c ON c.id = cl.course_id
             JOIN school_years sy ON sy.id = cl.school_year_id
             WHERE cl.id = ?",
            [&class_id],
            |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                    r.get(5)?,
                ))
            },
        )
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let Some((label, year, period, room, course_name, school_year)) = class else {
        return Err(HandlerErr::new("not_found", "class not found"));
    };

    let slot_list = slots::slots_for_period(&period);
    let slot_json: Vec<JsonValue> = slot_list
        .iter()
        .map(|s| {
            json!({
                "index": s.index,
                "start": s.start.format("%H:%M").to_string(),
                "end": s.end.format("%H:%M").to_string(),
                "label": s.label
            })
        })
        .collect();

    let mut pairing_stmt = conn
        .prepare(
            "SELECT
               cs.id,
               s.name,
               s.weekly_slots,
               (SELECT COUNT(*) FROM schedule_entries se
                WHERE se.class_id = cs.class_id AND se.class_subject_id = cs.id) AS used_slots
             FROM class_subjects cs
             JOIN subjects s ON s.id = cs.subject_id
             WHERE cs.class_id = ?
             ORDER BY s.name",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let pairings = pairing_stmt
        .query_map([&class_id], |r| {
            let id: String = r.get(0)?;
            let name: String = r.get(1)?;
            let weekly_slots: i64 = r.get(2)?;
            let used_slots: i64 = r.get(3)?;
            Ok(json!({
                "classSubjectId": id,
                "subjectName": name,
                "weeklySlots": weekly_slots,
                "usedSlots": used_slots
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    let mut entry_stmt = conn
        .prepare(
            "SELECT weekday, slot, class_subject_id
             FROM schedule_entries
             WHERE class_id = ?
             ORDER BY weekday, slot",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let entries = entry_stmt
        .query_map([&class_id], |r| {
            let weekday: i64 = r.get(0)?;
            let slot: i64 = r.get(1)?;
            let class_subject_id: String = r.get(2)?;
            Ok(json!({
                "weekday": weekday,
                "slot": slot,
                "classSubjectId": class_subject_id
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    Ok(json!({
        "class": {
            "id": class_id,
            "label": label,
            "year": year,
            "room": room,
            "courseName": course_name,
            "schoolYear": school_year,
            "period": period,
            "periodLabel": slots::period_label(&period)
        },
        "slots": slot_json,
        "pairings": pairings,
        "entries": entries
    }))
}

fn timetable_assign(conn: &Connection, params: &JsonValue) -> Result<JsonValue, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    let class_subject_id = required_str(params, "classSubjectId")?;
    let weekday = required_i64(params, "weekday")?;
    let slot = required_i64(params, "slot")?;

    if !slots::valid_weekday(weekday) {
        return Err(bad_params("weekday must be between 1 and 5"));
    }

    let period = class_period(conn, &class_id)?;
    let slot_count = slots::slots_for_period(&period).len();
    if !slots::slot_in_range(slot, slot_count) {
        return Err(HandlerErr::new(
            "invalid_slot",
            "slot out of range for the class period",
        ));
    }

    // Re-assigning the cell to the pairing it already holds is a no-op.
    let current: Option<String> = conn
        .query_row(
            "SELECT class_subject_id FROM schedule_entries
             WHERE class_id = ? AND weekday = ? AND slot = ?",
            (&class_id, &weekday, &slot),
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if current.as_deref() == Some(class_subject_id.as_str()) {
        return Ok(json!({
            "classId": class_id,
            "weekday": weekday,
            "slot": slot,
            "classSubjectId": class_subject_id,
            "updated": false
        }));
    }

    let ctx = load_assignment_context(
        conn,
        &class_id,
        &class_subject_id,
        weekday,
        slot,
        slot_count,
    )?;
    slots::check_assignment(slot, &ctx).map_err(assign_error)?;

    conn.execute(
        "INSERT INTO schedule_entries(class_id, weekday, slot, class_subject_id)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(class_id, weekday, slot)
         DO UPDATE SET class_subject_id = excluded.class_subject_id",
        (&class_id, &weekday, &slot, &class_subject_id),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e))?;

    Ok(json!({
        "classId": class_id,
        "weekday": weekday,
        "slot": slot,
        "classSubjectId": class_subject_id,
        "updated": true
    }))
}

fn timetable_clear(conn: &Connection, params: &JsonValue) -> Result<JsonValue, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    let weekday = required_i64(params, "weekday")?;
    let slot = required_i64(params, "slot")?;

    if !slots::valid_weekday(weekday) {
        return Err(bad_params("weekday must be between 1 and 5"));
    }

    let period = class_period(conn, &class_id)?;
    let slot_count = slots::slots_for_period(&period).len();
    if !slots::slot_in_range(slot, slot_count) {
        return Err(HandlerErr::new(
            "invalid_slot",
            "slot out of range for the class period",
        ));
    }

    let removed = conn
        .execute(
            "DELETE FROM schedule_entries
             WHERE class_id = ? AND weekday = ? AND slot = ?",
            (&class_id, &weekday, &slot),
        )
        .map_err(|e| HandlerErr::db("db_delete_failed", e))?;

    Ok(json!({
        "classId": class_id,
        "weekday": weekday,
        "slot": slot,
        "removed": removed > 0
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "timetable.open" => Some(run(state, req, timetable_open)),
        "timetable.assign" => Some(run(state, req, timetable_assign)),
        "timetable.clear" => Some(run(state, req, timetable_clear)),
        _ => None,
    }
}
