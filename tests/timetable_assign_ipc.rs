
use serde_json::json;
use test_support::{request_err, request_ok, result_str, spawn_sidecar, temp_dir};

#[test]
fn assign_clear_roundtrip_with_replacement_and_validation() {
    let workspace = temp_dir("eskola-timetable-assign");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let sy = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "schoolYears.create",
        json!({ "label": "2024/2025" }),
    );
    let school_year_id = result_str(&sy, "schoolYearId");
    let course = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "courses.create",
        json!({ "name": "Humanities" }),
    );
    let course_id = result_str(&course, "courseId");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "subjects.create",
        json!({ "courseId": course_id, "year": 10, "name": "Math", "weeklySlots": 5 }),
    );

    let class_a = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "classes.create",
        json!({
            "courseId": course_id,
            "schoolYearId": school_year_id,
            "year": 10,
            "period": "morning",
            "label": "A"
        }),
    );
    let class_a_id = result_str(&class_a, "classId");
    let class_b = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "classes.create",
        json!({
            "courseId": course_id,
            "schoolYearId": school_year_id,
            "year": 10,
            "period": "morning",
            "label": "B"
        }),
    );
    let class_b_id = result_str(&class_b, "classId");

    let open = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "timetable.open",
        json!({ "classId": class_a_id }),
    );
    assert_eq!(
        open.get("slots").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(6)
    );
    let math_a = open
        .get("pairings")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .and_then(|p| p.get("classSubjectId"))
        .and_then(|v| v.as_str())
        .expect("math pairing in A")
        .to_string();

    let assigned = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "timetable.assign",
        json!({ "classId": class_a_id, "classSubjectId": math_a, "weekday": 1, "slot": 1 }),
    );
    assert_eq!(assigned.get("updated").and_then(|v| v.as_bool()), Some(true));

    // Same pairing, same cell: success without a write.
    let repeat = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "timetable.assign",
        json!({ "classId": class_a_id, "classSubjectId": math_a, "weekday": 1, "slot": 1 }),
    );
    assert_eq!(repeat.get("updated").and_then(|v| v.as_bool()), Some(false));

    let open = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "timetable.open",
        json!({ "classId": class_a_id }),
    );
    let entries = open.get("entries").and_then(|v| v.as_array()).expect("entries");
    assert_eq!(entries.len(), 1);
    assert_eq!(
        open.get("pairings")
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .and_then(|p| p.get("usedSlots"))
            .and_then(|v| v.as_i64()),
        Some(1)
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "timetable.assign",
        json!({ "classId": class_a_id, "classSubjectId": math_a, "weekday": 1, "slot": 2 }),
    );

    // A subject created after the class shows up once synced, and can take
    // over an occupied cell.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "subjects.create",
        json!({ "courseId": course_id, "year": 10, "name": "English", "weeklySlots": 3 }),
    );
    let synced = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "classes.syncSubjects",
        json!({ "classId": class_a_id }),
    );
    assert_eq!(synced.get("linkedSubjects").and_then(|v| v.as_i64()), Some(1));

    let open = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "timetable.open",
        json!({ "classId": class_a_id }),
    );
    let english_a = open
        .get("pairings")
        .and_then(|v| v.as_array())
        .and_then(|arr| {
            arr.iter()
                .find(|p| p.get("subjectName").and_then(|v| v.as_str()) == Some("English"))
        })
        .and_then(|p| p.get("classSubjectId"))
        .and_then(|v| v.as_str())
        .expect("english pairing in A")
        .to_string();

    let replaced = request_ok(
        &mut stdin,
        &mut reader,
        "15",
        "timetable.assign",
        json!({ "classId": class_a_id, "classSubjectId": english_a, "weekday": 1, "slot": 1 }),
    );
    assert_eq!(replaced.get("updated").and_then(|v| v.as_bool()), Some(true));

    let open = request_ok(
        &mut stdin,
        &mut reader,
        "16",
        "timetable.open",
        json!({ "classId": class_a_id }),
    );
    let entries = open.get("entries").and_then(|v| v.as_array()).expect("entries");
    assert_eq!(entries.len(), 2);
    let cell_1_1 = entries
        .iter()
        .find(|e| {
            e.get("weekday").and_then(|v| v.as_i64()) == Some(1)
                && e.get("slot").and_then(|v| v.as_i64()) == Some(1)
        })
        .expect("cell 1/1");
    assert_eq!(
        cell_1_1.get("classSubjectId").and_then(|v| v.as_str()),
        Some(english_a.as_str())
    );

    // Validation failures: each one a distinct code, none fatal.
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "17",
            "timetable.assign",
            json!({ "classId": class_a_id, "classSubjectId": math_a, "weekday": 0, "slot": 1 }),
        ),
        "bad_params"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "18",
            "timetable.assign",
            json!({ "classId": class_a_id, "classSubjectId": math_a, "weekday": 6, "slot": 1 }),
        ),
        "bad_params"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "19",
            "timetable.assign",
            json!({ "classId": class_a_id, "classSubjectId": math_a, "weekday": "wed", "slot": 1 }),
        ),
        "bad_params"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "20",
            "timetable.assign",
            json!({ "classId": class_a_id, "classSubjectId": math_a, "weekday": 2, "slot": 7 }),
        ),
        "invalid_slot"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "21",
            "timetable.assign",
            json!({ "classId": class_a_id, "classSubjectId": math_a, "weekday": 2, "slot": 0 }),
        ),
        "invalid_slot"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "22",
            "timetable.assign",
            json!({ "classId": "missing", "classSubjectId": math_a, "weekday": 2, "slot": 1 }),
        ),
        "not_found"
    );

    // A pairing from class B cannot be scheduled in class A.
    let open_b = request_ok(
        &mut stdin,
        &mut reader,
        "23",
        "timetable.open",
        json!({ "classId": class_b_id }),
    );
    let math_b = open_b
        .get("pairings")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .and_then(|p| p.get("classSubjectId"))
        .and_then(|v| v.as_str())
        .expect("math pairing in B")
        .to_string();
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "24",
            "timetable.assign",
            json!({ "classId": class_a_id, "classSubjectId": math_b, "weekday": 2, "slot": 1 }),
        ),
        "not_in_class"
    );

    let cleared = request_ok(
        &mut stdin,
        &mut reader,
        "25",
        "timetable.clear",
        json!({ "classId": class_a_id, "weekday": 1, "slot": 2 }),
    );
    assert_eq!(cleared.get("removed").and_then(|v| v.as_bool()), Some(true));
    let cleared_again = request_ok(
        &mut stdin,
        &mut reader,
        "26",
        "timetable.clear",
        json!({ "classId": class_a_id, "weekday": 1, "slot": 2 }),
    );
    assert_eq!(
        cleared_again.get("removed").and_then(|v| v.as_bool()),
        Some(false)
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "27",
            "timetable.clear",
            json!({ "classId": class_a_id, "weekday": 1, "slot": 9 }),
        ),
        "invalid_slot"
    );

    let _ = std::fs::remove_dir_all(workspace);
}
