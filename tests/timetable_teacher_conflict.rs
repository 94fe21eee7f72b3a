
use serde_json::json;
use std::io::BufReader;
use std::process::{ChildStdin, ChildStdout};
use test_support::{request_err, request_ok, result_str, spawn_sidecar, temp_dir};

fn pairing_for(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    class_id: &str,
    subject: &str,
) -> String {
    let open = request_ok(
        stdin,
        reader,
        id,
        "timetable.open",
        json!({ "classId": class_id }),
    );
    open.get("pairings")
        .and_then(|v| v.as_array())
        .and_then(|arr| {
            arr.iter()
                .find(|p| p.get("subjectName").and_then(|v| v.as_str()) == Some(subject))
        })
        .and_then(|p| p.get("classSubjectId"))
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("pairing for {} in {}", subject, class_id))
        .to_string()
}

#[test]
fn teacher_cannot_be_double_booked_across_classes() {
    let workspace = temp_dir("eskola-teacher-conflict");
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
        json!({ "name": "Informatics" }),
    );
    let course_id = result_str(&course, "courseId");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "subjects.create",
        json!({ "courseId": course_id, "year": 12, "name": "Programming", "weeklySlots": 6 }),
    );

    let mut make_class = |id: &str, label: &str| -> String {
        let class = request_ok(
            &mut stdin,
            &mut reader,
            id,
            "classes.create",
            json!({
                "courseId": course_id,
                "schoolYearId": school_year_id,
                "year": 12,
                "period": "evening",
                "label": label
            }),
        );
        result_str(&class, "classId")
    };
    let class_a = make_class("5", "A");
    let class_b = make_class("6", "B");

    let prog_a = pairing_for(&mut stdin, &mut reader, "7", &class_a, "Programming");
    let prog_b = pairing_for(&mut stdin, &mut reader, "8", &class_b, "Programming");

    let silva = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "teachers.create",
        json!({ "name": "Silva" }),
    );
    let silva_id = result_str(&silva, "teacherId");
    let costa = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "teachers.create",
        json!({ "name": "Costa" }),
    );
    let costa_id = result_str(&costa, "teacherId");

    // Silva teaches Programming in both classes.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "teaching.assign",
        json!({ "classId": class_a, "classSubjectId": prog_a, "teacherId": silva_id }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "teaching.assign",
        json!({ "classId": class_b, "classSubjectId": prog_b, "teacherId": silva_id }),
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "timetable.assign",
        json!({ "classId": class_a, "classSubjectId": prog_a, "weekday": 2, "slot": 3 }),
    );

    // Same weekday and slot in the other class: double-booked.
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "14",
            "timetable.assign",
            json!({ "classId": class_b, "classSubjectId": prog_b, "weekday": 2, "slot": 3 }),
        ),
        "teacher_conflict"
    );

    // A different slot on the same day is fine.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "15",
        "timetable.assign",
        json!({ "classId": class_b, "classSubjectId": prog_b, "weekday": 2, "slot": 4 }),
    );

    // More slots for the same pairing in its own class never conflict.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "16",
        "timetable.assign",
        json!({ "classId": class_a, "classSubjectId": prog_a, "weekday": 3, "slot": 3 }),
    );

    // Handing class B to another teacher clears the clash.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "17",
        "teaching.assign",
        json!({ "classId": class_b, "classSubjectId": prog_b, "teacherId": costa_id }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "18",
        "timetable.assign",
        json!({ "classId": class_b, "classSubjectId": prog_b, "weekday": 2, "slot": 3 }),
    );

    // And the old closed assignment no longer counts against Silva.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "19",
        "timetable.assign",
        json!({ "classId": class_a, "classSubjectId": prog_a, "weekday": 2, "slot": 4 }),
    );

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn pairing_without_a_teacher_never_conflicts() {
    let workspace = temp_dir("eskola-no-teacher");
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
        json!({ "name": "Arts" }),
    );
    let course_id = result_str(&course, "courseId");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "subjects.create",
        json!({ "courseId": course_id, "year": 10, "name": "Drawing", "weeklySlots": 4 }),
    );

    let mut make_class = |id: &str, label: &str| -> String {
        let class = request_ok(
            &mut stdin,
            &mut reader,
            id,
            "classes.create",
            json!({
                "courseId": course_id,
                "schoolYearId": school_year_id,
                "year": 10,
                "period": "morning",
                "label": label
            }),
        );
        result_str(&class, "classId")
    };
    let class_a = make_class("5", "A");
    let class_b = make_class("6", "B");

    let drawing_a = pairing_for(&mut stdin, &mut reader, "7", &class_a, "Drawing");
    let drawing_b = pairing_for(&mut stdin, &mut reader, "8", &class_b, "Drawing");

    // No teaching assignment anywhere: the same cell in both classes is fine.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "timetable.assign",
        json!({ "classId": class_a, "classSubjectId": drawing_a, "weekday": 1, "slot": 1 }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "timetable.assign",
        json!({ "classId": class_b, "classSubjectId": drawing_b, "weekday": 1, "slot": 1 }),
    );

    let _ = std::fs::remove_dir_all(workspace);
}
