mod test_support;

use serde_json::json;
use std::io::BufReader;
use std::process::{ChildStdin, ChildStdout};
use test_support::{auth_admin, request_ok, spawn_sidecar, str_field, temp_dir};

struct Classroom {
    department_id: String,
    teacher_id: String,
    block_id: String,
    student_ids: Vec<String>,
}

fn seed_classroom(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &std::path::Path,
) -> Classroom {
    let _ = request_ok(
        stdin,
        reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let department = request_ok(
        stdin,
        reader,
        "2",
        "departments.create",
        json!({ "name": "Ciencias", "auth": auth_admin() }),
    );
    let department_id = str_field(&department, "departmentId");
    let teacher = request_ok(
        stdin,
        reader,
        "3",
        "staff.create",
        json!({
            "name": "Juan Pérez",
            "role": "teacher",
            "departmentId": department_id,
            "auth": auth_admin()
        }),
    );
    let teacher_id = str_field(&teacher, "staffId");
    let subject = request_ok(
        stdin,
        reader,
        "4",
        "subjects.create",
        json!({ "name": "Matemáticas", "auth": auth_admin() }),
    );
    let subject_id = str_field(&subject, "subjectId");
    let section = request_ok(
        stdin,
        reader,
        "5",
        "sections.create",
        json!({ "name": "3-A", "departmentId": department_id, "auth": auth_admin() }),
    );
    let section_id = str_field(&section, "sectionId");

    let mut student_ids = Vec::new();
    for (i, (name, gender)) in [
        ("Pedro Díaz", "V"),
        ("Luis Gómez", "V"),
        ("Ana Torres", "H"),
    ]
    .iter()
    .enumerate()
    {
        let created = request_ok(
            stdin,
            reader,
            &format!("s{}", i),
            "students.create",
            json!({
                "sectionId": section_id,
                "name": name,
                "gender": gender,
                "auth": auth_admin()
            }),
        );
        student_ids.push(str_field(&created, "studentId"));
    }

    let block = request_ok(
        stdin,
        reader,
        "6",
        "blocks.create",
        json!({
            "sectionId": section_id,
            "subjectId": subject_id,
            "teacherId": teacher_id,
            "weekday": "monday",
            "startTime": "07:00",
            "endTime": "08:00",
            "auth": auth_admin()
        }),
    );
    Classroom {
        department_id,
        teacher_id,
        block_id: str_field(&block, "blockId"),
        student_ids,
    }
}

#[test]
fn full_present_monday_rolls_up_to_one_hundred_percent() {
    let workspace = temp_dir("asistencia-summary-full");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let classroom = seed_classroom(&mut stdin, &mut reader, &workspace);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "attendance.upsert",
        json!({
            "blockId": classroom.block_id,
            "date": "2025-09-01",
            "topic": "Fracciones",
            "countFemale": 1,
            "countMale": 2,
            "countTotal": 3,
            "absences": [],
            "auth": auth_admin()
        }),
    );

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "summary.daily",
        json!({ "date": "2025-09-01", "auth": auth_admin() }),
    );
    assert_eq!(str_field(&summary, "view"), "academic");
    assert_eq!(str_field(&summary, "weekday"), "monday");
    assert_eq!(
        summary.pointer("/enrollment/total").and_then(|v| v.as_i64()),
        Some(3)
    );
    assert_eq!(
        summary.pointer("/enrollment/male").and_then(|v| v.as_i64()),
        Some(2)
    );
    assert_eq!(
        summary
            .pointer("/enrollment/female")
            .and_then(|v| v.as_i64()),
        Some(1)
    );
    assert_eq!(
        summary
            .pointer("/scheduledToday/total")
            .and_then(|v| v.as_i64()),
        Some(3)
    );
    assert_eq!(
        summary
            .pointer("/reported/present/total")
            .and_then(|v| v.as_i64()),
        Some(3)
    );
    assert_eq!(
        summary
            .pointer("/reported/absent/total")
            .and_then(|v| v.as_i64()),
        Some(0)
    );
    assert_eq!(str_field(&summary, "attendancePct"), "100.0%");
    assert_eq!(
        summary
            .pointer("/pendingBlocks")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(0)
    );
    assert_eq!(
        summary.pointer("/blocks/scheduled").and_then(|v| v.as_i64()),
        Some(1)
    );
    assert_eq!(
        summary.pointer("/blocks/reported").and_then(|v| v.as_i64()),
        Some(1)
    );

    // Department-scoped view sees the same classroom.
    let scoped = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "summary.daily",
        json!({
            "date": "2025-09-01",
            "auth": { "role": "coordinator", "departmentId": classroom.department_id }
        }),
    );
    assert_eq!(
        scoped.pointer("/enrollment/total").and_then(|v| v.as_i64()),
        Some(3)
    );
    assert_eq!(str_field(&scoped, "attendancePct"), "100.0%");

    // A weekday with no blocks has nothing scheduled and nothing reported.
    let tuesday = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "summary.daily",
        json!({ "date": "2025-09-02", "auth": auth_admin() }),
    );
    assert_eq!(
        tuesday
            .pointer("/scheduledToday/total")
            .and_then(|v| v.as_i64()),
        Some(0)
    );
    assert_eq!(str_field(&tuesday, "attendancePct"), "0%");
}

#[test]
fn absence_breakdown_counts_by_student_gender() {
    let workspace = temp_dir("asistencia-summary-absence");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let classroom = seed_classroom(&mut stdin, &mut reader, &workspace);

    // One of the two boys is absent; the teacher files their own report.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "attendance.upsert",
        json!({
            "blockId": classroom.block_id,
            "date": "2025-09-01",
            "topic": "Fracciones",
            "countFemale": 1,
            "countMale": 1,
            "countTotal": 2,
            "absences": [
                { "studentId": classroom.student_ids[0], "note": "sin avisar" }
            ],
            "auth": { "role": "teacher", "staffId": classroom.teacher_id }
        }),
    );

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "summary.daily",
        json!({ "date": "2025-09-01", "auth": auth_admin() }),
    );
    assert_eq!(
        summary
            .pointer("/reported/absent/male")
            .and_then(|v| v.as_i64()),
        Some(1)
    );
    assert_eq!(
        summary
            .pointer("/reported/absent/female")
            .and_then(|v| v.as_i64()),
        Some(0)
    );
    assert_eq!(str_field(&summary, "attendancePct"), "66.7%");

    let absent = summary
        .pointer("/absentStudents")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    assert_eq!(absent.len(), 1);
    assert_eq!(
        absent[0].get("studentId").and_then(|v| v.as_str()),
        Some(classroom.student_ids[0].as_str())
    );
    assert_eq!(
        absent[0].get("note").and_then(|v| v.as_str()),
        Some("sin avisar")
    );
}
