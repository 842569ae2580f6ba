mod test_support;

use serde_json::json;
use test_support::{auth_admin, request_ok, spawn_sidecar, str_field, temp_dir};

#[test]
fn pending_list_is_scheduled_minus_reported() {
    let workspace = temp_dir("asistencia-pending-blocks");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let department = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "departments.create",
        json!({ "name": "Ciencias", "auth": auth_admin() }),
    );
    let department_id = str_field(&department, "departmentId");
    let subject = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "subjects.create",
        json!({ "name": "Física", "auth": auth_admin() }),
    );
    let subject_id = str_field(&subject, "subjectId");
    let section = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "sections.create",
        json!({ "name": "4-A", "departmentId": department_id, "auth": auth_admin() }),
    );
    let section_id = str_field(&section, "sectionId");

    let mut block_ids = Vec::new();
    for (i, (name, start, end)) in [
        ("Marta Reyes", "07:00", "08:00"),
        ("Raúl Santana", "08:00", "09:00"),
    ]
    .iter()
    .enumerate()
    {
        let teacher = request_ok(
            &mut stdin,
            &mut reader,
            &format!("t{}", i),
            "staff.create",
            json!({
                "name": name,
                "role": "teacher",
                "departmentId": department_id,
                "auth": auth_admin()
            }),
        );
        let teacher_id = str_field(&teacher, "staffId");
        let block = request_ok(
            &mut stdin,
            &mut reader,
            &format!("b{}", i),
            "blocks.create",
            json!({
                "sectionId": section_id,
                "subjectId": subject_id,
                "teacherId": teacher_id,
                "weekday": "wednesday",
                "startTime": start,
                "endTime": end,
                "auth": auth_admin()
            }),
        );
        block_ids.push(str_field(&block, "blockId"));
    }

    // 2025-09-03 is a Wednesday. Nothing is reported yet.
    let before = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "summary.daily",
        json!({ "date": "2025-09-03", "auth": auth_admin() }),
    );
    assert_eq!(str_field(&before, "attendancePct"), "0%");
    assert_eq!(
        before.pointer("/blocks/scheduled").and_then(|v| v.as_i64()),
        Some(2)
    );
    assert_eq!(
        before.pointer("/blocks/reported").and_then(|v| v.as_i64()),
        Some(0)
    );
    assert_eq!(
        before
            .pointer("/blocks/pendingTeachers")
            .and_then(|v| v.as_i64()),
        Some(2)
    );
    let pending_before = before
        .pointer("/pendingBlocks")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    assert_eq!(pending_before.len(), 2);
    // Natural schedule order: earliest start time first.
    assert_eq!(
        pending_before[0].get("startTime").and_then(|v| v.as_str()),
        Some("07:00")
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "attendance.upsert",
        json!({
            "blockId": block_ids[0],
            "date": "2025-09-03",
            "topic": "Cinemática",
            "countFemale": 0,
            "countMale": 0,
            "countTotal": 0,
            "absences": [],
            "auth": auth_admin()
        }),
    );

    let after = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "summary.daily",
        json!({ "date": "2025-09-03", "auth": auth_admin() }),
    );
    let pending_after = after
        .pointer("/pendingBlocks")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    assert_eq!(pending_after.len(), 1);
    assert_eq!(
        pending_after[0].get("id").and_then(|v| v.as_str()),
        Some(block_ids[1].as_str())
    );
    assert_eq!(
        pending_after[0].get("teacherName").and_then(|v| v.as_str()),
        Some("Raúl Santana")
    );
    assert_eq!(
        after.pointer("/blocks/reported").and_then(|v| v.as_i64()),
        Some(1)
    );
    assert_eq!(
        after
            .pointer("/blocks/pendingTeachers")
            .and_then(|v| v.as_i64()),
        Some(1)
    );

    // The report itself carried no students, so the percentage stays at the
    // boundary value.
    assert_eq!(str_field(&after, "attendancePct"), "0%");
}
