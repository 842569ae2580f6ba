mod test_support;

use serde_json::json;
use test_support::{auth_admin, auth_teacher, request_ok, spawn_sidecar, str_field, temp_dir};

#[test]
fn teachers_see_only_their_own_blocks_and_no_personnel_data() {
    let workspace = temp_dir("asistencia-teacher-scope");
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
        json!({ "name": "Química", "auth": auth_admin() }),
    );
    let subject_id = str_field(&subject, "subjectId");
    let section = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "sections.create",
        json!({ "name": "5-A", "departmentId": department_id, "auth": auth_admin() }),
    );
    let section_id = str_field(&section, "sectionId");

    let mut teacher_ids = Vec::new();
    for (i, name) in ["Elena Castro", "Mario Peralta"].iter().enumerate() {
        let created = request_ok(
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
        teacher_ids.push(str_field(&created, "staffId"));
    }
    for (i, teacher_id) in teacher_ids.iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("b{}", i),
            "blocks.create",
            json!({
                "sectionId": section_id,
                "subjectId": subject_id,
                "teacherId": teacher_id,
                "weekday": "thursday",
                "startTime": format!("{:02}:00", 7 + i),
                "endTime": format!("{:02}:00", 8 + i),
                "auth": auth_admin()
            }),
        );
    }

    // 2025-09-04 is a Thursday.
    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "summary.daily",
        json!({ "date": "2025-09-04", "auth": auth_teacher(&teacher_ids[0]) }),
    );
    assert_eq!(str_field(&summary, "view"), "teacher");
    let blocks = summary
        .get("blocks")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    assert_eq!(blocks.len(), 1, "only the caller's own blocks are visible");
    assert_eq!(
        blocks[0].get("teacherId").and_then(|v| v.as_str()),
        Some(teacher_ids[0].as_str())
    );
    assert_eq!(
        blocks[0].get("reported").and_then(|v| v.as_bool()),
        Some(false)
    );
    assert!(
        summary.get("personnelAbsent").is_none(),
        "teacher view must not expose personnel records"
    );
    assert!(summary.get("enrollment").is_none());

    // Filing flips the reported flag and empties the pending list.
    let block_id = blocks[0].get("id").and_then(|v| v.as_str()).expect("block id");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "attendance.upsert",
        json!({
            "blockId": block_id,
            "date": "2025-09-04",
            "topic": "Enlaces químicos",
            "countFemale": 0,
            "countMale": 0,
            "countTotal": 0,
            "absences": [],
            "auth": auth_teacher(&teacher_ids[0])
        }),
    );
    let after = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "summary.daily",
        json!({ "date": "2025-09-04", "auth": auth_teacher(&teacher_ids[0]) }),
    );
    let pending = after
        .get("pendingBlocks")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    assert!(pending.is_empty());

    // A teacher cannot file for someone else's block.
    let other_view = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "summary.daily",
        json!({ "date": "2025-09-04", "auth": auth_teacher(&teacher_ids[1]) }),
    );
    let other_block = other_view
        .get("blocks")
        .and_then(|v| v.as_array())
        .and_then(|a| a.first())
        .and_then(|b| b.get("id"))
        .and_then(|v| v.as_str())
        .expect("other teacher block")
        .to_string();
    let code = test_support::request_err(
        &mut stdin,
        &mut reader,
        "9",
        "attendance.upsert",
        json!({
            "blockId": other_block,
            "date": "2025-09-04",
            "topic": "Intrusión",
            "countFemale": 0,
            "countMale": 0,
            "countTotal": 0,
            "absences": [],
            "auth": auth_teacher(&teacher_ids[0])
        }),
    );
    assert_eq!(code, "not_authorized");
}
