mod test_support;

use serde_json::json;
use test_support::{auth_admin, request_err, request_ok, spawn_sidecar, str_field, temp_dir};

#[test]
fn deleting_a_section_removes_students_blocks_and_records() {
    let workspace = temp_dir("asistencia-cascade");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let teacher = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "staff.create",
        json!({ "name": "Sonia Brito", "role": "teacher", "auth": auth_admin() }),
    );
    let teacher_id = str_field(&teacher, "staffId");
    let section = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "sections.create",
        json!({ "name": "6-C", "auth": auth_admin() }),
    );
    let section_id = str_field(&section, "sectionId");
    let student = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.create",
        json!({
            "sectionId": section_id,
            "name": "Iván Soto",
            "gender": "M",
            "auth": auth_admin()
        }),
    );
    let student_id = str_field(&student, "studentId");
    let block = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "blocks.create",
        json!({
            "sectionId": section_id,
            "teacherId": teacher_id,
            "weekday": "friday",
            "startTime": "10:00",
            "endTime": "11:00",
            "description": "Acto cívico",
            "auth": auth_admin()
        }),
    );
    let block_id = str_field(&block, "blockId");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "attendance.upsert",
        json!({
            "blockId": block_id,
            "date": "2025-09-05",
            "topic": "Acto",
            "countFemale": 0,
            "countMale": 0,
            "countTotal": 0,
            "absences": [{ "studentId": student_id }],
            "auth": auth_admin()
        }),
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "sections.delete",
        json!({ "sectionId": section_id, "auth": auth_admin() }),
    );

    let code = request_err(
        &mut stdin,
        &mut reader,
        "8",
        "students.list",
        json!({ "sectionId": section_id }),
    );
    assert_eq!(code, "not_found");
    let code = request_err(
        &mut stdin,
        &mut reader,
        "9",
        "attendance.get",
        json!({ "blockId": block_id, "date": "2025-09-05" }),
    );
    assert_eq!(code, "not_found");
    let blocks = request_ok(&mut stdin, &mut reader, "10", "blocks.list", json!({}));
    assert_eq!(
        blocks
            .get("blocks")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(0)
    );

    // The teacher survives; only section-owned rows are cascaded.
    let staff = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "staff.list",
        json!({ "auth": auth_admin() }),
    );
    assert_eq!(
        staff.get("staff").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(1)
    );
}
