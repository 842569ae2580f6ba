mod test_support;

use serde_json::json;
use test_support::{auth_admin, request_ok, spawn_sidecar, str_field, temp_dir};

#[test]
fn schedule_import_resolves_fuzzy_names_and_free_text_times() {
    let workspace = temp_dir("asistencia-import-schedule");
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
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "staff.create",
        json!({
            "name": "Juan Pérez",
            "role": "teacher",
            "departmentId": department_id,
            "auth": auth_admin()
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "subjects.create",
        json!({ "name": "Matemáticas", "auth": auth_admin() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "sections.create",
        json!({ "name": "3-A", "departmentId": department_id, "auth": auth_admin() }),
    );

    // Hand-typed cells: diacritics dropped, trailing honorific, 12-hour times,
    // and one row whose teacher cannot be matched.
    let text = "day,start,end,section,subject,teacher\n\
                monday,7:00 a.m.,8:00 a.m.,3-A,matematicas,Prof. Perez\n\
                tuesday,garbage,8:00 a.m.,3-A,Matemáticas,Juan Pérez\n\
                friday,2:30 p.m.,3:30 p.m.,3-A,Matemáticas,Nadie Conocido\n";

    let preview = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "import.schedule.preview",
        json!({ "text": text, "auth": auth_admin() }),
    );
    let rows = preview
        .get("rows")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    assert_eq!(rows.len(), 3);
    assert_eq!(preview.get("resolvedCount").and_then(|v| v.as_i64()), Some(1));

    assert_eq!(rows[0].get("resolved").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(
        rows[0].get("startTime").and_then(|v| v.as_str()),
        Some("07:00")
    );
    assert_eq!(
        rows[0].pointer("/teacher/name").and_then(|v| v.as_str()),
        Some("Juan Pérez")
    );
    assert_eq!(
        rows[0].pointer("/subject/name").and_then(|v| v.as_str()),
        Some("Matemáticas")
    );

    // Unparseable time leaves the row unresolved but previewable.
    assert_eq!(
        rows[1].get("resolved").and_then(|v| v.as_bool()),
        Some(false)
    );
    assert_eq!(rows[1].get("startTime").and_then(|v| v.as_str()), Some(""));

    // Unmatched teacher resolves to null.
    assert!(rows[2].get("teacher").map(|v| v.is_null()).unwrap_or(false));

    let applied = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "import.schedule.apply",
        json!({ "text": text, "auth": auth_admin() }),
    );
    assert_eq!(applied.get("created").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(applied.get("skipped").and_then(|v| v.as_i64()), Some(2));

    let blocks = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "blocks.list",
        json!({}),
    );
    let blocks = blocks
        .get("blocks")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    assert_eq!(blocks.len(), 1);
    assert_eq!(
        blocks[0].get("weekday").and_then(|v| v.as_str()),
        Some("monday")
    );
    assert_eq!(
        blocks[0].get("startTime").and_then(|v| v.as_str()),
        Some("07:00")
    );
    assert_eq!(
        blocks[0].get("endTime").and_then(|v| v.as_str()),
        Some("08:00")
    );
}
