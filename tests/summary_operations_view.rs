mod test_support;

use serde_json::json;
use test_support::{auth_admin, auth_coordinator, request_ok, spawn_sidecar, str_field, temp_dir};

#[test]
fn operations_department_gets_a_personnel_only_summary() {
    let workspace = temp_dir("asistencia-operations-view");
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
        json!({ "name": "Administración", "isOperations": true, "auth": auth_admin() }),
    );
    let department_id = str_field(&department, "departmentId");

    let mut staff_ids = Vec::new();
    for (i, name) in ["Rosa Medina", "Héctor Luna", "Iris Vargas", "Omar Peña"]
        .iter()
        .enumerate()
    {
        let created = request_ok(
            &mut stdin,
            &mut reader,
            &format!("p{}", i),
            "staff.create",
            json!({
                "name": name,
                "role": "operations",
                "departmentId": department_id,
                "auth": auth_admin()
            }),
        );
        staff_ids.push(str_field(&created, "staffId"));
    }

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "personnel.upsert",
        json!({
            "staffId": staff_ids[0],
            "date": "2025-09-04",
            "present": false,
            "reasonCode": "medical_leave",
            "note": "licencia médica",
            "auth": auth_coordinator(&department_id)
        }),
    );

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "summary.daily",
        json!({ "date": "2025-09-04", "auth": auth_coordinator(&department_id) }),
    );
    assert_eq!(str_field(&summary, "view"), "operations");
    assert_eq!(
        summary.get("staffTotal").and_then(|v| v.as_i64()),
        Some(4)
    );
    assert_eq!(
        summary.get("absentToday").and_then(|v| v.as_i64()),
        Some(1)
    );
    assert_eq!(str_field(&summary, "presencePct"), "75.0%");
    assert!(
        summary.get("enrollment").is_none(),
        "operations view must not carry academic rollups"
    );
    let absent = summary
        .get("absentStaff")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    assert_eq!(absent.len(), 1);
    assert_eq!(
        absent[0].get("reasonCode").and_then(|v| v.as_str()),
        Some("medical_leave")
    );
}
