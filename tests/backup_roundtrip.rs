mod test_support;

use serde_json::json;
use test_support::{auth_admin, request_ok, spawn_sidecar, str_field, temp_dir};

#[test]
fn bundle_export_then_import_restores_the_database() {
    let workspace = temp_dir("asistencia-backup-src");
    let restore_workspace = temp_dir("asistencia-backup-dst");
    let bundle_path = temp_dir("asistencia-backup-out").join("backup.zip");
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

    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "backup.export",
        json!({ "outPath": bundle_path.to_string_lossy() }),
    );
    assert_eq!(
        exported.get("bundleFormat").and_then(|v| v.as_str()),
        Some("asistencia-workspace-v1")
    );
    let sha = str_field(&exported, "dbSha256");
    assert_eq!(sha.len(), 64);
    assert!(sha.chars().all(|c| c.is_ascii_hexdigit()));

    // Import into a fresh workspace and confirm the data came along.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "workspace.select",
        json!({ "path": restore_workspace.to_string_lossy() }),
    );
    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "backup.import",
        json!({ "inPath": bundle_path.to_string_lossy() }),
    );
    assert_eq!(
        imported
            .get("bundleFormatDetected")
            .and_then(|v| v.as_str()),
        Some("asistencia-workspace-v1")
    );

    let departments = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "departments.list",
        json!({}),
    );
    let departments = departments
        .get("departments")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    assert_eq!(departments.len(), 1);
    assert_eq!(
        departments[0].get("id").and_then(|v| v.as_str()),
        Some(department_id.as_str())
    );
}
