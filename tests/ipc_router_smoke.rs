mod test_support;

use serde_json::json;
use test_support::{request, request_err, request_ok, spawn_sidecar, temp_dir};

#[test]
fn health_reports_version_and_workspace() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(
        health.get("version").and_then(|v| v.as_str()),
        Some(env!("CARGO_PKG_VERSION"))
    );
    assert!(health
        .get("workspacePath")
        .map(|v| v.is_null())
        .unwrap_or(false));

    let workspace = temp_dir("asistencia-smoke");
    let selected = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert!(selected
        .get("workspacePath")
        .and_then(|v| v.as_str())
        .is_some());

    let health = request_ok(&mut stdin, &mut reader, "3", "health", json!({}));
    assert!(health
        .get("workspacePath")
        .and_then(|v| v.as_str())
        .is_some());
}

#[test]
fn unknown_methods_and_missing_workspace_are_reported() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let resp = request(&mut stdin, &mut reader, "1", "no.such.method", json!({}));
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        resp.pointer("/error/code").and_then(|v| v.as_str()),
        Some("not_implemented")
    );

    // Data methods refuse to run before a workspace is selected.
    let code = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "summary.daily",
        json!({ "auth": { "role": "admin" } }),
    );
    assert_eq!(code, "no_workspace");
}
