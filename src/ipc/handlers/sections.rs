use crate::ipc::helpers::{
    get_opt_str, get_required_str, parse_auth, require_manager, with_db, HandlerErr, Role,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn sections_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let auth = parse_auth(params)?;
    let scope = auth.department_scope().map(|s| s.to_string());

    let base = "SELECT
           s.id,
           s.name,
           s.department_id,
           d.name,
           (SELECT COUNT(*) FROM students st WHERE st.section_id = s.id) AS student_count,
           (SELECT COUNT(*) FROM class_blocks b WHERE b.section_id = s.id) AS block_count
         FROM sections s
         LEFT JOIN departments d ON d.id = s.department_id";
    let sql = match scope {
        Some(_) => format!("{} WHERE s.department_id = ? ORDER BY s.name", base),
        None => format!("{} ORDER BY s.name", base),
    };
    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::query)?;

    let map_row = |row: &rusqlite::Row| -> rusqlite::Result<serde_json::Value> {
        let id: String = row.get(0)?;
        let name: String = row.get(1)?;
        let department_id: Option<String> = row.get(2)?;
        let department_name: Option<String> = row.get(3)?;
        let student_count: i64 = row.get(4)?;
        let block_count: i64 = row.get(5)?;
        Ok(json!({
            "id": id,
            "name": name,
            "departmentId": department_id,
            "departmentName": department_name,
            "studentCount": student_count,
            "blockCount": block_count
        }))
    };

    let rows = match scope {
        Some(dep) => stmt
            .query_map([&dep], map_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>()),
        None => stmt
            .query_map([], map_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>()),
    }
    .map_err(HandlerErr::query)?;

    Ok(json!({ "sections": rows }))
}

fn check_section_scope(
    conn: &Connection,
    auth: &crate::ipc::helpers::AuthCtx,
    section_id: &str,
) -> Result<(), HandlerErr> {
    let department: Option<Option<String>> = conn
        .query_row(
            "SELECT department_id FROM sections WHERE id = ?",
            [section_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::query)?;
    let Some(department) = department else {
        return Err(HandlerErr::not_found("section not found"));
    };
    if auth.role == Role::Coordinator && department.as_deref() != auth.department_scope() {
        return Err(HandlerErr::not_authorized(
            "section belongs to another department",
        ));
    }
    Ok(())
}

fn sections_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let auth = parse_auth(params)?;
    require_manager(&auth)?;
    let name = get_required_str(params, "name")?;
    let department_id = match auth.role {
        Role::Coordinator => auth.department_id.clone(),
        _ => get_opt_str(params, "departmentId"),
    };

    if let Some(dep) = department_id.as_deref() {
        let found: Option<i64> = conn
            .query_row("SELECT 1 FROM departments WHERE id = ?", [dep], |r| {
                r.get(0)
            })
            .optional()
            .map_err(HandlerErr::query)?;
        if found.is_none() {
            return Err(HandlerErr::not_found("department not found"));
        }
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO sections(id, department_id, name) VALUES(?, ?, ?)",
        (&id, &department_id, &name),
    )
    .map_err(|e| HandlerErr::update("sections", e))?;
    Ok(json!({ "sectionId": id }))
}

fn sections_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let auth = parse_auth(params)?;
    require_manager(&auth)?;
    let section_id = get_required_str(params, "sectionId")?;
    check_section_scope(conn, &auth, &section_id)?;
    let name = get_required_str(params, "name")?;

    conn.execute(
        "UPDATE sections SET name = ? WHERE id = ?",
        (&name, &section_id),
    )
    .map_err(|e| HandlerErr::update("sections", e))?;
    Ok(json!({ "ok": true }))
}

/// Students are owned by their section, so section delete removes the whole
/// subtree in one transaction: absence entries, attendance records, blocks,
/// students, then the section row.
fn sections_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let auth = parse_auth(params)?;
    require_manager(&auth)?;
    let section_id = get_required_str(params, "sectionId")?;
    check_section_scope(conn, &auth, &section_id)?;

    let tx = conn.unchecked_transaction().map_err(HandlerErr::tx)?;
    tx.execute(
        "DELETE FROM absence_entries WHERE record_id IN (
           SELECT ar.id FROM attendance_records ar
           JOIN class_blocks b ON b.id = ar.block_id
           WHERE b.section_id = ?
         )",
        [&section_id],
    )
    .map_err(|e| HandlerErr::update("absence_entries", e))?;
    tx.execute(
        "DELETE FROM attendance_records WHERE block_id IN (
           SELECT id FROM class_blocks WHERE section_id = ?
         )",
        [&section_id],
    )
    .map_err(|e| HandlerErr::update("attendance_records", e))?;
    tx.execute("DELETE FROM class_blocks WHERE section_id = ?", [&section_id])
        .map_err(|e| HandlerErr::update("class_blocks", e))?;
    tx.execute(
        "DELETE FROM absence_entries WHERE student_id IN (
           SELECT id FROM students WHERE section_id = ?
         )",
        [&section_id],
    )
    .map_err(|e| HandlerErr::update("absence_entries", e))?;
    tx.execute("DELETE FROM students WHERE section_id = ?", [&section_id])
        .map_err(|e| HandlerErr::update("students", e))?;
    let removed = tx
        .execute("DELETE FROM sections WHERE id = ?", [&section_id])
        .map_err(|e| HandlerErr::update("sections", e))?;
    tx.commit().map_err(HandlerErr::commit)?;

    if removed == 0 {
        return Err(HandlerErr::not_found("section not found"));
    }
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "sections.list" => Some(with_db(state, req, sections_list)),
        "sections.create" => Some(with_db(state, req, sections_create)),
        "sections.update" => Some(with_db(state, req, sections_update)),
        "sections.delete" => Some(with_db(state, req, sections_delete)),
        _ => None,
    }
}
