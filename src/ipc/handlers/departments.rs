use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_required_str, parse_auth, require_admin, with_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn handle_departments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "departments": [] }));
    };

    // Include basic counts so the UI can show a useful overview.
    let mut stmt = match conn.prepare(
        "SELECT
           d.id,
           d.name,
           d.is_operations,
           (SELECT COUNT(*) FROM sections s WHERE s.department_id = d.id) AS section_count,
           (SELECT COUNT(*) FROM staff st WHERE st.department_id = d.id) AS staff_count
         FROM departments d
         ORDER BY d.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let is_operations: i64 = row.get(2)?;
            let section_count: i64 = row.get(3)?;
            let staff_count: i64 = row.get(4)?;
            Ok(json!({
                "id": id,
                "name": name,
                "isOperations": is_operations != 0,
                "sectionCount": section_count,
                "staffCount": staff_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(departments) => ok(&req.id, json!({ "departments": departments })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn departments_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let auth = parse_auth(params)?;
    require_admin(&auth)?;
    let name = get_required_str(params, "name")?;
    let is_operations = params
        .get("isOperations")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO departments(id, name, is_operations) VALUES(?, ?, ?)",
        (&id, &name, is_operations as i64),
    )
    .map_err(|e| HandlerErr::update("departments", e))?;
    Ok(json!({ "departmentId": id }))
}

fn departments_update(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let auth = parse_auth(params)?;
    require_admin(&auth)?;
    let department_id = get_required_str(params, "departmentId")?;

    let existing: Option<(String, i64)> = conn
        .query_row(
            "SELECT name, is_operations FROM departments WHERE id = ?",
            [&department_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(HandlerErr::query)?;
    let Some((current_name, current_ops)) = existing else {
        return Err(HandlerErr::not_found("department not found"));
    };

    let name = params
        .get("name")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or(current_name);
    let is_operations = params
        .get("isOperations")
        .and_then(|v| v.as_bool())
        .map(|b| b as i64)
        .unwrap_or(current_ops);

    conn.execute(
        "UPDATE departments SET name = ?, is_operations = ? WHERE id = ?",
        (&name, is_operations, &department_id),
    )
    .map_err(|e| HandlerErr::update("departments", e))?;
    Ok(json!({ "ok": true }))
}

fn departments_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let auth = parse_auth(params)?;
    require_admin(&auth)?;
    let department_id = get_required_str(params, "departmentId")?;

    let in_use: i64 = conn
        .query_row(
            "SELECT
               (SELECT COUNT(*) FROM sections WHERE department_id = ?1) +
               (SELECT COUNT(*) FROM staff WHERE department_id = ?1)",
            [&department_id],
            |r| r.get(0),
        )
        .map_err(HandlerErr::query)?;
    if in_use > 0 {
        return Err(HandlerErr::bad_params(
            "department still has sections or staff",
        ));
    }

    conn.execute("DELETE FROM departments WHERE id = ?", [&department_id])
        .map_err(|e| HandlerErr::update("departments", e))?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "departments.list" => Some(handle_departments_list(state, req)),
        "departments.create" => Some(with_db(state, req, departments_create)),
        "departments.update" => Some(with_db(state, req, departments_update)),
        "departments.delete" => Some(with_db(state, req, departments_delete)),
        _ => None,
    }
}
