use crate::ipc::helpers::{
    get_opt_str, get_required_str, parse_auth, require_admin, require_manager, with_db, HandlerErr,
    Role,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn staff_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let auth = parse_auth(params)?;
    let scope = auth.department_scope().map(|s| s.to_string());

    let sql = match scope {
        Some(_) => {
            "SELECT st.id, st.name, st.id_number, st.role, st.active, st.department_id, d.name
             FROM staff st
             LEFT JOIN departments d ON d.id = st.department_id
             WHERE st.department_id = ?
             ORDER BY st.name"
        }
        None => {
            "SELECT st.id, st.name, st.id_number, st.role, st.active, st.department_id, d.name
             FROM staff st
             LEFT JOIN departments d ON d.id = st.department_id
             ORDER BY st.name"
        }
    };
    let mut stmt = conn.prepare(sql).map_err(HandlerErr::query)?;

    let map_row = |row: &rusqlite::Row| -> rusqlite::Result<serde_json::Value> {
        let id: String = row.get(0)?;
        let name: String = row.get(1)?;
        let id_number: Option<String> = row.get(2)?;
        let role: String = row.get(3)?;
        let active: i64 = row.get(4)?;
        let department_id: Option<String> = row.get(5)?;
        let department_name: Option<String> = row.get(6)?;
        Ok(json!({
            "id": id,
            "name": name,
            "idNumber": id_number,
            "role": role,
            "active": active != 0,
            "departmentId": department_id,
            "departmentName": department_name
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

    Ok(json!({ "staff": rows }))
}

fn staff_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let auth = parse_auth(params)?;
    require_manager(&auth)?;
    let name = get_required_str(params, "name")?;
    let role = get_required_str(params, "role")?.to_ascii_lowercase();
    let id_number = get_opt_str(params, "idNumber");
    let department_id = get_opt_str(params, "departmentId");

    // Coordinators may only add staff to their own department.
    if auth.role == Role::Coordinator && department_id != auth.department_id {
        return Err(HandlerErr::not_authorized(
            "coordinator may only manage own department staff",
        ));
    }
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
        "INSERT INTO staff(id, department_id, name, id_number, role, active)
         VALUES(?, ?, ?, ?, ?, 1)",
        (&id, &department_id, &name, &id_number, &role),
    )
    .map_err(|e| HandlerErr::update("staff", e))?;
    Ok(json!({ "staffId": id }))
}

fn staff_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let auth = parse_auth(params)?;
    require_manager(&auth)?;
    let staff_id = get_required_str(params, "staffId")?;

    #[allow(clippy::type_complexity)]
    let existing: Option<(String, Option<String>, String, Option<String>, i64)> = conn
        .query_row(
            "SELECT name, id_number, role, department_id, active FROM staff WHERE id = ?",
            [&staff_id],
            |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                ))
            },
        )
        .optional()
        .map_err(HandlerErr::query)?;
    let Some((cur_name, cur_id_number, cur_role, cur_department, cur_active)) = existing else {
        return Err(HandlerErr::not_found("staff member not found"));
    };
    if auth.role == Role::Coordinator && cur_department != auth.department_id {
        return Err(HandlerErr::not_authorized(
            "coordinator may only manage own department staff",
        ));
    }

    let name = get_opt_str(params, "name").unwrap_or(cur_name);
    let id_number = get_opt_str(params, "idNumber").or(cur_id_number);
    let role = get_opt_str(params, "role")
        .map(|r| r.to_ascii_lowercase())
        .unwrap_or(cur_role);
    let department_id = match params.get("departmentId") {
        Some(v) if v.is_null() => None,
        Some(v) => v.as_str().map(|s| s.trim().to_string()),
        None => cur_department.clone(),
    };
    if auth.role == Role::Coordinator && department_id != auth.department_id {
        return Err(HandlerErr::not_authorized(
            "coordinator may not move staff between departments",
        ));
    }
    let active = params
        .get("active")
        .and_then(|v| v.as_bool())
        .map(|b| b as i64)
        .unwrap_or(cur_active);

    conn.execute(
        "UPDATE staff SET name = ?, id_number = ?, role = ?, department_id = ?, active = ?
         WHERE id = ?",
        (&name, &id_number, &role, &department_id, active, &staff_id),
    )
    .map_err(|e| HandlerErr::update("staff", e))?;
    Ok(json!({ "ok": true }))
}

fn staff_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let auth = parse_auth(params)?;
    require_admin(&auth)?;
    let staff_id = get_required_str(params, "staffId")?;

    let blocks: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM class_blocks WHERE teacher_id = ?",
            [&staff_id],
            |r| r.get(0),
        )
        .map_err(HandlerErr::query)?;
    if blocks > 0 {
        return Err(HandlerErr::bad_params(
            "staff member still teaches scheduled blocks",
        ));
    }

    let tx = conn.unchecked_transaction().map_err(HandlerErr::tx)?;
    tx.execute(
        "DELETE FROM personnel_attendance WHERE staff_id = ?",
        [&staff_id],
    )
    .map_err(|e| HandlerErr::update("personnel_attendance", e))?;
    let removed = tx
        .execute("DELETE FROM staff WHERE id = ?", [&staff_id])
        .map_err(|e| HandlerErr::update("staff", e))?;
    tx.commit().map_err(HandlerErr::commit)?;

    if removed == 0 {
        return Err(HandlerErr::not_found("staff member not found"));
    }
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "staff.list" => Some(with_db(state, req, staff_list)),
        "staff.create" => Some(with_db(state, req, staff_create)),
        "staff.update" => Some(with_db(state, req, staff_update)),
        "staff.delete" => Some(with_db(state, req, staff_delete)),
        _ => None,
    }
}
