use crate::clock;
use crate::ipc::helpers::{
    get_bool, get_opt_str, get_required_str, parse_auth, require_manager, with_db, AuthCtx,
    HandlerErr, Role,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

const REASON_CODES: [&str; 5] = [
    "unexcused",
    "medical_leave",
    "personal_leave",
    "vacation",
    "other",
];

fn check_staff_scope(
    conn: &Connection,
    auth: &AuthCtx,
    staff_id: &str,
) -> Result<(), HandlerErr> {
    let department: Option<Option<String>> = conn
        .query_row(
            "SELECT department_id FROM staff WHERE id = ?",
            [staff_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::query)?;
    let Some(department) = department else {
        return Err(HandlerErr::not_found("staff member not found"));
    };
    if auth.role == Role::Coordinator && department.as_deref() != auth.department_scope() {
        return Err(HandlerErr::not_authorized(
            "staff member belongs to another department",
        ));
    }
    Ok(())
}

fn personnel_upsert(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let auth = parse_auth(params)?;
    require_manager(&auth)?;
    let staff_id = get_required_str(params, "staffId")?;
    check_staff_scope(conn, &auth, &staff_id)?;

    let date = get_required_str(params, "date")?;
    if !clock::is_valid_date(&date) {
        return Err(HandlerErr::bad_params("date must be YYYY-MM-DD"));
    }
    let present = get_bool(params, "present")?;
    let note = get_opt_str(params, "note");

    // A present person has no absence reason, whatever the caller sent.
    let reason_code = if present {
        None
    } else {
        match get_opt_str(params, "reasonCode") {
            Some(code) if REASON_CODES.contains(&code.as_str()) => Some(code),
            Some(code) => {
                return Err(HandlerErr::bad_params(format!(
                    "unknown reasonCode: {}",
                    code
                )))
            }
            None => Some("unexcused".to_string()),
        }
    };

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO personnel_attendance(id, staff_id, recorder_id, date, present, reason_code, note)
         VALUES(?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(staff_id, date) DO UPDATE SET
           present = excluded.present,
           reason_code = excluded.reason_code,
           note = excluded.note,
           recorder_id = excluded.recorder_id",
        (
            &id,
            &staff_id,
            &auth.staff_id,
            &date,
            present as i64,
            &reason_code,
            &note,
        ),
    )
    .map_err(|e| HandlerErr::update("personnel_attendance", e))?;
    Ok(json!({ "ok": true }))
}

/// Clearing returns the staff member to the "no record" (pending) state.
/// Clearing an absent row is a benign no-op.
fn personnel_clear(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let auth = parse_auth(params)?;
    require_manager(&auth)?;
    let staff_id = get_required_str(params, "staffId")?;
    check_staff_scope(conn, &auth, &staff_id)?;
    let date = get_required_str(params, "date")?;

    let removed = conn
        .execute(
            "DELETE FROM personnel_attendance WHERE staff_id = ? AND date = ?",
            (&staff_id, &date),
        )
        .map_err(|e| HandlerErr::update("personnel_attendance", e))?;
    Ok(json!({ "ok": true, "removed": removed > 0 }))
}

fn personnel_list_for_date(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let auth = parse_auth(params)?;
    require_manager(&auth)?;
    let date = get_required_str(params, "date")?;
    if !clock::is_valid_date(&date) {
        return Err(HandlerErr::bad_params("date must be YYYY-MM-DD"));
    }
    let scope = auth.department_scope().map(|s| s.to_string());

    let base = "SELECT
           st.id, st.name, st.role, d.name,
           pa.present, pa.reason_code, pa.note, pa.recorder_id
         FROM staff st
         LEFT JOIN departments d ON d.id = st.department_id
         LEFT JOIN personnel_attendance pa ON pa.staff_id = st.id AND pa.date = ?1
         WHERE st.active = 1";
    let sql = match scope {
        Some(_) => format!("{} AND st.department_id = ?2 ORDER BY st.name", base),
        None => format!("{} ORDER BY st.name", base),
    };
    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::query)?;

    let map_row = |row: &rusqlite::Row| -> rusqlite::Result<serde_json::Value> {
        let id: String = row.get(0)?;
        let name: String = row.get(1)?;
        let role: String = row.get(2)?;
        let department_name: Option<String> = row.get(3)?;
        let present: Option<i64> = row.get(4)?;
        let reason_code: Option<String> = row.get(5)?;
        let note: Option<String> = row.get(6)?;
        let recorder_id: Option<String> = row.get(7)?;
        let status = match present {
            None => "pending",
            Some(0) => "absent",
            Some(_) => "present",
        };
        Ok(json!({
            "staffId": id,
            "name": name,
            "role": role,
            "departmentName": department_name,
            "status": status,
            "reasonCode": reason_code,
            "note": note,
            "recorderId": recorder_id
        }))
    };

    let rows = match scope {
        Some(dep) => stmt
            .query_map([date.as_str(), dep.as_str()], map_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>()),
        None => stmt
            .query_map([date.as_str()], map_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>()),
    }
    .map_err(HandlerErr::query)?;

    Ok(json!({ "date": date, "staff": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "personnel.upsert" => Some(with_db(state, req, personnel_upsert)),
        "personnel.clear" => Some(with_db(state, req, personnel_clear)),
        "personnel.listForDate" => Some(with_db(state, req, personnel_list_for_date)),
        _ => None,
    }
}
