use crate::ipc::helpers::{
    get_opt_str, get_required_str, parse_auth, require_manager, with_db, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

pub fn parse_gender(raw: &str) -> Option<&'static str> {
    // Rosters arrive with either letter convention: F/H female, M/V male.
    match raw.trim().to_ascii_uppercase().as_str() {
        "F" | "H" => Some("F"),
        "M" | "V" => Some("M"),
        _ => None,
    }
}

fn section_exists(conn: &Connection, section_id: &str) -> Result<bool, HandlerErr> {
    conn.query_row("SELECT 1 FROM sections WHERE id = ?", [section_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(HandlerErr::query)
}

fn students_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let section_id = get_required_str(params, "sectionId")?;
    if !section_exists(conn, &section_id)? {
        return Err(HandlerErr::not_found("section not found"));
    }

    let mut stmt = conn
        .prepare(
            "SELECT id, list_number, name, gender, id_number
             FROM students
             WHERE section_id = ?
             ORDER BY list_number",
        )
        .map_err(HandlerErr::query)?;
    let rows = stmt
        .query_map([&section_id], |row| {
            let id: String = row.get(0)?;
            let list_number: i64 = row.get(1)?;
            let name: String = row.get(2)?;
            let gender: String = row.get(3)?;
            let id_number: Option<String> = row.get(4)?;
            Ok(json!({
                "id": id,
                "listNumber": list_number,
                "name": name,
                "gender": gender,
                "idNumber": id_number
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;

    Ok(json!({ "students": rows }))
}

fn students_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let auth = parse_auth(params)?;
    require_manager(&auth)?;
    let section_id = get_required_str(params, "sectionId")?;
    let name = get_required_str(params, "name")?;
    let gender_raw = get_required_str(params, "gender")?;
    let Some(gender) = parse_gender(&gender_raw) else {
        return Err(HandlerErr::bad_params("gender must be F/H or M/V"));
    };
    let id_number = get_opt_str(params, "idNumber");

    if !section_exists(conn, &section_id)? {
        return Err(HandlerErr::not_found("section not found"));
    }

    let list_number = match params.get("listNumber").and_then(|v| v.as_i64()) {
        Some(n) if n > 0 => n,
        Some(_) => return Err(HandlerErr::bad_params("listNumber must be positive")),
        None => {
            // Next ordinal within the section.
            conn.query_row(
                "SELECT COALESCE(MAX(list_number), 0) + 1 FROM students WHERE section_id = ?",
                [&section_id],
                |r| r.get::<_, i64>(0),
            )
            .map_err(HandlerErr::query)?
        }
    };

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, section_id, list_number, name, gender, id_number)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&id, &section_id, list_number, &name, gender, &id_number),
    )
    .map_err(|e| HandlerErr::update("students", e))?;
    Ok(json!({ "studentId": id, "listNumber": list_number }))
}

fn students_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let auth = parse_auth(params)?;
    require_manager(&auth)?;
    let student_id = get_required_str(params, "studentId")?;

    #[allow(clippy::type_complexity)]
    let existing: Option<(i64, String, String, Option<String>)> = conn
        .query_row(
            "SELECT list_number, name, gender, id_number FROM students WHERE id = ?",
            [&student_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()
        .map_err(HandlerErr::query)?;
    let Some((cur_list, cur_name, cur_gender, cur_id_number)) = existing else {
        return Err(HandlerErr::not_found("student not found"));
    };

    let list_number = match params.get("listNumber").and_then(|v| v.as_i64()) {
        Some(n) if n > 0 => n,
        Some(_) => return Err(HandlerErr::bad_params("listNumber must be positive")),
        None => cur_list,
    };
    let name = get_opt_str(params, "name").unwrap_or(cur_name);
    let gender = match get_opt_str(params, "gender") {
        Some(raw) => parse_gender(&raw)
            .ok_or_else(|| HandlerErr::bad_params("gender must be F/H or M/V"))?
            .to_string(),
        None => cur_gender,
    };
    let id_number = get_opt_str(params, "idNumber").or(cur_id_number);

    conn.execute(
        "UPDATE students SET list_number = ?, name = ?, gender = ?, id_number = ? WHERE id = ?",
        (list_number, &name, &gender, &id_number, &student_id),
    )
    .map_err(|e| HandlerErr::update("students", e))?;
    Ok(json!({ "ok": true }))
}

fn students_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let auth = parse_auth(params)?;
    require_manager(&auth)?;
    let student_id = get_required_str(params, "studentId")?;

    let tx = conn.unchecked_transaction().map_err(HandlerErr::tx)?;
    tx.execute(
        "DELETE FROM absence_entries WHERE student_id = ?",
        [&student_id],
    )
    .map_err(|e| HandlerErr::update("absence_entries", e))?;
    let removed = tx
        .execute("DELETE FROM students WHERE id = ?", [&student_id])
        .map_err(|e| HandlerErr::update("students", e))?;
    tx.commit().map_err(HandlerErr::commit)?;

    if removed == 0 {
        return Err(HandlerErr::not_found("student not found"));
    }
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(with_db(state, req, students_list)),
        "students.create" => Some(with_db(state, req, students_create)),
        "students.update" => Some(with_db(state, req, students_update)),
        "students.delete" => Some(with_db(state, req, students_delete)),
        _ => None,
    }
}
