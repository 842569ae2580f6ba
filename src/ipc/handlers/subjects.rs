use crate::ipc::helpers::{
    get_required_str, parse_auth, require_manager, with_db, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

fn subjects_list(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT
               s.id,
               s.name,
               (SELECT COUNT(*) FROM class_blocks b WHERE b.subject_id = s.id) AS block_count
             FROM subjects s
             ORDER BY s.name",
        )
        .map_err(HandlerErr::query)?;
    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let block_count: i64 = row.get(2)?;
            Ok(json!({ "id": id, "name": name, "blockCount": block_count }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "subjects": rows }))
}

fn subjects_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let auth = parse_auth(params)?;
    require_manager(&auth)?;
    let name = get_required_str(params, "name")?;

    let id = Uuid::new_v4().to_string();
    conn.execute("INSERT INTO subjects(id, name) VALUES(?, ?)", (&id, &name))
        .map_err(|e| HandlerErr::update("subjects", e))?;
    Ok(json!({ "subjectId": id }))
}

fn subjects_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let auth = parse_auth(params)?;
    require_manager(&auth)?;
    let subject_id = get_required_str(params, "subjectId")?;
    let name = get_required_str(params, "name")?;

    let changed = conn
        .execute(
            "UPDATE subjects SET name = ? WHERE id = ?",
            (&name, &subject_id),
        )
        .map_err(|e| HandlerErr::update("subjects", e))?;
    if changed == 0 {
        return Err(HandlerErr::not_found("subject not found"));
    }
    Ok(json!({ "ok": true }))
}

fn subjects_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let auth = parse_auth(params)?;
    require_manager(&auth)?;
    let subject_id = get_required_str(params, "subjectId")?;

    let blocks: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM class_blocks WHERE subject_id = ?",
            [&subject_id],
            |r| r.get(0),
        )
        .map_err(HandlerErr::query)?;
    if blocks > 0 {
        return Err(HandlerErr::bad_params(
            "subject is still referenced by scheduled blocks",
        ));
    }

    conn.execute("DELETE FROM subjects WHERE id = ?", [&subject_id])
        .map_err(|e| HandlerErr::update("subjects", e))?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subjects.list" => Some(with_db(state, req, subjects_list)),
        "subjects.create" => Some(with_db(state, req, subjects_create)),
        "subjects.update" => Some(with_db(state, req, subjects_update)),
        "subjects.delete" => Some(with_db(state, req, subjects_delete)),
        _ => None,
    }
}
