use crate::clock;
use crate::ipc::helpers::{
    get_opt_str, get_required_str, parse_auth, require_manager, with_db, AuthCtx, HandlerErr, Role,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct BlockRow {
    pub id: String,
    pub section_id: String,
    pub section_name: String,
    pub subject_name: Option<String>,
    pub description: Option<String>,
    pub teacher_id: String,
    pub teacher_name: String,
    pub weekday: String,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone)]
pub enum BlockScope {
    All,
    Department(String),
    Teacher(String),
}

impl BlockScope {
    pub fn for_auth(auth: &AuthCtx) -> Result<Self, HandlerErr> {
        match auth.role {
            Role::Admin => Ok(Self::All),
            Role::Coordinator => auth
                .department_id
                .clone()
                .map(Self::Department)
                .ok_or_else(|| HandlerErr::bad_params("coordinator auth requires departmentId")),
            Role::Teacher => auth
                .staff_id
                .clone()
                .map(Self::Teacher)
                .ok_or_else(|| HandlerErr::bad_params("teacher auth requires staffId")),
        }
    }
}

/// Blocks active on one weekday, with display names resolved, in natural
/// schedule order (start time ascending).
pub fn blocks_for_day(
    conn: &Connection,
    weekday: &str,
    scope: &BlockScope,
) -> Result<Vec<BlockRow>, HandlerErr> {
    let base = "SELECT
           b.id, b.section_id, sec.name, sub.name, b.description,
           b.teacher_id, st.name, b.weekday, b.start_time, b.end_time
         FROM class_blocks b
         JOIN sections sec ON sec.id = b.section_id
         JOIN staff st ON st.id = b.teacher_id
         LEFT JOIN subjects sub ON sub.id = b.subject_id
         WHERE b.weekday = ?1";
    let sql = match scope {
        BlockScope::All => format!("{} ORDER BY b.start_time", base),
        BlockScope::Department(_) => {
            format!("{} AND sec.department_id = ?2 ORDER BY b.start_time", base)
        }
        BlockScope::Teacher(_) => {
            format!("{} AND b.teacher_id = ?2 ORDER BY b.start_time", base)
        }
    };
    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::query)?;

    let map_row = |row: &rusqlite::Row| -> rusqlite::Result<BlockRow> {
        Ok(BlockRow {
            id: row.get(0)?,
            section_id: row.get(1)?,
            section_name: row.get(2)?,
            subject_name: row.get(3)?,
            description: row.get(4)?,
            teacher_id: row.get(5)?,
            teacher_name: row.get(6)?,
            weekday: row.get(7)?,
            start_time: row.get(8)?,
            end_time: row.get(9)?,
        })
    };

    match scope {
        BlockScope::All => stmt
            .query_map([weekday], map_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>()),
        BlockScope::Department(dep) => stmt
            .query_map([weekday, dep.as_str()], map_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>()),
        BlockScope::Teacher(teacher) => stmt
            .query_map([weekday, teacher.as_str()], map_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>()),
    }
    .map_err(HandlerErr::query)
}

pub fn block_json(b: &BlockRow) -> serde_json::Value {
    json!({
        "id": b.id,
        "sectionId": b.section_id,
        "sectionName": b.section_name,
        "subjectName": b.subject_name,
        "description": b.description,
        "teacherId": b.teacher_id,
        "teacherName": b.teacher_name,
        "weekday": b.weekday,
        "startTime": b.start_time,
        "endTime": b.end_time
    })
}

fn is_valid_hhmm(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() != 5 || bytes[2] != b':' {
        return false;
    }
    let digits = [bytes[0], bytes[1], bytes[3], bytes[4]];
    if !digits.iter().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let hour = (bytes[0] - b'0') * 10 + (bytes[1] - b'0');
    let minute = (bytes[3] - b'0') * 10 + (bytes[4] - b'0');
    hour < 24 && minute < 60
}

fn blocks_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let auth = parse_auth(params)?;
    require_manager(&auth)?;
    let section_id = get_required_str(params, "sectionId")?;
    let teacher_id = get_required_str(params, "teacherId")?;
    let weekday = get_required_str(params, "weekday")?.to_ascii_lowercase();
    let start_time = get_required_str(params, "startTime")?;
    let end_time = get_required_str(params, "endTime")?;
    let subject_id = get_opt_str(params, "subjectId");
    let description = get_opt_str(params, "description");

    if !clock::is_valid_weekday(&weekday) {
        return Err(HandlerErr::bad_params("weekday must be monday..sunday"));
    }
    if !is_valid_hhmm(&start_time) || !is_valid_hhmm(&end_time) {
        return Err(HandlerErr::bad_params("times must be HH:MM"));
    }
    if start_time >= end_time {
        return Err(HandlerErr::bad_params("startTime must be before endTime"));
    }
    // A block without a subject is a non-academic activity and needs a label.
    if subject_id.is_none() && description.is_none() {
        return Err(HandlerErr::bad_params(
            "subjectId or description is required",
        ));
    }

    let section_found: Option<i64> = conn
        .query_row("SELECT 1 FROM sections WHERE id = ?", [&section_id], |r| {
            r.get(0)
        })
        .optional()
        .map_err(HandlerErr::query)?;
    if section_found.is_none() {
        return Err(HandlerErr::not_found("section not found"));
    }
    let teacher_found: Option<i64> = conn
        .query_row("SELECT 1 FROM staff WHERE id = ?", [&teacher_id], |r| {
            r.get(0)
        })
        .optional()
        .map_err(HandlerErr::query)?;
    if teacher_found.is_none() {
        return Err(HandlerErr::not_found("teacher not found"));
    }
    if let Some(sub) = subject_id.as_deref() {
        let found: Option<i64> = conn
            .query_row("SELECT 1 FROM subjects WHERE id = ?", [sub], |r| r.get(0))
            .optional()
            .map_err(HandlerErr::query)?;
        if found.is_none() {
            return Err(HandlerErr::not_found("subject not found"));
        }
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO class_blocks(id, section_id, subject_id, teacher_id, weekday,
                                  start_time, end_time, description)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &section_id,
            &subject_id,
            &teacher_id,
            &weekday,
            &start_time,
            &end_time,
            &description,
        ),
    )
    .map_err(|e| HandlerErr::update("class_blocks", e))?;
    Ok(json!({ "blockId": id }))
}

fn blocks_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let auth = parse_auth(params)?;
    require_manager(&auth)?;
    let block_id = get_required_str(params, "blockId")?;

    #[allow(clippy::type_complexity)]
    let existing: Option<(String, Option<String>, String, String, String, Option<String>)> = conn
        .query_row(
            "SELECT teacher_id, subject_id, weekday, start_time, end_time, description
             FROM class_blocks WHERE id = ?",
            [&block_id],
            |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                    r.get(5)?,
                ))
            },
        )
        .optional()
        .map_err(HandlerErr::query)?;
    let Some((cur_teacher, cur_subject, cur_weekday, cur_start, cur_end, cur_description)) =
        existing
    else {
        return Err(HandlerErr::not_found("block not found"));
    };

    let teacher_id = get_opt_str(params, "teacherId").unwrap_or(cur_teacher);
    let subject_id = match params.get("subjectId") {
        Some(v) if v.is_null() => None,
        Some(v) => v.as_str().map(|s| s.trim().to_string()),
        None => cur_subject,
    };
    let weekday = get_opt_str(params, "weekday")
        .map(|w| w.to_ascii_lowercase())
        .unwrap_or(cur_weekday);
    let start_time = get_opt_str(params, "startTime").unwrap_or(cur_start);
    let end_time = get_opt_str(params, "endTime").unwrap_or(cur_end);
    let description = get_opt_str(params, "description").or(cur_description);

    if !clock::is_valid_weekday(&weekday) {
        return Err(HandlerErr::bad_params("weekday must be monday..sunday"));
    }
    if !is_valid_hhmm(&start_time) || !is_valid_hhmm(&end_time) {
        return Err(HandlerErr::bad_params("times must be HH:MM"));
    }
    if start_time >= end_time {
        return Err(HandlerErr::bad_params("startTime must be before endTime"));
    }
    if subject_id.is_none() && description.is_none() {
        return Err(HandlerErr::bad_params(
            "subjectId or description is required",
        ));
    }

    conn.execute(
        "UPDATE class_blocks
         SET teacher_id = ?, subject_id = ?, weekday = ?, start_time = ?, end_time = ?, description = ?
         WHERE id = ?",
        (
            &teacher_id,
            &subject_id,
            &weekday,
            &start_time,
            &end_time,
            &description,
            &block_id,
        ),
    )
    .map_err(|e| HandlerErr::update("class_blocks", e))?;
    Ok(json!({ "ok": true }))
}

fn blocks_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let auth = parse_auth(params)?;
    require_manager(&auth)?;
    let block_id = get_required_str(params, "blockId")?;

    let tx = conn.unchecked_transaction().map_err(HandlerErr::tx)?;
    tx.execute(
        "DELETE FROM absence_entries WHERE record_id IN (
           SELECT id FROM attendance_records WHERE block_id = ?
         )",
        [&block_id],
    )
    .map_err(|e| HandlerErr::update("absence_entries", e))?;
    tx.execute(
        "DELETE FROM attendance_records WHERE block_id = ?",
        [&block_id],
    )
    .map_err(|e| HandlerErr::update("attendance_records", e))?;
    let removed = tx
        .execute("DELETE FROM class_blocks WHERE id = ?", [&block_id])
        .map_err(|e| HandlerErr::update("class_blocks", e))?;
    tx.commit().map_err(HandlerErr::commit)?;

    if removed == 0 {
        return Err(HandlerErr::not_found("block not found"));
    }
    Ok(json!({ "ok": true }))
}

fn blocks_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let section_id = get_opt_str(params, "sectionId");
    let base = "SELECT
           b.id, b.section_id, sec.name, sub.name, b.description,
           b.teacher_id, st.name, b.weekday, b.start_time, b.end_time
         FROM class_blocks b
         JOIN sections sec ON sec.id = b.section_id
         JOIN staff st ON st.id = b.teacher_id
         LEFT JOIN subjects sub ON sub.id = b.subject_id";
    let sql = match section_id {
        Some(_) => format!(
            "{} WHERE b.section_id = ? ORDER BY b.weekday, b.start_time",
            base
        ),
        None => format!("{} ORDER BY b.weekday, b.start_time", base),
    };
    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::query)?;

    let map_row = |row: &rusqlite::Row| -> rusqlite::Result<BlockRow> {
        Ok(BlockRow {
            id: row.get(0)?,
            section_id: row.get(1)?,
            section_name: row.get(2)?,
            subject_name: row.get(3)?,
            description: row.get(4)?,
            teacher_id: row.get(5)?,
            teacher_name: row.get(6)?,
            weekday: row.get(7)?,
            start_time: row.get(8)?,
            end_time: row.get(9)?,
        })
    };
    let rows = match section_id {
        Some(sec) => stmt
            .query_map([&sec], map_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>()),
        None => stmt
            .query_map([], map_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>()),
    }
    .map_err(HandlerErr::query)?;

    Ok(json!({ "blocks": rows.iter().map(block_json).collect::<Vec<_>>() }))
}

fn schedule_for_day(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let auth = parse_auth(params)?;
    let scope = BlockScope::for_auth(&auth)?;

    let weekday = match get_opt_str(params, "weekday") {
        Some(w) => {
            let w = w.to_ascii_lowercase();
            if !clock::is_valid_weekday(&w) {
                return Err(HandlerErr::bad_params("weekday must be monday..sunday"));
            }
            w
        }
        None => match get_opt_str(params, "date") {
            Some(date) => clock::weekday_for_date(&date)
                .map_err(|e| HandlerErr::bad_params(e.to_string()))?
                .to_string(),
            None => clock::today().weekday.to_string(),
        },
    };

    let blocks = blocks_for_day(conn, &weekday, &scope)?;
    Ok(json!({
        "weekday": weekday,
        "blocks": blocks.iter().map(block_json).collect::<Vec<_>>()
    }))
}

/// The caller's blocks whose time range contains the current school-zone
/// wall-clock time.
fn schedule_current(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let auth = parse_auth(params)?;
    let scope = BlockScope::for_auth(&auth)?;

    let day = clock::today();
    let now = clock::current_time_hhmm();
    let blocks = blocks_for_day(conn, day.weekday, &scope)?;
    let current: Vec<serde_json::Value> = blocks
        .iter()
        .filter(|b| b.start_time.as_str() <= now.as_str() && now.as_str() < b.end_time.as_str())
        .map(block_json)
        .collect();

    Ok(json!({
        "date": day.date,
        "weekday": day.weekday,
        "time": now,
        "blocks": current
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "blocks.list" => Some(with_db(state, req, blocks_list)),
        "blocks.create" => Some(with_db(state, req, blocks_create)),
        "blocks.update" => Some(with_db(state, req, blocks_update)),
        "blocks.delete" => Some(with_db(state, req, blocks_delete)),
        "schedule.forDay" => Some(with_db(state, req, schedule_for_day)),
        "schedule.current" => Some(with_db(state, req, schedule_current)),
        _ => None,
    }
}
