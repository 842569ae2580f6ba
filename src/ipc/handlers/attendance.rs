use crate::clock;
use crate::db;
use crate::ipc::helpers::{
    get_opt_str, get_required_count, get_required_str, parse_auth, with_db, AuthCtx, HandlerErr,
    Role,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

const DEFAULT_AUTO_PRESENCE_NOTE: &str = "marked present from class attendance report";

#[derive(Debug, Clone)]
struct AbsenceInput {
    student_id: String,
    note: Option<String>,
}

#[derive(Debug, Clone)]
struct BlockInfo {
    section_id: String,
    teacher_id: String,
}

fn load_block(conn: &Connection, block_id: &str) -> Result<BlockInfo, HandlerErr> {
    conn.query_row(
        "SELECT section_id, teacher_id FROM class_blocks WHERE id = ?",
        [block_id],
        |r| {
            Ok(BlockInfo {
                section_id: r.get(0)?,
                teacher_id: r.get(1)?,
            })
        },
    )
    .optional()
    .map_err(HandlerErr::query)?
    .ok_or_else(|| HandlerErr::not_found("block not found"))
}

fn check_filing_scope(
    conn: &Connection,
    auth: &AuthCtx,
    block: &BlockInfo,
) -> Result<(), HandlerErr> {
    match auth.role {
        Role::Admin => Ok(()),
        Role::Teacher => {
            if auth.staff_id.as_deref() == Some(block.teacher_id.as_str()) {
                Ok(())
            } else {
                Err(HandlerErr::not_authorized(
                    "teachers may only file for their own blocks",
                ))
            }
        }
        Role::Coordinator => {
            let department: Option<String> = conn
                .query_row(
                    "SELECT department_id FROM sections WHERE id = ?",
                    [&block.section_id],
                    |r| r.get(0),
                )
                .optional()
                .map_err(HandlerErr::query)?
                .flatten();
            if department.as_deref() == auth.department_scope() {
                Ok(())
            } else {
                Err(HandlerErr::not_authorized(
                    "block belongs to another department",
                ))
            }
        }
    }
}

fn parse_absences(params: &serde_json::Value) -> Result<Vec<AbsenceInput>, HandlerErr> {
    let Some(raw) = params.get("absences") else {
        return Ok(Vec::new());
    };
    if raw.is_null() {
        return Ok(Vec::new());
    }
    let Some(items) = raw.as_array() else {
        return Err(HandlerErr::bad_params("absences must be an array"));
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let student_id = item
            .get("studentId")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| HandlerErr::bad_params("absences entries need studentId"))?;
        let note = item
            .get("note")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        out.push(AbsenceInput { student_id, note });
    }
    Ok(out)
}

fn setup_string(conn: &Connection, key: &str, field: &str, default: &str) -> String {
    if let Ok(Some(section)) = db::settings_get_json(conn, key) {
        if let Some(value) = section.get(field).and_then(|v| v.as_str()) {
            return value.to_string();
        }
    }
    default.to_string()
}

/// Mark the block's teacher present for the date as a side effect of filing.
/// Best-effort: the caller reports the outcome in-band and never fails the
/// primary submission over it.
fn auto_mark_teacher_present(
    conn: &Connection,
    teacher_id: &str,
    date: &str,
    recorder_id: Option<&str>,
) -> Result<(), rusqlite::Error> {
    let note = setup_string(
        conn,
        "setup.attendance",
        "autoPresenceNote",
        DEFAULT_AUTO_PRESENCE_NOTE,
    );
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO personnel_attendance(id, staff_id, recorder_id, date, present, reason_code, note)
         VALUES(?, ?, ?, ?, 1, NULL, ?)
         ON CONFLICT(staff_id, date) DO UPDATE SET
           present = 1,
           reason_code = NULL,
           note = excluded.note,
           recorder_id = excluded.recorder_id",
        (&id, teacher_id, &recorder_id, date, &note),
    )?;
    Ok(())
}

fn attendance_upsert(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let auth = parse_auth(params)?;
    let block_id = get_required_str(params, "blockId")?;
    let block = load_block(conn, &block_id)?;
    check_filing_scope(conn, &auth, &block)?;

    let date = match get_opt_str(params, "date") {
        Some(d) => {
            if !clock::is_valid_date(&d) {
                return Err(HandlerErr::bad_params("date must be YYYY-MM-DD"));
            }
            d
        }
        None => clock::today().date,
    };
    let topic = get_required_str(params, "topic")?;
    let incident_notes = get_opt_str(params, "incidentNotes");
    let count_female = get_required_count(params, "countFemale")?;
    let count_male = get_required_count(params, "countMale")?;
    let count_total = get_required_count(params, "countTotal")?;
    let absences = parse_absences(params)?;

    // Absentees must be students of the block's section.
    for absence in &absences {
        let section: Option<String> = conn
            .query_row(
                "SELECT section_id FROM students WHERE id = ?",
                [&absence.student_id],
                |r| r.get(0),
            )
            .optional()
            .map_err(HandlerErr::query)?;
        match section {
            None => return Err(HandlerErr::not_found("absent student not found")),
            Some(sec) if sec != block.section_id => {
                return Err(HandlerErr::bad_params(
                    "absent student is not in the block's section",
                ))
            }
            Some(_) => {}
        }
    }

    let existing_id: Option<String> = conn
        .query_row(
            "SELECT id FROM attendance_records WHERE block_id = ? AND date = ?",
            (&block_id, &date),
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::query)?;
    let created = existing_id.is_none();

    let tx = conn.unchecked_transaction().map_err(HandlerErr::tx)?;
    let new_id = Uuid::new_v4().to_string();
    let created_at = clock::now_stamp();
    // The unique key keeps this to one row per (block, date) even when two
    // submissions race; the conflict path replaces the scalars in place.
    tx.execute(
        "INSERT INTO attendance_records(id, block_id, date, topic, incident_notes,
                                        count_female, count_male, count_total, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(block_id, date) DO UPDATE SET
           topic = excluded.topic,
           incident_notes = excluded.incident_notes,
           count_female = excluded.count_female,
           count_male = excluded.count_male,
           count_total = excluded.count_total",
        (
            &new_id,
            &block_id,
            &date,
            &topic,
            &incident_notes,
            count_female,
            count_male,
            count_total,
            &created_at,
        ),
    )
    .map_err(|e| HandlerErr::update("attendance_records", e))?;

    let record_id: String = tx
        .query_row(
            "SELECT id FROM attendance_records WHERE block_id = ? AND date = ?",
            (&block_id, &date),
            |r| r.get(0),
        )
        .map_err(HandlerErr::query)?;

    // The absence set is replaced wholesale, never merged.
    tx.execute(
        "DELETE FROM absence_entries WHERE record_id = ?",
        [&record_id],
    )
    .map_err(|e| HandlerErr::update("absence_entries", e))?;
    for absence in &absences {
        tx.execute(
            "INSERT INTO absence_entries(id, record_id, student_id, note)
             VALUES(?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                &record_id,
                &absence.student_id,
                &absence.note,
            ),
        )
        .map_err(|e| HandlerErr::update("absence_entries", e))?;
    }
    tx.commit().map_err(HandlerErr::commit)?;

    let auto_presence =
        match auto_mark_teacher_present(conn, &block.teacher_id, &date, auth.staff_id.as_deref()) {
            Ok(()) => "applied",
            Err(_) => "failed",
        };

    Ok(json!({
        "attendanceId": record_id,
        "created": created,
        "date": date,
        "autoPresence": auto_presence
    }))
}

fn attendance_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let block_id = get_required_str(params, "blockId")?;
    let date = get_required_str(params, "date")?;

    #[allow(clippy::type_complexity)]
    let record: Option<(String, String, Option<String>, i64, i64, i64, String)> = conn
        .query_row(
            "SELECT id, topic, incident_notes, count_female, count_male, count_total, created_at
             FROM attendance_records WHERE block_id = ? AND date = ?",
            (&block_id, &date),
            |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                    r.get(5)?,
                    r.get(6)?,
                ))
            },
        )
        .optional()
        .map_err(HandlerErr::query)?;
    let Some((id, topic, incident_notes, count_female, count_male, count_total, created_at)) =
        record
    else {
        return Err(HandlerErr::not_found("no attendance record for block/date"));
    };

    let mut stmt = conn
        .prepare(
            "SELECT ae.student_id, s.name, s.list_number, ae.note
             FROM absence_entries ae
             JOIN students s ON s.id = ae.student_id
             WHERE ae.record_id = ?
             ORDER BY s.list_number",
        )
        .map_err(HandlerErr::query)?;
    let absences = stmt
        .query_map([&id], |row| {
            let student_id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let list_number: i64 = row.get(2)?;
            let note: Option<String> = row.get(3)?;
            Ok(json!({
                "studentId": student_id,
                "name": name,
                "listNumber": list_number,
                "note": note
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;

    Ok(json!({
        "id": id,
        "blockId": block_id,
        "date": date,
        "topic": topic,
        "incidentNotes": incident_notes,
        "countFemale": count_female,
        "countMale": count_male,
        "countTotal": count_total,
        "createdAt": created_at,
        "absences": absences
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.upsert" => Some(with_db(state, req, attendance_upsert)),
        "attendance.get" => Some(with_db(state, req, attendance_get)),
        _ => None,
    }
}
