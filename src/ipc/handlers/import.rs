use crate::clock;
use crate::ipc::handlers::students::parse_gender;
use crate::ipc::helpers::{
    get_required_str, non_empty_trimmed, parse_auth, parse_boolish, parse_csv_record,
    require_manager, with_db, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::matching::{extract_time, match_name};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct NamedRow {
    id: String,
    name: String,
}

fn load_named(conn: &Connection, sql: &str) -> Result<Vec<NamedRow>, HandlerErr> {
    let mut stmt = conn.prepare(sql).map_err(HandlerErr::query)?;
    stmt.query_map([], |row| {
        Ok(NamedRow {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(HandlerErr::query)
}

fn header_index(header_fields: &[String]) -> HashMap<String, usize> {
    let mut idx = HashMap::new();
    for (i, f) in header_fields.iter().enumerate() {
        idx.insert(f.clone(), i);
    }
    idx
}

fn named_json(row: Option<&NamedRow>) -> Value {
    match row {
        Some(r) => json!({ "id": r.id, "name": r.name }),
        None => Value::Null,
    }
}

// ---- schedule import -------------------------------------------------------

#[derive(Debug, Clone)]
struct ScheduleRow {
    line_no: usize,
    day_raw: String,
    start_raw: String,
    end_raw: String,
    section_raw: String,
    subject_raw: String,
    teacher_raw: String,
}

fn parse_schedule_rows(text: &str) -> (Vec<ScheduleRow>, Vec<Value>) {
    let mut warnings = Vec::new();
    let mut rows = Vec::new();
    let lines = text.lines().collect::<Vec<_>>();
    if lines.is_empty() {
        return (rows, warnings);
    }

    let header_fields = parse_csv_record(lines[0])
        .into_iter()
        .map(|s| s.trim().to_ascii_lowercase())
        .collect::<Vec<_>>();
    let idx = header_index(&header_fields);
    let day_col = idx.get("day").copied().unwrap_or(0);
    let start_col = idx.get("start").copied().unwrap_or(1);
    let end_col = idx.get("end").copied().unwrap_or(2);
    let section_col = idx.get("section").copied().unwrap_or(3);
    let subject_col = idx.get("subject").copied().unwrap_or(4);
    let teacher_col = idx.get("teacher").copied().unwrap_or(5);

    for (line_no, raw_line) in lines.iter().enumerate().skip(1) {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        let fields = parse_csv_record(line);
        let get = |col: usize| fields.get(col).map(|s| s.trim().to_string()).unwrap_or_default();

        let row = ScheduleRow {
            line_no: line_no + 1,
            day_raw: get(day_col),
            start_raw: get(start_col),
            end_raw: get(end_col),
            section_raw: get(section_col),
            subject_raw: get(subject_col),
            teacher_raw: get(teacher_col),
        };
        if row.teacher_raw.is_empty() || row.section_raw.is_empty() {
            warnings.push(json!({
                "line": row.line_no,
                "code": "missing_fields",
                "message": "section and teacher are required"
            }));
            continue;
        }
        rows.push(row);
    }

    (rows, warnings)
}

#[derive(Debug)]
struct ResolvedScheduleRow {
    weekday: Option<String>,
    start_time: String,
    end_time: String,
    section: Option<NamedRow>,
    subject: Option<NamedRow>,
    teacher: Option<NamedRow>,
}

impl ResolvedScheduleRow {
    fn complete(&self) -> bool {
        self.weekday.is_some()
            && !self.start_time.is_empty()
            && !self.end_time.is_empty()
            && self.section.is_some()
            && self.subject.is_some()
            && self.teacher.is_some()
            && self.start_time < self.end_time
    }
}

fn resolve_schedule_row(
    row: &ScheduleRow,
    sections: &[NamedRow],
    subjects: &[NamedRow],
    teachers: &[NamedRow],
) -> ResolvedScheduleRow {
    let day = row.day_raw.trim().to_ascii_lowercase();
    let weekday = if clock::is_valid_weekday(&day) {
        Some(day)
    } else {
        None
    };
    ResolvedScheduleRow {
        weekday,
        start_time: extract_time(&row.start_raw),
        end_time: extract_time(&row.end_raw),
        section: match_name(&row.section_raw, sections, |c| c.name.as_str()).cloned(),
        subject: match_name(&row.subject_raw, subjects, |c| c.name.as_str()).cloned(),
        teacher: match_name(&row.teacher_raw, teachers, |c| c.name.as_str()).cloned(),
    }
}

fn schedule_preview(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let auth = parse_auth(params)?;
    require_manager(&auth)?;
    let text = get_required_str(params, "text")?;

    let sections = load_named(conn, "SELECT id, name FROM sections ORDER BY name")?;
    let subjects = load_named(conn, "SELECT id, name FROM subjects ORDER BY name")?;
    let teachers = load_named(conn, "SELECT id, name FROM staff WHERE active = 1 ORDER BY name")?;

    let (rows, warnings) = parse_schedule_rows(&text);
    let mut resolved_count = 0usize;
    let preview: Vec<Value> = rows
        .iter()
        .map(|row| {
            let resolved = resolve_schedule_row(row, &sections, &subjects, &teachers);
            let complete = resolved.complete();
            if complete {
                resolved_count += 1;
            }
            json!({
                "line": row.line_no,
                "day": row.day_raw,
                "weekday": resolved.weekday,
                "startTime": resolved.start_time,
                "endTime": resolved.end_time,
                "section": named_json(resolved.section.as_ref()),
                "subject": named_json(resolved.subject.as_ref()),
                "teacher": named_json(resolved.teacher.as_ref()),
                "resolved": complete
            })
        })
        .collect();

    Ok(json!({
        "rows": preview,
        "resolvedCount": resolved_count,
        "totalRows": rows.len(),
        "warnings": warnings
    }))
}

fn schedule_apply(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let auth = parse_auth(params)?;
    require_manager(&auth)?;
    let text = get_required_str(params, "text")?;

    let sections = load_named(conn, "SELECT id, name FROM sections ORDER BY name")?;
    let subjects = load_named(conn, "SELECT id, name FROM subjects ORDER BY name")?;
    let teachers = load_named(conn, "SELECT id, name FROM staff WHERE active = 1 ORDER BY name")?;

    let (rows, mut warnings) = parse_schedule_rows(&text);
    let tx = conn.unchecked_transaction().map_err(HandlerErr::tx)?;
    let mut created = 0usize;
    let mut skipped = 0usize;
    for row in &rows {
        let resolved = resolve_schedule_row(row, &sections, &subjects, &teachers);
        if !resolved.complete() {
            skipped += 1;
            warnings.push(json!({
                "line": row.line_no,
                "code": "unresolved_row",
                "message": "row could not be fully matched and was skipped"
            }));
            continue;
        }
        // complete() checked every field above
        let (Some(weekday), Some(section), Some(subject), Some(teacher)) = (
            resolved.weekday.as_ref(),
            resolved.section.as_ref(),
            resolved.subject.as_ref(),
            resolved.teacher.as_ref(),
        ) else {
            skipped += 1;
            continue;
        };
        tx.execute(
            "INSERT INTO class_blocks(id, section_id, subject_id, teacher_id, weekday,
                                      start_time, end_time, description)
             VALUES(?, ?, ?, ?, ?, ?, ?, NULL)",
            (
                Uuid::new_v4().to_string(),
                &section.id,
                &subject.id,
                &teacher.id,
                weekday,
                &resolved.start_time,
                &resolved.end_time,
            ),
        )
        .map_err(|e| HandlerErr::update("class_blocks", e))?;
        created += 1;
    }
    tx.commit().map_err(HandlerErr::commit)?;

    Ok(json!({
        "created": created,
        "skipped": skipped,
        "warnings": warnings
    }))
}

// ---- roster import ---------------------------------------------------------

#[derive(Debug, Clone)]
struct RosterRow {
    line_no: usize,
    list_number: Option<i64>,
    name: String,
    gender: Option<&'static str>,
    id_number: Option<String>,
}

fn parse_roster_rows(text: &str) -> (Vec<RosterRow>, Vec<Value>) {
    let mut warnings = Vec::new();
    let mut rows = Vec::new();
    let lines = text.lines().collect::<Vec<_>>();
    if lines.is_empty() {
        return (rows, warnings);
    }

    let header_fields = parse_csv_record(lines[0])
        .into_iter()
        .map(|s| s.trim().to_ascii_lowercase())
        .collect::<Vec<_>>();
    let idx = header_index(&header_fields);
    let list_col = idx
        .get("list_number")
        .or_else(|| idx.get("number"))
        .copied()
        .unwrap_or(0);
    let name_col = idx.get("name").copied().unwrap_or(1);
    let gender_col = idx.get("gender").copied().unwrap_or(2);
    let id_col = idx.get("id_number").copied().unwrap_or(3);

    for (line_no, raw_line) in lines.iter().enumerate().skip(1) {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        let fields = parse_csv_record(line);

        let name = fields
            .get(name_col)
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        if name.is_empty() {
            warnings.push(json!({
                "line": line_no + 1,
                "code": "missing_name",
                "message": "name is required"
            }));
            continue;
        }
        let gender = fields.get(gender_col).and_then(|s| parse_gender(s));
        if gender.is_none() {
            warnings.push(json!({
                "line": line_no + 1,
                "code": "bad_gender",
                "message": "gender letter must be F/H or M/V"
            }));
        }
        let list_number = fields
            .get(list_col)
            .and_then(|s| s.trim().parse::<i64>().ok())
            .filter(|n| *n > 0);

        rows.push(RosterRow {
            line_no: line_no + 1,
            list_number,
            name,
            gender,
            id_number: fields.get(id_col).and_then(|s| non_empty_trimmed(s)),
        });
    }

    (rows, warnings)
}

fn roster_preview(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let auth = parse_auth(params)?;
    require_manager(&auth)?;
    let section_id = get_required_str(params, "sectionId")?;
    let text = get_required_str(params, "text")?;

    let section_found: Option<i64> = conn
        .query_row("SELECT 1 FROM sections WHERE id = ?", [&section_id], |r| {
            r.get(0)
        })
        .optional()
        .map_err(HandlerErr::query)?;
    if section_found.is_none() {
        return Err(HandlerErr::not_found("section not found"));
    }

    let (rows, warnings) = parse_roster_rows(&text);
    let preview: Vec<Value> = rows
        .iter()
        .map(|r| {
            json!({
                "line": r.line_no,
                "listNumber": r.list_number,
                "name": r.name,
                "gender": r.gender,
                "idNumber": r.id_number,
                "resolved": r.gender.is_some()
            })
        })
        .collect();

    Ok(json!({
        "rows": preview,
        "totalRows": rows.len(),
        "warnings": warnings
    }))
}

fn roster_apply(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let auth = parse_auth(params)?;
    require_manager(&auth)?;
    let section_id = get_required_str(params, "sectionId")?;
    let text = get_required_str(params, "text")?;

    let section_found: Option<i64> = conn
        .query_row("SELECT 1 FROM sections WHERE id = ?", [&section_id], |r| {
            r.get(0)
        })
        .optional()
        .map_err(HandlerErr::query)?;
    if section_found.is_none() {
        return Err(HandlerErr::not_found("section not found"));
    }

    let (rows, mut warnings) = parse_roster_rows(&text);
    let tx = conn.unchecked_transaction().map_err(HandlerErr::tx)?;
    let mut created = 0usize;
    let mut updated = 0usize;
    let mut skipped = 0usize;
    let mut next_list_number: i64 = tx
        .query_row(
            "SELECT COALESCE(MAX(list_number), 0) + 1 FROM students WHERE section_id = ?",
            [&section_id],
            |r| r.get(0),
        )
        .map_err(HandlerErr::query)?;

    for row in &rows {
        let Some(gender) = row.gender else {
            skipped += 1;
            continue;
        };
        let list_number = match row.list_number {
            Some(n) => n,
            None => {
                let n = next_list_number;
                next_list_number += 1;
                n
            }
        };

        // Re-applying a roster updates the row holding the same list number.
        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM students WHERE section_id = ? AND list_number = ?",
                (&section_id, list_number),
                |r| r.get(0),
            )
            .optional()
            .map_err(HandlerErr::query)?;
        match existing {
            Some(student_id) => {
                tx.execute(
                    "UPDATE students SET name = ?, gender = ?, id_number = ? WHERE id = ?",
                    (&row.name, gender, &row.id_number, &student_id),
                )
                .map_err(|e| HandlerErr::update("students", e))?;
                updated += 1;
            }
            None => {
                tx.execute(
                    "INSERT INTO students(id, section_id, list_number, name, gender, id_number)
                     VALUES(?, ?, ?, ?, ?, ?)",
                    (
                        Uuid::new_v4().to_string(),
                        &section_id,
                        list_number,
                        &row.name,
                        gender,
                        &row.id_number,
                    ),
                )
                .map_err(|e| HandlerErr::update("students", e))?;
                created += 1;
            }
        }
    }
    tx.commit().map_err(HandlerErr::commit)?;

    if skipped > 0 {
        warnings.push(json!({
            "code": "skipped_rows",
            "message": format!("{} rows with unusable gender letters were skipped", skipped)
        }));
    }
    Ok(json!({
        "created": created,
        "updated": updated,
        "skipped": skipped,
        "warnings": warnings
    }))
}

// ---- personnel import ------------------------------------------------------

#[derive(Debug, Clone)]
struct PersonnelRow {
    line_no: usize,
    name: String,
    id_number: Option<String>,
    role: String,
    department_raw: String,
    active: bool,
}

fn parse_personnel_rows(text: &str) -> (Vec<PersonnelRow>, Vec<Value>) {
    let mut warnings = Vec::new();
    let mut rows = Vec::new();
    let lines = text.lines().collect::<Vec<_>>();
    if lines.is_empty() {
        return (rows, warnings);
    }

    let header_fields = parse_csv_record(lines[0])
        .into_iter()
        .map(|s| s.trim().to_ascii_lowercase())
        .collect::<Vec<_>>();
    let idx = header_index(&header_fields);
    let name_col = idx.get("name").copied().unwrap_or(0);
    let id_col = idx.get("id_number").copied().unwrap_or(1);
    let role_col = idx.get("role").copied().unwrap_or(2);
    let department_col = idx.get("department").copied().unwrap_or(3);
    let active_col = idx.get("active").copied().unwrap_or(4);

    for (line_no, raw_line) in lines.iter().enumerate().skip(1) {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        let fields = parse_csv_record(line);

        let name = fields
            .get(name_col)
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        if name.is_empty() {
            warnings.push(json!({
                "line": line_no + 1,
                "code": "missing_name",
                "message": "name is required"
            }));
            continue;
        }
        let role = fields
            .get(role_col)
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "teacher".to_string());

        rows.push(PersonnelRow {
            line_no: line_no + 1,
            name,
            id_number: fields.get(id_col).and_then(|s| non_empty_trimmed(s)),
            role,
            department_raw: fields
                .get(department_col)
                .map(|s| s.trim().to_string())
                .unwrap_or_default(),
            active: fields
                .get(active_col)
                .and_then(|s| parse_boolish(s))
                .unwrap_or(true),
        });
    }

    (rows, warnings)
}

fn personnel_preview(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let auth = parse_auth(params)?;
    require_manager(&auth)?;
    let text = get_required_str(params, "text")?;

    let departments = load_named(conn, "SELECT id, name FROM departments ORDER BY name")?;
    let (rows, warnings) = parse_personnel_rows(&text);
    let preview: Vec<Value> = rows
        .iter()
        .map(|r| {
            let department = if r.department_raw.is_empty() {
                None
            } else {
                match_name(&r.department_raw, &departments, |c| c.name.as_str()).cloned()
            };
            json!({
                "line": r.line_no,
                "name": r.name,
                "idNumber": r.id_number,
                "role": r.role,
                "department": named_json(department.as_ref()),
                "active": r.active
            })
        })
        .collect();

    Ok(json!({
        "rows": preview,
        "totalRows": rows.len(),
        "warnings": warnings
    }))
}

fn personnel_apply(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let auth = parse_auth(params)?;
    require_manager(&auth)?;
    let text = get_required_str(params, "text")?;

    let departments = load_named(conn, "SELECT id, name FROM departments ORDER BY name")?;
    let (rows, warnings) = parse_personnel_rows(&text);

    let tx = conn.unchecked_transaction().map_err(HandlerErr::tx)?;
    let mut created = 0usize;
    let mut updated = 0usize;
    for row in &rows {
        let department_id = if row.department_raw.is_empty() {
            None
        } else {
            match_name(&row.department_raw, &departments, |c| c.name.as_str())
                .map(|d| d.id.clone())
        };

        // An id number identifies the person across re-imports.
        let existing: Option<String> = match row.id_number.as_deref() {
            Some(id_number) => tx
                .query_row(
                    "SELECT id FROM staff WHERE id_number = ?",
                    [id_number],
                    |r| r.get(0),
                )
                .optional()
                .map_err(HandlerErr::query)?,
            None => None,
        };
        match existing {
            Some(staff_id) => {
                tx.execute(
                    "UPDATE staff SET name = ?, role = ?, department_id = ?, active = ? WHERE id = ?",
                    (
                        &row.name,
                        &row.role,
                        &department_id,
                        row.active as i64,
                        &staff_id,
                    ),
                )
                .map_err(|e| HandlerErr::update("staff", e))?;
                updated += 1;
            }
            None => {
                tx.execute(
                    "INSERT INTO staff(id, department_id, name, id_number, role, active)
                     VALUES(?, ?, ?, ?, ?, ?)",
                    (
                        Uuid::new_v4().to_string(),
                        &department_id,
                        &row.name,
                        &row.id_number,
                        &row.role,
                        row.active as i64,
                    ),
                )
                .map_err(|e| HandlerErr::update("staff", e))?;
                created += 1;
            }
        }
    }
    tx.commit().map_err(HandlerErr::commit)?;

    Ok(json!({
        "created": created,
        "updated": updated,
        "warnings": warnings
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "import.schedule.preview" => Some(with_db(state, req, schedule_preview)),
        "import.schedule.apply" => Some(with_db(state, req, schedule_apply)),
        "import.roster.preview" => Some(with_db(state, req, roster_preview)),
        "import.roster.apply" => Some(with_db(state, req, roster_apply)),
        "import.personnel.preview" => Some(with_db(state, req, personnel_preview)),
        "import.personnel.apply" => Some(with_db(state, req, personnel_apply)),
        _ => None,
    }
}
