use crate::clock;
use crate::ipc::handlers::summary::daily_summary;
use crate::ipc::helpers::{
    csv_quote, get_opt_str, get_required_str, parse_auth, require_manager, with_db,
    write_text_file, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};

fn str_at<'a>(value: &'a Value, pointer: &str) -> &'a str {
    value.pointer(pointer).and_then(|v| v.as_str()).unwrap_or("")
}

fn num_at(value: &Value, pointer: &str) -> i64 {
    value.pointer(pointer).and_then(|v| v.as_i64()).unwrap_or(0)
}

/// Flatten the academic daily summary to a small CSV report: the scalar
/// rollups first, then the pending blocks and absent students as sections.
fn export_summary(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let auth = parse_auth(params)?;
    require_manager(&auth)?;
    let out_path = get_required_str(params, "outPath")?;
    let date = match get_opt_str(params, "date") {
        Some(d) => {
            if !clock::is_valid_date(&d) {
                return Err(HandlerErr::bad_params("date must be YYYY-MM-DD"));
            }
            d
        }
        None => clock::today().date,
    };

    let summary = daily_summary(conn, &date, &auth)?;

    let mut csv = String::new();
    csv.push_str("metric,value\n");
    csv.push_str(&format!("date,{}\n", str_at(&summary, "/date")));
    csv.push_str(&format!("weekday,{}\n", str_at(&summary, "/weekday")));
    if str_at(&summary, "/view") == "operations" {
        csv.push_str(&format!("staff_total,{}\n", num_at(&summary, "/staffTotal")));
        csv.push_str(&format!(
            "absent_today,{}\n",
            num_at(&summary, "/absentToday")
        ));
        csv.push_str(&format!(
            "presence_pct,{}\n",
            str_at(&summary, "/presencePct")
        ));
    } else {
        csv.push_str(&format!(
            "enrollment_total,{}\n",
            num_at(&summary, "/enrollment/total")
        ));
        csv.push_str(&format!(
            "enrollment_female,{}\n",
            num_at(&summary, "/enrollment/female")
        ));
        csv.push_str(&format!(
            "enrollment_male,{}\n",
            num_at(&summary, "/enrollment/male")
        ));
        csv.push_str(&format!(
            "scheduled_today_total,{}\n",
            num_at(&summary, "/scheduledToday/total")
        ));
        csv.push_str(&format!(
            "reported_present,{}\n",
            num_at(&summary, "/reported/present/total")
        ));
        csv.push_str(&format!(
            "reported_absent,{}\n",
            num_at(&summary, "/reported/absent/total")
        ));
        csv.push_str(&format!(
            "attendance_pct,{}\n",
            str_at(&summary, "/attendancePct")
        ));
        csv.push_str(&format!(
            "blocks_scheduled,{}\n",
            num_at(&summary, "/blocks/scheduled")
        ));
        csv.push_str(&format!(
            "blocks_reported,{}\n",
            num_at(&summary, "/blocks/reported")
        ));

        if let Some(pending) = summary.get("pendingBlocks").and_then(|v| v.as_array()) {
            csv.push('\n');
            csv.push_str("pending_block,teacher,section,subject,start,end\n");
            for block in pending {
                csv.push_str(&format!(
                    "{},{},{},{},{},{}\n",
                    csv_quote(str_at(block, "/id")),
                    csv_quote(str_at(block, "/teacherName")),
                    csv_quote(str_at(block, "/sectionName")),
                    csv_quote(str_at(block, "/subjectName")),
                    str_at(block, "/startTime"),
                    str_at(block, "/endTime"),
                ));
            }
        }
        if let Some(absent) = summary.get("absentStudents").and_then(|v| v.as_array()) {
            csv.push('\n');
            csv.push_str("absent_student,gender,section,note\n");
            for student in absent {
                csv.push_str(&format!(
                    "{},{},{},{}\n",
                    csv_quote(str_at(student, "/name")),
                    str_at(student, "/gender"),
                    csv_quote(str_at(student, "/sectionName")),
                    csv_quote(str_at(student, "/note")),
                ));
            }
        }
    }

    write_text_file(&out_path, &csv)?;
    Ok(json!({ "path": out_path, "date": date }))
}

fn export_roster(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let section_id = get_required_str(params, "sectionId")?;
    let out_path = get_required_str(params, "outPath")?;

    let section_name: Option<String> = conn
        .query_row(
            "SELECT name FROM sections WHERE id = ?",
            [&section_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::query)?;
    let Some(section_name) = section_name else {
        return Err(HandlerErr::not_found("section not found"));
    };

    let mut stmt = conn
        .prepare(
            "SELECT list_number, name, gender, id_number
             FROM students
             WHERE section_id = ?
             ORDER BY list_number",
        )
        .map_err(HandlerErr::query)?;
    let rows = stmt
        .query_map([&section_id], |row| {
            let list_number: i64 = row.get(0)?;
            let name: String = row.get(1)?;
            let gender: String = row.get(2)?;
            let id_number: Option<String> = row.get(3)?;
            Ok((list_number, name, gender, id_number))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;

    let mut csv = String::from("list_number,name,gender,id_number\n");
    let mut rows_exported = 0usize;
    for (list_number, name, gender, id_number) in rows {
        rows_exported += 1;
        csv.push_str(&format!(
            "{},{},{},{}\n",
            list_number,
            csv_quote(&name),
            gender,
            csv_quote(id_number.as_deref().unwrap_or("")),
        ));
    }

    write_text_file(&out_path, &csv)?;
    Ok(json!({
        "path": out_path,
        "sectionName": section_name,
        "rowsExported": rows_exported
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.exportSummary" => Some(with_db(state, req, export_summary)),
        "reports.exportRoster" => Some(with_db(state, req, export_roster)),
        _ => None,
    }
}
