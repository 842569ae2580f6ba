use crate::clock;
use crate::ipc::handlers::schedule::{block_json, blocks_for_day, BlockScope};
use crate::ipc::helpers::{get_opt_str, parse_auth, with_db, AuthCtx, HandlerErr, Role};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, Default)]
struct GenderCounts {
    female: i64,
    male: i64,
}

impl GenderCounts {
    fn total(&self) -> i64 {
        self.female + self.male
    }

    fn json(&self) -> serde_json::Value {
        json!({ "total": self.total(), "female": self.female, "male": self.male })
    }
}

/// "0%" when nothing is reported yet; otherwise one decimal place.
fn attendance_percentage(present: i64, absent: i64) -> String {
    let denominator = present + absent;
    if denominator == 0 {
        return "0%".to_string();
    }
    format!("{:.1}%", present as f64 * 100.0 / denominator as f64)
}

fn gender_counts(
    conn: &Connection,
    sql: &str,
    params: &[&str],
) -> Result<GenderCounts, HandlerErr> {
    let mut stmt = conn.prepare(sql).map_err(HandlerErr::query)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    let mut counts = GenderCounts::default();
    for (gender, n) in rows {
        match gender.as_str() {
            "F" => counts.female = n,
            "M" => counts.male = n,
            _ => {}
        }
    }
    Ok(counts)
}

fn reported_block_ids(conn: &Connection, date: &str) -> Result<HashSet<String>, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT block_id FROM attendance_records WHERE date = ?")
        .map_err(HandlerErr::query)?;
    stmt.query_map([date], |row| row.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<HashSet<_>, _>>())
        .map_err(HandlerErr::query)
}

fn academic_summary(
    conn: &Connection,
    date: &str,
    weekday: &str,
    department: Option<&str>,
) -> Result<serde_json::Value, HandlerErr> {
    let enrollment = match department {
        Some(dep) => gender_counts(
            conn,
            "SELECT s.gender, COUNT(*)
             FROM students s
             JOIN sections sec ON sec.id = s.section_id
             WHERE sec.department_id = ?
             GROUP BY s.gender",
            &[dep],
        )?,
        None => gender_counts(
            conn,
            "SELECT gender, COUNT(*) FROM students GROUP BY gender",
            &[],
        )?,
    };

    // Only students whose section has at least one block today are expected
    // in class; this is usually a smaller number than total enrollment.
    let scheduled_today = match department {
        Some(dep) => gender_counts(
            conn,
            "SELECT s.gender, COUNT(*)
             FROM students s
             JOIN sections sec ON sec.id = s.section_id
             WHERE sec.department_id = ?1
               AND s.section_id IN (SELECT DISTINCT section_id FROM class_blocks WHERE weekday = ?2)
             GROUP BY s.gender",
            &[dep, weekday],
        )?,
        None => gender_counts(
            conn,
            "SELECT gender, COUNT(*)
             FROM students
             WHERE section_id IN (SELECT DISTINCT section_id FROM class_blocks WHERE weekday = ?1)
             GROUP BY gender",
            &[weekday],
        )?,
    };

    let (present_female, present_male, present_total): (i64, i64, i64) = {
        let base = "SELECT COALESCE(SUM(ar.count_female), 0),
                           COALESCE(SUM(ar.count_male), 0),
                           COALESCE(SUM(ar.count_total), 0)
                    FROM attendance_records ar
                    JOIN class_blocks b ON b.id = ar.block_id
                    JOIN sections sec ON sec.id = b.section_id
                    WHERE ar.date = ?1";
        match department {
            Some(dep) => conn
                .query_row(
                    &format!("{} AND sec.department_id = ?2", base),
                    [date, dep],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
                )
                .map_err(HandlerErr::query)?,
            None => conn
                .query_row(base, [date], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
                .map_err(HandlerErr::query)?,
        }
    };

    let absent = match department {
        Some(dep) => gender_counts(
            conn,
            "SELECT s.gender, COUNT(*)
             FROM absence_entries ae
             JOIN attendance_records ar ON ar.id = ae.record_id
             JOIN class_blocks b ON b.id = ar.block_id
             JOIN sections sec ON sec.id = b.section_id
             JOIN students s ON s.id = ae.student_id
             WHERE ar.date = ?1 AND sec.department_id = ?2
             GROUP BY s.gender",
            &[date, dep],
        )?,
        None => gender_counts(
            conn,
            "SELECT s.gender, COUNT(*)
             FROM absence_entries ae
             JOIN attendance_records ar ON ar.id = ae.record_id
             JOIN students s ON s.id = ae.student_id
             WHERE ar.date = ?1
             GROUP BY s.gender",
            &[date],
        )?,
    };

    // Literal absent-student list so the shell can render details without a
    // second round trip.
    let absent_students = {
        let base = "SELECT ae.student_id, s.name, s.gender, sec.name, ae.note, b.start_time, b.end_time
                    FROM absence_entries ae
                    JOIN attendance_records ar ON ar.id = ae.record_id
                    JOIN class_blocks b ON b.id = ar.block_id
                    JOIN sections sec ON sec.id = b.section_id
                    JOIN students s ON s.id = ae.student_id
                    WHERE ar.date = ?1";
        let sql = match department {
            Some(_) => format!("{} AND sec.department_id = ?2 ORDER BY sec.name, s.list_number", base),
            None => format!("{} ORDER BY sec.name, s.list_number", base),
        };
        let mut stmt = conn.prepare(&sql).map_err(HandlerErr::query)?;
        let map_row = |row: &rusqlite::Row| -> rusqlite::Result<serde_json::Value> {
            let student_id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let gender: String = row.get(2)?;
            let section_name: String = row.get(3)?;
            let note: Option<String> = row.get(4)?;
            let start_time: String = row.get(5)?;
            let end_time: String = row.get(6)?;
            Ok(json!({
                "studentId": student_id,
                "name": name,
                "gender": gender,
                "sectionName": section_name,
                "note": note,
                "startTime": start_time,
                "endTime": end_time
            }))
        };
        match department {
            Some(dep) => stmt
                .query_map([date, dep], map_row)
                .and_then(|it| it.collect::<Result<Vec<_>, _>>()),
            None => stmt
                .query_map([date], map_row)
                .and_then(|it| it.collect::<Result<Vec<_>, _>>()),
        }
        .map_err(HandlerErr::query)?
    };

    let scope = match department {
        Some(dep) => BlockScope::Department(dep.to_string()),
        None => BlockScope::All,
    };
    let scheduled_blocks = blocks_for_day(conn, weekday, &scope)?;
    let reported = reported_block_ids(conn, date)?;
    let pending: Vec<_> = scheduled_blocks
        .iter()
        .filter(|b| !reported.contains(&b.id))
        .collect();
    let pending_teachers: HashSet<&str> =
        pending.iter().map(|b| b.teacher_id.as_str()).collect();

    let personnel_absent = {
        let base = "SELECT pa.staff_id, st.name, st.role, pa.reason_code, pa.note
                    FROM personnel_attendance pa
                    JOIN staff st ON st.id = pa.staff_id
                    WHERE pa.date = ?1 AND pa.present = 0";
        let sql = match department {
            Some(_) => format!("{} AND st.department_id = ?2 ORDER BY st.name", base),
            None => format!("{} ORDER BY st.name", base),
        };
        let mut stmt = conn.prepare(&sql).map_err(HandlerErr::query)?;
        let map_row = |row: &rusqlite::Row| -> rusqlite::Result<serde_json::Value> {
            let staff_id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let role: String = row.get(2)?;
            let reason_code: Option<String> = row.get(3)?;
            let note: Option<String> = row.get(4)?;
            Ok(json!({
                "staffId": staff_id,
                "name": name,
                "role": role,
                "reasonCode": reason_code,
                "note": note
            }))
        };
        match department {
            Some(dep) => stmt
                .query_map([date, dep], map_row)
                .and_then(|it| it.collect::<Result<Vec<_>, _>>()),
            None => stmt
                .query_map([date], map_row)
                .and_then(|it| it.collect::<Result<Vec<_>, _>>()),
        }
        .map_err(HandlerErr::query)?
    };

    Ok(json!({
        "view": "academic",
        "date": date,
        "weekday": weekday,
        "enrollment": enrollment.json(),
        "scheduledToday": scheduled_today.json(),
        "reported": {
            "present": {
                "total": present_total,
                "female": present_female,
                "male": present_male
            },
            "absent": absent.json()
        },
        "attendancePct": attendance_percentage(present_total, absent.total()),
        "blocks": {
            "scheduled": scheduled_blocks.len(),
            "reported": scheduled_blocks.len() - pending.len(),
            "pendingTeachers": pending_teachers.len()
        },
        "pendingBlocks": pending.iter().map(|b| block_json(b)).collect::<Vec<_>>(),
        "absentStudents": absent_students,
        "personnelAbsent": personnel_absent
    }))
}

/// The operations department has no sections or class blocks; its day is
/// described purely in personnel terms.
fn operations_summary(
    conn: &Connection,
    date: &str,
    weekday: &str,
    department: &str,
) -> Result<serde_json::Value, HandlerErr> {
    let staff_total: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM staff WHERE department_id = ? AND active = 1",
            [department],
            |r| r.get(0),
        )
        .map_err(HandlerErr::query)?;
    let absent_today: i64 = conn
        .query_row(
            "SELECT COUNT(*)
             FROM personnel_attendance pa
             JOIN staff st ON st.id = pa.staff_id
             WHERE pa.date = ?1 AND pa.present = 0
               AND st.department_id = ?2 AND st.active = 1",
            [date, department],
            |r| r.get(0),
        )
        .map_err(HandlerErr::query)?;

    let mut stmt = conn
        .prepare(
            "SELECT pa.staff_id, st.name, pa.reason_code, pa.note
             FROM personnel_attendance pa
             JOIN staff st ON st.id = pa.staff_id
             WHERE pa.date = ?1 AND pa.present = 0
               AND st.department_id = ?2 AND st.active = 1
             ORDER BY st.name",
        )
        .map_err(HandlerErr::query)?;
    let absent_staff = stmt
        .query_map([date, department], |row| {
            let staff_id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let reason_code: Option<String> = row.get(2)?;
            let note: Option<String> = row.get(3)?;
            Ok(json!({
                "staffId": staff_id,
                "name": name,
                "reasonCode": reason_code,
                "note": note
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;

    Ok(json!({
        "view": "operations",
        "date": date,
        "weekday": weekday,
        "staffTotal": staff_total,
        "absentToday": absent_today,
        "presencePct": attendance_percentage(staff_total - absent_today, absent_today),
        "absentStaff": absent_staff
    }))
}

/// Teachers see only their own schedule: per-block reported flags and their
/// pending list, never the cross-teacher drill-down or personnel data.
fn teacher_summary(
    conn: &Connection,
    date: &str,
    weekday: &str,
    teacher_id: &str,
) -> Result<serde_json::Value, HandlerErr> {
    let scope = BlockScope::Teacher(teacher_id.to_string());
    let blocks = blocks_for_day(conn, weekday, &scope)?;
    let reported = reported_block_ids(conn, date)?;

    let blocks_json: Vec<serde_json::Value> = blocks
        .iter()
        .map(|b| {
            let mut v = block_json(b);
            v["reported"] = json!(reported.contains(&b.id));
            v
        })
        .collect();
    let pending: Vec<serde_json::Value> = blocks
        .iter()
        .filter(|b| !reported.contains(&b.id))
        .map(block_json)
        .collect();

    Ok(json!({
        "view": "teacher",
        "date": date,
        "weekday": weekday,
        "blocks": blocks_json,
        "pendingBlocks": pending
    }))
}

fn department_is_operations(conn: &Connection, department: &str) -> Result<bool, HandlerErr> {
    let flag: Option<i64> = conn
        .query_row(
            "SELECT is_operations FROM departments WHERE id = ?",
            [department],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::query)?;
    match flag {
        Some(v) => Ok(v != 0),
        None => Err(HandlerErr::not_found("department not found")),
    }
}

pub fn daily_summary(
    conn: &Connection,
    date: &str,
    auth: &AuthCtx,
) -> Result<serde_json::Value, HandlerErr> {
    let weekday = clock::weekday_for_date(date).map_err(|e| HandlerErr::bad_params(e.to_string()))?;

    match auth.role {
        Role::Admin => academic_summary(conn, date, weekday, None),
        Role::Coordinator => {
            let department = auth
                .department_id
                .as_deref()
                .ok_or_else(|| HandlerErr::bad_params("coordinator auth requires departmentId"))?;
            if department_is_operations(conn, department)? {
                operations_summary(conn, date, weekday, department)
            } else {
                academic_summary(conn, date, weekday, Some(department))
            }
        }
        Role::Teacher => {
            let teacher = auth
                .staff_id
                .as_deref()
                .ok_or_else(|| HandlerErr::bad_params("teacher auth requires staffId"))?;
            teacher_summary(conn, date, weekday, teacher)
        }
    }
}

fn summary_daily(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let auth = parse_auth(params)?;
    // Resolve "today" once; every query below reuses the same date.
    let date = match get_opt_str(params, "date") {
        Some(d) => {
            if !clock::is_valid_date(&d) {
                return Err(HandlerErr::bad_params("date must be YYYY-MM-DD"));
            }
            d
        }
        None => clock::today().date,
    };
    daily_summary(conn, &date, &auth)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "summary.daily" => Some(with_db(state, req, summary_daily)),
        _ => None,
    }
}
