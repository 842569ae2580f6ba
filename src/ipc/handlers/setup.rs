use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Attendance,
    Import,
    Reports,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "attendance" => Some(Self::Attendance),
            "import" => Some(Self::Import),
            "reports" => Some(Self::Reports),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Attendance => "setup.attendance",
            Self::Import => "setup.import",
            Self::Reports => "setup.reports",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Attendance => json!({
            "timezoneLabel": "America/Santo_Domingo",
            "autoPresenceNote": "marked present from class attendance report",
            "defaultTopicRequired": true
        }),
        SetupSection::Import => json!({
            "scheduleHeaders": ["day", "start", "end", "section", "subject", "teacher"],
            "rosterHeaders": ["list_number", "name", "gender", "id_number"],
            "personnelHeaders": ["name", "id_number", "role", "department", "active"],
            "minMatchTokenLength": 3
        }),
        SetupSection::Reports => json!({
            "csvDelimiter": ",",
            "includePendingBlocks": true,
            "includePersonnelAbsences": true
        }),
    }
}

fn merged_section(conn: &rusqlite::Connection, section: SetupSection) -> Value {
    let mut merged = default_section(section);
    if let Ok(Some(stored)) = db::settings_get_json(conn, section.key()) {
        if let (Some(base), Some(overrides)) = (merged.as_object_mut(), stored.as_object()) {
            for (k, v) in overrides {
                base.insert(k.clone(), v.clone());
            }
        }
    }
    merged
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section) = req
        .params
        .get("section")
        .and_then(|v| v.as_str())
        .and_then(SetupSection::parse)
    else {
        return err(&req.id, "bad_params", "unknown setup section", None);
    };
    ok(&req.id, json!({ "values": merged_section(conn, section) }))
}

fn handle_setup_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section) = req
        .params
        .get("section")
        .and_then(|v| v.as_str())
        .and_then(SetupSection::parse)
    else {
        return err(&req.id, "bad_params", "unknown setup section", None);
    };
    let Some(values) = req.params.get("values").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing values object", None);
    };

    // Only keys the section defines are accepted; unknown keys are dropped.
    let defaults = default_section(section);
    let allowed = defaults.as_object().cloned().unwrap_or_else(Map::new);
    let mut stored = Map::new();
    for (k, v) in values {
        if allowed.contains_key(k) {
            stored.insert(k.clone(), v.clone());
        }
    }

    match db::settings_set_json(conn, section.key(), &Value::Object(stored)) {
        Ok(()) => ok(&req.id, json!({ "values": merged_section(conn, section) })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.set" => Some(handle_setup_set(state, req)),
        _ => None,
    }
}
