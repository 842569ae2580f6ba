use rusqlite::Connection;
use serde_json::{json, Value};
use std::path::PathBuf;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn response(self, id: &str) -> Value {
        crate::ipc::error::err(id, self.code, self.message, self.details)
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        HandlerErr {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        HandlerErr {
            code: "not_found",
            message: message.into(),
            details: None,
        }
    }

    pub fn not_authorized(message: impl Into<String>) -> Self {
        HandlerErr {
            code: "not_authorized",
            message: message.into(),
            details: None,
        }
    }

    pub fn query(e: impl ToString) -> Self {
        HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        }
    }

    pub fn update(table: &str, e: impl ToString) -> Self {
        HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: Some(json!({ "table": table })),
        }
    }

    pub fn tx(e: impl ToString) -> Self {
        HandlerErr {
            code: "db_tx_failed",
            message: e.to_string(),
            details: None,
        }
    }

    pub fn commit(e: impl ToString) -> Self {
        HandlerErr {
            code: "db_commit_failed",
            message: e.to_string(),
            details: None,
        }
    }
}

pub fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_opt_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn get_required_count(params: &Value, key: &str) -> Result<i64, HandlerErr> {
    let v = params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))?;
    if v < 0 {
        return Err(HandlerErr::bad_params(format!(
            "{} must not be negative",
            key
        )));
    }
    Ok(v)
}

pub fn get_bool(params: &Value, key: &str) -> Result<bool, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_bool())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Coordinator,
    Teacher,
}

impl Role {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "coordinator" => Some(Self::Coordinator),
            "teacher" => Some(Self::Teacher),
            _ => None,
        }
    }
}

/// Explicit caller identity. The shell resolves its session to this object
/// and sends it with every scoped request; the daemon never holds ambient
/// session state.
#[derive(Debug, Clone)]
pub struct AuthCtx {
    pub staff_id: Option<String>,
    pub role: Role,
    pub department_id: Option<String>,
}

impl AuthCtx {
    /// Department scope for queries: None means global (admin).
    pub fn department_scope(&self) -> Option<&str> {
        match self.role {
            Role::Admin => None,
            _ => self.department_id.as_deref(),
        }
    }
}

pub fn parse_auth(params: &Value) -> Result<AuthCtx, HandlerErr> {
    let auth = params
        .get("auth")
        .ok_or_else(|| HandlerErr::bad_params("missing auth"))?;
    let role_raw = auth
        .get("role")
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params("missing auth.role"))?;
    let role = Role::parse(role_raw)
        .ok_or_else(|| HandlerErr::bad_params(format!("unknown role: {}", role_raw)))?;
    let staff_id = get_opt_str(auth, "staffId");
    let department_id = get_opt_str(auth, "departmentId");
    match role {
        Role::Coordinator if department_id.is_none() => Err(HandlerErr::bad_params(
            "coordinator auth requires departmentId",
        )),
        Role::Teacher if staff_id.is_none() => {
            Err(HandlerErr::bad_params("teacher auth requires staffId"))
        }
        _ => Ok(AuthCtx {
            staff_id,
            role,
            department_id,
        }),
    }
}

/// Mutations on reference data are limited to administrative roles.
pub fn require_manager(auth: &AuthCtx) -> Result<(), HandlerErr> {
    match auth.role {
        Role::Admin | Role::Coordinator => Ok(()),
        Role::Teacher => Err(HandlerErr::not_authorized(
            "requires admin or coordinator role",
        )),
    }
}

pub fn require_admin(auth: &AuthCtx) -> Result<(), HandlerErr> {
    match auth.role {
        Role::Admin => Ok(()),
        _ => Err(HandlerErr::not_authorized("requires admin role")),
    }
}

pub fn non_empty_trimmed(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

pub fn parse_boolish(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "si" | "sí" => Some(true),
        "0" | "false" | "no" | "n" => Some(false),
        _ => None,
    }
}

pub fn parse_csv_record(line: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0usize;
    while i < chars.len() {
        let ch = chars[i];
        if ch == '"' {
            if in_quotes && i + 1 < chars.len() && chars[i + 1] == '"' {
                buf.push('"');
                i += 2;
                continue;
            }
            in_quotes = !in_quotes;
            i += 1;
            continue;
        }
        if ch == ',' && !in_quotes {
            out.push(buf.clone());
            buf.clear();
            i += 1;
            continue;
        }
        buf.push(ch);
        i += 1;
    }
    out.push(buf);
    out
}

pub fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

pub fn write_text_file(path: &str, contents: &str) -> Result<(), HandlerErr> {
    let out = PathBuf::from(path);
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent).map_err(|e| HandlerErr {
            code: "export_failed",
            message: e.to_string(),
            details: Some(json!({ "path": path })),
        })?;
    }
    std::fs::write(&out, contents).map_err(|e| HandlerErr {
        code: "export_failed",
        message: e.to_string(),
        details: Some(json!({ "path": path })),
    })?;
    Ok(())
}

pub fn with_db(
    state: &mut crate::ipc::types::AppState,
    req: &crate::ipc::types::Request,
    f: impl Fn(&Connection, &Value) -> Result<Value, HandlerErr>,
) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return crate::ipc::error::err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => crate::ipc::error::ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}
