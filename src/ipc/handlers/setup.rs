use crate::db;
use crate::ipc::helpers::{db_conn, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::overview::RangeSpan;
use rusqlite::Connection;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Planner,
    Compliance,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "planner" => Some(Self::Planner),
            "compliance" => Some(Self::Compliance),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Planner => "setup.planner",
            Self::Compliance => "setup.compliance",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Planner => json!({
            "defaultLessonDurationMinutes": 60,
            "defaultSchoolId": "default"
        }),
        SetupSection::Compliance => json!({
            "defaultRangeSpan": "week"
        }),
    }
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.is_empty() {
        return Err(format!("{} must not be empty", key));
    }
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

/// Validates one field of a section and returns its normalised value.
fn validate_field(section: SetupSection, key: &str, v: &Value) -> Result<Value, String> {
    match (section, key) {
        (SetupSection::Planner, "defaultLessonDurationMinutes") => {
            Ok(Value::from(parse_i64_range(v, key, 5, 480)?))
        }
        (SetupSection::Planner, "defaultSchoolId") => {
            Ok(Value::String(parse_string_max(v, key, 64)?))
        }
        (SetupSection::Compliance, "defaultRangeSpan") => {
            let s = parse_string_max(v, key, 8)?.to_ascii_lowercase();
            if RangeSpan::parse(&s).is_none() {
                return Err("defaultRangeSpan must be one of: week, month".into());
            }
            Ok(Value::String(s))
        }
        (SetupSection::Planner, _) => Err(format!("unknown planner field: {}", key)),
        (SetupSection::Compliance, _) => Err(format!("unknown compliance field: {}", key)),
    }
}

/// All-or-nothing: the first invalid field rejects the whole patch.
fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        obj.insert(k.clone(), validate_field(section, k, v)?);
    }
    Ok(())
}

fn load_section(conn: &Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    let Some(saved) = db::settings_get_json(conn, section.key())? else {
        return Ok(current);
    };
    let Some(saved_obj) = saved.as_object() else {
        tracing::warn!(key = section.key(), "ignoring non-object stored setup");
        return Ok(current);
    };
    if let Some(obj) = current.as_object_mut() {
        // Per field: a stale stored value falls back to its default without
        // discarding the other saved fields.
        for (k, v) in saved_obj {
            match validate_field(section, k, v) {
                Ok(value) => {
                    obj.insert(k.clone(), value);
                }
                Err(e) => {
                    tracing::warn!(
                        key = section.key(),
                        field = %k,
                        error = %e,
                        "ignoring invalid stored setup field"
                    );
                }
            }
        }
    }
    Ok(current)
}

#[derive(Clone, Debug)]
pub struct PlannerSetup {
    pub default_lesson_duration_minutes: i64,
    pub default_school_id: String,
    pub default_range_span: RangeSpan,
}

pub fn load_planner_setup(conn: &Connection) -> anyhow::Result<PlannerSetup> {
    let planner = load_section(conn, SetupSection::Planner)?;
    let compliance = load_section(conn, SetupSection::Compliance)?;
    Ok(PlannerSetup {
        default_lesson_duration_minutes: planner
            .get("defaultLessonDurationMinutes")
            .and_then(|v| v.as_i64())
            .unwrap_or(60),
        default_school_id: planner
            .get("defaultSchoolId")
            .and_then(|v| v.as_str())
            .unwrap_or("default")
            .to_string(),
        default_range_span: compliance
            .get("defaultRangeSpan")
            .and_then(|v| v.as_str())
            .and_then(RangeSpan::parse)
            .unwrap_or(RangeSpan::Week),
    })
}

fn setup_get(state: &AppState) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let planner = load_section(conn, SetupSection::Planner)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let compliance = load_section(conn, SetupSection::Compliance)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(json!({ "planner": planner, "compliance": compliance }))
}

fn setup_update(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let section = params
        .get("section")
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params("missing section"))?;
    let section =
        SetupSection::parse(section).ok_or_else(|| HandlerErr::bad_params("unknown section"))?;
    let patch = params
        .get("patch")
        .and_then(|v| v.as_object())
        .ok_or_else(|| HandlerErr::bad_params("patch must be an object"))?;

    let mut current =
        load_section(conn, section).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    merge_section_patch(section, &mut current, patch).map_err(HandlerErr::bad_params)?;
    db::settings_set_json(conn, section.key(), &current)
        .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    tracing::info!(key = section.key(), "setup updated");
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "setup.get" => Some(respond(&req.id, setup_get(state))),
        "setup.update" => Some(respond(&req.id, setup_update(state, &req.params))),
        _ => None,
    }
}
