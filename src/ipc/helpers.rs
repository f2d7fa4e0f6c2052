use chrono::{NaiveDate, NaiveTime};
use rusqlite::Connection;
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::ipc::error::{err, ok};
use crate::ipc::types::AppState;
use crate::overview::{DateRange, RangeSpan};
use crate::schedule::{parse_hhmm, parse_iso_date};

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn not_found(what: &str) -> Self {
        Self::new("not_found", format!("{} not found", what))
    }

    /// Store failure. Logged here so every handler reports them the same way.
    pub fn db(code: &'static str, e: anyhow::Error) -> Self {
        tracing::warn!(code, error = %e, "store operation failed");
        Self::new(code, format!("{e:#}"))
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }
}

pub fn respond(id: &str, result: Result<Value, HandlerErr>) -> Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => e.response(id),
    }
}

pub fn db_conn(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .conn()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn now_ts() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

pub fn required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn opt_str(params: &Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            Ok(if s.is_empty() { None } else { Some(s.to_string()) })
        }
        Some(_) => Err(HandlerErr::bad_params(format!(
            "{} must be string or null",
            key
        ))),
    }
}

pub fn parse_date_value(v: &Value, key: &str) -> Result<NaiveDate, HandlerErr> {
    v.as_str()
        .and_then(parse_iso_date)
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a YYYY-MM-DD date", key)))
}

pub fn parse_time_value(v: &Value, key: &str) -> Result<NaiveTime, HandlerErr> {
    v.as_str()
        .and_then(parse_hhmm)
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an HH:MM time", key)))
}

pub fn required_date(params: &Value, key: &str) -> Result<NaiveDate, HandlerErr> {
    let v = params
        .get(key)
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))?;
    parse_date_value(v, key)
}

pub fn required_time(params: &Value, key: &str) -> Result<NaiveTime, HandlerErr> {
    let v = params
        .get(key)
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))?;
    parse_time_value(v, key)
}

/// Accepts either `startDate` + `endDate`, or `anchor` + `span` ("week" or
/// "month"). `default_span` applies when only `anchor` is given.
pub fn resolve_range(params: &Value, default_span: RangeSpan) -> Result<DateRange, HandlerErr> {
    if params.get("startDate").is_some() || params.get("endDate").is_some() {
        let start = required_date(params, "startDate")?;
        let end = required_date(params, "endDate")?;
        return DateRange::new(start, end).map_err(|e| HandlerErr::bad_params(e.to_string()));
    }
    let anchor = required_date(params, "anchor")?;
    let span = match opt_str(params, "span")? {
        Some(s) => RangeSpan::parse(&s)
            .ok_or_else(|| HandlerErr::bad_params("span must be one of: week, month"))?,
        None => default_span,
    };
    Ok(DateRange::spanning(span, anchor))
}

/// Explicit `today` wins so callers (and tests) pin the evaluation date;
/// otherwise the local calendar date.
pub fn resolve_today(params: &Value) -> Result<NaiveDate, HandlerErr> {
    match params.get("today") {
        None | Some(Value::Null) => Ok(chrono::Local::now().date_naive()),
        Some(v) => parse_date_value(v, "today"),
    }
}

pub fn range_json(range: &DateRange) -> Value {
    serde_json::json!({ "startDate": range.start(), "endDate": range.end() })
}
