use crate::db;
use crate::ipc::handlers::setup::load_planner_setup;
use crate::ipc::helpers::{db_conn, opt_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::policy::CompliancePolicy;
use rusqlite::Connection;
use serde_json::{json, Value};

fn policy_key(school_id: &str) -> String {
    format!("policy.{}", school_id)
}

pub fn resolve_school_id(conn: &Connection, params: &Value) -> Result<String, HandlerErr> {
    match opt_str(params, "schoolId")? {
        Some(s) => Ok(s),
        None => Ok(load_planner_setup(conn)
            .map_err(|e| HandlerErr::db("db_query_failed", e))?
            .default_school_id),
    }
}

/// The stored policy for a school, or the built-in default when none was
/// saved. A stored record that no longer validates is an error, never
/// silently replaced by defaults.
pub fn load_policy(conn: &Connection, school_id: &str) -> Result<CompliancePolicy, HandlerErr> {
    let stored = db::settings_get_json(conn, &policy_key(school_id))
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    match stored {
        None => Ok(CompliancePolicy::default()),
        Some(v) => CompliancePolicy::from_json(&v).map_err(|e| {
            tracing::error!(school_id, error = %e, "stored policy is invalid");
            HandlerErr::new("bad_policy", e.to_string()).with_details(json!({ "schoolId": school_id }))
        }),
    }
}

fn policy_get(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let school_id = resolve_school_id(conn, params)?;
    let policy = load_policy(conn, &school_id)?;
    Ok(json!({ "schoolId": school_id, "policy": policy.to_json() }))
}

fn policy_update(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let school_id = resolve_school_id(conn, params)?;
    let patch = params
        .get("patch")
        .and_then(|v| v.as_object())
        .ok_or_else(|| HandlerErr::bad_params("patch must be an object"))?;

    // Merge over the raw stored record so a patch can repair an invalid one.
    let stored = db::settings_get_json(conn, &policy_key(&school_id))
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let merged = match stored {
        Some(raw) => CompliancePolicy::merge_json(&raw, patch),
        None => CompliancePolicy::default().merge_patch(patch),
    }
    .map_err(|e| HandlerErr::new("bad_policy", e.to_string()))?;
    let stored = merged.to_json();
    db::settings_set_json(conn, &policy_key(&school_id), &stored)
        .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    tracing::info!(school_id = %school_id, "policy updated");
    Ok(json!({ "schoolId": school_id, "policy": stored }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "policy.get" => policy_get(state, &req.params),
        "policy.update" => policy_update(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
