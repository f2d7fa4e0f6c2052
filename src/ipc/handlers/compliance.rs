use crate::compliance::{evaluate_grid, ComplianceSummary};
use crate::db;
use crate::ipc::handlers::policy::load_policy;
use crate::ipc::handlers::setup::load_planner_setup;
use crate::ipc::helpers::{
    db_conn, opt_str, range_json, required_str, resolve_range, resolve_today, respond, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Value};

fn requested_subjects(
    conn: &Connection,
    params: &Value,
    class_id: &str,
) -> Result<Vec<String>, HandlerErr> {
    match params.get("subjectIds") {
        None | Some(Value::Null) => {
            db::class_subject_ids(conn, class_id).map_err(|e| HandlerErr::db("db_query_failed", e))
        }
        Some(Value::Array(items)) => {
            let mut out: Vec<String> = Vec::with_capacity(items.len());
            for item in items {
                let s = item
                    .as_str()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| HandlerErr::bad_params("subjectIds must be non-empty strings"))?;
                if !out.iter().any(|x| x == s) {
                    out.push(s.to_string());
                }
            }
            Ok(out)
        }
        Some(_) => Err(HandlerErr::bad_params("subjectIds must be an array of strings")),
    }
}

fn compliance_grid(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let setup = load_planner_setup(conn).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let class_id = required_str(params, "classId")?;
    let class_school = db::class_school_id(conn, &class_id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .ok_or_else(|| HandlerErr::not_found("class"))?;
    let school_id = opt_str(params, "schoolId")?.unwrap_or(class_school);
    let range = resolve_range(params, setup.default_range_span)?;
    let today = resolve_today(params)?;
    let policy = load_policy(conn, &school_id)?;

    let slots: Vec<(String, String)> = requested_subjects(conn, params, &class_id)?
        .into_iter()
        .map(|subject_id| (class_id.clone(), subject_id))
        .collect();
    let plans = db::list_lesson_plans(conn, Some(&class_id), &range)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    let cells = evaluate_grid(&slots, &range, &plans, &policy, today);
    let summary = ComplianceSummary::from_statuses(cells.iter().map(|c| c.status));
    tracing::debug!(class_id = %class_id, cells = cells.len(), "compliance grid evaluated");

    Ok(json!({
        "classId": class_id,
        "schoolId": school_id,
        "range": range_json(&range),
        "today": today,
        "policy": policy.to_json(),
        "cells": cells,
        "summary": summary,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "compliance.grid" => compliance_grid(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
