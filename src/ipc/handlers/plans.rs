use crate::db;
use crate::ipc::handlers::setup::load_planner_setup;
use crate::ipc::helpers::{
    db_conn, now_ts, opt_str, parse_date_value, parse_time_value, required_date, required_str,
    required_time, resolve_range, respond, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::schedule::{
    find_conflict, format_hhmm, LessonPlan, PlanStatus, SchedulingWindow, WindowError,
};
use chrono::Duration;
use rusqlite::Connection;
use serde_json::{json, Value};
use uuid::Uuid;

fn window_err(e: WindowError) -> HandlerErr {
    HandlerErr::new("invalid_window", e.to_string())
}

fn ensure_exists(conn: &Connection, table: &str, id: &str, what: &str) -> Result<(), HandlerErr> {
    match db::row_exists(conn, table, id) {
        Ok(true) => Ok(()),
        Ok(false) => Err(HandlerErr::not_found(what)),
        Err(e) => Err(HandlerErr::db("db_query_failed", e)),
    }
}

/// Runs the candidate against the plans already stored for its class and
/// date. A hit is reported as `schedule_conflict` carrying the blocking plan.
fn ensure_no_conflict(conn: &Connection, window: &SchedulingWindow) -> Result<(), HandlerErr> {
    let siblings = db::plans_on_date(conn, window.class_id(), window.date())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    match find_conflict(window, &siblings) {
        None => Ok(()),
        Some(hit) => {
            tracing::debug!(
                class_id = window.class_id(),
                date = %window.date(),
                conflict = %hit.id,
                "schedule conflict"
            );
            Err(HandlerErr::new(
                "schedule_conflict",
                format!(
                    "overlaps plan {} ({}-{})",
                    hit.id,
                    format_hhmm(hit.start_time),
                    format_hhmm(hit.end_time)
                ),
            )
            .with_details(json!({ "conflict": hit })))
        }
    }
}

fn parse_status(v: &Value, key: &str) -> Result<PlanStatus, HandlerErr> {
    v.as_str().and_then(PlanStatus::parse).ok_or_else(|| {
        HandlerErr::bad_params(format!(
            "{} must be one of: planned, completed, cancelled",
            key
        ))
    })
}

fn text_field(input: &Value, key: &str) -> Result<String, HandlerErr> {
    match input.get(key) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(HandlerErr::bad_params(format!("input.{} must be string", key))),
    }
}

fn plans_list(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let setup = load_planner_setup(conn).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let class_id = required_str(params, "classId")?;
    let range = resolve_range(params, setup.default_range_span)?;
    let plans = db::list_lesson_plans(conn, Some(&class_id), &range)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(json!({ "plans": plans }))
}

fn plans_open(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let plan_id = required_str(params, "planId")?;
    match db::get_lesson_plan(conn, &plan_id) {
        Ok(Some(plan)) => Ok(json!({ "plan": plan })),
        Ok(None) => Err(HandlerErr::not_found("plan")),
        Err(e) => Err(HandlerErr::db("db_query_failed", e)),
    }
}

fn plans_create(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let setup = load_planner_setup(conn).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let input = params
        .get("input")
        .filter(|v| v.is_object())
        .ok_or_else(|| HandlerErr::bad_params("missing input"))?;

    let class_id = required_str(input, "classId")?;
    let subject_id = required_str(input, "subjectId")?;
    ensure_exists(conn, "classes", &class_id, "class")?;
    ensure_exists(conn, "subjects", &subject_id, "subject")?;

    let date = required_date(input, "date")?;
    let start_time = required_time(input, "startTime")?;
    let end_time = match input.get("endTime") {
        None | Some(Value::Null) => {
            let (end, wrapped) = start_time
                .overflowing_add_signed(Duration::minutes(setup.default_lesson_duration_minutes));
            if wrapped != 0 {
                return Err(HandlerErr::new(
                    "invalid_window",
                    "default lesson duration runs past midnight; give an explicit endTime",
                ));
            }
            end
        }
        Some(v) => parse_time_value(v, "endTime")?,
    };
    let status = match input.get("status") {
        None | Some(Value::Null) => PlanStatus::Planned,
        Some(v) => parse_status(v, "input.status")?,
    };

    let window = SchedulingWindow::new(class_id.clone(), date, start_time, end_time, None)
        .map_err(window_err)?;
    if status != PlanStatus::Cancelled {
        ensure_no_conflict(conn, &window)?;
    }

    let plan = LessonPlan {
        id: Uuid::new_v4().to_string(),
        class_id,
        subject_id,
        date,
        start_time,
        end_time,
        status,
        topic: text_field(input, "topic")?,
        objective: text_field(input, "objective")?,
        materials: text_field(input, "materials")?,
        homework: text_field(input, "homework")?,
        notes: text_field(input, "notes")?,
    };
    db::insert_lesson_plan(conn, &plan, &now_ts())
        .map_err(|e| HandlerErr::db("db_insert_failed", e))?;
    tracing::info!(plan_id = %plan.id, class_id = %plan.class_id, date = %plan.date, "plan created");
    Ok(json!({ "planId": plan.id, "plan": plan }))
}

fn apply_patch(
    conn: &Connection,
    plan: &mut LessonPlan,
    patch: &serde_json::Map<String, Value>,
) -> Result<(), HandlerErr> {
    for (k, v) in patch {
        let key = format!("patch.{}", k);
        match k.as_str() {
            "subjectId" => {
                let s = v
                    .as_str()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a non-empty string", key)))?;
                ensure_exists(conn, "subjects", s, "subject")?;
                plan.subject_id = s.to_string();
            }
            "date" => plan.date = parse_date_value(v, &key)?,
            "startTime" => plan.start_time = parse_time_value(v, &key)?,
            "endTime" => plan.end_time = parse_time_value(v, &key)?,
            "status" => plan.status = parse_status(v, &key)?,
            "topic" | "objective" | "materials" | "homework" | "notes" => {
                let s = v
                    .as_str()
                    .ok_or_else(|| HandlerErr::bad_params(format!("{} must be string", key)))?
                    .to_string();
                match k.as_str() {
                    "topic" => plan.topic = s,
                    "objective" => plan.objective = s,
                    "materials" => plan.materials = s,
                    "homework" => plan.homework = s,
                    _ => plan.notes = s,
                }
            }
            _ => return Err(HandlerErr::bad_params(format!("unknown patch field: {}", k))),
        }
    }
    Ok(())
}

fn plans_update(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let plan_id = required_str(params, "planId")?;
    let patch = params
        .get("patch")
        .and_then(|v| v.as_object())
        .ok_or_else(|| HandlerErr::bad_params("missing patch"))?;

    let mut plan = match db::get_lesson_plan(conn, &plan_id) {
        Ok(Some(p)) => p,
        Ok(None) => return Err(HandlerErr::not_found("plan")),
        Err(e) => return Err(HandlerErr::db("db_query_failed", e)),
    };
    apply_patch(conn, &mut plan, patch)?;

    // The window excludes the plan's own id, so moving a lesson within its
    // old slot does not collide with itself.
    let window = plan.window().map_err(window_err)?;
    if plan.status != PlanStatus::Cancelled {
        ensure_no_conflict(conn, &window)?;
    }
    db::update_lesson_plan(conn, &plan, &now_ts())
        .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    tracing::info!(plan_id = %plan.id, "plan updated");
    Ok(json!({ "plan": plan }))
}

fn plans_delete(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let plan_id = required_str(params, "planId")?;
    let removed =
        db::delete_lesson_plan(conn, &plan_id).map_err(|e| HandlerErr::db("db_update_failed", e))?;
    if !removed {
        return Err(HandlerErr::not_found("plan"));
    }
    tracing::info!(plan_id = %plan_id, "plan deleted");
    Ok(json!({ "ok": true }))
}

fn plans_check_conflict(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let class_id = required_str(params, "classId")?;
    ensure_exists(conn, "classes", &class_id, "class")?;
    let date = required_date(params, "date")?;
    let start_time = required_time(params, "startTime")?;
    let end_time = required_time(params, "endTime")?;
    let exclude_id = opt_str(params, "excludeId")?;
    let window = SchedulingWindow::new(class_id, date, start_time, end_time, exclude_id)
        .map_err(window_err)?;
    let siblings = db::plans_on_date(conn, window.class_id(), window.date())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(json!({ "conflict": find_conflict(&window, &siblings) }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "plans.list" => plans_list(state, &req.params),
        "plans.open" => plans_open(state, &req.params),
        "plans.create" => plans_create(state, &req.params),
        "plans.update" => plans_update(state, &req.params),
        "plans.delete" => plans_delete(state, &req.params),
        "plans.checkConflict" => plans_check_conflict(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
