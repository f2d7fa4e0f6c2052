use crate::compliance::{evaluate_days, ComplianceSummary};
use crate::db;
use crate::ipc::handlers::policy::load_policy;
use crate::ipc::handlers::setup::load_planner_setup;
use crate::ipc::helpers::{
    db_conn, opt_str, range_json, resolve_range, resolve_today, respond, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::overview::{build_overview, DateRange, TeacherOverview};
use crate::policy::CompliancePolicy;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::collections::HashMap;

fn load_overview(
    conn: &Connection,
    range: &DateRange,
) -> Result<Vec<TeacherOverview>, HandlerErr> {
    let teachers = db::list_teachers(conn).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let assignments =
        db::list_class_assignments(conn).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let plans = db::list_lesson_plans(conn, None, range)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(build_overview(&teachers, &assignments, &plans))
}

fn planning_overview(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let setup = load_planner_setup(conn).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let range = resolve_range(params, setup.default_range_span)?;
    let teachers = load_overview(conn, &range)?;
    Ok(json!({ "range": range_json(&range), "teachers": teachers }))
}

fn compliance_overview(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let setup = load_planner_setup(conn).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let range = resolve_range(params, setup.default_range_span)?;
    let today = resolve_today(params)?;
    let school_override = opt_str(params, "schoolId")?;
    let teachers = load_overview(conn, &range)?;

    // One policy lookup per school, reused across every class in that school.
    let mut policies: HashMap<String, CompliancePolicy> = HashMap::new();
    let mut total = ComplianceSummary::default();
    let mut rows = Vec::with_capacity(teachers.len());
    for teacher in &teachers {
        let mut classes = Vec::with_capacity(teacher.classes.len());
        for class in &teacher.classes {
            let school_id = match &school_override {
                Some(s) => s.clone(),
                None => db::class_school_id(conn, &class.class_id)
                    .map_err(|e| HandlerErr::db("db_query_failed", e))?
                    .unwrap_or_else(|| setup.default_school_id.clone()),
            };
            if !policies.contains_key(&school_id) {
                let policy = load_policy(conn, &school_id)?;
                policies.insert(school_id.clone(), policy);
            }
            let policy = &policies[&school_id];
            let days = evaluate_days(&class.lesson_dates, &range, policy, today);
            let summary = ComplianceSummary::from_statuses(days.iter().map(|d| d.status));
            for d in &days {
                total.add(d.status);
            }
            classes.push(json!({
                "classId": class.class_id,
                "className": class.class_name,
                "schoolId": school_id,
                "lessonDates": class.lesson_dates,
                "days": days,
                "summary": summary,
            }));
        }
        rows.push(json!({
            "teacherId": teacher.teacher_id,
            "teacherName": teacher.teacher_name,
            "classes": classes,
        }));
    }

    Ok(json!({
        "range": range_json(&range),
        "today": today,
        "teachers": rows,
        "summary": total,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "planning.overview" => planning_overview(state, &req.params),
        "compliance.overview" => compliance_overview(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
