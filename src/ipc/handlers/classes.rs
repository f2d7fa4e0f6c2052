use crate::db;
use crate::ipc::helpers::{db_conn, opt_str, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Value};
use uuid::Uuid;

fn list_named(conn: &Connection, sql: &str) -> anyhow::Result<Vec<Value>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn classes_list(state: &AppState) -> Result<Value, HandlerErr> {
    let Some(conn) = state.conn() else {
        return Ok(json!({ "classes": [] }));
    };
    let mut stmt = conn
        .prepare(
            "SELECT
               c.id,
               c.name,
               c.school_id,
               (SELECT COUNT(*) FROM class_subjects cs WHERE cs.class_id = c.id) AS subject_count,
               (SELECT COUNT(*) FROM lesson_plans lp WHERE lp.class_id = c.id) AS plan_count
             FROM classes c
             ORDER BY c.name, c.id",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e.into()))?;
    let classes = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "schoolId": r.get::<_, String>(2)?,
                "subjectCount": r.get::<_, i64>(3)?,
                "planCount": r.get::<_, i64>(4)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e.into()))?;
    Ok(json!({ "classes": classes }))
}

fn classes_create(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let name = required_str(params, "name")?;
    let school_id = match opt_str(params, "schoolId")? {
        Some(s) => s,
        None => {
            crate::ipc::handlers::setup::load_planner_setup(conn)
                .map_err(|e| HandlerErr::db("db_query_failed", e))?
                .default_school_id
        }
    };
    let class_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classes(id, name, school_id) VALUES(?, ?, ?)",
        (&class_id, &name, &school_id),
    )
    .map_err(|e| {
        HandlerErr::db("db_insert_failed", e.into()).with_details(json!({ "table": "classes" }))
    })?;
    Ok(json!({ "classId": class_id, "name": name, "schoolId": school_id }))
}

fn subjects_list(state: &AppState) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let subjects = list_named(conn, "SELECT id, name FROM subjects ORDER BY name, id")
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(json!({ "subjects": subjects }))
}

fn subjects_create(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let name = required_str(params, "name")?;
    let subject_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO subjects(id, name) VALUES(?, ?)",
        (&subject_id, &name),
    )
    .map_err(|e| {
        HandlerErr::db("db_insert_failed", e.into()).with_details(json!({ "table": "subjects" }))
    })?;
    Ok(json!({ "subjectId": subject_id, "name": name }))
}

fn classes_assign_subject(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let class_id = required_str(params, "classId")?;
    let subject_id = required_str(params, "subjectId")?;
    let exists = |table: &str, id: &str| {
        db::row_exists(conn, table, id).map_err(|e| HandlerErr::db("db_query_failed", e))
    };
    if !exists("classes", &class_id)? {
        return Err(HandlerErr::not_found("class"));
    }
    if !exists("subjects", &subject_id)? {
        return Err(HandlerErr::not_found("subject"));
    }
    db::append_link(
        conn,
        "class_subjects",
        "class_id",
        &class_id,
        "subject_id",
        &subject_id,
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e))?;
    let subject_ids =
        db::class_subject_ids(conn, &class_id).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(json!({ "classId": class_id, "subjectIds": subject_ids }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "classes.list" => classes_list(state),
        "classes.create" => classes_create(state, &req.params),
        "classes.assignSubject" => classes_assign_subject(state, &req.params),
        "subjects.list" => subjects_list(state),
        "subjects.create" => subjects_create(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
