use crate::db;
use crate::ipc::helpers::{db_conn, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};
use uuid::Uuid;

fn teachers_list(state: &AppState) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let teachers = db::list_teachers(conn).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let assignments =
        db::list_class_assignments(conn).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let rows: Vec<Value> = teachers
        .iter()
        .map(|t| {
            let class_ids: Vec<&str> = assignments
                .iter()
                .filter(|a| a.teacher_id == t.id)
                .map(|a| a.class_id.as_str())
                .collect();
            json!({ "id": t.id, "name": t.name, "classIds": class_ids })
        })
        .collect();
    Ok(json!({ "teachers": rows }))
}

fn teachers_create(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let name = required_str(params, "name")?;
    let teacher_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO teachers(id, name) VALUES(?, ?)",
        (&teacher_id, &name),
    )
    .map_err(|e| {
        HandlerErr::db("db_insert_failed", e.into()).with_details(json!({ "table": "teachers" }))
    })?;
    Ok(json!({ "teacherId": teacher_id, "name": name }))
}

fn teachers_assign_class(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let teacher_id = required_str(params, "teacherId")?;
    let class_id = required_str(params, "classId")?;
    if !db::row_exists(conn, "teachers", &teacher_id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
    {
        return Err(HandlerErr::not_found("teacher"));
    }
    if !db::row_exists(conn, "classes", &class_id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
    {
        return Err(HandlerErr::not_found("class"));
    }
    db::append_link(
        conn,
        "teacher_classes",
        "teacher_id",
        &teacher_id,
        "class_id",
        &class_id,
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e))?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "teachers.list" => teachers_list(state),
        "teachers.create" => teachers_create(state, &req.params),
        "teachers.assignClass" => teachers_assign_class(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
