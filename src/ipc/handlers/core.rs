use crate::ipc::helpers::{required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};
use std::path::PathBuf;

fn health(state: &AppState) -> Result<Value, HandlerErr> {
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "workspacePath": state.workspace().map(|p| p.to_string_lossy().to_string()),
    }))
}

fn workspace_select(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let path = PathBuf::from(required_str(params, "path")?);
    state.open_workspace(path.clone()).map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "failed to open workspace");
        HandlerErr::new("db_open_failed", format!("{e:#}"))
    })?;
    tracing::info!(path = %path.display(), "workspace selected");
    Ok(json!({ "workspacePath": path.to_string_lossy() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "health" => health(state),
        "workspace.select" => workspace_select(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
