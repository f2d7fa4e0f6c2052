use serde_json::Value;

use super::error::err;
use super::handlers;
use super::types::{AppState, Request};

type Family = fn(&mut AppState, &Request) -> Option<Value>;

/// Handler families in dispatch order. Each claims the methods it knows and
/// passes on everything else.
const FAMILIES: [(&str, Family); 8] = [
    ("core", handlers::core::try_handle),
    ("classes", handlers::classes::try_handle),
    ("teachers", handlers::teachers::try_handle),
    ("plans", handlers::plans::try_handle),
    ("policy", handlers::policy::try_handle),
    ("compliance", handlers::compliance::try_handle),
    ("overview", handlers::overview::try_handle),
    ("setup", handlers::setup::try_handle),
];

pub fn handle_request(state: &mut AppState, req: Request) -> Value {
    let span = tracing::debug_span!("request", id = %req.id, method = %req.method);
    let _enter = span.enter();

    for (family, try_handle) in FAMILIES {
        if let Some(resp) = try_handle(state, &req) {
            tracing::trace!(family, "handled");
            return resp;
        }
    }

    tracing::warn!(method = %req.method, "unknown method");
    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
