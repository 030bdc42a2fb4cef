use axum::{http::StatusCode, routing::get, Json, Router};
use serde_json::json;

async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

pub fn monitoring_router() -> anyhow::Result<Router> {
    Ok(Router::new().route("/health", get(health)))
}
