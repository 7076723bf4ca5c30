use axum::{
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;

use crate::handlers::click;
use crate::state::AppState;

pub fn click_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(click_health))
        .route("/prepare", post(click::click_prepare))
        .route("/complete", post(click::click_complete))
}

async fn click_health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "click",
        "timestamp": Utc::now().to_rfc3339(),
        "features": ["prepare", "complete"]
    }))
}
