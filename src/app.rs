use axum::{extract::State, middleware, routing::get, Json, Router};
use serde_json::json;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::{
    app_state::AppState,
    middleware::tracing::observability_middleware,
    modules::{
        attendance::routes::attendance_routes,
        certificate_requests::routes::certificate_request_routes,
        certificates::routes::certificate_routes,
        completion::routes::completion_routes,
        templates::routes::template_routes,
        verify::routes::{verify_api_routes, verify_page_routes},
    },
};

pub fn create_router(state: AppState) -> Router {
    let static_dir = state.env.app.static_dir.to_string();
    let upload_max_bytes = state.env.certificates.template_upload_max_bytes;

    let api = Router::new()
        .merge(certificate_routes())
        .merge(certificate_request_routes())
        .merge(template_routes(upload_max_bytes))
        .merge(attendance_routes())
        .merge(completion_routes())
        .merge(verify_api_routes());

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api)
        .merge(verify_page_routes())
        .nest_service("/static", tower_http::services::ServeDir::new(static_dir))
        .layer(middleware::from_fn(observability_middleware))
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let db_result = sqlx::query("SELECT 1").execute(&state.db).await;

    let db_status = match db_result {
        Ok(_) => "healthy",
        Err(e) => {
            tracing::info!("Database health check failed: {}", e);
            "unhealthy"
        }
    };

    let telemetry_health = crate::telemetry::telemetry_health_check();

    Json(json!({
        "status": "ok",
        "timestamp": OffsetDateTime::now_utc().format(&Rfc3339).ok(),
        "version": env!("CARGO_PKG_VERSION"),
        "services": {
            "database": db_status,
            "telemetry": telemetry_health
        }
    }))
}
