use axum::{extract::DefaultBodyLimit, routing::get, Router};
use tower_http::limit::RequestBodyLimitLayer;

use super::handlers::{create_template, delete_template, list_templates, show_template, update_template};
use crate::app_state::AppState;

/// Backgrounds travel base64 encoded inside JSON, so the body may be roughly
/// a third larger than the decoded image. axum's own 2 MiB extractor limit is
/// replaced by the configured one.
pub fn template_routes(upload_max_bytes: usize) -> Router<AppState> {
    let body_limit = upload_max_bytes.saturating_mul(2).max(64 * 1024);

    Router::new()
        .route("/certificate-templates", get(list_templates).post(create_template))
        .route(
            "/certificate-templates/{id}",
            get(show_template).put(update_template).delete(delete_template),
        )
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
}
