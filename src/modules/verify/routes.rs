use axum::{routing::get, Router};

use super::handlers::{verify_certificate, verify_certificate_page};
use crate::app_state::AppState;

/// JSON verification, mounted under `/api`.
pub fn verify_api_routes() -> Router<AppState> {
    Router::new().route("/verify/{code}", get(verify_certificate))
}

/// The human-facing page that certificate QR codes point at.
pub fn verify_page_routes() -> Router<AppState> {
    Router::new().route("/verify/{code}", get(verify_certificate_page))
}
