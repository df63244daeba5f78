use axum::{routing::post, Router};

use super::handlers::{complete_session, evaluate_enrollment};
use crate::app_state::AppState;

pub fn completion_routes() -> Router<AppState> {
    Router::new()
        .route("/sessions/{id}/complete", post(complete_session))
        .route("/enrollments/{id}/evaluate-completion", post(evaluate_enrollment))
}
