use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    approve_request, create_request, list_requests, reject_request, show_request, trainer_requests,
};
use crate::app_state::AppState;

pub fn certificate_request_routes() -> Router<AppState> {
    Router::new()
        .route("/certificate-requests", post(create_request))
        .route("/trainer/certificate-requests", get(trainer_requests))
        .route("/admin/certificate-requests", get(list_requests))
        .route("/admin/certificate-requests/{id}", get(show_request))
        .route("/admin/certificate-requests/{id}/approve", post(approve_request))
        .route("/admin/certificate-requests/{id}/reject", post(reject_request))
}
