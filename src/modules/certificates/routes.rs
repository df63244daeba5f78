use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    download_certificate, issue_program_certificates, issue_session_certificates, my_certificates,
    program_certificates, regenerate_certificate, revoke_certificate, session_certificates, show_certificate,
    view_certificate,
};
use crate::app_state::AppState;

pub fn certificate_routes() -> Router<AppState> {
    Router::new()
        .route("/me/certificates", get(my_certificates))
        .route("/certificates/{id}", get(show_certificate))
        .route("/certificates/{id}/download", get(download_certificate))
        .route("/certificates/{id}/view", get(view_certificate))
        .route(
            "/sessions/{id}/certificates",
            get(session_certificates).post(issue_session_certificates),
        )
        .route(
            "/programs/{id}/certificates",
            get(program_certificates).post(issue_program_certificates),
        )
        .route("/admin/certificates/{id}/revoke", post(revoke_certificate))
        .route("/admin/certificates/{id}/regenerate", post(regenerate_certificate))
}
