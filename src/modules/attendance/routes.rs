use axum::{
    routing::{get, post, put},
    Router,
};

use super::handlers::{
    bulk_record_attendance, enrollment_attendances, enrollments_for_attendance, record_attendance,
    session_attendances, update_attendance,
};
use crate::app_state::AppState;

pub fn attendance_routes() -> Router<AppState> {
    Router::new()
        .route("/attendances", post(record_attendance))
        .route("/attendances/{id}", put(update_attendance))
        .route("/sessions/{id}/attendances", get(session_attendances))
        .route("/sessions/{id}/attendances/bulk", post(bulk_record_attendance))
        .route("/sessions/{id}/enrollments-for-attendance", get(enrollments_for_attendance))
        .route("/enrollments/{id}/attendances", get(enrollment_attendances))
}
