use std::collections::HashSet;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::app_state::AppState;
use crate::db::{
    Attendance, BulkAttendance, BulkAttendanceItem, EnrollmentAttendances, NewAttendance, TrainingSession,
    UpdateAttendance,
};
use crate::error::{AppError, AppResult};
use crate::middleware::Actor;
use crate::response::ApiResponse;

#[derive(Debug, Serialize)]
pub struct BulkAttendanceResult {
    pub count: usize,
}

pub async fn record_attendance(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<NewAttendance>,
) -> AppResult<ApiResponse<Attendance>> {
    actor.require_staff()?;
    payload.validate()?;

    let session = state.sessions.get(payload.session_id).await?;
    ensure_session_staff(&actor, &session)?;

    let belongs = state
        .enrollments
        .find(payload.enrollment_id)
        .await?
        .is_some_and(|enrollment| enrollment.session_id == payload.session_id);
    if !belongs {
        return Err(AppError::validation("Enrollment does not belong to the session."));
    }

    let attendance = state
        .attendances
        .upsert(
            payload.session_id,
            payload.enrollment_id,
            payload.status,
            payload.note.as_deref(),
            actor.user_id,
        )
        .await?;
    info!(attendance_id = %attendance.id, enrollment_id = %attendance.enrollment_id, status = ?attendance.status, "Attendance recorded");

    Ok(ApiResponse::created(attendance, "Attendance recorded successfully."))
}

pub async fn update_attendance(
    State(state): State<AppState>,
    actor: Actor,
    Path(attendance_id): Path<Uuid>,
    Json(payload): Json<UpdateAttendance>,
) -> AppResult<ApiResponse<Attendance>> {
    actor.require_staff()?;
    payload.validate()?;

    let attendance = state
        .attendances
        .find(attendance_id)
        .await?
        .ok_or_else(|| AppError::not_found("Attendance not found."))?;
    let session = state.sessions.get(attendance.session_id).await?;
    ensure_session_staff(&actor, &session)?;

    let updated = state
        .attendances
        .update(attendance_id, payload.status, payload.note_change(), actor.user_id)
        .await?;

    Ok(ApiResponse::ok(updated, "Attendance updated successfully."))
}

pub async fn bulk_record_attendance(
    State(state): State<AppState>,
    actor: Actor,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<BulkAttendance>,
) -> AppResult<ApiResponse<BulkAttendanceResult>> {
    actor.require_staff()?;
    payload.validate()?;

    let session = state.sessions.get(session_id).await?;
    ensure_session_staff(&actor, &session)?;

    let enrollment_ids = distinct_enrollment_ids(&payload.items);
    let foreign = state.attendances.foreign_enrollments(session_id, &enrollment_ids).await?;
    if !foreign.is_empty() {
        return Err(AppError::validation("Some enrollments do not belong to this session."));
    }

    let count = state
        .attendances
        .bulk_upsert(session_id, &payload.items, actor.user_id)
        .await?;
    info!(%session_id, count, "Bulk attendance recorded");

    Ok(ApiResponse::ok(
        BulkAttendanceResult { count },
        "Attendance recorded successfully.",
    ))
}

pub async fn session_attendances(
    State(state): State<AppState>,
    actor: Actor,
    Path(session_id): Path<Uuid>,
) -> AppResult<ApiResponse<Vec<Attendance>>> {
    actor.require_staff()?;
    let session = state.sessions.get(session_id).await?;
    ensure_session_staff(&actor, &session)?;

    let attendances = state.attendances.list_for_session(session_id).await?;
    Ok(ApiResponse::ok(attendances, "Attendances retrieved successfully."))
}

pub async fn enrollments_for_attendance(
    State(state): State<AppState>,
    actor: Actor,
    Path(session_id): Path<Uuid>,
) -> AppResult<ApiResponse<Vec<EnrollmentAttendances>>> {
    actor.require_staff()?;
    let session = state.sessions.get(session_id).await?;
    ensure_session_staff(&actor, &session)?;

    let enrollments = state.enrollments.list_attending(session_id).await?;
    let ids: Vec<Uuid> = enrollments.iter().map(|enrollment| enrollment.id).collect();
    let attendances = state.attendances.list_for_enrollments(&ids).await?;

    Ok(ApiResponse::ok(
        EnrollmentAttendances::group(enrollments, attendances),
        "Enrollments retrieved successfully.",
    ))
}

pub async fn enrollment_attendances(
    State(state): State<AppState>,
    actor: Actor,
    Path(enrollment_id): Path<Uuid>,
) -> AppResult<ApiResponse<Vec<Attendance>>> {
    let enrollment = state
        .enrollments
        .find(enrollment_id)
        .await?
        .ok_or_else(|| AppError::not_found("Enrollment not found."))?;

    if enrollment.user_id != actor.user_id {
        actor.require_staff()?;
        let session = state.sessions.get(enrollment.session_id).await?;
        ensure_session_staff(&actor, &session)?;
    }

    let attendances = state.attendances.list_for_enrollment(enrollment_id).await?;
    Ok(ApiResponse::ok(attendances, "Attendances retrieved successfully."))
}

/// Trainers only handle attendance for sessions they run.
fn ensure_session_staff(actor: &Actor, session: &TrainingSession) -> AppResult<()> {
    if actor.is_admin() || session.is_trained_by(actor.user_id) {
        Ok(())
    } else {
        Err(AppError::forbidden("Only the session trainer or admin can manage attendance."))
    }
}

fn distinct_enrollment_ids(items: &[BulkAttendanceItem]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    items
        .iter()
        .map(|item| item.enrollment_id)
        .filter(|id| seen.insert(*id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ApprovalStatus, AttendanceStatus, SessionStatus};
    use crate::middleware::Role;
    use time::OffsetDateTime;

    fn session(trainer_id: Option<Uuid>) -> TrainingSession {
        TrainingSession {
            id: Uuid::new_v4(),
            program_id: Uuid::new_v4(),
            title: "Working at height".to_string(),
            start_date: None,
            end_date: None,
            capacity: 20,
            trainer_id,
            location: None,
            status: SessionStatus::Open,
            approval_status: ApprovalStatus::Approved,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn item(enrollment_id: Uuid) -> BulkAttendanceItem {
        BulkAttendanceItem {
            enrollment_id,
            status: AttendanceStatus::Present,
            note: None,
        }
    }

    #[test]
    fn only_the_sessions_trainer_or_an_admin_manage_attendance() {
        let trainer = Actor { user_id: Uuid::new_v4(), role: Role::Trainer };
        let other = Actor { user_id: Uuid::new_v4(), role: Role::Trainer };
        let admin = Actor { user_id: Uuid::new_v4(), role: Role::Admin };
        let session = session(Some(trainer.user_id));

        assert!(ensure_session_staff(&trainer, &session).is_ok());
        assert!(ensure_session_staff(&admin, &session).is_ok());
        assert!(matches!(ensure_session_staff(&other, &session), Err(AppError::Authorization(_))));
    }

    #[test]
    fn bulk_ids_are_deduplicated_in_order() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let items = vec![item(a), item(b), item(a)];
        assert_eq!(distinct_enrollment_ids(&items), vec![a, b]);
    }
}
