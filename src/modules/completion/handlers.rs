use axum::extract::{Path, State};
use serde::Serialize;
use time::{Date, OffsetDateTime};
use tracing::info;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::{SessionStatus, TrainingSession};
use crate::error::{AppError, AppResult};
use crate::middleware::Actor;
use crate::response::ApiResponse;
use crate::services::completion::{evaluate_enrollment_completion, evaluate_session_completions};
use crate::services::{CompletionOutcome, CompletionSummary};

#[derive(Debug, Serialize)]
pub struct SessionCompletion {
    pub session: TrainingSession,
    pub summary: CompletionSummary,
}

pub async fn complete_session(
    State(state): State<AppState>,
    actor: Actor,
    Path(session_id): Path<Uuid>,
) -> AppResult<ApiResponse<SessionCompletion>> {
    let session = state.sessions.get(session_id).await?;
    if !actor.is_admin() && !session.is_trained_by(actor.user_id) {
        return Err(AppError::forbidden("Only the session trainer or admin can complete this session."));
    }

    ensure_completable(&session, OffsetDateTime::now_utc().date())?;

    let session = state.sessions.update_status(session_id, SessionStatus::Completed).await?;
    let summary = evaluate_session_completions(&state.enrollments, session_id).await?;
    info!(%session_id, total = summary.total, completed = summary.completed, "Session completed");

    Ok(ApiResponse::ok(
        SessionCompletion { session, summary },
        "Session completed successfully.",
    ))
}

pub async fn evaluate_enrollment(
    State(state): State<AppState>,
    actor: Actor,
    Path(enrollment_id): Path<Uuid>,
) -> AppResult<ApiResponse<CompletionOutcome>> {
    actor.require_staff()?;
    let outcome = evaluate_enrollment_completion(&state.enrollments, enrollment_id).await?;

    Ok(ApiResponse::ok(outcome, "Completion evaluated successfully."))
}

fn ensure_completable(session: &TrainingSession, today: Date) -> AppResult<()> {
    if !session.can_be_completed() {
        return Err(AppError::validation("Only open or closed sessions can be completed."));
    }
    if session.end_date.is_some_and(|end| end > today) {
        return Err(AppError::validation("Session has not ended yet."));
    }
    Ok(())
}
