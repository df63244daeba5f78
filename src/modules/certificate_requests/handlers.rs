use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::app_state::AppState;
use crate::db::{
    CertificateRequest, CertificateRequestFilter, NewCertificateRequest, RejectCertificateRequest, RequestTarget,
};
use crate::error::{AppError, AppResult};
use crate::middleware::Actor;
use crate::response::ApiResponse;
use crate::services::certificate_issuance::{self, RequestApproval, RequestSubject};

#[derive(Debug, Serialize)]
pub struct CertificateRequestDetail {
    pub request: CertificateRequest,
    pub eligible_enrollments_count: i64,
}

pub async fn create_request(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<NewCertificateRequest>,
) -> AppResult<ApiResponse<CertificateRequest>> {
    if !actor.is_trainer() {
        return Err(AppError::forbidden("Only trainers can create certificate requests."));
    }
    payload.validate()?;

    let target = payload.target().map_err(AppError::validation)?;
    let subject = load_subject(&state, target).await?;
    certificate_issuance::ensure_requestable(&subject)?;

    if state.certificate_requests.has_open_request(target).await? {
        return Err(AppError::validation(
            "A pending or approved certificate request already exists for this record.",
        ));
    }

    let request = state
        .certificate_requests
        .create(actor.user_id, target, payload.note_text())
        .await?;
    info!(request_id = %request.id, trainer_id = %actor.user_id, request_type = ?request.request_type, "Certificate request submitted");

    Ok(ApiResponse::created(request, "Certificate request submitted successfully."))
}

pub async fn trainer_requests(
    State(state): State<AppState>,
    actor: Actor,
) -> AppResult<ApiResponse<Vec<CertificateRequest>>> {
    if !actor.is_trainer() {
        return Err(AppError::forbidden("Only trainers can view certificate requests."));
    }

    let requests = state.certificate_requests.list_for_trainer(actor.user_id).await?;
    Ok(ApiResponse::ok(requests, "Certificate requests retrieved successfully."))
}

pub async fn list_requests(
    State(state): State<AppState>,
    actor: Actor,
    Query(filter): Query<CertificateRequestFilter>,
) -> AppResult<ApiResponse<Vec<CertificateRequest>>> {
    actor.require_admin()?;

    let requests = state.certificate_requests.list(&filter).await?;
    Ok(ApiResponse::ok(requests, "Certificate requests retrieved successfully."))
}

pub async fn show_request(
    State(state): State<AppState>,
    actor: Actor,
    Path(request_id): Path<Uuid>,
) -> AppResult<ApiResponse<CertificateRequestDetail>> {
    actor.require_admin()?;

    let request = find_request(&state, request_id).await?;
    let eligible_enrollments_count = match request.target() {
        Some(target) => state.certificate_requests.count_eligible(target).await?,
        None => 0,
    };

    Ok(ApiResponse::ok(
        CertificateRequestDetail {
            request,
            eligible_enrollments_count,
        },
        "Certificate request retrieved successfully.",
    ))
}

pub async fn approve_request(
    State(state): State<AppState>,
    actor: Actor,
    Path(request_id): Path<Uuid>,
) -> AppResult<ApiResponse<RequestApproval>> {
    if !actor.is_admin() {
        return Err(AppError::forbidden("Only admins can approve certificate requests."));
    }

    let request = find_request(&state, request_id).await?;
    ensure_pending(&request)?;
    let target = request
        .target()
        .ok_or_else(|| AppError::validation("Certificate request has no target."))?;
    let subject = load_subject(&state, target).await?;

    let approval = certificate_issuance::approve_request(&state.db, request_id, &subject, actor.user_id).await?;
    Ok(ApiResponse::ok(approval, "Certificate request approved."))
}

pub async fn reject_request(
    State(state): State<AppState>,
    actor: Actor,
    Path(request_id): Path<Uuid>,
    payload: Option<Json<RejectCertificateRequest>>,
) -> AppResult<ApiResponse<CertificateRequest>> {
    if !actor.is_admin() {
        return Err(AppError::forbidden("Only admins can reject certificate requests."));
    }
    let payload = payload.map(|Json(payload)| payload).unwrap_or_default();
    payload.validate()?;

    let request = find_request(&state, request_id).await?;
    ensure_pending(&request)?;

    let rejected = state
        .certificate_requests
        .reject(request_id, actor.user_id, payload.note.as_deref())
        .await?
        .ok_or_else(|| AppError::validation("Certificate request must be pending."))?;
    info!(%request_id, rejected_by = %actor.user_id, "Certificate request rejected");

    Ok(ApiResponse::ok(rejected, "Certificate request rejected."))
}

async fn find_request(state: &AppState, request_id: Uuid) -> AppResult<CertificateRequest> {
    state
        .certificate_requests
        .find(request_id)
        .await?
        .ok_or_else(|| AppError::not_found("Certificate request not found."))
}

fn ensure_pending(request: &CertificateRequest) -> AppResult<()> {
    if request.is_pending() {
        Ok(())
    } else {
        Err(AppError::validation("Certificate request must be pending."))
    }
}

async fn load_subject(state: &AppState, target: RequestTarget) -> AppResult<RequestSubject> {
    match target {
        RequestTarget::Program(program_id) => state
            .programs
            .find(program_id)
            .await?
            .map(RequestSubject::Program)
            .ok_or_else(|| AppError::validation("The selected program id is invalid.")),
        RequestTarget::Session(session_id) => state
            .sessions
            .find(session_id)
            .await?
            .map(RequestSubject::Session)
            .ok_or_else(|| AppError::validation("The selected session id is invalid.")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CertificateRequestStatus, CertificateRequestType};
    use time::OffsetDateTime;

    fn request(status: CertificateRequestStatus) -> CertificateRequest {
        CertificateRequest {
            id: Uuid::new_v4(),
            trainer_id: Uuid::new_v4(),
            program_id: Some(Uuid::new_v4()),
            session_id: None,
            request_type: CertificateRequestType::Program,
            status,
            approved_by: None,
            approved_at: None,
            note: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn only_pending_requests_can_be_decided() {
        assert!(ensure_pending(&request(CertificateRequestStatus::Pending)).is_ok());
        assert!(matches!(
            ensure_pending(&request(CertificateRequestStatus::Approved)),
            Err(AppError::Validation(_))
        ));
        assert!(ensure_pending(&request(CertificateRequestStatus::Rejected)).is_err());
    }

    #[test]
    fn detail_wraps_the_request() {
        let detail = CertificateRequestDetail {
            request: request(CertificateRequestStatus::Pending),
            eligible_enrollments_count: 4,
        };
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["eligible_enrollments_count"], 4);
        assert_eq!(json["request"]["type"], "program");
    }
}
