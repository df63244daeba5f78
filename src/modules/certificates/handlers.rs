use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::access::{can_access_certificate, certificate_filename};
use crate::app_state::AppState;
use crate::db::{Certificate, CertificateContext, RegenerateCertificate, RevokeCertificate};
use crate::error::{AppError, AppResult};
use crate::middleware::Actor;
use crate::response::ApiResponse;
use crate::services::certificate_issuance::{self, IssuanceSummary};
use crate::services::CertificateStore;

const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

pub async fn my_certificates(State(state): State<AppState>, actor: Actor) -> AppResult<ApiResponse<Vec<Certificate>>> {
    let certificates = state.certificates.list_for_user(actor.user_id).await?;
    Ok(ApiResponse::ok(certificates, "Certificates retrieved successfully."))
}

pub async fn show_certificate(
    State(state): State<AppState>,
    actor: Actor,
    Path(certificate_id): Path<Uuid>,
) -> AppResult<ApiResponse<CertificateContext>> {
    let certificate = state
        .certificates
        .find(certificate_id)
        .await?
        .ok_or_else(|| AppError::not_found("Certificate not found."))?;
    let relations = state.certificates.load_relations(&certificate).await?;
    let context = CertificateContext {
        certificate,
        relations,
    };

    if !can_access_certificate(&actor, &context) {
        return Err(AppError::forbidden("You are not allowed to view this certificate."));
    }

    Ok(ApiResponse::ok(context, "Certificate retrieved successfully."))
}

pub async fn download_certificate(
    State(state): State<AppState>,
    actor: Actor,
    Path(certificate_id): Path<Uuid>,
) -> AppResult<Response> {
    certificate_file_response(&state, &actor, certificate_id, "attachment").await
}

pub async fn view_certificate(
    State(state): State<AppState>,
    actor: Actor,
    Path(certificate_id): Path<Uuid>,
) -> AppResult<Response> {
    certificate_file_response(&state, &actor, certificate_id, "inline").await
}

async fn certificate_file_response(
    state: &AppState,
    actor: &Actor,
    certificate_id: Uuid,
    disposition: &str,
) -> AppResult<Response> {
    let context = state.certificate_files.load_context(certificate_id).await?;
    if !can_access_certificate(actor, &context) {
        let verb = if disposition == "attachment" { "download" } else { "view" };
        return Err(AppError::forbidden(format!("You are not allowed to {} this certificate.", verb)));
    }

    let certificate = state.certificate_files.generate_and_store_file(context).await?;
    let mime_type = certificate
        .file_mime_type
        .clone()
        .unwrap_or_else(|| FALLBACK_MIME_TYPE.to_string());
    let filename = certificate_filename(&certificate.certificate_code, &mime_type);
    let bytes = certificate
        .file_data
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| AppError::FileUnavailable(format!("Certificate {} has no stored file", certificate_id)))?;

    Ok((
        [
            (header::CONTENT_TYPE, mime_type),
            (header::CONTENT_DISPOSITION, format!("{}; filename=\"{}\"", disposition, filename)),
        ],
        bytes,
    )
        .into_response())
}

pub async fn session_certificates(
    State(state): State<AppState>,
    actor: Actor,
    Path(session_id): Path<Uuid>,
) -> AppResult<ApiResponse<Vec<Certificate>>> {
    let session = state.sessions.get(session_id).await?;
    if !actor.is_admin() && !session.is_trained_by(actor.user_id) {
        return Err(AppError::forbidden("Only the session trainer or admin can view certificates."));
    }

    let certificates = state.certificates.list_for_session(session_id).await?;
    Ok(ApiResponse::ok(certificates, "Session certificates retrieved successfully."))
}

pub async fn program_certificates(
    State(state): State<AppState>,
    actor: Actor,
    Path(program_id): Path<Uuid>,
) -> AppResult<ApiResponse<Vec<Certificate>>> {
    let program = state.programs.get(program_id).await?;
    if !actor.is_admin() && !program.is_owned_by(actor.user_id) {
        return Err(AppError::forbidden("Only the program owner or admin can view certificates."));
    }

    let certificates = state.certificates.list_for_program(program_id).await?;
    Ok(ApiResponse::ok(certificates, "Program certificates retrieved successfully."))
}

pub async fn issue_session_certificates(
    State(state): State<AppState>,
    actor: Actor,
    Path(session_id): Path<Uuid>,
) -> AppResult<ApiResponse<IssuanceSummary>> {
    let session = state.sessions.get(session_id).await?;
    if !actor.is_admin() && !session.is_trained_by(actor.user_id) {
        return Err(AppError::forbidden("Only the session trainer or admin can generate certificates."));
    }

    let summary = certificate_issuance::issue_for_session(&state.db, &session, actor.user_id).await?;
    Ok(ApiResponse::ok(summary, "Certificates generated successfully."))
}

pub async fn issue_program_certificates(
    State(state): State<AppState>,
    actor: Actor,
    Path(program_id): Path<Uuid>,
) -> AppResult<ApiResponse<IssuanceSummary>> {
    let program = state.programs.get(program_id).await?;
    if !actor.is_admin() && !program.is_owned_by(actor.user_id) {
        return Err(AppError::forbidden("Only the program owner or admin can generate certificates."));
    }

    let summary = certificate_issuance::issue_for_program(&state.db, &program, actor.user_id).await?;
    Ok(ApiResponse::ok(summary, "Certificates generated successfully."))
}

pub async fn revoke_certificate(
    State(state): State<AppState>,
    actor: Actor,
    Path(certificate_id): Path<Uuid>,
    payload: Option<Json<RevokeCertificate>>,
) -> AppResult<ApiResponse<Certificate>> {
    actor.require_admin()?;
    let payload = payload.map(|Json(payload)| payload).unwrap_or_default();
    payload.validate()?;

    let certificate = state
        .certificates
        .find(certificate_id)
        .await?
        .ok_or_else(|| AppError::not_found("Certificate not found."))?;

    if !certificate.is_valid() {
        return Ok(ApiResponse::ok(certificate, "Certificate already revoked."));
    }

    let revoked = state
        .certificates
        .revoke(certificate_id, actor.user_id, payload.note.as_deref())
        .await?;
    info!(%certificate_id, revoked_by = %actor.user_id, "Certificate revoked");

    Ok(ApiResponse::ok(revoked, "Certificate revoked successfully."))
}

pub async fn regenerate_certificate(
    State(state): State<AppState>,
    actor: Actor,
    Path(certificate_id): Path<Uuid>,
    payload: Option<Json<RegenerateCertificate>>,
) -> AppResult<ApiResponse<Certificate>> {
    actor.require_admin()?;
    let payload = payload.map(|Json(payload)| payload).unwrap_or_default();
    payload.validate()?;

    let certificate = state
        .certificate_files
        .regenerate(certificate_id, payload.template_id)
        .await?;

    Ok(ApiResponse::ok(certificate, "Certificate regenerated successfully."))
}
