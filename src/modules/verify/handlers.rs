use askama::Template;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use tracing::error;

use crate::app_state::AppState;
use crate::db::VerifiedCertificate;
use crate::error::{AppError, AppResult};
use crate::response::ApiResponse;
use crate::services::renderer::format_datetime;
use crate::services::CertificateStore;

const VERIFICATION_DATE_FORMAT: &str = "F j, Y";

struct HtmlTemplate<T>(T);

impl<T> IntoResponse for HtmlTemplate<T>
where
    T: Template,
{
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(html) => Html(html).into_response(),
            Err(e) => {
                error!("Failed to render template: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}

#[derive(Template)]
#[template(path = "verify.html")]
struct VerifyTemplate {
    app_name: String,
    code: String,
    certificate: Option<VerifiedCertificate>,
    issued_on: String,
}

/// Looks up a certificate by code; revoked and unknown codes are both invalid.
async fn find_verified(state: &AppState, code: &str) -> AppResult<Option<VerifiedCertificate>> {
    let Some(certificate) = state.certificates.find_by_code(code).await? else {
        return Ok(None);
    };
    if !certificate.is_valid() {
        return Ok(None);
    }

    let relations = state.certificates.load_relations(&certificate).await?;
    Ok(Some(VerifiedCertificate {
        recipient: relations.recipient_name,
        program: relations.program.map(|program| program.name),
        session: relations.session.map(|session| session.title),
        issued_at: certificate.issued_at,
        status: certificate.status,
        certificate_code: certificate.certificate_code,
    }))
}

pub async fn verify_certificate(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> AppResult<ApiResponse<VerifiedCertificate>> {
    let certificate = find_verified(&state, code.trim())
        .await?
        .ok_or_else(|| AppError::not_found("Certificate invalid."))?;

    Ok(ApiResponse::ok(certificate, "Certificate is valid."))
}

pub async fn verify_certificate_page(State(state): State<AppState>, Path(code): Path<String>) -> AppResult<Response> {
    let code = code.trim().to_string();
    let certificate = find_verified(&state, &code).await?;
    let status = if certificate.is_some() {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    let issued_on = certificate
        .as_ref()
        .map(|c| format_datetime(c.issued_at, VERIFICATION_DATE_FORMAT))
        .unwrap_or_default();

    let page = VerifyTemplate {
        app_name: state.env.app.name.clone(),
        code,
        certificate,
        issued_on,
    };

    Ok((status, HtmlTemplate(page)).into_response())
}
