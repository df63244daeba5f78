use axum::{
    extract::{Path, State},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::app_state::AppState;
use crate::db::{
    CertificateTemplate, CertificateTemplatePayload, CertificateTemplateSummary, NewCertificateTemplate, TemplateScope,
};
use crate::error::{AppError, AppResult};
use crate::middleware::Actor;
use crate::response::ApiResponse;
use crate::services::TemplateStore;

/// A template with its background inlined as a `data:` URL.
#[derive(Debug, Serialize)]
pub struct TemplateView {
    #[serde(flatten)]
    pub template: CertificateTemplate,
    pub background_image_url: Option<String>,
}

impl From<CertificateTemplate> for TemplateView {
    fn from(template: CertificateTemplate) -> Self {
        let background_image_url = background_data_url(&template);
        Self {
            template,
            background_image_url,
        }
    }
}

pub async fn list_templates(
    State(state): State<AppState>,
    actor: Actor,
) -> AppResult<ApiResponse<Vec<CertificateTemplateSummary>>> {
    actor.require_staff()?;
    let templates = if actor.is_admin() {
        state.templates.list_all().await?
    } else {
        state.templates.list_for_trainer(actor.user_id).await?
    };

    let summaries = templates.iter().map(CertificateTemplateSummary::from).collect();
    Ok(ApiResponse::ok(summaries, "Certificate templates retrieved successfully."))
}

pub async fn show_template(
    State(state): State<AppState>,
    actor: Actor,
    Path(template_id): Path<Uuid>,
) -> AppResult<ApiResponse<TemplateView>> {
    actor.require_staff()?;
    let template = find_template(&state, template_id).await?;
    ensure_can_manage(&state, &actor, template.scope, template.program_id, template.session_id).await?;

    Ok(ApiResponse::ok(template.into(), "Certificate template retrieved successfully."))
}

pub async fn create_template(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<CertificateTemplatePayload>,
) -> AppResult<ApiResponse<TemplateView>> {
    actor.require_staff()?;
    payload.validate()?;

    let max_bytes = state.env.certificates.template_upload_max_bytes;
    let new = build_template(payload, None, max_bytes)?;
    ensure_targets_exist(&state, &new).await?;
    ensure_can_manage(&state, &actor, new.scope, new.program_id, new.session_id).await?;

    let template = state.templates.create_template(&new).await?;
    info!(template_id = %template.id, scope = ?template.scope, "Certificate template created");

    Ok(ApiResponse::created(template.into(), "Certificate template created successfully."))
}

pub async fn update_template(
    State(state): State<AppState>,
    actor: Actor,
    Path(template_id): Path<Uuid>,
    Json(payload): Json<CertificateTemplatePayload>,
) -> AppResult<ApiResponse<TemplateView>> {
    actor.require_staff()?;
    payload.validate()?;

    let existing = find_template(&state, template_id).await?;
    ensure_can_manage(&state, &actor, existing.scope, existing.program_id, existing.session_id).await?;

    let max_bytes = state.env.certificates.template_upload_max_bytes;
    let updated = build_template(payload, Some(&existing), max_bytes)?;
    ensure_targets_exist(&state, &updated).await?;
    ensure_can_manage(&state, &actor, updated.scope, updated.program_id, updated.session_id).await?;

    let template = state.templates.update(template_id, &updated).await?;
    info!(%template_id, "Certificate template updated");

    Ok(ApiResponse::ok(template.into(), "Certificate template updated successfully."))
}

pub async fn delete_template(
    State(state): State<AppState>,
    actor: Actor,
    Path(template_id): Path<Uuid>,
) -> AppResult<ApiResponse<Option<()>>> {
    actor.require_staff()?;
    let template = find_template(&state, template_id).await?;
    ensure_can_manage(&state, &actor, template.scope, template.program_id, template.session_id).await?;

    state.templates.delete(template_id).await?;
    info!(%template_id, "Certificate template deleted");

    Ok(ApiResponse::ok(None, "Certificate template deleted successfully."))
}

async fn find_template(state: &AppState, template_id: Uuid) -> AppResult<CertificateTemplate> {
    state
        .templates
        .find_template(template_id)
        .await?
        .ok_or_else(|| AppError::not_found("Certificate template not found."))
}

/// Trainers manage program templates of programs they own and session
/// templates of sessions they train; global templates are admin-only.
async fn ensure_can_manage(
    state: &AppState,
    actor: &Actor,
    scope: TemplateScope,
    program_id: Option<Uuid>,
    session_id: Option<Uuid>,
) -> AppResult<()> {
    if actor.is_admin() {
        return Ok(());
    }

    match scope {
        TemplateScope::Global => Err(AppError::forbidden(
            "Only admin can manage global certificate templates.",
        )),
        TemplateScope::Program => {
            let owned = match program_id {
                Some(program_id) => state
                    .programs
                    .find(program_id)
                    .await?
                    .is_some_and(|program| program.is_owned_by(actor.user_id)),
                None => false,
            };
            if owned {
                Ok(())
            } else {
                Err(AppError::forbidden(
                    "Only the program owner can manage this certificate template.",
                ))
            }
        }
        TemplateScope::Session => {
            let trained = match session_id {
                Some(session_id) => state
                    .sessions
                    .find(session_id)
                    .await?
                    .is_some_and(|session| session.is_trained_by(actor.user_id)),
                None => false,
            };
            if trained {
                Ok(())
            } else {
                Err(AppError::forbidden(
                    "Only the session trainer can manage this certificate template.",
                ))
            }
        }
    }
}

async fn ensure_targets_exist(state: &AppState, template: &NewCertificateTemplate) -> AppResult<()> {
    if let Some(program_id) = template.program_id {
        if state.programs.find(program_id).await?.is_none() {
            return Err(AppError::validation("The selected program id is invalid."));
        }
    }
    if let Some(session_id) = template.session_id {
        if state.sessions.find(session_id).await?.is_none() {
            return Err(AppError::validation("The selected session id is invalid."));
        }
    }
    Ok(())
}

/// Merges a payload over an existing template (or defaults on create) and
/// normalizes the scope targets.
pub fn build_template(
    payload: CertificateTemplatePayload,
    existing: Option<&CertificateTemplate>,
    max_background_bytes: usize,
) -> AppResult<NewCertificateTemplate> {
    let name = payload
        .name
        .or_else(|| existing.map(|t| t.name.clone()))
        .ok_or_else(|| AppError::validation("The name field is required."))?;
    let scope = payload
        .scope
        .or_else(|| existing.map(|t| t.scope))
        .ok_or_else(|| AppError::validation("The scope field is required."))?;

    let mut program_id = payload.program_id.or_else(|| existing.and_then(|t| t.program_id));
    let mut session_id = payload.session_id.or_else(|| existing.and_then(|t| t.session_id));

    match scope {
        TemplateScope::Global => {
            program_id = None;
            session_id = None;
        }
        TemplateScope::Program => {
            if program_id.is_none() {
                return Err(AppError::validation("The program id field is required for program templates."));
            }
            session_id = None;
        }
        TemplateScope::Session => {
            if session_id.is_none() {
                return Err(AppError::validation("The session id field is required for session templates."));
            }
        }
    }

    let (background_image, background_mime_type) = match payload.background_image {
        Some(encoded) if encoded.trim().is_empty() => (None, None),
        Some(encoded) => {
            let bytes = decode_background(&encoded, max_background_bytes)?;
            let mime_type = payload
                .background_mime_type
                .ok_or_else(|| AppError::validation("The background mime type field is required with a background image."))?;
            (Some(bytes), Some(mime_type))
        }
        None => (
            existing.and_then(|t| t.background_image.clone()),
            existing.and_then(|t| t.background_mime_type.clone()),
        ),
    };

    let layout_config = match payload.layout_config {
        Some(value) => normalize_layout_config(value),
        None => existing.and_then(|t| t.layout_config.clone()),
    };

    Ok(NewCertificateTemplate {
        name,
        scope,
        program_id,
        session_id,
        background_image,
        background_mime_type,
        layout_config,
        font_family: payload.font_family.or_else(|| existing.and_then(|t| t.font_family.clone())),
        font_size: payload.font_size.or_else(|| existing.and_then(|t| t.font_size)),
        text_color: payload.text_color.or_else(|| existing.and_then(|t| t.text_color.clone())),
        is_active: payload.is_active.or_else(|| existing.map(|t| t.is_active)).unwrap_or(true),
    })
}

/// Accepts a JSON object or a JSON-encoded string. Anything that does not
/// decode is stored as null.
pub fn normalize_layout_config(value: Value) -> Option<Value> {
    match value {
        Value::Object(_) | Value::Array(_) => Some(value),
        Value::String(encoded) if encoded.trim().is_empty() => None,
        Value::String(encoded) => serde_json::from_str::<Value>(&encoded).ok().filter(|decoded| !decoded.is_null()),
        _ => None,
    }
}

fn decode_background(encoded: &str, max_bytes: usize) -> AppResult<Vec<u8>> {
    // Browsers send data URLs; plain base64 is accepted too.
    let raw = match encoded.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => encoded,
    };

    let bytes = STANDARD
        .decode(raw.trim())
        .map_err(|_| AppError::validation("The background image must be base64 encoded."))?;

    if bytes.len() > max_bytes {
        return Err(AppError::validation(format!(
            "The background image may not be greater than {} kilobytes.",
            max_bytes / 1024
        )));
    }
    if image::guess_format(&bytes).is_err() {
        return Err(AppError::validation("The background image must be an image."));
    }

    Ok(bytes)
}

fn background_data_url(template: &CertificateTemplate) -> Option<String> {
    let bytes = template.background_image.as_deref().filter(|b| !b.is_empty())?;
    let mime_type = template.background_mime_type.as_deref()?;
    Some(format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::OffsetDateTime;

    const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    fn existing(scope: TemplateScope) -> CertificateTemplate {
        CertificateTemplate {
            id: Uuid::new_v4(),
            name: "Existing".to_string(),
            scope,
            program_id: Some(Uuid::new_v4()),
            session_id: Some(Uuid::new_v4()),
            background_image: Some(PNG_SIGNATURE.to_vec()),
            background_mime_type: Some("image/png".to_string()),
            layout_config: Some(json!({ "name": { "x": 1, "y": 2 } })),
            font_family: Some("Inter".to_string()),
            font_size: Some(30),
            text_color: Some("#000".to_string()),
            is_active: false,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn create_requires_name_and_scope() {
        let payload = CertificateTemplatePayload {
            scope: Some(TemplateScope::Global),
            ..Default::default()
        };
        assert!(matches!(build_template(payload, None, 1024), Err(AppError::Validation(_))));

        let payload = CertificateTemplatePayload {
            name: Some("Certificate".to_string()),
            ..Default::default()
        };
        assert!(matches!(build_template(payload, None, 1024), Err(AppError::Validation(_))));
    }

    #[test]
    fn create_defaults_to_active_and_clears_global_targets() {
        let payload = CertificateTemplatePayload {
            name: Some("Certificate".to_string()),
            scope: Some(TemplateScope::Global),
            program_id: Some(Uuid::new_v4()),
            session_id: Some(Uuid::new_v4()),
            ..Default::default()
        };
        let template = build_template(payload, None, 1024).unwrap();
        assert!(template.is_active);
        assert_eq!(template.program_id, None);
        assert_eq!(template.session_id, None);
        assert_eq!(template.layout_config, None);
    }

    #[test]
    fn scoped_templates_need_their_target() {
        let payload = CertificateTemplatePayload {
            name: Some("Certificate".to_string()),
            scope: Some(TemplateScope::Program),
            ..Default::default()
        };
        assert!(build_template(payload, None, 1024).is_err());

        let program_id = Uuid::new_v4();
        let payload = CertificateTemplatePayload {
            name: Some("Certificate".to_string()),
            scope: Some(TemplateScope::Program),
            program_id: Some(program_id),
            session_id: Some(Uuid::new_v4()),
            ..Default::default()
        };
        let template = build_template(payload, None, 1024).unwrap();
        assert_eq!(template.program_id, Some(program_id));
        assert_eq!(template.session_id, None);
    }

    #[test]
    fn session_templates_keep_the_given_program() {
        let (program_id, session_id) = (Uuid::new_v4(), Uuid::new_v4());
        let payload = CertificateTemplatePayload {
            name: Some("Certificate".to_string()),
            scope: Some(TemplateScope::Session),
            program_id: Some(program_id),
            session_id: Some(session_id),
            ..Default::default()
        };
        let template = build_template(payload, None, 1024).unwrap();
        assert_eq!(template.program_id, Some(program_id));
        assert_eq!(template.session_id, Some(session_id));
    }

    #[test]
    fn update_keeps_unspecified_fields() {
        let existing = existing(TemplateScope::Session);
        let payload = CertificateTemplatePayload {
            font_size: Some(40),
            ..Default::default()
        };
        let template = build_template(payload, Some(&existing), 1024).unwrap();
        assert_eq!(template.name, "Existing");
        assert_eq!(template.font_size, Some(40));
        assert_eq!(template.font_family.as_deref(), Some("Inter"));
        assert_eq!(template.background_image, existing.background_image);
        assert_eq!(template.layout_config, existing.layout_config);
        assert!(!template.is_active);
    }

    #[test]
    fn background_accepts_base64_and_data_urls() {
        let encoded = STANDARD.encode(PNG_SIGNATURE);
        let payload = CertificateTemplatePayload {
            name: Some("Certificate".to_string()),
            scope: Some(TemplateScope::Global),
            background_image: Some(format!("data:image/png;base64,{}", encoded)),
            background_mime_type: Some("image/png".to_string()),
            ..Default::default()
        };
        let template = build_template(payload, None, 1024).unwrap();
        assert_eq!(template.background_image, Some(PNG_SIGNATURE.to_vec()));
    }

    #[test]
    fn background_is_checked_for_size_and_type() {
        let too_big = STANDARD.encode(vec![0u8; 2048]);
        assert!(decode_background(&too_big, 1024).is_err());

        let not_an_image = STANDARD.encode(b"hello world");
        assert!(decode_background(&not_an_image, 1024).is_err());

        assert!(decode_background("%%%not base64%%%", 1024).is_err());
    }

    #[test]
    fn layout_config_accepts_objects_and_encoded_strings() {
        let object = json!({ "name": { "x": 10, "y": 20 } });
        assert_eq!(normalize_layout_config(object.clone()), Some(object.clone()));
        assert_eq!(
            normalize_layout_config(Value::String(object.to_string())),
            Some(object)
        );
        assert_eq!(normalize_layout_config(Value::String("{not json".to_string())), None);
        assert_eq!(normalize_layout_config(Value::String(String::new())), None);
        assert_eq!(normalize_layout_config(Value::Null), None);
    }

    #[test]
    fn view_exposes_background_as_data_url() {
        let view = TemplateView::from(existing(TemplateScope::Global));
        let url = view.background_image_url.unwrap();
        assert!(url.starts_with("data:image/png;base64,"));

        let json = serde_json::to_value(TemplateView::from(existing(TemplateScope::Global))).unwrap();
        assert!(json.get("background_image").is_none());
        assert_eq!(json["name"], "Existing");
    }
}
