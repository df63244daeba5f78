//! Picks the template a certificate is drawn with.

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{CertificateContext, CertificateTemplate, DatabaseError, NewCertificateTemplate, TemplateScope};

pub const DEFAULT_TEMPLATE_NAME: &str = "Default Global Template";

#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn find_template(&self, template_id: Uuid) -> Result<Option<CertificateTemplate>, DatabaseError>;

    /// Most recently created active template of `scope` for `target`
    /// (a session or program id; ignored for the global scope).
    async fn latest_active(
        &self,
        scope: TemplateScope,
        target: Option<Uuid>,
    ) -> Result<Option<CertificateTemplate>, DatabaseError>;

    async fn create_template(&self, template: &NewCertificateTemplate) -> Result<CertificateTemplate, DatabaseError>;
}

/// Resolves the template for a certificate, most specific first: the pinned
/// template, the session's, the program's, the newest global one, and as a
/// last resort a freshly created default global template.
pub async fn resolve_template(
    store: &dyn TemplateStore,
    context: &CertificateContext,
) -> Result<CertificateTemplate, DatabaseError> {
    let certificate = &context.certificate;

    if let Some(template_id) = certificate.template_id {
        match store.find_template(template_id).await? {
            Some(template) => return Ok(template),
            None => warn!(
                certificate_id = %certificate.id,
                %template_id,
                "Pinned certificate template no longer exists, resolving by scope"
            ),
        }
    }

    if let Some(session) = &context.relations.session {
        if let Some(template) = store.latest_active(TemplateScope::Session, Some(session.id)).await? {
            return Ok(template);
        }
    }

    let program_id = context
        .relations
        .program
        .as_ref()
        .map(|program| program.id)
        .or_else(|| context.relations.session.as_ref().map(|session| session.program_id));
    if let Some(program_id) = program_id {
        if let Some(template) = store.latest_active(TemplateScope::Program, Some(program_id)).await? {
            return Ok(template);
        }
    }

    if let Some(template) = store.latest_active(TemplateScope::Global, None).await? {
        return Ok(template);
    }

    let template = store.create_template(&default_template()).await?;
    info!(template_id = %template.id, "Created default global certificate template");
    Ok(template)
}

pub fn default_template() -> NewCertificateTemplate {
    NewCertificateTemplate {
        name: DEFAULT_TEMPLATE_NAME.to_string(),
        scope: TemplateScope::Global,
        program_id: None,
        session_id: None,
        background_image: None,
        background_mime_type: None,
        layout_config: Some(default_layout()),
        font_family: None,
        font_size: Some(28),
        text_color: Some("#1f2937".to_string()),
        is_active: true,
    }
}

pub fn default_layout() -> serde_json::Value {
    json!({
        "canvas": { "width": 1600, "height": 1200 },
        "name": { "x": 192, "y": 384 },
        "program": { "x": 192, "y": 504 },
        "session": { "x": 192, "y": 624 },
        "issued_at": { "x": 192, "y": 744 },
        "certificate_code": { "x": 192, "y": 864 },
        "qr": { "x": 1152, "y": 696, "width": 160, "height": 160, "size": 160 }
    })
}
