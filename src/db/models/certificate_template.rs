use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;
use time::OffsetDateTime;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "template_scope", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TemplateScope {
    Global,
    Program,
    Session,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct CertificateTemplate {
    pub id: Uuid,
    pub name: String,
    pub scope: TemplateScope,
    pub program_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    #[sqlx(default)]
    #[serde(skip)]
    pub background_image: Option<Vec<u8>>,
    pub background_mime_type: Option<String>,
    pub layout_config: Option<serde_json::Value>,
    pub font_family: Option<String>,
    pub font_size: Option<i32>,
    pub text_color: Option<String>,
    pub is_active: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl CertificateTemplate {
    pub fn has_background(&self) -> bool {
        self.background_image.as_ref().is_some_and(|bytes| !bytes.is_empty())
    }
}

/// Fully normalized values for inserting a template row.
#[derive(Debug, Clone)]
pub struct NewCertificateTemplate {
    pub name: String,
    pub scope: TemplateScope,
    pub program_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    pub background_image: Option<Vec<u8>>,
    pub background_mime_type: Option<String>,
    pub layout_config: Option<serde_json::Value>,
    pub font_family: Option<String>,
    pub font_size: Option<i32>,
    pub text_color: Option<String>,
    pub is_active: bool,
}

/// Request body for creating or updating a template.
///
/// `layout_config` accepts either a JSON object or a JSON-encoded string.
/// `background_image` is base64; it is decoded by the handler.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct CertificateTemplatePayload {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub scope: Option<TemplateScope>,
    pub program_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    pub background_image: Option<String>,
    #[validate(custom(function = "validate_image_mime_type"))]
    pub background_mime_type: Option<String>,
    pub layout_config: Option<serde_json::Value>,
    #[validate(length(max = 255))]
    pub font_family: Option<String>,
    #[validate(range(min = 1, max = 200))]
    pub font_size: Option<i32>,
    #[validate(length(max = 30))]
    pub text_color: Option<String>,
    pub is_active: Option<bool>,
}

fn validate_image_mime_type(mime_type: &str) -> Result<(), ValidationError> {
    if mime_type.starts_with("image/") {
        Ok(())
    } else {
        Err(ValidationError::new("image_mime_type"))
    }
}

/// Listing entry; background bytes are reduced to a flag.
#[derive(Debug, Clone, Serialize)]
pub struct CertificateTemplateSummary {
    pub id: Uuid,
    pub name: String,
    pub scope: TemplateScope,
    pub program_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    pub is_active: bool,
    pub has_background: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl From<&CertificateTemplate> for CertificateTemplateSummary {
    fn from(template: &CertificateTemplate) -> Self {
        Self {
            id: template.id,
            name: template.name.clone(),
            scope: template.scope,
            program_id: template.program_id,
            session_id: template.session_id,
            is_active: template.is_active,
            has_background: template.has_background(),
            created_at: template.created_at,
            updated_at: template.updated_at,
        }
    }
}
