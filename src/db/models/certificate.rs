use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;
use time::{Date, OffsetDateTime};
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "certificate_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    Valid,
    Revoked,
}

/// A certificate row.
///
/// `file_data` is only selected when the rendered file is needed; listing
/// queries leave it out and it defaults to `None`.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Certificate {
    pub id: Uuid,
    pub enrollment_id: Uuid,
    pub user_id: Uuid,
    pub program_id: Uuid,
    pub session_id: Option<Uuid>,
    pub template_id: Option<Uuid>,
    pub issued_by: Option<Uuid>,
    pub issued_at: OffsetDateTime,
    pub certificate_code: String,
    pub status: CertificateStatus,
    pub revoked_by: Option<Uuid>,
    pub revoked_at: Option<OffsetDateTime>,
    pub revoked_note: Option<String>,
    #[sqlx(default)]
    #[serde(skip)]
    pub file_data: Option<Vec<u8>>,
    pub file_mime_type: Option<String>,
    pub file_size: Option<i32>,
    pub generated_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Certificate {
    pub fn has_file_data(&self) -> bool {
        self.file_data.as_ref().is_some_and(|data| !data.is_empty())
    }

    pub fn is_valid(&self) -> bool {
        self.status == CertificateStatus::Valid
    }
}

/// The people, session and program a certificate refers to.
///
/// The session is the certificate's own session, falling back to the
/// enrollment's; the program likewise falls back to the session's program.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertificateRelations {
    pub recipient_name: Option<String>,
    pub issuer_name: Option<String>,
    pub session: Option<SessionSummary>,
    pub program: Option<ProgramSummary>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub title: String,
    pub program_id: Uuid,
    pub trainer_id: Option<Uuid>,
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct ProgramSummary {
    pub id: Uuid,
    pub name: String,
    pub created_by: Option<Uuid>,
}

/// A certificate together with its loaded relations.
#[derive(Debug, Clone, Serialize)]
pub struct CertificateContext {
    #[serde(flatten)]
    pub certificate: Certificate,
    #[serde(flatten)]
    pub relations: CertificateRelations,
}

#[derive(Debug, Clone)]
pub struct NewCertificate {
    pub enrollment_id: Uuid,
    pub user_id: Uuid,
    pub program_id: Uuid,
    pub session_id: Option<Uuid>,
    pub issued_by: Uuid,
    pub certificate_code: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct RevokeCertificate {
    #[validate(length(max = 2000))]
    pub note: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct RegenerateCertificate {
    pub template_id: Option<Uuid>,
}

/// Public view of a certificate returned by the verification endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct VerifiedCertificate {
    pub recipient: Option<String>,
    pub program: Option<String>,
    pub session: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,
    pub status: CertificateStatus,
    pub certificate_code: String,
}
