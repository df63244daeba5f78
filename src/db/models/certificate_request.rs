use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;
use time::OffsetDateTime;
use validator::Validate;

/// Note written on the audit rows left by direct issuance.
pub const AUTO_REQUEST_NOTE: &str = "auto-generated by owner";

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "certificate_request_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CertificateRequestType {
    Program,
    Session,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "certificate_request_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CertificateRequestStatus {
    Pending,
    Approved,
    Rejected,
}

/// The program or session a request is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestTarget {
    Program(Uuid),
    Session(Uuid),
}

impl RequestTarget {
    pub fn request_type(self) -> CertificateRequestType {
        match self {
            RequestTarget::Program(_) => CertificateRequestType::Program,
            RequestTarget::Session(_) => CertificateRequestType::Session,
        }
    }

    pub fn program_id(self) -> Option<Uuid> {
        match self {
            RequestTarget::Program(id) => Some(id),
            RequestTarget::Session(_) => None,
        }
    }

    pub fn session_id(self) -> Option<Uuid> {
        match self {
            RequestTarget::Session(id) => Some(id),
            RequestTarget::Program(_) => None,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct CertificateRequest {
    pub id: Uuid,
    pub trainer_id: Uuid,
    pub program_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub request_type: CertificateRequestType,
    pub status: CertificateRequestStatus,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<OffsetDateTime>,
    pub note: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl CertificateRequest {
    pub fn is_pending(&self) -> bool {
        self.status == CertificateRequestStatus::Pending
    }

    /// `None` when the row's id columns do not match its type.
    pub fn target(&self) -> Option<RequestTarget> {
        match self.request_type {
            CertificateRequestType::Program => self.program_id.map(RequestTarget::Program),
            CertificateRequestType::Session => self.session_id.map(RequestTarget::Session),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct NewCertificateRequest {
    #[serde(rename = "type")]
    pub request_type: CertificateRequestType,
    pub program_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    #[validate(length(max = 2000))]
    pub note: Option<String>,
    #[validate(length(max = 2000))]
    pub message: Option<String>,
}

impl NewCertificateRequest {
    /// The id matching the type; the other one is ignored.
    pub fn target(&self) -> Result<RequestTarget, &'static str> {
        match self.request_type {
            CertificateRequestType::Program => self
                .program_id
                .map(RequestTarget::Program)
                .ok_or("The program id field is required when type is program."),
            CertificateRequestType::Session => self
                .session_id
                .map(RequestTarget::Session)
                .ok_or("The session id field is required when type is session."),
        }
    }

    /// `message` is accepted in place of `note`.
    pub fn note_text(&self) -> Option<&str> {
        self.note.as_deref().or(self.message.as_deref())
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct RejectCertificateRequest {
    #[validate(length(max = 2000))]
    pub note: Option<String>,
}

/// Query string of the admin listing.
#[derive(Debug, Default, Deserialize)]
pub struct CertificateRequestFilter {
    pub status: Option<CertificateRequestStatus>,
    #[serde(rename = "type")]
    pub request_type: Option<CertificateRequestType>,
    pub program_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(request_type: CertificateRequestType, program_id: Option<Uuid>, session_id: Option<Uuid>) -> CertificateRequest {
        CertificateRequest {
            id: Uuid::new_v4(),
            trainer_id: Uuid::new_v4(),
            program_id,
            session_id,
            request_type,
            status: CertificateRequestStatus::Pending,
            approved_by: None,
            approved_at: None,
            note: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn payload_target_follows_the_type() {
        let program_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();
        let payload: NewCertificateRequest = serde_json::from_value(serde_json::json!({
            "type": "session",
            "program_id": program_id,
            "session_id": session_id,
        }))
        .unwrap();
        assert_eq!(payload.target(), Ok(RequestTarget::Session(session_id)));

        let payload: NewCertificateRequest =
            serde_json::from_value(serde_json::json!({ "type": "program", "session_id": session_id })).unwrap();
        assert!(payload.target().is_err());
    }

    #[test]
    fn message_stands_in_for_a_missing_note() {
        let payload: NewCertificateRequest =
            serde_json::from_value(serde_json::json!({ "type": "program", "message": "cohort 3" })).unwrap();
        assert_eq!(payload.note_text(), Some("cohort 3"));

        let payload: NewCertificateRequest = serde_json::from_value(serde_json::json!({
            "type": "program",
            "note": "from note",
            "message": "from message",
        }))
        .unwrap();
        assert_eq!(payload.note_text(), Some("from note"));
    }

    #[test]
    fn unknown_types_are_rejected() {
        let parsed = serde_json::from_value::<NewCertificateRequest>(serde_json::json!({ "type": "enrollment" }));
        assert!(parsed.is_err());
    }

    #[test]
    fn row_target_requires_the_matching_id() {
        let program_id = Uuid::new_v4();
        let row = request(CertificateRequestType::Program, Some(program_id), None);
        assert_eq!(row.target(), Some(RequestTarget::Program(program_id)));

        let broken = request(CertificateRequestType::Session, Some(program_id), None);
        assert_eq!(broken.target(), None);
    }

    #[test]
    fn target_splits_into_columns() {
        let id = Uuid::new_v4();
        let target = RequestTarget::Session(id);
        assert_eq!(target.request_type(), CertificateRequestType::Session);
        assert_eq!(target.session_id(), Some(id));
        assert_eq!(target.program_id(), None);
    }

    #[test]
    fn type_is_serialized_under_its_wire_name() {
        let row = request(CertificateRequestType::Program, Some(Uuid::new_v4()), None);
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["type"], "program");
        assert_eq!(json["status"], "pending");
    }
}
