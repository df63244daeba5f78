//! Issuing certificates to completed enrollments.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::db::repositories::{CertificateRepository, CertificateRequestRepository};
use crate::db::{
    ApprovalStatus, Certificate, CertificateRequest, DatabaseError, Enrollment, NewCertificate, Program, RequestTarget,
    SessionStatus, TrainingSession,
};

pub const CERTIFICATE_CODE_PREFIX: &str = "CERT-";
const CERTIFICATE_CODE_LENGTH: usize = 10;
const MAX_CODE_ATTEMPTS: usize = 16;

#[derive(Debug, Error)]
pub enum IssuanceError {
    #[error("{0}")]
    NotEligible(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IssuanceSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl IssuanceSummary {
    pub fn record(&mut self, action: IssueAction) {
        match action {
            IssueAction::Skip => self.skipped += 1,
            IssueAction::Reissue(_) => self.updated += 1,
            IssueAction::Create => self.created += 1,
        }
    }
}

/// An approved request and what its approval issued.
#[derive(Debug, Clone, Serialize)]
pub struct RequestApproval {
    pub request: CertificateRequest,
    pub generated: IssuanceSummary,
}

/// The loaded program or session a certificate request points at.
#[derive(Debug, Clone)]
pub enum RequestSubject {
    Program(Program),
    Session(TrainingSession),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueAction {
    Skip,
    Reissue(Uuid),
    Create,
}

/// What to do for an enrollment given its existing certificate, if any.
pub fn plan_issue(existing: Option<&Certificate>) -> IssueAction {
    match existing {
        Some(certificate) if certificate.is_valid() => IssueAction::Skip,
        Some(certificate) => IssueAction::Reissue(certificate.id),
        None => IssueAction::Create,
    }
}

/// `CERT-` followed by ten uppercase alphanumerics.
pub fn generate_certificate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    let suffix: String = rng
        .sample_iter(&Alphanumeric)
        .take(CERTIFICATE_CODE_LENGTH)
        .map(|c| char::from(c).to_ascii_uppercase())
        .collect();
    format!("{}{}", CERTIFICATE_CODE_PREFIX, suffix)
}

pub fn ensure_session_issuable(session: &TrainingSession) -> Result<(), IssuanceError> {
    if session.status != SessionStatus::Completed {
        return Err(IssuanceError::NotEligible(
            "Session must be completed before issuing certificates.".to_string(),
        ));
    }
    Ok(())
}

pub fn ensure_program_issuable(program: &Program) -> Result<(), IssuanceError> {
    if !program.accepts_certificates() {
        return Err(IssuanceError::NotEligible(
            "Program must be approved and active before issuing certificates.".to_string(),
        ));
    }
    Ok(())
}

/// Trainers may request certificates for approved programs and for
/// approved, completed sessions.
pub fn ensure_requestable(subject: &RequestSubject) -> Result<(), IssuanceError> {
    check_subject(subject, "request certificates", "requesting certificates")
}

/// Approval re-checks the target, which may have changed since the request.
pub fn ensure_approvable(subject: &RequestSubject) -> Result<(), IssuanceError> {
    check_subject(subject, "issue certificates", "issuing certificates")
}

fn check_subject(subject: &RequestSubject, purpose: &str, gerund: &str) -> Result<(), IssuanceError> {
    let not_eligible = |message: String| Err(IssuanceError::NotEligible(message));
    match subject {
        RequestSubject::Program(program) if program.approval_status != ApprovalStatus::Approved => {
            not_eligible(format!("Program must be approved to {}.", purpose))
        }
        RequestSubject::Session(session) if session.approval_status != ApprovalStatus::Approved => {
            not_eligible(format!("Session must be approved to {}.", purpose))
        }
        RequestSubject::Session(session) if session.status != SessionStatus::Completed => {
            not_eligible(format!("Session must be completed before {}.", gerund))
        }
        _ => Ok(()),
    }
}

/// Issues certificates for every completed enrollment of a session.
pub async fn issue_for_session(
    pool: &PgPool,
    session: &TrainingSession,
    issued_by: Uuid,
) -> Result<IssuanceSummary, IssuanceError> {
    ensure_session_issuable(session)?;

    let mut tx = pool.begin().await.map_err(DatabaseError::from)?;
    CertificateRequestRepository::log_direct_issuance(&mut tx, issued_by, RequestTarget::Session(session.id)).await?;
    let summary = issue_session(&mut tx, session, issued_by).await?;
    tx.commit().await.map_err(DatabaseError::from)?;

    info!(
        session_id = %session.id,
        created = summary.created,
        updated = summary.updated,
        skipped = summary.skipped,
        "Certificates issued for session"
    );
    Ok(summary)
}

/// Issues program-level certificates for completed enrollments of any
/// session of the program.
pub async fn issue_for_program(
    pool: &PgPool,
    program: &Program,
    issued_by: Uuid,
) -> Result<IssuanceSummary, IssuanceError> {
    ensure_program_issuable(program)?;

    let mut tx = pool.begin().await.map_err(DatabaseError::from)?;
    CertificateRequestRepository::log_direct_issuance(&mut tx, issued_by, RequestTarget::Program(program.id)).await?;
    let summary = issue_program(&mut tx, program, issued_by).await?;
    tx.commit().await.map_err(DatabaseError::from)?;

    info!(
        program_id = %program.id,
        created = summary.created,
        updated = summary.updated,
        skipped = summary.skipped,
        "Certificates issued for program"
    );
    Ok(summary)
}

/// Approves a pending request and issues its certificates in one transaction.
pub async fn approve_request(
    pool: &PgPool,
    request_id: Uuid,
    subject: &RequestSubject,
    approved_by: Uuid,
) -> Result<RequestApproval, IssuanceError> {
    ensure_approvable(subject)?;

    let mut tx = pool.begin().await.map_err(DatabaseError::from)?;
    let request = CertificateRequestRepository::approve(&mut tx, request_id, approved_by)
        .await?
        .ok_or_else(|| IssuanceError::NotEligible("Certificate request must be pending.".to_string()))?;
    let generated = match subject {
        RequestSubject::Session(session) => issue_session(&mut tx, session, approved_by).await?,
        RequestSubject::Program(program) => issue_program(&mut tx, program, approved_by).await?,
    };
    tx.commit().await.map_err(DatabaseError::from)?;

    info!(
        %request_id,
        created = generated.created,
        updated = generated.updated,
        skipped = generated.skipped,
        "Certificate request approved"
    );
    Ok(RequestApproval { request, generated })
}

async fn issue_session(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    session: &TrainingSession,
    issued_by: Uuid,
) -> Result<IssuanceSummary, DatabaseError> {
    let enrollments = CertificateRepository::completed_enrollments_for_session(tx, session.id).await?;
    issue_all(tx, &enrollments, session.program_id, Some(session.id), issued_by).await
}

async fn issue_program(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    program: &Program,
    issued_by: Uuid,
) -> Result<IssuanceSummary, DatabaseError> {
    let enrollments = CertificateRepository::completed_enrollments_for_program(tx, program.id).await?;
    issue_all(tx, &enrollments, program.id, None, issued_by).await
}

async fn issue_all(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    enrollments: &[Enrollment],
    program_id: Uuid,
    session_id: Option<Uuid>,
    issued_by: Uuid,
) -> Result<IssuanceSummary, DatabaseError> {
    let mut summary = IssuanceSummary::default();

    for enrollment in enrollments {
        let existing = CertificateRepository::find_by_enrollment(tx, enrollment.id).await?;
        let action = plan_issue(existing.as_ref());
        summary.record(action);
        if action == IssueAction::Skip {
            continue;
        }

        let certificate = NewCertificate {
            enrollment_id: enrollment.id,
            user_id: enrollment.user_id,
            program_id,
            session_id,
            issued_by,
            certificate_code: unique_code(tx).await?,
        };

        match action {
            IssueAction::Reissue(certificate_id) => {
                CertificateRepository::reissue(tx, certificate_id, &certificate).await?;
            }
            _ => {
                CertificateRepository::insert(tx, &certificate).await?;
            }
        }
    }

    Ok(summary)
}

async fn unique_code(tx: &mut sqlx::Transaction<'_, sqlx::Postgres>) -> Result<String, DatabaseError> {
    for _ in 0..MAX_CODE_ATTEMPTS {
        let code = generate_certificate_code(&mut rand::thread_rng());
        if !CertificateRepository::code_exists(tx, &code).await? {
            return Ok(code);
        }
    }
    Err(DatabaseError::Duplicate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CertificateStatus, ProgramStatus};
    use crate::services::template_resolver::tests::context;
    use time::OffsetDateTime;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn codes_are_prefixed_uppercase_alphanumerics() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let code = generate_certificate_code(&mut rng);
            let suffix = code.strip_prefix("CERT-").unwrap();
            assert_eq!(suffix.len(), 10);
            assert!(suffix
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn valid_certificates_are_skipped_and_revoked_ones_reissued() {
        let mut certificate = context(Uuid::new_v4(), Uuid::new_v4()).certificate;
        assert_eq!(plan_issue(Some(&certificate)), IssueAction::Skip);

        certificate.status = CertificateStatus::Revoked;
        assert_eq!(plan_issue(Some(&certificate)), IssueAction::Reissue(certificate.id));

        assert_eq!(plan_issue(None), IssueAction::Create);
    }

    #[test]
    fn reissues_are_counted_as_updates() {
        let mut summary = IssuanceSummary::default();
        summary.record(IssueAction::Create);
        summary.record(IssueAction::Reissue(Uuid::new_v4()));
        summary.record(IssueAction::Skip);
        summary.record(IssueAction::Skip);

        assert_eq!(summary, IssuanceSummary { created: 1, updated: 1, skipped: 2 });
        let json = serde_json::to_value(summary).unwrap();
        assert_eq!(json, serde_json::json!({ "created": 1, "updated": 1, "skipped": 2 }));
    }

    fn program(approval_status: ApprovalStatus, status: ProgramStatus) -> Program {
        Program {
            id: Uuid::new_v4(),
            name: "Working at height".to_string(),
            code: "WAH".to_string(),
            description: None,
            category: None,
            created_by: None,
            approval_status,
            status,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn session(approval_status: ApprovalStatus, status: SessionStatus) -> TrainingSession {
        TrainingSession {
            id: Uuid::new_v4(),
            program_id: Uuid::new_v4(),
            title: "Morning cohort".to_string(),
            start_date: None,
            end_date: None,
            capacity: 20,
            trainer_id: None,
            location: None,
            status,
            approval_status,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn not_eligible_message(result: Result<(), IssuanceError>) -> String {
        match result {
            Err(IssuanceError::NotEligible(message)) => message,
            other => panic!("expected NotEligible, got {:?}", other),
        }
    }

    #[test]
    fn requests_need_an_approved_target() {
        let pending = RequestSubject::Program(program(ApprovalStatus::Pending, ProgramStatus::Active));
        assert_eq!(
            not_eligible_message(ensure_requestable(&pending)),
            "Program must be approved to request certificates."
        );

        // Inactive programs can still be requested once approved.
        let inactive = RequestSubject::Program(program(ApprovalStatus::Approved, ProgramStatus::Inactive));
        assert!(ensure_requestable(&inactive).is_ok());

        let rejected = RequestSubject::Session(session(ApprovalStatus::Rejected, SessionStatus::Completed));
        assert_eq!(
            not_eligible_message(ensure_requestable(&rejected)),
            "Session must be approved to request certificates."
        );
    }

    #[test]
    fn session_targets_must_be_completed() {
        let open = RequestSubject::Session(session(ApprovalStatus::Approved, SessionStatus::Open));
        assert_eq!(
            not_eligible_message(ensure_requestable(&open)),
            "Session must be completed before requesting certificates."
        );
        assert_eq!(
            not_eligible_message(ensure_approvable(&open)),
            "Session must be completed before issuing certificates."
        );

        let done = RequestSubject::Session(session(ApprovalStatus::Approved, SessionStatus::Completed));
        assert!(ensure_approvable(&done).is_ok());
    }
}
