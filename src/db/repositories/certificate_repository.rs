use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::db::{
    Certificate, CertificateRelations, DatabaseError, Enrollment, NewCertificate, ProgramSummary, SessionSummary,
};
use crate::services::certificate_file::{CertificateStore, StoredFile};

use super::enrollment_repository::ENROLLMENT_COLUMNS;

/// Everything but the file bytes.
const CERTIFICATE_COLUMNS: &str = "id, enrollment_id, user_id, program_id, session_id, template_id, issued_by, \
     issued_at, certificate_code, status, revoked_by, revoked_at, revoked_note, file_mime_type, file_size, \
     generated_at, created_at, updated_at";

#[derive(Clone)]
pub struct CertificateRepository {
    pool: PgPool,
}

impl CertificateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Loads a certificate without its file bytes.
    pub async fn find(&self, certificate_id: Uuid) -> Result<Option<Certificate>, DatabaseError> {
        let sql = format!("SELECT {CERTIFICATE_COLUMNS} FROM certificates WHERE id = $1");
        let certificate = sqlx::query_as::<_, Certificate>(&sql)
            .bind(certificate_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(certificate)
    }

    pub async fn find_by_code(&self, code: &str) -> Result<Option<Certificate>, DatabaseError> {
        let sql = format!("SELECT {CERTIFICATE_COLUMNS} FROM certificates WHERE certificate_code = $1");
        let certificate = sqlx::query_as::<_, Certificate>(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;

        Ok(certificate)
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Certificate>, DatabaseError> {
        self.list_where("user_id = $1", user_id).await
    }

    pub async fn list_for_session(&self, session_id: Uuid) -> Result<Vec<Certificate>, DatabaseError> {
        self.list_where("session_id = $1", session_id).await
    }

    pub async fn list_for_program(&self, program_id: Uuid) -> Result<Vec<Certificate>, DatabaseError> {
        self.list_where("program_id = $1", program_id).await
    }

    async fn list_where(&self, condition: &str, id: Uuid) -> Result<Vec<Certificate>, DatabaseError> {
        let sql = format!(
            "SELECT {CERTIFICATE_COLUMNS} FROM certificates WHERE {condition} ORDER BY issued_at DESC, created_at DESC"
        );
        let certificates = sqlx::query_as::<_, Certificate>(&sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await?;

        Ok(certificates)
    }

    pub async fn revoke(
        &self,
        certificate_id: Uuid,
        revoked_by: Uuid,
        note: Option<&str>,
    ) -> Result<Certificate, DatabaseError> {
        let sql = format!(
            r#"
            UPDATE certificates
            SET status = 'revoked', revoked_by = $2, revoked_at = NOW(), revoked_note = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {CERTIFICATE_COLUMNS}
            "#
        );
        let certificate = sqlx::query_as::<_, Certificate>(&sql)
            .bind(certificate_id)
            .bind(revoked_by)
            .bind(note)
            .fetch_one(&self.pool)
            .await?;

        Ok(certificate)
    }

    // Issuance runs inside one transaction.

    pub async fn completed_enrollments_for_session(
        tx: &mut Transaction<'_, Postgres>,
        session_id: Uuid,
    ) -> Result<Vec<Enrollment>, DatabaseError> {
        let sql = format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE session_id = $1 AND status = 'completed' ORDER BY enrolled_at"
        );
        let enrollments = sqlx::query_as::<_, Enrollment>(&sql)
            .bind(session_id)
            .fetch_all(&mut **tx)
            .await?;

        Ok(enrollments)
    }

    pub async fn completed_enrollments_for_program(
        tx: &mut Transaction<'_, Postgres>,
        program_id: Uuid,
    ) -> Result<Vec<Enrollment>, DatabaseError> {
        let sql = format!(
            r#"
            SELECT {ENROLLMENT_COLUMNS} FROM enrollments
            WHERE status = 'completed'
              AND session_id IN (SELECT id FROM training_sessions WHERE program_id = $1)
            ORDER BY enrolled_at
            "#
        );
        let enrollments = sqlx::query_as::<_, Enrollment>(&sql)
            .bind(program_id)
            .fetch_all(&mut **tx)
            .await?;

        Ok(enrollments)
    }

    pub async fn find_by_enrollment(
        tx: &mut Transaction<'_, Postgres>,
        enrollment_id: Uuid,
    ) -> Result<Option<Certificate>, DatabaseError> {
        let sql = format!("SELECT {CERTIFICATE_COLUMNS} FROM certificates WHERE enrollment_id = $1 FOR UPDATE");
        let certificate = sqlx::query_as::<_, Certificate>(&sql)
            .bind(enrollment_id)
            .fetch_optional(&mut **tx)
            .await?;

        Ok(certificate)
    }

    pub async fn code_exists(tx: &mut Transaction<'_, Postgres>, code: &str) -> Result<bool, DatabaseError> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM certificates WHERE certificate_code = $1)")
            .bind(code)
            .fetch_one(&mut **tx)
            .await?;

        Ok(exists)
    }

    pub async fn insert(tx: &mut Transaction<'_, Postgres>, new: &NewCertificate) -> Result<Certificate, DatabaseError> {
        let sql = format!(
            r#"
            INSERT INTO certificates
                (enrollment_id, user_id, program_id, session_id, issued_by, issued_at, certificate_code, status)
            VALUES ($1, $2, $3, $4, $5, NOW(), $6, 'valid')
            RETURNING {CERTIFICATE_COLUMNS}
            "#
        );
        let certificate = sqlx::query_as::<_, Certificate>(&sql)
            .bind(new.enrollment_id)
            .bind(new.user_id)
            .bind(new.program_id)
            .bind(new.session_id)
            .bind(new.issued_by)
            .bind(&new.certificate_code)
            .fetch_one(&mut **tx)
            .await?;

        Ok(certificate)
    }

    /// Turns a revoked certificate back into a valid one with a new code.
    /// The stored file is dropped so it renders again.
    pub async fn reissue(
        tx: &mut Transaction<'_, Postgres>,
        certificate_id: Uuid,
        new: &NewCertificate,
    ) -> Result<Certificate, DatabaseError> {
        let sql = format!(
            r#"
            UPDATE certificates
            SET user_id = $2, program_id = $3, session_id = $4, issued_by = $5, issued_at = NOW(),
                certificate_code = $6, status = 'valid',
                revoked_by = NULL, revoked_at = NULL, revoked_note = NULL,
                file_data = NULL, file_mime_type = NULL, file_size = NULL,
                generated_at = NULL, updated_at = NOW()
            WHERE id = $1
            RETURNING {CERTIFICATE_COLUMNS}
            "#
        );
        let certificate = sqlx::query_as::<_, Certificate>(&sql)
            .bind(certificate_id)
            .bind(new.user_id)
            .bind(new.program_id)
            .bind(new.session_id)
            .bind(new.issued_by)
            .bind(&new.certificate_code)
            .fetch_one(&mut **tx)
            .await?;

        Ok(certificate)
    }

    async fn user_name(&self, user_id: Uuid) -> Result<Option<String>, DatabaseError> {
        let name = sqlx::query_scalar::<_, String>("SELECT name FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(name)
    }
}

#[async_trait]
impl CertificateStore for CertificateRepository {
    async fn find_certificate(&self, certificate_id: Uuid) -> Result<Option<Certificate>, DatabaseError> {
        let sql = format!("SELECT {CERTIFICATE_COLUMNS}, file_data FROM certificates WHERE id = $1");
        let certificate = sqlx::query_as::<_, Certificate>(&sql)
            .bind(certificate_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(certificate)
    }

    async fn load_relations(&self, certificate: &Certificate) -> Result<CertificateRelations, DatabaseError> {
        let recipient_name = self.user_name(certificate.user_id).await?;
        let issuer_name = match certificate.issued_by {
            Some(issuer) => self.user_name(issuer).await?,
            None => None,
        };

        let session_id = match certificate.session_id {
            Some(session_id) => Some(session_id),
            None => {
                sqlx::query_scalar::<_, Uuid>("SELECT session_id FROM enrollments WHERE id = $1")
                    .bind(certificate.enrollment_id)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };

        let session = match session_id {
            Some(session_id) => {
                sqlx::query_as::<_, SessionSummary>(
                    r#"
                    SELECT id, title, program_id, trainer_id, start_date, end_date
                    FROM training_sessions
                    WHERE id = $1
                    "#,
                )
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?
            }
            None => None,
        };

        let program = sqlx::query_as::<_, ProgramSummary>("SELECT id, name, created_by FROM programs WHERE id = $1")
            .bind(certificate.program_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(CertificateRelations {
            recipient_name,
            issuer_name,
            session,
            program,
        })
    }

    async fn store_file(
        &self,
        certificate_id: Uuid,
        file: &StoredFile,
        overwrite: bool,
    ) -> Result<Option<Certificate>, DatabaseError> {
        let size = i32::try_from(file.bytes.len())
            .map_err(|_| DatabaseError::InvalidInput("Certificate file is too large".to_string()))?;

        // First writer wins unless the caller forces an overwrite.
        let sql = format!(
            r#"
            UPDATE certificates
            SET file_data = $2, file_mime_type = $3, file_size = $4, generated_at = $5, template_id = $6,
                updated_at = NOW()
            WHERE id = $1
              AND ($7 OR file_data IS NULL OR octet_length(file_data) = 0)
            RETURNING {CERTIFICATE_COLUMNS}, file_data
            "#
        );
        let certificate = sqlx::query_as::<_, Certificate>(&sql)
            .bind(certificate_id)
            .bind(&file.bytes)
            .bind(&file.mime_type)
            .bind(size)
            .bind(file.generated_at)
            .bind(file.template_id)
            .bind(overwrite)
            .fetch_optional(&self.pool)
            .await?;

        Ok(certificate)
    }
}
