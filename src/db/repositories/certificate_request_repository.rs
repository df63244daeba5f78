use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::db::{
    CertificateRequest, CertificateRequestFilter, CertificateRequestStatus, DatabaseError, RequestTarget,
    AUTO_REQUEST_NOTE,
};

const REQUEST_COLUMNS: &str =
    "id, trainer_id, program_id, session_id, type, status, approved_by, approved_at, note, created_at, updated_at";

#[derive(Clone)]
pub struct CertificateRequestRepository {
    pool: PgPool,
}

impl CertificateRequestRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, request_id: Uuid) -> Result<Option<CertificateRequest>, DatabaseError> {
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM certificate_requests WHERE id = $1");
        let request = sqlx::query_as::<_, CertificateRequest>(&sql)
            .bind(request_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(request)
    }

    pub async fn get(&self, request_id: Uuid) -> Result<CertificateRequest, DatabaseError> {
        self.find(request_id).await?.ok_or(DatabaseError::NotFound)
    }

    pub async fn create(
        &self,
        trainer_id: Uuid,
        target: RequestTarget,
        note: Option<&str>,
    ) -> Result<CertificateRequest, DatabaseError> {
        let sql = format!(
            r#"
            INSERT INTO certificate_requests (trainer_id, program_id, session_id, type, status, note)
            VALUES ($1, $2, $3, $4, 'pending', $5)
            RETURNING {REQUEST_COLUMNS}
            "#
        );
        let request = sqlx::query_as::<_, CertificateRequest>(&sql)
            .bind(trainer_id)
            .bind(target.program_id())
            .bind(target.session_id())
            .bind(target.request_type())
            .bind(note)
            .fetch_one(&self.pool)
            .await?;

        Ok(request)
    }

    pub async fn list_for_trainer(&self, trainer_id: Uuid) -> Result<Vec<CertificateRequest>, DatabaseError> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM certificate_requests WHERE trainer_id = $1 ORDER BY created_at DESC"
        );
        let requests = sqlx::query_as::<_, CertificateRequest>(&sql)
            .bind(trainer_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(requests)
    }

    /// Admin listing; unset filters match everything.
    pub async fn list(&self, filter: &CertificateRequestFilter) -> Result<Vec<CertificateRequest>, DatabaseError> {
        let sql = format!(
            r#"
            SELECT {REQUEST_COLUMNS} FROM certificate_requests
            WHERE ($1::certificate_request_status IS NULL OR status = $1)
              AND ($2::certificate_request_type IS NULL OR type = $2)
              AND ($3::uuid IS NULL OR program_id = $3)
              AND ($4::uuid IS NULL OR session_id = $4)
            ORDER BY created_at DESC
            "#
        );
        let requests = sqlx::query_as::<_, CertificateRequest>(&sql)
            .bind(filter.status)
            .bind(filter.request_type)
            .bind(filter.program_id)
            .bind(filter.session_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(requests)
    }

    /// Whether a pending or approved request already covers the target.
    pub async fn has_open_request(&self, target: RequestTarget) -> Result<bool, DatabaseError> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM certificate_requests
                WHERE type = $1
                  AND program_id IS NOT DISTINCT FROM $2
                  AND session_id IS NOT DISTINCT FROM $3
                  AND status IN ('pending', 'approved')
            )
            "#,
        )
        .bind(target.request_type())
        .bind(target.program_id())
        .bind(target.session_id())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    /// Completed enrollments an approval would issue certificates for.
    pub async fn count_eligible(&self, target: RequestTarget) -> Result<i64, DatabaseError> {
        let sql = match target {
            RequestTarget::Session(_) => {
                "SELECT COUNT(*) FROM enrollments WHERE session_id = $1 AND status = 'completed'"
            }
            RequestTarget::Program(_) => {
                r#"
                SELECT COUNT(*) FROM enrollments
                WHERE status = 'completed'
                  AND session_id IN (SELECT id FROM training_sessions WHERE program_id = $1)
                "#
            }
        };
        let id = target.session_id().or(target.program_id());
        let count = sqlx::query_scalar::<_, i64>(sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Returns `None` when the request is not pending anymore.
    pub async fn reject(
        &self,
        request_id: Uuid,
        rejected_by: Uuid,
        note: Option<&str>,
    ) -> Result<Option<CertificateRequest>, DatabaseError> {
        decide(&self.pool, request_id, CertificateRequestStatus::Rejected, rejected_by, note).await
    }

    // Approval and the audit rows are written inside the issuance transaction.

    pub async fn approve(
        tx: &mut Transaction<'_, Postgres>,
        request_id: Uuid,
        approved_by: Uuid,
    ) -> Result<Option<CertificateRequest>, DatabaseError> {
        decide(&mut **tx, request_id, CertificateRequestStatus::Approved, approved_by, None).await
    }

    /// Records a direct issuance as an already approved request.
    pub async fn log_direct_issuance(
        tx: &mut Transaction<'_, Postgres>,
        issued_by: Uuid,
        target: RequestTarget,
    ) -> Result<CertificateRequest, DatabaseError> {
        let sql = format!(
            r#"
            INSERT INTO certificate_requests
                (trainer_id, program_id, session_id, type, status, approved_by, approved_at, note)
            VALUES ($1, $2, $3, $4, 'approved', $1, NOW(), $5)
            RETURNING {REQUEST_COLUMNS}
            "#
        );
        let request = sqlx::query_as::<_, CertificateRequest>(&sql)
            .bind(issued_by)
            .bind(target.program_id())
            .bind(target.session_id())
            .bind(target.request_type())
            .bind(AUTO_REQUEST_NOTE)
            .fetch_one(&mut **tx)
            .await?;

        Ok(request)
    }
}

async fn decide<'e, E>(
    executor: E,
    request_id: Uuid,
    status: CertificateRequestStatus,
    decided_by: Uuid,
    note: Option<&str>,
) -> Result<Option<CertificateRequest>, DatabaseError>
where
    E: sqlx::PgExecutor<'e>,
{
    let sql = format!(
        r#"
        UPDATE certificate_requests
        SET status = $2, approved_by = $3, approved_at = NOW(), note = COALESCE($4, note), updated_at = NOW()
        WHERE id = $1 AND status = 'pending'
        RETURNING {REQUEST_COLUMNS}
        "#
    );
    let request = sqlx::query_as::<_, CertificateRequest>(&sql)
        .bind(request_id)
        .bind(status)
        .bind(decided_by)
        .bind(note)
        .fetch_optional(executor)
        .await?;

    Ok(request)
}
