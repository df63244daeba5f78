use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::{AttendanceStatus, DatabaseError, Enrollment, EnrollmentStatus, TrainingSession};
use crate::services::completion::EnrollmentStore;

use super::session_repository::SESSION_COLUMNS;

pub(crate) const ENROLLMENT_COLUMNS: &str =
    "id, user_id, session_id, status, enrolled_at, completed_at, created_at, updated_at";

#[derive(Clone)]
pub struct EnrollmentRepository {
    pool: PgPool,
}

impl EnrollmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, enrollment_id: Uuid) -> Result<Option<Enrollment>, DatabaseError> {
        let sql = format!("SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE id = $1");
        let enrollment = sqlx::query_as::<_, Enrollment>(&sql)
            .bind(enrollment_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(enrollment)
    }

    /// Enrollments still expected to attend: pending or confirmed.
    pub async fn list_attending(&self, session_id: Uuid) -> Result<Vec<Enrollment>, DatabaseError> {
        let sql = format!(
            r#"
            SELECT {ENROLLMENT_COLUMNS} FROM enrollments
            WHERE session_id = $1 AND status IN ($2, $3)
            ORDER BY enrolled_at
            "#
        );
        let enrollments = sqlx::query_as::<_, Enrollment>(&sql)
            .bind(session_id)
            .bind(EnrollmentStatus::Pending)
            .bind(EnrollmentStatus::Confirmed)
            .fetch_all(&self.pool)
            .await?;

        Ok(enrollments)
    }
}

#[async_trait]
impl EnrollmentStore for EnrollmentRepository {
    async fn find_enrollment(&self, enrollment_id: Uuid) -> Result<Option<Enrollment>, DatabaseError> {
        self.find(enrollment_id).await
    }

    async fn find_session(&self, session_id: Uuid) -> Result<Option<TrainingSession>, DatabaseError> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM training_sessions WHERE id = $1");
        let session = sqlx::query_as::<_, TrainingSession>(&sql)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(session)
    }

    async fn count_attended(&self, enrollment_id: Uuid) -> Result<i64, DatabaseError> {
        let [present, late] = AttendanceStatus::ATTENDED;
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM attendances WHERE enrollment_id = $1 AND status IN ($2, $3)",
        )
        .bind(enrollment_id)
        .bind(present)
        .bind(late)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn session_enrollment_ids(&self, session_id: Uuid) -> Result<Vec<Uuid>, DatabaseError> {
        let ids = sqlx::query_scalar::<_, Uuid>("SELECT id FROM enrollments WHERE session_id = $1 ORDER BY enrolled_at")
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(ids)
    }

    async fn mark_completed(&self, enrollment_id: Uuid, completed_at: OffsetDateTime) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE enrollments SET status = 'completed', completed_at = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(enrollment_id)
        .bind(completed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn reset_completion(&self, enrollment_id: Uuid) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            UPDATE enrollments
            SET status = 'confirmed', completed_at = NULL, updated_at = NOW()
            WHERE id = $1 AND status <> 'cancelled'
            "#,
        )
        .bind(enrollment_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
