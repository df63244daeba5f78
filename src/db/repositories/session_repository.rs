use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{DatabaseError, SessionStatus, TrainingSession};

pub(crate) const SESSION_COLUMNS: &str = "id, program_id, title, start_date, end_date, capacity, trainer_id, \
     location, status, approval_status, created_at, updated_at";

#[derive(Clone)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, session_id: Uuid) -> Result<Option<TrainingSession>, DatabaseError> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM training_sessions WHERE id = $1");
        let session = sqlx::query_as::<_, TrainingSession>(&sql)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(session)
    }

    pub async fn get(&self, session_id: Uuid) -> Result<TrainingSession, DatabaseError> {
        self.find(session_id).await?.ok_or(DatabaseError::NotFound)
    }

    pub async fn update_status(&self, session_id: Uuid, status: SessionStatus) -> Result<TrainingSession, DatabaseError> {
        let sql = format!(
            "UPDATE training_sessions SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {SESSION_COLUMNS}"
        );
        let session = sqlx::query_as::<_, TrainingSession>(&sql)
            .bind(session_id)
            .bind(status)
            .fetch_one(&self.pool)
            .await?;

        Ok(session)
    }
}
