use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{DatabaseError, Program};

#[derive(Clone)]
pub struct ProgramRepository {
    pool: PgPool,
}

impl ProgramRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, program_id: Uuid) -> Result<Option<Program>, DatabaseError> {
        let program = sqlx::query_as::<_, Program>(
            r#"
            SELECT id, name, code, description, category, created_by, approval_status, status,
                   created_at, updated_at
            FROM programs
            WHERE id = $1
            "#,
        )
        .bind(program_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(program)
    }

    pub async fn get(&self, program_id: Uuid) -> Result<Program, DatabaseError> {
        self.find(program_id).await?.ok_or(DatabaseError::NotFound)
    }
}
