use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::db::{Attendance, AttendanceStatus, BulkAttendanceItem, DatabaseError};

const ATTENDANCE_COLUMNS: &str =
    "id, session_id, enrollment_id, checked_at, status, checked_by, note, created_at, updated_at";

#[derive(Clone)]
pub struct AttendanceRepository {
    pool: PgPool,
}

impl AttendanceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, attendance_id: Uuid) -> Result<Option<Attendance>, DatabaseError> {
        let sql = format!("SELECT {ATTENDANCE_COLUMNS} FROM attendances WHERE id = $1");
        let attendance = sqlx::query_as::<_, Attendance>(&sql)
            .bind(attendance_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(attendance)
    }

    pub async fn list_for_session(&self, session_id: Uuid) -> Result<Vec<Attendance>, DatabaseError> {
        let sql = format!("SELECT {ATTENDANCE_COLUMNS} FROM attendances WHERE session_id = $1 ORDER BY checked_at");
        let attendances = sqlx::query_as::<_, Attendance>(&sql)
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(attendances)
    }

    pub async fn list_for_enrollment(&self, enrollment_id: Uuid) -> Result<Vec<Attendance>, DatabaseError> {
        let sql = format!("SELECT {ATTENDANCE_COLUMNS} FROM attendances WHERE enrollment_id = $1 ORDER BY checked_at");
        let attendances = sqlx::query_as::<_, Attendance>(&sql)
            .bind(enrollment_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(attendances)
    }

    pub async fn list_for_enrollments(&self, enrollment_ids: &[Uuid]) -> Result<Vec<Attendance>, DatabaseError> {
        let sql = format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendances WHERE enrollment_id = ANY($1) ORDER BY checked_at"
        );
        let attendances = sqlx::query_as::<_, Attendance>(&sql)
            .bind(enrollment_ids)
            .fetch_all(&self.pool)
            .await?;

        Ok(attendances)
    }

    /// Records attendance for an enrollment, replacing any earlier check.
    pub async fn upsert(
        &self,
        session_id: Uuid,
        enrollment_id: Uuid,
        status: AttendanceStatus,
        note: Option<&str>,
        checked_by: Uuid,
    ) -> Result<Attendance, DatabaseError> {
        upsert_with(&self.pool, session_id, enrollment_id, status, note, checked_by).await
    }

    /// `note` is `None` to keep the stored note and `Some(None)` to clear it.
    pub async fn update(
        &self,
        attendance_id: Uuid,
        status: Option<AttendanceStatus>,
        note: Option<Option<&str>>,
        checked_by: Uuid,
    ) -> Result<Attendance, DatabaseError> {
        let sql = format!(
            r#"
            UPDATE attendances
            SET status = COALESCE($2, status), note = CASE WHEN $5 THEN $3 ELSE note END,
                checked_at = NOW(), checked_by = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING {ATTENDANCE_COLUMNS}
            "#
        );
        let attendance = sqlx::query_as::<_, Attendance>(&sql)
            .bind(attendance_id)
            .bind(status)
            .bind(note.flatten())
            .bind(checked_by)
            .bind(note.is_some())
            .fetch_one(&self.pool)
            .await?;

        Ok(attendance)
    }

    /// Ids among `enrollment_ids` that do not belong to the session.
    pub async fn foreign_enrollments(&self, session_id: Uuid, enrollment_ids: &[Uuid]) -> Result<Vec<Uuid>, DatabaseError> {
        let foreign = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT requested.id
            FROM UNNEST($2::uuid[]) AS requested(id)
            WHERE NOT EXISTS (
                SELECT 1 FROM enrollments e WHERE e.id = requested.id AND e.session_id = $1
            )
            "#,
        )
        .bind(session_id)
        .bind(enrollment_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(foreign)
    }

    /// Upserts every item in one transaction and returns how many were written.
    pub async fn bulk_upsert(
        &self,
        session_id: Uuid,
        items: &[BulkAttendanceItem],
        checked_by: Uuid,
    ) -> Result<usize, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        for item in items {
            upsert_with(
                &mut *tx,
                session_id,
                item.enrollment_id,
                item.status,
                item.note.as_deref(),
                checked_by,
            )
            .await?;
        }
        tx.commit().await?;

        Ok(items.len())
    }
}

async fn upsert_with<'e, E>(
    executor: E,
    session_id: Uuid,
    enrollment_id: Uuid,
    status: AttendanceStatus,
    note: Option<&str>,
    checked_by: Uuid,
) -> Result<Attendance, DatabaseError>
where
    E: PgExecutor<'e>,
{
    let sql = format!(
        r#"
        INSERT INTO attendances (session_id, enrollment_id, checked_at, status, checked_by, note)
        VALUES ($1, $2, NOW(), $3, $4, $5)
        ON CONFLICT (enrollment_id) DO UPDATE
        SET session_id = EXCLUDED.session_id, checked_at = EXCLUDED.checked_at, status = EXCLUDED.status,
            checked_by = EXCLUDED.checked_by, note = EXCLUDED.note, updated_at = NOW()
        RETURNING {ATTENDANCE_COLUMNS}
        "#
    );
    let attendance = sqlx::query_as::<_, Attendance>(&sql)
        .bind(session_id)
        .bind(enrollment_id)
        .bind(status)
        .bind(checked_by)
        .bind(note)
        .fetch_one(executor)
        .await?;

    Ok(attendance)
}
