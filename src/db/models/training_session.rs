use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;
use time::{Date, OffsetDateTime};

use super::ApprovalStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "session_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Upcoming,
    Open,
    Closed,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct TrainingSession {
    pub id: Uuid,
    pub program_id: Uuid,
    pub title: String,
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
    pub capacity: i32,
    pub trainer_id: Option<Uuid>,
    pub location: Option<String>,
    pub status: SessionStatus,
    pub approval_status: ApprovalStatus,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TrainingSession {
    pub fn is_trained_by(&self, user_id: Uuid) -> bool {
        self.trainer_id == Some(user_id)
    }

    /// Only running sessions can be closed out as completed.
    pub fn can_be_completed(&self) -> bool {
        matches!(self.status, SessionStatus::Open | SessionStatus::Closed)
    }
}
