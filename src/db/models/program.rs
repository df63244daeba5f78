use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "approval_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "program_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProgramStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Program {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub created_by: Option<Uuid>,
    pub approval_status: ApprovalStatus,
    pub status: ProgramStatus,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Program {
    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.created_by == Some(user_id)
    }

    /// Certificates may only be issued for approved, active programs.
    pub fn accepts_certificates(&self) -> bool {
        self.approval_status == ApprovalStatus::Approved && self.status == ProgramStatus::Active
    }
}
