use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use sqlx::types::Uuid;
use time::OffsetDateTime;
use validator::{Validate, ValidationError};

use super::Enrollment;

const NOTE_MAX_CHARS: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "attendance_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    LeaveEarly,
}

impl AttendanceStatus {
    /// Statuses that count towards completion.
    pub const ATTENDED: [AttendanceStatus; 2] = [AttendanceStatus::Present, AttendanceStatus::Late];

    pub fn counts_as_attended(self) -> bool {
        Self::ATTENDED.contains(&self)
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Attendance {
    pub id: Uuid,
    pub session_id: Uuid,
    pub enrollment_id: Uuid,
    pub checked_at: OffsetDateTime,
    pub status: AttendanceStatus,
    pub checked_by: Option<Uuid>,
    pub note: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// An enrollment as shown on the attendance sheet.
#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentAttendances {
    #[serde(flatten)]
    pub enrollment: Enrollment,
    pub attendances: Vec<Attendance>,
}

impl EnrollmentAttendances {
    /// Pairs each enrollment with its rows, keeping the enrollment order.
    pub fn group(enrollments: Vec<Enrollment>, attendances: Vec<Attendance>) -> Vec<Self> {
        let mut by_enrollment: HashMap<Uuid, Vec<Attendance>> = HashMap::new();
        for attendance in attendances {
            by_enrollment.entry(attendance.enrollment_id).or_default().push(attendance);
        }

        enrollments
            .into_iter()
            .map(|enrollment| Self {
                attendances: by_enrollment.remove(&enrollment.id).unwrap_or_default(),
                enrollment,
            })
            .collect()
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct NewAttendance {
    pub session_id: Uuid,
    pub enrollment_id: Uuid,
    pub status: AttendanceStatus,
    #[validate(length(max = 2000))]
    pub note: Option<String>,
}

/// Partial update. `note` is `None` when absent, `Some(None)` when sent as
/// `null` (clears the note).
#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = "validate_note_change"))]
pub struct UpdateAttendance {
    pub status: Option<AttendanceStatus>,
    #[serde(default, deserialize_with = "present_or_null")]
    pub note: Option<Option<String>>,
}

fn present_or_null<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

fn validate_note_change(payload: &UpdateAttendance) -> Result<(), ValidationError> {
    match &payload.note {
        Some(Some(note)) if note.chars().count() > NOTE_MAX_CHARS => Err(ValidationError::new("length")),
        _ => Ok(()),
    }
}

impl UpdateAttendance {
    pub fn note_change(&self) -> Option<Option<&str>> {
        self.note.as_ref().map(|note| note.as_deref())
    }
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct BulkAttendanceItem {
    pub enrollment_id: Uuid,
    pub status: AttendanceStatus,
    #[validate(length(max = 2000))]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BulkAttendance {
    #[validate(length(min = 1), nested)]
    pub items: Vec<BulkAttendanceItem>,
}
