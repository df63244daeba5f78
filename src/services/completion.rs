//! Attendance-based completion of enrollments.

use async_trait::async_trait;
use serde::Serialize;
use time::{Date, OffsetDateTime};
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::{DatabaseError, Enrollment, EnrollmentStatus, TrainingSession};

/// Percentage of session days a multi-day enrollment must attend.
const MULTI_DAY_THRESHOLD_PERCENT: i64 = 80;

#[async_trait]
pub trait EnrollmentStore: Send + Sync {
    async fn find_enrollment(&self, enrollment_id: Uuid) -> Result<Option<Enrollment>, DatabaseError>;

    async fn find_session(&self, session_id: Uuid) -> Result<Option<TrainingSession>, DatabaseError>;

    /// Attendance rows of the enrollment whose status counts as attended.
    async fn count_attended(&self, enrollment_id: Uuid) -> Result<i64, DatabaseError>;

    async fn session_enrollment_ids(&self, session_id: Uuid) -> Result<Vec<Uuid>, DatabaseError>;

    async fn mark_completed(&self, enrollment_id: Uuid, completed_at: OffsetDateTime) -> Result<(), DatabaseError>;

    /// Sets the enrollment back to confirmed and clears `completed_at`.
    async fn reset_completion(&self, enrollment_id: Uuid) -> Result<(), DatabaseError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompletionOutcome {
    pub completed: bool,
    pub attended: i64,
    pub required: i64,
}

impl CompletionOutcome {
    fn skipped() -> Self {
        Self {
            completed: false,
            attended: 0,
            required: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompletionSummary {
    pub total: usize,
    pub completed: usize,
}

/// Inclusive number of calendar days a session covers.
///
/// Missing or inverted dates count as a single day.
pub fn session_day_span(start: Option<Date>, end: Option<Date>) -> i64 {
    match (start, end) {
        (Some(start), Some(end)) if end >= start => (end - start).whole_days() + 1,
        _ => 1,
    }
}

/// Attendances needed to complete a session spanning `day_span` days.
pub fn required_attendance(day_span: i64) -> i64 {
    if day_span <= 1 {
        return 1;
    }
    // ceil(day_span * 0.8) without going through floats
    (day_span * MULTI_DAY_THRESHOLD_PERCENT + 99) / 100
}

/// Re-derives the completion state of one enrollment from its attendance.
///
/// Cancelled enrollments and enrollments without a session are left alone.
pub async fn evaluate_enrollment_completion(
    store: &dyn EnrollmentStore,
    enrollment_id: Uuid,
) -> Result<CompletionOutcome, DatabaseError> {
    let enrollment = store
        .find_enrollment(enrollment_id)
        .await?
        .ok_or(DatabaseError::NotFound)?;

    if enrollment.status == EnrollmentStatus::Cancelled {
        debug!(%enrollment_id, "Skipping completion for cancelled enrollment");
        return Ok(CompletionOutcome::skipped());
    }

    let Some(session) = store.find_session(enrollment.session_id).await? else {
        debug!(%enrollment_id, "Skipping completion for enrollment without a session");
        return Ok(CompletionOutcome::skipped());
    };

    let attended = store.count_attended(enrollment_id).await?;
    let required = required_attendance(session_day_span(session.start_date, session.end_date));
    let completed = attended >= required;

    if completed {
        store.mark_completed(enrollment_id, OffsetDateTime::now_utc()).await?;
    } else {
        store.reset_completion(enrollment_id).await?;
    }

    debug!(%enrollment_id, attended, required, completed, "Enrollment completion evaluated");

    Ok(CompletionOutcome {
        completed,
        attended,
        required,
    })
}

/// Evaluates every enrollment of a session.
pub async fn evaluate_session_completions(
    store: &dyn EnrollmentStore,
    session_id: Uuid,
) -> Result<CompletionSummary, DatabaseError> {
    let enrollment_ids = store.session_enrollment_ids(session_id).await?;
    let mut summary = CompletionSummary {
        total: enrollment_ids.len(),
        completed: 0,
    };

    for enrollment_id in enrollment_ids {
        if evaluate_enrollment_completion(store, enrollment_id).await?.completed {
            summary.completed += 1;
        }
    }

    info!(
        %session_id,
        total = summary.total,
        completed = summary.completed,
        "Session completions evaluated"
    );

    Ok(summary)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::{ApprovalStatus, AttendanceStatus, SessionStatus};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use time::macros::date;

    #[derive(Default)]
    pub(crate) struct MemoryEnrollments {
        pub enrollments: Mutex<HashMap<Uuid, Enrollment>>,
        pub sessions: Mutex<HashMap<Uuid, TrainingSession>>,
        pub attendances: Mutex<Vec<(Uuid, AttendanceStatus)>>,
    }

    impl MemoryEnrollments {
        pub fn add_session(&self, start: Option<Date>, end: Option<Date>) -> Uuid {
            let session = TrainingSession {
                id: Uuid::new_v4(),
                program_id: Uuid::new_v4(),
                title: "Forklift basics".to_string(),
                start_date: start,
                end_date: end,
                capacity: 20,
                trainer_id: None,
                location: None,
                status: SessionStatus::Open,
                approval_status: ApprovalStatus::Approved,
                created_at: OffsetDateTime::UNIX_EPOCH,
                updated_at: OffsetDateTime::UNIX_EPOCH,
            };
            let id = session.id;
            self.sessions.lock().unwrap().insert(id, session);
            id
        }

        pub fn enroll(&self, session_id: Uuid, status: EnrollmentStatus) -> Uuid {
            let enrollment = Enrollment {
                id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                session_id,
                status,
                enrolled_at: OffsetDateTime::UNIX_EPOCH,
                completed_at: None,
                created_at: OffsetDateTime::UNIX_EPOCH,
                updated_at: OffsetDateTime::UNIX_EPOCH,
            };
            let id = enrollment.id;
            self.enrollments.lock().unwrap().insert(id, enrollment);
            id
        }

        pub fn attend(&self, enrollment_id: Uuid, status: AttendanceStatus, times: usize) {
            let mut attendances = self.attendances.lock().unwrap();
            attendances.extend(std::iter::repeat((enrollment_id, status)).take(times));
        }

        pub fn enrollment(&self, enrollment_id: Uuid) -> Enrollment {
            self.enrollments.lock().unwrap()[&enrollment_id].clone()
        }
    }

    #[async_trait]
    impl EnrollmentStore for MemoryEnrollments {
        async fn find_enrollment(&self, enrollment_id: Uuid) -> Result<Option<Enrollment>, DatabaseError> {
            Ok(self.enrollments.lock().unwrap().get(&enrollment_id).cloned())
        }

        async fn find_session(&self, session_id: Uuid) -> Result<Option<TrainingSession>, DatabaseError> {
            Ok(self.sessions.lock().unwrap().get(&session_id).cloned())
        }

        async fn count_attended(&self, enrollment_id: Uuid) -> Result<i64, DatabaseError> {
            let attendances = self.attendances.lock().unwrap();
            Ok(attendances
                .iter()
                .filter(|(id, status)| *id == enrollment_id && status.counts_as_attended())
                .count() as i64)
        }

        async fn session_enrollment_ids(&self, session_id: Uuid) -> Result<Vec<Uuid>, DatabaseError> {
            let enrollments = self.enrollments.lock().unwrap();
            Ok(enrollments
                .values()
                .filter(|e| e.session_id == session_id)
                .map(|e| e.id)
                .collect())
        }

        async fn mark_completed(&self, enrollment_id: Uuid, completed_at: OffsetDateTime) -> Result<(), DatabaseError> {
            let mut enrollments = self.enrollments.lock().unwrap();
            let enrollment = enrollments.get_mut(&enrollment_id).ok_or(DatabaseError::NotFound)?;
            enrollment.status = EnrollmentStatus::Completed;
            enrollment.completed_at = Some(completed_at);
            Ok(())
        }

        async fn reset_completion(&self, enrollment_id: Uuid) -> Result<(), DatabaseError> {
            let mut enrollments = self.enrollments.lock().unwrap();
            let enrollment = enrollments.get_mut(&enrollment_id).ok_or(DatabaseError::NotFound)?;
            enrollment.status = EnrollmentStatus::Confirmed;
            enrollment.completed_at = None;
            Ok(())
        }
    }

    #[test]
    fn day_span_counts_both_ends() {
        assert_eq!(session_day_span(Some(date!(2025 - 01 - 06)), Some(date!(2025 - 01 - 10))), 5);
        assert_eq!(session_day_span(Some(date!(2025 - 01 - 06)), Some(date!(2025 - 01 - 06))), 1);
    }

    #[test]
    fn day_span_is_one_for_missing_or_inverted_dates() {
        assert_eq!(session_day_span(None, Some(date!(2025 - 01 - 10))), 1);
        assert_eq!(session_day_span(Some(date!(2025 - 01 - 06)), None), 1);
        assert_eq!(session_day_span(Some(date!(2025 - 01 - 10)), Some(date!(2025 - 01 - 06))), 1);
    }

    #[test]
    fn required_attendance_rounds_up() {
        assert_eq!(required_attendance(0), 1);
        assert_eq!(required_attendance(1), 1);
        assert_eq!(required_attendance(2), 2);
        assert_eq!(required_attendance(5), 4);
        assert_eq!(required_attendance(10), 8);
        assert_eq!(required_attendance(11), 9);
    }

    #[tokio::test]
    async fn five_day_session_needs_four_attendances() {
        let store = MemoryEnrollments::default();
        let session = store.add_session(Some(date!(2025 - 03 - 03)), Some(date!(2025 - 03 - 07)));
        let enrollment = store.enroll(session, EnrollmentStatus::Confirmed);

        store.attend(enrollment, AttendanceStatus::Present, 3);
        store.attend(enrollment, AttendanceStatus::Absent, 2);
        let outcome = evaluate_enrollment_completion(&store, enrollment).await.unwrap();
        assert_eq!(
            outcome,
            CompletionOutcome {
                completed: false,
                attended: 3,
                required: 4
            }
        );
        assert_eq!(store.enrollment(enrollment).status, EnrollmentStatus::Confirmed);

        store.attend(enrollment, AttendanceStatus::Late, 1);
        let outcome = evaluate_enrollment_completion(&store, enrollment).await.unwrap();
        assert!(outcome.completed);
        let stored = store.enrollment(enrollment);
        assert_eq!(stored.status, EnrollmentStatus::Completed);
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn reevaluation_resets_completion_when_attendance_drops() {
        let store = MemoryEnrollments::default();
        let session = store.add_session(Some(date!(2025 - 03 - 03)), Some(date!(2025 - 03 - 07)));
        let enrollment = store.enroll(session, EnrollmentStatus::Confirmed);
        store.attend(enrollment, AttendanceStatus::Present, 4);

        assert!(evaluate_enrollment_completion(&store, enrollment).await.unwrap().completed);

        store.attendances.lock().unwrap().pop();
        let outcome = evaluate_enrollment_completion(&store, enrollment).await.unwrap();
        assert!(!outcome.completed);
        let stored = store.enrollment(enrollment);
        assert_eq!(stored.status, EnrollmentStatus::Confirmed);
        assert_eq!(stored.completed_at, None);
    }

    #[tokio::test]
    async fn cancelled_enrollments_are_left_untouched() {
        let store = MemoryEnrollments::default();
        let session = store.add_session(None, None);
        let enrollment = store.enroll(session, EnrollmentStatus::Cancelled);
        store.attend(enrollment, AttendanceStatus::Present, 1);

        let outcome = evaluate_enrollment_completion(&store, enrollment).await.unwrap();
        assert!(!outcome.completed);
        assert_eq!(store.enrollment(enrollment).status, EnrollmentStatus::Cancelled);
    }

    #[tokio::test]
    async fn enrollment_without_session_is_not_completed() {
        let store = MemoryEnrollments::default();
        let enrollment = store.enroll(Uuid::new_v4(), EnrollmentStatus::Pending);

        let outcome = evaluate_enrollment_completion(&store, enrollment).await.unwrap();
        assert!(!outcome.completed);
        assert_eq!(store.enrollment(enrollment).status, EnrollmentStatus::Pending);
    }

    #[tokio::test]
    async fn unknown_enrollment_is_not_found() {
        let store = MemoryEnrollments::default();
        let err = evaluate_enrollment_completion(&store, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound));
    }

    #[tokio::test]
    async fn session_summary_counts_every_enrollment() {
        let store = MemoryEnrollments::default();
        let session = store.add_session(Some(date!(2025 - 03 - 03)), Some(date!(2025 - 03 - 03)));
        let done = store.enroll(session, EnrollmentStatus::Confirmed);
        let absent = store.enroll(session, EnrollmentStatus::Confirmed);
        let cancelled = store.enroll(session, EnrollmentStatus::Cancelled);
        store.attend(done, AttendanceStatus::Present, 1);
        store.attend(absent, AttendanceStatus::Absent, 1);
        store.attend(cancelled, AttendanceStatus::Present, 1);

        let summary = evaluate_session_completions(&store, session).await.unwrap();
        assert_eq!(summary, CompletionSummary { total: 3, completed: 1 });
    }
}
