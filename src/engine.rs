//! Student state machine.
//!
//! Every transition is a total override of the persisted `state`:
//! - check-in: `normal` when on track, `locked` otherwise, whatever the prior state
//! - intervention assigned: `remedial`
//! - task completed: `normal`
//!
//! The engine keeps no student data of its own. It reads and writes through
//! a `StudentStore` and hands review alerts to a `Notifier`. Transitions for
//! one student are serialized through an in-process lock so that a check-in
//! racing an intervention cannot interleave its read-modify-write.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{
    CheckInStatus, DailyLog, Intervention, NewDailyLog, Student, StudentState,
};
use crate::notify::{self, NotificationPayload, Notifier};
use crate::stats::{self, RollingAverages, ROLLING_WINDOW_DAYS};
use crate::store::StudentStore;

/// A check-in is on track only when the quiz score is strictly above this.
pub const QUIZ_SCORE_THRESHOLD: i32 = 7;
/// A check-in is on track only when focus time is strictly above this.
pub const FOCUS_MINUTES_THRESHOLD: i32 = 60;

/// Decide the next state for a check-in. Ignores the current state.
pub fn evaluate_check_in(quiz_score: i32, focus_minutes: i32) -> (StudentState, CheckInStatus) {
    if quiz_score > QUIZ_SCORE_THRESHOLD && focus_minutes > FOCUS_MINUTES_THRESHOLD {
        (StudentState::Normal, CheckInStatus::OnTrack)
    } else {
        (StudentState::Locked, CheckInStatus::PendingReview)
    }
}

/// Which intervention a task completion refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionTarget {
    ById(Uuid),
    /// The most recently created pending intervention for this student.
    LatestForStudent(Uuid),
}

#[derive(Debug, Clone)]
pub struct CheckInOutcome {
    pub student: Student,
    pub status: CheckInStatus,
    /// The alert handed to the notifier, if the check-in needs review.
    pub notification: Option<NotificationPayload>,
}

#[derive(Debug, Clone)]
pub struct StudentDetail {
    pub student: Student,
    /// Only populated while the student is `remedial`.
    pub current_task: Option<Intervention>,
    pub averages: RollingAverages,
    pub recent_logs: Vec<DailyLog>,
}

type LockMap = Arc<StdMutex<HashMap<Uuid, Arc<Mutex<()>>>>>;

fn lock_map(map: &LockMap) -> MutexGuard<'_, HashMap<Uuid, Arc<Mutex<()>>>> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One async mutex per student id, held only while someone uses it.
///
/// Entries are removed when the last holder or waiter lets go, so the map
/// stays as small as the set of students with a transition in flight.
#[derive(Default)]
struct StudentLocks {
    locks: LockMap,
}

impl StudentLocks {
    async fn acquire(&self, student_id: Uuid) -> StudentGuard {
        let lock = {
            let mut locks = lock_map(&self.locks);
            // Entries left behind by cancelled waiters.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(student_id).or_default())
        };

        let mut guard = StudentGuard {
            student_id,
            locks: Arc::clone(&self.locks),
            held: None,
        };
        guard.held = Some(lock.lock_owned().await);
        guard
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        lock_map(&self.locks).len()
    }
}

struct StudentGuard {
    student_id: Uuid,
    locks: LockMap,
    held: Option<OwnedMutexGuard<()>>,
}

impl Drop for StudentGuard {
    fn drop(&mut self) {
        let mut locks = lock_map(&self.locks);
        // Release under the map lock so nobody can clone the entry in between.
        self.held.take();
        if locks
            .get(&self.student_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.student_id);
        }
    }
}

pub struct StudentStateEngine {
    store: Arc<dyn StudentStore>,
    notifier: Arc<dyn Notifier>,
    locks: StudentLocks,
}

impl StudentStateEngine {
    pub fn new(store: Arc<dyn StudentStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            notifier,
            locks: StudentLocks::default(),
        }
    }

    pub async fn create_student(&self, name: &str) -> Result<Student, EngineError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::Validation("name is required".to_string()));
        }

        let student = self.store.create_student(name).await?;
        info!(student_id = %student.id, "student created");
        Ok(student)
    }

    pub async fn list_students(&self) -> Result<Vec<Student>, EngineError> {
        Ok(self.store.list_students().await?)
    }

    pub async fn student_detail(&self, student_id: Uuid) -> Result<StudentDetail, EngineError> {
        let student = self
            .store
            .fetch_student(student_id)
            .await?
            .ok_or(EngineError::StudentNotFound(student_id))?;

        let current_task = if student.state == StudentState::Remedial {
            self.store
                .fetch_latest_pending_intervention(student_id)
                .await?
        } else {
            None
        };

        let since = stats::cutoff(Utc::now(), ROLLING_WINDOW_DAYS);
        let recent_logs = self.store.fetch_logs_since(student_id, since).await?;
        let averages = stats::rolling_averages(&recent_logs);

        Ok(StudentDetail {
            student,
            current_task,
            averages,
            recent_logs,
        })
    }

    /// Record a check-in and move the student to `normal` or `locked`.
    ///
    /// `quiz_score` and `focus_minutes` are expected to be range-checked by
    /// the caller. A check-in that needs review fires a mentor alert on a
    /// detached task; its delivery never affects the result.
    pub async fn check_in(
        &self,
        student_id: Uuid,
        quiz_score: i32,
        focus_minutes: i32,
    ) -> Result<CheckInOutcome, EngineError> {
        self.require_student(student_id).await?;
        let _guard = self.locks.acquire(student_id).await;
        let prior = self.require_student(student_id).await?;

        let log = self
            .store
            .insert_daily_log(NewDailyLog {
                student_id,
                quiz_score,
                focus_minutes,
            })
            .await?;

        let (target, status) = evaluate_check_in(quiz_score, focus_minutes);
        let student = self
            .store
            .update_student_state(student_id, target)
            .await?
            .ok_or(EngineError::StudentNotFound(student_id))?;

        info!(
            %student_id,
            quiz_score,
            focus_minutes,
            from = %prior.state,
            to = %student.state,
            "check-in applied"
        );

        let notification = match status {
            CheckInStatus::OnTrack => None,
            CheckInStatus::PendingReview => {
                let payload = NotificationPayload {
                    student_id,
                    quiz_score,
                    focus_minutes,
                    state: student.state,
                    name: student.name.clone(),
                    timestamp: log.created_at.to_rfc3339(),
                };
                notify::dispatch(Arc::clone(&self.notifier), payload.clone());
                Some(payload)
            }
        };

        Ok(CheckInOutcome {
            student,
            status,
            notification,
        })
    }

    /// Create a pending intervention and force the student into `remedial`.
    pub async fn assign_intervention(
        &self,
        student_id: Uuid,
        task: &str,
    ) -> Result<Intervention, EngineError> {
        let task = task.trim();
        if task.is_empty() {
            return Err(EngineError::Validation("task is required".to_string()));
        }

        self.require_student(student_id).await?;
        let _guard = self.locks.acquire(student_id).await;

        let intervention = self
            .store
            .assign_intervention(student_id, task)
            .await?
            .ok_or(EngineError::StudentNotFound(student_id))?;

        info!(
            %student_id,
            intervention_id = %intervention.id,
            "intervention assigned"
        );
        Ok(intervention)
    }

    /// Complete an intervention and force its student back to `normal`.
    ///
    /// An intervention that is already completed is returned as stored; the
    /// state is still forced to `normal`.
    pub async fn complete_task(
        &self,
        target: CompletionTarget,
    ) -> Result<Intervention, EngineError> {
        let student_id = match target {
            CompletionTarget::ById(id) => self.fetch_intervention(id).await?.student_id,
            CompletionTarget::LatestForStudent(student_id) => student_id,
        };

        let _guard = self.locks.acquire(student_id).await;

        let resolved = match target {
            CompletionTarget::ById(id) => self.fetch_intervention(id).await?,
            CompletionTarget::LatestForStudent(student_id) => self
                .store
                .fetch_latest_pending_intervention(student_id)
                .await?
                .ok_or(EngineError::NoPendingIntervention(student_id))?,
        };

        let intervention = if resolved.is_pending() {
            self.store
                .complete_intervention(resolved.id, Utc::now())
                .await?
                .ok_or(EngineError::InterventionNotFound(resolved.id))?
        } else {
            debug!(intervention_id = %resolved.id, "intervention already completed");
            resolved
        };

        self.store
            .update_student_state(intervention.student_id, StudentState::Normal)
            .await?
            .ok_or(EngineError::StudentNotFound(intervention.student_id))?;

        info!(
            student_id = %intervention.student_id,
            intervention_id = %intervention.id,
            "task completed"
        );
        Ok(intervention)
    }

    async fn require_student(&self, student_id: Uuid) -> Result<Student, EngineError> {
        self.store
            .fetch_student(student_id)
            .await?
            .ok_or(EngineError::StudentNotFound(student_id))
    }

    async fn fetch_intervention(&self, id: Uuid) -> Result<Intervention, EngineError> {
        self.store
            .fetch_intervention(id)
            .await?
            .ok_or(EngineError::InterventionNotFound(id))
    }
}
