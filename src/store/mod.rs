//! Persistence collaborator for student records, daily logs and interventions.
//!
//! The engine only talks to `StudentStore`. Two backends exist: Postgres for
//! real deployments and an in-memory map for tests and local runs.

mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{DailyLog, Intervention, NewDailyLog, Student, StudentState};

#[async_trait]
pub trait StudentStore: Send + Sync {
    /// Insert a student in the `normal` state.
    async fn create_student(&self, name: &str) -> Result<Student, StoreError>;

    /// All students, newest first.
    async fn list_students(&self) -> Result<Vec<Student>, StoreError>;

    async fn fetch_student(&self, id: Uuid) -> Result<Option<Student>, StoreError>;

    /// Atomically set `state` (and stamp `updated_at`), returning the updated
    /// row. `None` when no student has this id.
    async fn update_student_state(
        &self,
        id: Uuid,
        state: StudentState,
    ) -> Result<Option<Student>, StoreError>;

    async fn insert_daily_log(&self, log: NewDailyLog) -> Result<DailyLog, StoreError>;

    /// Logs created at or after `since`, newest first.
    async fn fetch_logs_since(
        &self,
        student_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<DailyLog>, StoreError>;

    /// Insert a `pending` intervention.
    async fn insert_intervention(
        &self,
        student_id: Uuid,
        task: &str,
    ) -> Result<Intervention, StoreError>;

    /// Insert a `pending` intervention and move the student to `remedial` in
    /// one atomic write. `None`, with nothing written, when no student has
    /// this id.
    async fn assign_intervention(
        &self,
        student_id: Uuid,
        task: &str,
    ) -> Result<Option<Intervention>, StoreError>;

    async fn fetch_intervention(&self, id: Uuid) -> Result<Option<Intervention>, StoreError>;

    /// Most recently created pending intervention for the student, if any.
    async fn fetch_latest_pending_intervention(
        &self,
        student_id: Uuid,
    ) -> Result<Option<Intervention>, StoreError>;

    /// Mark an intervention completed at `completed_at`, returning the
    /// updated row. `None` when no intervention has this id.
    async fn complete_intervention(
        &self,
        id: Uuid,
        completed_at: DateTime<Utc>,
    ) -> Result<Option<Intervention>, StoreError>;
}

#[cfg(test)]
pub mod testing {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    /// Wraps an `InMemoryStore` and fails selected writes on demand.
    #[derive(Default)]
    pub struct FailingStore {
        pub inner: InMemoryStore,
        pub fail_state_updates: AtomicBool,
        pub fail_assignments: AtomicBool,
    }

    impl FailingStore {
        pub fn new() -> Self {
            Self::default()
        }

        fn check(flag: &AtomicBool) -> Result<(), StoreError> {
            if flag.load(Ordering::SeqCst) {
                return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl StudentStore for FailingStore {
        async fn create_student(&self, name: &str) -> Result<Student, StoreError> {
            self.inner.create_student(name).await
        }

        async fn list_students(&self) -> Result<Vec<Student>, StoreError> {
            self.inner.list_students().await
        }

        async fn fetch_student(&self, id: Uuid) -> Result<Option<Student>, StoreError> {
            self.inner.fetch_student(id).await
        }

        async fn update_student_state(
            &self,
            id: Uuid,
            state: StudentState,
        ) -> Result<Option<Student>, StoreError> {
            Self::check(&self.fail_state_updates)?;
            self.inner.update_student_state(id, state).await
        }

        async fn insert_daily_log(&self, log: NewDailyLog) -> Result<DailyLog, StoreError> {
            self.inner.insert_daily_log(log).await
        }

        async fn fetch_logs_since(
            &self,
            student_id: Uuid,
            since: DateTime<Utc>,
        ) -> Result<Vec<DailyLog>, StoreError> {
            self.inner.fetch_logs_since(student_id, since).await
        }

        async fn insert_intervention(
            &self,
            student_id: Uuid,
            task: &str,
        ) -> Result<Intervention, StoreError> {
            self.inner.insert_intervention(student_id, task).await
        }

        async fn assign_intervention(
            &self,
            student_id: Uuid,
            task: &str,
        ) -> Result<Option<Intervention>, StoreError> {
            Self::check(&self.fail_assignments)?;
            self.inner.assign_intervention(student_id, task).await
        }

        async fn fetch_intervention(&self, id: Uuid) -> Result<Option<Intervention>, StoreError> {
            self.inner.fetch_intervention(id).await
        }

        async fn fetch_latest_pending_intervention(
            &self,
            student_id: Uuid,
        ) -> Result<Option<Intervention>, StoreError> {
            self.inner.fetch_latest_pending_intervention(student_id).await
        }

        async fn complete_intervention(
            &self,
            id: Uuid,
            completed_at: DateTime<Utc>,
        ) -> Result<Option<Intervention>, StoreError> {
            self.inner.complete_intervention(id, completed_at).await
        }
    }
}
