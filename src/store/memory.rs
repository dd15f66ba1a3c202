//! In-memory implementation of `StudentStore`.
//!
//! All data is held in maps behind `RwLock`s and lost on restart.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::StudentStore;
use crate::error::StoreError;
use crate::models::{
    DailyLog, Intervention, InterventionStatus, NewDailyLog, Student, StudentState,
};

pub struct InMemoryStore {
    students: RwLock<HashMap<Uuid, Student>>,
    logs: RwLock<Vec<DailyLog>>,
    interventions: RwLock<HashMap<Uuid, Intervention>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            students: RwLock::new(HashMap::new()),
            logs: RwLock::new(Vec::new()),
            interventions: RwLock::new(HashMap::new()),
        }
    }

    /// Insert an intervention with an explicit creation time.
    ///
    /// Lets tests build histories where ordering by `created_at` matters.
    #[cfg(test)]
    pub async fn insert_intervention_at(
        &self,
        student_id: Uuid,
        task: &str,
        created_at: DateTime<Utc>,
    ) -> Intervention {
        let intervention = Intervention {
            id: Uuid::new_v4(),
            student_id,
            task: task.to_string(),
            status: InterventionStatus::Pending,
            created_at,
            completed_at: None,
        };
        self.interventions
            .write()
            .await
            .insert(intervention.id, intervention.clone());
        intervention
    }

    /// Insert a log with an explicit creation time.
    #[cfg(test)]
    pub async fn insert_log_at(&self, log: NewDailyLog, created_at: DateTime<Utc>) -> DailyLog {
        let log = DailyLog {
            id: Uuid::new_v4(),
            student_id: log.student_id,
            quiz_score: log.quiz_score,
            focus_minutes: log.focus_minutes,
            created_at,
        };
        self.logs.write().await.push(log.clone());
        log
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StudentStore for InMemoryStore {
    async fn create_student(&self, name: &str) -> Result<Student, StoreError> {
        let student = Student {
            id: Uuid::new_v4(),
            name: name.to_string(),
            state: StudentState::Normal,
            created_at: Utc::now(),
            updated_at: None,
        };
        self.students
            .write()
            .await
            .insert(student.id, student.clone());
        Ok(student)
    }

    async fn list_students(&self) -> Result<Vec<Student>, StoreError> {
        let students = self.students.read().await;
        let mut values: Vec<Student> = students.values().cloned().collect();
        values.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(values)
    }

    async fn fetch_student(&self, id: Uuid) -> Result<Option<Student>, StoreError> {
        Ok(self.students.read().await.get(&id).cloned())
    }

    async fn update_student_state(
        &self,
        id: Uuid,
        state: StudentState,
    ) -> Result<Option<Student>, StoreError> {
        let mut students = self.students.write().await;
        Ok(students.get_mut(&id).map(|student| {
            student.state = state;
            student.updated_at = Some(Utc::now());
            student.clone()
        }))
    }

    async fn insert_daily_log(&self, log: NewDailyLog) -> Result<DailyLog, StoreError> {
        let log = DailyLog {
            id: Uuid::new_v4(),
            student_id: log.student_id,
            quiz_score: log.quiz_score,
            focus_minutes: log.focus_minutes,
            created_at: Utc::now(),
        };
        self.logs.write().await.push(log.clone());
        Ok(log)
    }

    async fn fetch_logs_since(
        &self,
        student_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<DailyLog>, StoreError> {
        let logs = self.logs.read().await;
        let mut matching: Vec<DailyLog> = logs
            .iter()
            .filter(|log| log.student_id == student_id && log.created_at >= since)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }

    async fn insert_intervention(
        &self,
        student_id: Uuid,
        task: &str,
    ) -> Result<Intervention, StoreError> {
        let intervention = Intervention {
            id: Uuid::new_v4(),
            student_id,
            task: task.to_string(),
            status: InterventionStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
        };
        self.interventions
            .write()
            .await
            .insert(intervention.id, intervention.clone());
        Ok(intervention)
    }

    async fn assign_intervention(
        &self,
        student_id: Uuid,
        task: &str,
    ) -> Result<Option<Intervention>, StoreError> {
        // Held across both writes so readers never see one without the other.
        let mut students = self.students.write().await;
        let Some(student) = students.get_mut(&student_id) else {
            return Ok(None);
        };

        let intervention = self.insert_intervention(student_id, task).await?;
        student.state = StudentState::Remedial;
        student.updated_at = Some(Utc::now());
        Ok(Some(intervention))
    }

    async fn fetch_intervention(&self, id: Uuid) -> Result<Option<Intervention>, StoreError> {
        Ok(self.interventions.read().await.get(&id).cloned())
    }

    async fn fetch_latest_pending_intervention(
        &self,
        student_id: Uuid,
    ) -> Result<Option<Intervention>, StoreError> {
        let interventions = self.interventions.read().await;
        Ok(interventions
            .values()
            .filter(|i| i.student_id == student_id && i.is_pending())
            .max_by_key(|i| i.created_at)
            .cloned())
    }

    async fn complete_intervention(
        &self,
        id: Uuid,
        completed_at: DateTime<Utc>,
    ) -> Result<Option<Intervention>, StoreError> {
        let mut interventions = self.interventions.write().await;
        Ok(interventions.get_mut(&id).map(|intervention| {
            intervention.status = InterventionStatus::Completed;
            intervention.completed_at = Some(completed_at);
            intervention.clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn new_students_start_normal_and_list_newest_first() {
        let store = InMemoryStore::new();
        let first = store.create_student("Ada").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let second = store.create_student("Grace").await.unwrap();

        assert_eq!(first.state, StudentState::Normal);
        assert!(first.updated_at.is_none());

        let listed = store.list_students().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
    }

    #[tokio::test]
    async fn update_state_stamps_updated_at_and_misses_return_none() {
        let store = InMemoryStore::new();
        let student = store.create_student("Ada").await.unwrap();

        let updated = store
            .update_student_state(student.id, StudentState::Locked)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.state, StudentState::Locked);
        assert!(updated.updated_at.is_some());

        let missing = store
            .update_student_state(Uuid::new_v4(), StudentState::Locked)
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn logs_since_excludes_older_entries_and_other_students() {
        let store = InMemoryStore::new();
        let ada = store.create_student("Ada").await.unwrap();
        let grace = store.create_student("Grace").await.unwrap();
        let now = Utc::now();

        let new_log = |student_id, quiz_score| NewDailyLog {
            student_id,
            quiz_score,
            focus_minutes: 45,
        };
        store
            .insert_log_at(new_log(ada.id, 4), now - Duration::days(10))
            .await;
        let recent = store
            .insert_log_at(new_log(ada.id, 8), now - Duration::days(1))
            .await;
        let newest = store.insert_log_at(new_log(ada.id, 9), now).await;
        store.insert_log_at(new_log(grace.id, 2), now).await;

        let logs = store
            .fetch_logs_since(ada.id, now - Duration::days(7))
            .await
            .unwrap();
        let ids: Vec<Uuid> = logs.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![newest.id, recent.id]);
    }

    #[tokio::test]
    async fn latest_pending_skips_completed_interventions() {
        let store = InMemoryStore::new();
        let student = store.create_student("Ada").await.unwrap();
        let now = Utc::now();

        let older = store
            .insert_intervention_at(student.id, "older", now - Duration::hours(2))
            .await;
        let newer = store
            .insert_intervention_at(student.id, "newer", now - Duration::hours(1))
            .await;
        store.complete_intervention(newer.id, now).await.unwrap();

        let latest = store
            .fetch_latest_pending_intervention(student.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, older.id);
    }

    #[tokio::test]
    async fn assign_writes_intervention_and_state_together() {
        let store = InMemoryStore::new();
        let student = store.create_student("Ada").await.unwrap();

        let intervention = store
            .assign_intervention(student.id, "Redo quiz 3")
            .await
            .unwrap()
            .unwrap();
        assert!(intervention.is_pending());

        let stored = store.fetch_student(student.id).await.unwrap().unwrap();
        assert_eq!(stored.state, StudentState::Remedial);
        assert!(stored.updated_at.is_some());
        let latest = store
            .fetch_latest_pending_intervention(student.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, intervention.id);
    }

    #[tokio::test]
    async fn assign_to_unknown_student_writes_nothing() {
        let store = InMemoryStore::new();
        let ghost = Uuid::new_v4();

        let assigned = store.assign_intervention(ghost, "Redo quiz 3").await.unwrap();
        assert!(assigned.is_none());
        assert!(store
            .fetch_latest_pending_intervention(ghost)
            .await
            .unwrap()
            .is_none());
    }
}
