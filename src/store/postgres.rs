use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::StudentStore;
use crate::error::StoreError;
use crate::models::{
    DailyLog, Intervention, InterventionStatus, NewDailyLog, Student, StudentState,
};

const STUDENT_COLUMNS: &str = "id, name, state, created_at, updated_at";
const LOG_COLUMNS: &str = "id, student_id, quiz_score, focus_minutes, created_at";
const INTERVENTION_COLUMNS: &str = "id, student_id, task, status, created_at, completed_at";

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init_db(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Load a few demo students with a week of check-ins.
    ///
    /// Every row has a fixed id, so running this again resets the demo
    /// students' states without duplicating their logs or tasks.
    pub async fn seed(&self) -> anyhow::Result<()> {
        let rows = seed_rows()?;
        let mut tx = self.pool.begin().await?;

        for student in &rows.students {
            sqlx::query(
                r#"
                INSERT INTO focusloop.students (id, name, state)
                VALUES ($1, $2, $3)
                ON CONFLICT (id) DO UPDATE
                SET name = EXCLUDED.name, state = EXCLUDED.state, updated_at = now()
                "#,
            )
            .bind(student.id)
            .bind(student.name)
            .bind(student.state.as_str())
            .execute(&mut *tx)
            .await?;
        }

        let now = Utc::now();
        for log in &rows.logs {
            sqlx::query(
                r#"
                INSERT INTO focusloop.daily_logs
                (id, student_id, quiz_score, focus_minutes, created_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(log.id)
            .bind(log.student_id)
            .bind(log.quiz_score)
            .bind(log.focus_minutes)
            .bind(now - Duration::days(log.days_ago))
            .execute(&mut *tx)
            .await?;
        }

        for intervention in &rows.interventions {
            sqlx::query(
                r#"
                INSERT INTO focusloop.interventions (id, student_id, task, status)
                VALUES ($1, $2, $3, 'pending')
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(intervention.id)
            .bind(intervention.student_id)
            .bind(intervention.task)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

struct SeedStudent {
    id: Uuid,
    name: &'static str,
    state: StudentState,
}

struct SeedLog {
    id: Uuid,
    student_id: Uuid,
    quiz_score: i32,
    focus_minutes: i32,
    days_ago: i64,
}

struct SeedIntervention {
    id: Uuid,
    student_id: Uuid,
    task: &'static str,
}

struct SeedRows {
    students: Vec<SeedStudent>,
    logs: Vec<SeedLog>,
    interventions: Vec<SeedIntervention>,
}

/// Demo data. Log ids are derived from the student id and the day index.
fn seed_rows() -> Result<SeedRows, uuid::Error> {
    let roster = [
        (
            "6b1f3c52-0d1e-4a8b-9a47-2f5c0e7d9a11",
            "Ada Lovelace",
            StudentState::Normal,
            vec![(9, 75), (8, 90), (9, 65)],
        ),
        (
            "c4e2a9d7-5b3f-4f60-8e12-7a9b1d0c3e22",
            "Alan Turing",
            StudentState::Locked,
            vec![(8, 80), (6, 40)],
        ),
        (
            "0f9d8c7b-6a5e-4d3c-b2a1-908f7e6d5c33",
            "Grace Hopper",
            StudentState::Remedial,
            vec![(5, 30), (7, 60)],
        ),
    ];

    let mut rows = SeedRows {
        students: Vec::new(),
        logs: Vec::new(),
        interventions: Vec::new(),
    };

    for (id, name, state, logs) in roster {
        let id = Uuid::parse_str(id)?;
        let day_count = logs.len() as i64;
        for (offset, (quiz_score, focus_minutes)) in logs.into_iter().enumerate() {
            rows.logs.push(SeedLog {
                id: Uuid::from_u128(id.as_u128() ^ (offset as u128 + 1)),
                student_id: id,
                quiz_score,
                focus_minutes,
                days_ago: day_count - offset as i64,
            });
        }

        if state == StudentState::Remedial {
            rows.interventions.push(SeedIntervention {
                id: Uuid::from_u128(id.as_u128() ^ (0xffu128 << 64)),
                student_id: id,
                task: "Re-read chapter 4 and redo the practice quiz",
            });
        }

        rows.students.push(SeedStudent { id, name, state });
    }

    Ok(rows)
}

fn student_from_row(row: &PgRow) -> Result<Student, StoreError> {
    let state: String = row.try_get("state")?;
    let state = state.parse::<StudentState>().map_err(|message| StoreError::CorruptRow {
        table: "students",
        message,
    })?;

    Ok(Student {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        state,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn log_from_row(row: &PgRow) -> Result<DailyLog, StoreError> {
    Ok(DailyLog {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        quiz_score: row.try_get("quiz_score")?,
        focus_minutes: row.try_get("focus_minutes")?,
        created_at: row.try_get("created_at")?,
    })
}

fn intervention_from_row(row: &PgRow) -> Result<Intervention, StoreError> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<InterventionStatus>()
        .map_err(|message| StoreError::CorruptRow {
            table: "interventions",
            message,
        })?;

    Ok(Intervention {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        task: row.try_get("task")?,
        status,
        created_at: row.try_get("created_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

#[async_trait]
impl StudentStore for PostgresStore {
    async fn create_student(&self, name: &str) -> Result<Student, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO focusloop.students (id, name, state) \
             VALUES ($1, $2, $3) \
             RETURNING {STUDENT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(StudentState::Normal.as_str())
        .fetch_one(&self.pool)
        .await?;

        student_from_row(&row)
    }

    async fn list_students(&self) -> Result<Vec<Student>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {STUDENT_COLUMNS} FROM focusloop.students ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(student_from_row).collect()
    }

    async fn fetch_student(&self, id: Uuid) -> Result<Option<Student>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {STUDENT_COLUMNS} FROM focusloop.students WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(student_from_row).transpose()
    }

    async fn update_student_state(
        &self,
        id: Uuid,
        state: StudentState,
    ) -> Result<Option<Student>, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE focusloop.students SET state = $2, updated_at = now() \
             WHERE id = $1 \
             RETURNING {STUDENT_COLUMNS}"
        ))
        .bind(id)
        .bind(state.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(student_from_row).transpose()
    }

    async fn insert_daily_log(&self, log: NewDailyLog) -> Result<DailyLog, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO focusloop.daily_logs (id, student_id, quiz_score, focus_minutes) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {LOG_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(log.student_id)
        .bind(log.quiz_score)
        .bind(log.focus_minutes)
        .fetch_one(&self.pool)
        .await?;

        log_from_row(&row)
    }

    async fn fetch_logs_since(
        &self,
        student_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<DailyLog>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {LOG_COLUMNS} FROM focusloop.daily_logs \
             WHERE student_id = $1 AND created_at >= $2 \
             ORDER BY created_at DESC"
        ))
        .bind(student_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(log_from_row).collect()
    }

    async fn insert_intervention(
        &self,
        student_id: Uuid,
        task: &str,
    ) -> Result<Intervention, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO focusloop.interventions (id, student_id, task, status) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {INTERVENTION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(task)
        .bind(InterventionStatus::Pending.as_str())
        .fetch_one(&self.pool)
        .await?;

        intervention_from_row(&row)
    }

    async fn assign_intervention(
        &self,
        student_id: Uuid,
        task: &str,
    ) -> Result<Option<Intervention>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE focusloop.students SET state = $2, updated_at = now() WHERE id = $1",
        )
        .bind(student_id)
        .bind(StudentState::Remedial.as_str())
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let row = sqlx::query(&format!(
            "INSERT INTO focusloop.interventions (id, student_id, task, status) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {INTERVENTION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(task)
        .bind(InterventionStatus::Pending.as_str())
        .fetch_one(&mut *tx)
        .await?;
        let intervention = intervention_from_row(&row)?;

        tx.commit().await?;
        Ok(Some(intervention))
    }

    async fn fetch_intervention(&self, id: Uuid) -> Result<Option<Intervention>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {INTERVENTION_COLUMNS} FROM focusloop.interventions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(intervention_from_row).transpose()
    }

    async fn fetch_latest_pending_intervention(
        &self,
        student_id: Uuid,
    ) -> Result<Option<Intervention>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {INTERVENTION_COLUMNS} FROM focusloop.interventions \
             WHERE student_id = $1 AND status = 'pending' \
             ORDER BY created_at DESC \
             LIMIT 1"
        ))
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(intervention_from_row).transpose()
    }

    async fn complete_intervention(
        &self,
        id: Uuid,
        completed_at: DateTime<Utc>,
    ) -> Result<Option<Intervention>, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE focusloop.interventions SET status = 'completed', completed_at = $2 \
             WHERE id = $1 \
             RETURNING {INTERVENTION_COLUMNS}"
        ))
        .bind(id)
        .bind(completed_at)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(intervention_from_row).transpose()
    }
}
