use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a student sits in the study workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudentState {
    /// Free to study. Every new student starts here.
    Normal,
    /// Performance dipped; waiting for a mentor to review.
    Locked,
    /// Working through a mentor-assigned task.
    Remedial,
}

impl StudentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Locked => "locked",
            Self::Remedial => "remedial",
        }
    }
}

impl fmt::Display for StudentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StudentState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Self::Normal),
            "locked" => Ok(Self::Locked),
            "remedial" => Ok(Self::Remedial),
            other => Err(format!("unknown student state '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterventionStatus {
    Pending,
    Completed,
}

impl InterventionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }
}

impl FromStr for InterventionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            other => Err(format!("unknown intervention status '{other}'")),
        }
    }
}

/// Outcome reported back to whoever submitted a check-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CheckInStatus {
    #[serde(rename = "On Track")]
    OnTrack,
    #[serde(rename = "Pending Mentor Review")]
    PendingReview,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Student {
    pub id: Uuid,
    pub name: String,
    pub state: StudentState,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Student {
    pub fn last_updated(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(self.created_at)
    }
}

/// Append-only record of one check-in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyLog {
    pub id: Uuid,
    pub student_id: Uuid,
    pub quiz_score: i32,
    pub focus_minutes: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDailyLog {
    pub student_id: Uuid,
    pub quiz_score: i32,
    pub focus_minutes: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Intervention {
    pub id: Uuid,
    pub student_id: Uuid,
    pub task: String,
    pub status: InterventionStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Intervention {
    pub fn is_pending(&self) -> bool {
        self.status == InterventionStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_parse_from_their_persisted_text() {
        for state in [
            StudentState::Normal,
            StudentState::Locked,
            StudentState::Remedial,
        ] {
            assert_eq!(state.as_str().parse::<StudentState>(), Ok(state));
        }
        assert!("frozen".parse::<StudentState>().is_err());
    }

    #[test]
    fn check_in_status_uses_display_labels_on_the_wire() {
        assert_eq!(
            serde_json::to_value(CheckInStatus::OnTrack).unwrap(),
            serde_json::json!("On Track")
        );
        assert_eq!(
            serde_json::to_value(CheckInStatus::PendingReview).unwrap(),
            serde_json::json!("Pending Mentor Review")
        );
    }

    #[test]
    fn last_updated_falls_back_to_creation_time() {
        let created_at = Utc::now();
        let mut student = Student {
            id: Uuid::new_v4(),
            name: "Ada".to_string(),
            state: StudentState::Normal,
            created_at,
            updated_at: None,
        };
        assert_eq!(student.last_updated(), created_at);

        let later = created_at + chrono::Duration::minutes(5);
        student.updated_at = Some(later);
        assert_eq!(student.last_updated(), later);
    }
}
