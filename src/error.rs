//! Error types shared by the engine and its collaborators.

use thiserror::Error;
use uuid::Uuid;

/// Failures raised by a `StudentStore` backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A row came back with a value the domain types cannot represent.
    #[error("corrupt row in {table}: {message}")]
    CorruptRow { table: &'static str, message: String },
}

/// Failures raised while delivering a mentor notification.
///
/// These never escape a transition; they are logged and dropped.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("webhook returned HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Error, Debug)]
pub enum EngineError {
    /// Caller input was missing or malformed. Raised before any write.
    #[error("{0}")]
    Validation(String),

    #[error("student {0} not found")]
    StudentNotFound(Uuid),

    #[error("intervention {0} not found")]
    InterventionNotFound(Uuid),

    #[error("no pending intervention for student {0}")]
    NoPendingIntervention(Uuid),

    #[error("storage unavailable: {0}")]
    Upstream(#[from] StoreError),
}

impl EngineError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::StudentNotFound(_) | Self::InterventionNotFound(_) | Self::NoPendingIntervention(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_covers_every_lookup_miss() {
        let id = Uuid::new_v4();
        assert!(EngineError::StudentNotFound(id).is_not_found());
        assert!(EngineError::InterventionNotFound(id).is_not_found());
        assert!(EngineError::NoPendingIntervention(id).is_not_found());
        assert!(!EngineError::Validation("task is required".into()).is_not_found());
    }

    #[test]
    fn corrupt_rows_name_their_table() {
        let err = StoreError::CorruptRow {
            table: "students",
            message: "unknown student state 'frozen'".into(),
        };
        assert_eq!(
            err.to_string(),
            "corrupt row in students: unknown student state 'frozen'"
        );
    }
}
