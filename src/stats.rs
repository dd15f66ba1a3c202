use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::models::DailyLog;

/// Length of the trailing window used for student averages.
pub const ROLLING_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RollingAverages {
    pub average_quiz_score: f64,
    pub average_focus_minutes: f64,
    pub total_logs: usize,
}

pub fn cutoff(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    now - Duration::days(days.max(1))
}

/// Simple arithmetic means, rounded to two decimals. No logs means zero.
pub fn rolling_averages(logs: &[DailyLog]) -> RollingAverages {
    if logs.is_empty() {
        return RollingAverages {
            average_quiz_score: 0.0,
            average_focus_minutes: 0.0,
            total_logs: 0,
        };
    }

    let (quiz_total, focus_total) = logs.iter().fold((0i64, 0i64), |(quiz, focus), log| {
        (
            quiz + i64::from(log.quiz_score),
            focus + i64::from(log.focus_minutes),
        )
    });
    let count = logs.len() as f64;

    RollingAverages {
        average_quiz_score: round2(quiz_total as f64 / count),
        average_focus_minutes: round2(focus_total as f64 / count),
        total_logs: logs.len(),
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn sample_log(quiz_score: i32, focus_minutes: i32) -> DailyLog {
        DailyLog {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            quiz_score,
            focus_minutes,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn empty_window_averages_to_zero() {
        let averages = rolling_averages(&[]);
        assert_eq!(averages.average_quiz_score, 0.0);
        assert_eq!(averages.average_focus_minutes, 0.0);
        assert_eq!(averages.total_logs, 0);
    }

    #[test]
    fn averages_are_rounded_to_two_decimals() {
        let logs = vec![sample_log(9, 70), sample_log(5, 30), sample_log(6, 45)];
        let averages = rolling_averages(&logs);
        assert_eq!(averages.average_quiz_score, 6.67);
        assert_eq!(averages.average_focus_minutes, 48.33);
        assert_eq!(averages.total_logs, 3);
    }

    #[test]
    fn cutoff_respects_window_length() {
        let now = Utc::now();
        assert_eq!(cutoff(now, ROLLING_WINDOW_DAYS), now - Duration::days(7));
        assert_eq!(cutoff(now, 0), now - Duration::days(1));
    }

    #[test]
    fn round2_handles_exact_and_repeating_values() {
        assert_eq!(round2(8.0), 8.0);
        assert_eq!(round2(2.0 / 3.0), 0.67);
        assert_eq!(round2(1.005 * 1000.0), 1005.0);
    }
}
