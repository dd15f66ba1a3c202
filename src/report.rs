use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::engine::StudentDetail;
use crate::models::StudentState;

fn state_rank(state: StudentState) -> u8 {
    match state {
        StudentState::Locked => 0,
        StudentState::Remedial => 1,
        StudentState::Normal => 2,
    }
}

/// Markdown digest for mentors: who needs review, who is remediating, and
/// how everyone trended over the window.
pub fn build_report(window_days: i64, cutoff: DateTime<Utc>, details: &[StudentDetail]) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# FocusLoop Mentor Digest");
    let _ = writeln!(
        output,
        "Check-ins from the last {} days (since {})",
        window_days,
        cutoff.format("%Y-%m-%d")
    );
    let _ = writeln!(output);

    let count = |state: StudentState| details.iter().filter(|d| d.student.state == state).count();
    let _ = writeln!(output, "## Roster");
    let _ = writeln!(
        output,
        "- {} students: {} normal, {} locked, {} remedial",
        details.len(),
        count(StudentState::Normal),
        count(StudentState::Locked),
        count(StudentState::Remedial)
    );

    let mut ordered: Vec<&StudentDetail> = details.iter().collect();
    ordered.sort_by(|a, b| {
        state_rank(a.student.state)
            .cmp(&state_rank(b.student.state))
            .then_with(|| a.student.name.cmp(&b.student.name))
    });

    let _ = writeln!(output);
    let _ = writeln!(output, "## Awaiting Review");
    let locked: Vec<&&StudentDetail> = ordered
        .iter()
        .filter(|d| d.student.state == StudentState::Locked)
        .collect();
    if locked.is_empty() {
        let _ = writeln!(output, "Nobody is waiting on a mentor.");
    } else {
        for detail in locked {
            let _ = writeln!(
                output,
                "- {} (last update {})",
                detail.student.name,
                detail.student.last_updated().format("%Y-%m-%d %H:%M")
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Open Interventions");
    let remedial: Vec<&&StudentDetail> = ordered
        .iter()
        .filter(|d| d.student.state == StudentState::Remedial)
        .collect();
    if remedial.is_empty() {
        let _ = writeln!(output, "No remedial tasks in progress.");
    } else {
        for detail in remedial {
            let task = detail
                .current_task
                .as_ref()
                .map(|t| t.task.as_str())
                .unwrap_or("(no pending task on record)");
            let _ = writeln!(output, "- {}: {}", detail.student.name, task);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Rolling Averages");
    if ordered.is_empty() {
        let _ = writeln!(output, "No students enrolled.");
    } else {
        for detail in ordered {
            let _ = writeln!(
                output,
                "- {} [{}]: quiz {:.2}, focus {:.2} min across {} check-ins",
                detail.student.name,
                detail.student.state,
                detail.averages.average_quiz_score,
                detail.averages.average_focus_minutes,
                detail.averages.total_logs
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Intervention, InterventionStatus, Student};
    use crate::stats::RollingAverages;
    use uuid::Uuid;

    fn detail(name: &str, state: StudentState, task: Option<&str>) -> StudentDetail {
        let student = Student {
            id: Uuid::new_v4(),
            name: name.to_string(),
            state,
            created_at: Utc::now(),
            updated_at: None,
        };
        let current_task = task.map(|task| Intervention {
            id: Uuid::new_v4(),
            student_id: student.id,
            task: task.to_string(),
            status: InterventionStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
        });
        StudentDetail {
            student,
            current_task,
            averages: RollingAverages {
                average_quiz_score: 7.5,
                average_focus_minutes: 62.25,
                total_logs: 4,
            },
            recent_logs: Vec::new(),
        }
    }

    #[test]
    fn report_groups_students_by_state() {
        let details = vec![
            detail("Ada", StudentState::Normal, None),
            detail("Alan", StudentState::Locked, None),
            detail("Grace", StudentState::Remedial, Some("Read chapter 4")),
        ];
        let report = build_report(7, Utc::now(), &details);

        assert!(report.contains("- 3 students: 1 normal, 1 locked, 1 remedial"));
        assert!(report.contains("- Alan (last update"));
        assert!(report.contains("- Grace: Read chapter 4"));
        assert!(report.contains("- Ada [normal]: quiz 7.50, focus 62.25 min across 4 check-ins"));

        let locked_at = report.find("Alan [locked]").unwrap();
        let normal_at = report.find("Ada [normal]").unwrap();
        assert!(locked_at < normal_at);
    }

    #[test]
    fn empty_roster_still_renders_every_section() {
        let report = build_report(7, Utc::now(), &[]);
        assert!(report.contains("Nobody is waiting on a mentor."));
        assert!(report.contains("No remedial tasks in progress."));
        assert!(report.contains("No students enrolled."));
    }
}
