use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "status", rename_all = "snake_case")]
pub enum Status {
    Pending,
    Completed,
    Cancelled,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Completed => "completed",
            Status::Cancelled => "cancelled",
        }
    }
}

/// Statuses never regress: pending may advance to completed or
/// cancelled, terminal statuses stay where they are.
pub fn status_may_advance(from: Status, to: Status) -> bool {
    match from {
        Status::Pending => matches!(to, Status::Completed | Status::Cancelled),
        Status::Completed | Status::Cancelled => false,
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, FromRow)]
pub struct HomeworkTask {
    pub id: String,
    pub teacher_id: String,
    pub student_ids: Vec<String>,
    pub content: serde_json::Value,
    pub status: Status,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, FromRow)]
pub struct Submission {
    pub id: String,
    pub homework_task_id: String,
    pub student_id: String,
    pub teacher_id: String,
    pub content: serde_json::Value,
    pub status: Status,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, FromRow)]
pub struct Feedback {
    pub id: String,
    pub submission_id: String,
    pub student_id: String,
    pub teacher_id: String,
    pub content: serde_json::Value,
    pub status: Status,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_advances_to_terminal_statuses() {
        assert!(status_may_advance(Status::Pending, Status::Completed));
        assert!(status_may_advance(Status::Pending, Status::Cancelled));
    }

    #[test]
    fn terminal_statuses_never_regress() {
        assert!(!status_may_advance(Status::Completed, Status::Pending));
        assert!(!status_may_advance(Status::Completed, Status::Cancelled));
        assert!(!status_may_advance(Status::Cancelled, Status::Pending));
        assert!(!status_may_advance(Status::Cancelled, Status::Completed));
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Status::Pending).unwrap(),
            "\"pending\""
        );
        assert_eq!(
            serde_json::from_str::<Status>("\"cancelled\"").unwrap(),
            Status::Cancelled
        );
    }
}
