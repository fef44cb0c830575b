use log::error;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use std::fmt;

use crate::models::homework::{Feedback, HomeworkTask, Status, Submission};
use crate::models::new_id;
use crate::models::user::{User, UserRole};
use crate::queue;

/// Failures of the three mutating operations. Validation and not-found
/// cases are raised before anything is written; `Database` covers
/// everything the store itself rejects, at which point the transaction
/// has already been rolled back.
#[derive(Debug)]
pub enum CascadeError {
    NotFound(&'static str),
    RoleMismatch(&'static str),
    Validation(String),
    Duplicate(&'static str),
    Database(sqlx::Error),
}

impl fmt::Display for CascadeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CascadeError::NotFound(what) => write!(f, "{}", what),
            CascadeError::RoleMismatch(what) => write!(f, "{}", what),
            CascadeError::Validation(what) => write!(f, "{}", what),
            CascadeError::Duplicate(what) => write!(f, "{}", what),
            CascadeError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for CascadeError {}

impl From<sqlx::Error> for CascadeError {
    fn from(e: sqlx::Error) -> Self {
        CascadeError::Database(e)
    }
}

fn map_insert_error(e: sqlx::Error, duplicate: &'static str) -> CascadeError {
    match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            CascadeError::Duplicate(duplicate)
        }
        _ => CascadeError::Database(e),
    }
}

async fn fetch_user(db: &PgPool, user_id: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "SELECT id, tg_handle, telegram_id, role, meta, created_at
         FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(db)
    .await
}

fn title_of(content: &JsonValue) -> &str {
    content
        .get("title")
        .and_then(|v| v.as_str())
        .unwrap_or("Untitled")
}

fn text_of(content: &JsonValue) -> &str {
    content.get("text").and_then(|v| v.as_str()).unwrap_or("")
}

/// True when every assigned student appears in the completed set.
pub(crate) fn all_students_completed(student_ids: &[String], completed: &[String]) -> bool {
    student_ids
        .iter()
        .all(|student_id| completed.contains(student_id))
}

/// Create a homework task for a set of students and queue one
/// `homework_assigned` event per student.
pub async fn assign_homework(
    db: &PgPool,
    teacher_id: &str,
    student_ids: &[String],
    content: JsonValue,
) -> Result<HomeworkTask, CascadeError> {
    let teacher = fetch_user(db, teacher_id).await?;
    let teacher = match teacher {
        Some(user) if user.role == UserRole::Teacher => user,
        _ => return Err(CascadeError::NotFound("Teacher not found")),
    };

    if student_ids.is_empty() {
        return Err(CascadeError::Validation(
            "Homework must be assigned to at least one student".to_string(),
        ));
    }

    let students = sqlx::query_as::<_, User>(
        "SELECT id, tg_handle, telegram_id, role, meta, created_at
         FROM users WHERE id = ANY($1) AND role = 'student'",
    )
    .bind(student_ids)
    .fetch_all(db)
    .await?;

    if students.len() != student_ids.len() {
        return Err(CascadeError::Validation(
            "One or more student ids are invalid".to_string(),
        ));
    }

    let task = sqlx::query_as::<_, HomeworkTask>(
        "INSERT INTO homework_tasks (id, teacher_id, student_ids, content)
         VALUES ($1, $2, $3, $4)
         RETURNING id, teacher_id, student_ids, content, status, created_at",
    )
    .bind(new_id("hw"))
    .bind(&teacher.id)
    .bind(student_ids)
    .bind(&content)
    .fetch_one(db)
    .await?;

    let title = title_of(&task.content);
    let description = task
        .content
        .get("description")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    for student in &students {
        queue::notify_homework_assigned(db, &student.telegram_id, title, description).await;
    }

    Ok(task)
}

/// Record a student's submission against a homework task and queue a
/// `submission_received` event for the task's teacher.
pub async fn record_submission(
    db: &PgPool,
    student_id: &str,
    homework_task_id: &str,
    content: JsonValue,
) -> Result<Submission, CascadeError> {
    let task = sqlx::query_as::<_, HomeworkTask>(
        "SELECT id, teacher_id, student_ids, content, status, created_at
         FROM homework_tasks WHERE id = $1",
    )
    .bind(homework_task_id)
    .fetch_optional(db)
    .await?
    .ok_or(CascadeError::NotFound("Homework task not found"))?;

    let student = match fetch_user(db, student_id).await? {
        None => return Err(CascadeError::NotFound("Student not found")),
        Some(user) if user.role != UserRole::Student => {
            return Err(CascadeError::RoleMismatch("User is not a student"))
        }
        Some(user) => user,
    };

    if !task.student_ids.iter().any(|id| id == &student.id) {
        return Err(CascadeError::Validation(
            "Student is not assigned to this homework task".to_string(),
        ));
    }

    let submission = sqlx::query_as::<_, Submission>(
        "INSERT INTO submissions (id, homework_task_id, student_id, teacher_id, content)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING id, homework_task_id, student_id, teacher_id, content, status, created_at",
    )
    .bind(new_id("sub"))
    .bind(&task.id)
    .bind(&student.id)
    .bind(&task.teacher_id)
    .bind(&content)
    .fetch_one(db)
    .await
    .map_err(|e| map_insert_error(e, "A submission for this homework already exists"))?;

    match fetch_user(db, &task.teacher_id).await {
        Ok(Some(teacher)) => {
            queue::notify_submission_received(
                db,
                &teacher.telegram_id,
                title_of(&task.content),
                &student.tg_handle,
                &submission.id,
                text_of(&submission.content),
            )
            .await;
        }
        Ok(None) => error!(
            "[cascade] teacher {} missing, submission event dropped",
            task.teacher_id
        ),
        Err(e) => error!(
            "[cascade] failed to resolve teacher {}: {}",
            task.teacher_id, e
        ),
    }

    Ok(submission)
}

/// Record feedback on a submission and run the status cascade: the
/// submission becomes completed, and the homework task becomes completed
/// once every assigned student has a completed submission.
///
/// The rescan is guarded by a `FOR UPDATE` lock on the homework row, so
/// concurrent feedback on the same task serializes and exactly one call
/// observes the all-complete state.
pub async fn record_feedback(
    db: &PgPool,
    teacher_id: &str,
    submission_id: &str,
    student_id: &str,
    content: JsonValue,
) -> Result<Feedback, CascadeError> {
    let teacher = match fetch_user(db, teacher_id).await? {
        Some(user) if user.role == UserRole::Teacher => user,
        _ => return Err(CascadeError::NotFound("Teacher not found")),
    };

    let submission = sqlx::query_as::<_, Submission>(
        "SELECT id, homework_task_id, student_id, teacher_id, content, status, created_at
         FROM submissions WHERE id = $1",
    )
    .bind(submission_id)
    .fetch_optional(db)
    .await?
    .ok_or(CascadeError::NotFound("Submission not found"))?;

    if student_id != submission.student_id {
        return Err(CascadeError::Validation(
            "Student id does not match the submission's student".to_string(),
        ));
    }

    if teacher.id != submission.teacher_id {
        return Err(CascadeError::Validation(
            "Teacher id does not match the submission's teacher".to_string(),
        ));
    }

    let mut tx = db.begin().await?;

    // Serializes the cascade per task: concurrent feedback for other
    // students of the same task waits here until this one commits.
    let task = sqlx::query_as::<_, HomeworkTask>(
        "SELECT id, teacher_id, student_ids, content, status, created_at
         FROM homework_tasks WHERE id = $1 FOR UPDATE",
    )
    .bind(&submission.homework_task_id)
    .fetch_one(&mut *tx)
    .await?;

    let already_reviewed: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM feedbacks WHERE submission_id = $1)")
            .bind(&submission.id)
            .fetch_one(&mut *tx)
            .await?;

    if already_reviewed {
        return Err(CascadeError::Duplicate(
            "Feedback already exists for this submission",
        ));
    }

    let feedback = sqlx::query_as::<_, Feedback>(
        "INSERT INTO feedbacks (id, submission_id, student_id, teacher_id, content)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING id, submission_id, student_id, teacher_id, content, status, created_at",
    )
    .bind(new_id("fb"))
    .bind(&submission.id)
    .bind(&submission.student_id)
    .bind(&submission.teacher_id)
    .bind(&content)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| map_insert_error(e, "Feedback already exists for this submission"))?;

    sqlx::query("UPDATE submissions SET status = 'completed' WHERE id = $1")
        .bind(&submission.id)
        .execute(&mut *tx)
        .await?;

    let completed: Vec<String> = sqlx::query_scalar(
        "SELECT student_id FROM submissions
         WHERE homework_task_id = $1 AND status = 'completed'",
    )
    .bind(&task.id)
    .fetch_all(&mut *tx)
    .await?;

    if task.status == Status::Pending && all_students_completed(&task.student_ids, &completed) {
        sqlx::query("UPDATE homework_tasks SET status = 'completed' WHERE id = $1")
            .bind(&task.id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    match fetch_user(db, &submission.student_id).await {
        Ok(Some(student)) => {
            queue::notify_feedback_provided(
                db,
                &student.telegram_id,
                title_of(&task.content),
                &feedback.id,
                text_of(&feedback.content),
                &teacher.tg_handle,
            )
            .await;
        }
        Ok(None) => error!(
            "[cascade] student {} missing, feedback event dropped",
            submission.student_id
        ),
        Err(e) => error!(
            "[cascade] failed to resolve student {}: {}",
            submission.student_id, e
        ),
    }

    Ok(feedback)
}

/// Translate a cascade failure into the API's JSON error response.
pub fn error_response(err: &CascadeError) -> actix_web::HttpResponse {
    use actix_web::HttpResponse;
    use serde_json::json;

    match err {
        CascadeError::NotFound(_) => HttpResponse::NotFound().json(json!({
            "error": err.to_string()
        })),
        CascadeError::RoleMismatch(_) => HttpResponse::Forbidden().json(json!({
            "error": err.to_string()
        })),
        CascadeError::Validation(_) => HttpResponse::BadRequest().json(json!({
            "error": err.to_string()
        })),
        CascadeError::Duplicate(_) => HttpResponse::Conflict().json(json!({
            "error": err.to_string()
        })),
        CascadeError::Database(e) => {
            error!("[cascade] database error: {}", e);
            HttpResponse::InternalServerError().json(json!({
                "error": "Internal server error"
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn completion_requires_every_student() {
        let students = ids(&["usr_a", "usr_b"]);
        assert!(!all_students_completed(&students, &ids(&["usr_a"])));
        assert!(all_students_completed(&students, &ids(&["usr_b", "usr_a"])));
    }

    #[test]
    fn extra_completed_submissions_do_not_matter() {
        let students = ids(&["usr_a"]);
        assert!(all_students_completed(
            &students,
            &ids(&["usr_a", "usr_zombie"])
        ));
    }

    #[test]
    fn title_falls_back_when_missing() {
        assert_eq!(title_of(&serde_json::json!({})), "Untitled");
        assert_eq!(
            title_of(&serde_json::json!({"title": "Waltz"})),
            "Waltz"
        );
    }
}
