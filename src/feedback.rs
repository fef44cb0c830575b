use actix_web::{get, post, web, HttpResponse, Responder};
use log::error;
use serde::Deserialize;
use serde_json::json;

use crate::cascade::{self, error_response};
use crate::homeworks::require_role;
use crate::models::homework::Feedback;
use crate::models::user::UserRole;
use crate::AppState;

#[derive(Debug, Deserialize)]
struct CreateFeedbackRequest {
    teacher_id: String,
    submission_id: String,
    student_id: String,
    content: serde_json::Value,
}

const FEEDBACK_COLUMNS: &str =
    "id, submission_id, student_id, teacher_id, content, status, created_at";

#[post("/api/feedback")]
async fn create_feedback(
    app_state: web::Data<AppState>,
    payload: web::Json<CreateFeedbackRequest>,
) -> impl Responder {
    match cascade::record_feedback(
        &app_state.db,
        &payload.teacher_id,
        &payload.submission_id,
        &payload.student_id,
        payload.content.clone(),
    )
    .await
    {
        Ok(feedback) => HttpResponse::Created().json(feedback),
        Err(e) => error_response(&e),
    }
}

#[get("/api/feedback/submission/{submission_id}")]
async fn list_submission_feedback(
    app_state: web::Data<AppState>,
    submission_id: web::Path<String>,
) -> impl Responder {
    let exists: Result<bool, sqlx::Error> =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM submissions WHERE id = $1)")
            .bind(submission_id.as_str())
            .fetch_one(&app_state.db)
            .await;

    match exists {
        Ok(false) => {
            return HttpResponse::NotFound().json(json!({
                "error": "Submission not found"
            }))
        }
        Err(e) => {
            error!("Database error checking submission: {}", e);
            return HttpResponse::InternalServerError().json(json!({
                "error": "Failed to fetch feedback"
            }));
        }
        Ok(true) => {}
    }

    let query = format!(
        "SELECT {} FROM feedbacks WHERE submission_id = $1 ORDER BY created_at",
        FEEDBACK_COLUMNS
    );
    match sqlx::query_as::<_, Feedback>(&query)
        .bind(submission_id.as_str())
        .fetch_all(&app_state.db)
        .await
    {
        Ok(feedback) => HttpResponse::Ok().json(feedback),
        Err(e) => {
            error!("Database error listing feedback: {}", e);
            HttpResponse::InternalServerError().json(json!({
                "error": "Failed to fetch feedback"
            }))
        }
    }
}

#[get("/api/feedback/student/{student_id}")]
async fn list_student_feedback(
    app_state: web::Data<AppState>,
    student_id: web::Path<String>,
) -> impl Responder {
    if let Some(response) = require_role(&app_state, &student_id, UserRole::Student).await {
        return response;
    }

    let query = format!(
        "SELECT {} FROM feedbacks WHERE student_id = $1 ORDER BY created_at",
        FEEDBACK_COLUMNS
    );
    match sqlx::query_as::<_, Feedback>(&query)
        .bind(student_id.as_str())
        .fetch_all(&app_state.db)
        .await
    {
        Ok(feedback) => HttpResponse::Ok().json(feedback),
        Err(e) => {
            error!("Database error listing student feedback: {}", e);
            HttpResponse::InternalServerError().json(json!({
                "error": "Failed to fetch feedback"
            }))
        }
    }
}

#[get("/api/feedback/{feedback_id}")]
async fn get_feedback(
    app_state: web::Data<AppState>,
    feedback_id: web::Path<String>,
) -> impl Responder {
    let query = format!("SELECT {} FROM feedbacks WHERE id = $1", FEEDBACK_COLUMNS);
    match sqlx::query_as::<_, Feedback>(&query)
        .bind(feedback_id.as_str())
        .fetch_optional(&app_state.db)
        .await
    {
        Ok(Some(feedback)) => HttpResponse::Ok().json(feedback),
        Ok(None) => HttpResponse::NotFound().json(json!({
            "error": "Feedback not found"
        })),
        Err(e) => {
            error!("Database error fetching feedback: {}", e);
            HttpResponse::InternalServerError().json(json!({
                "error": "Failed to fetch feedback"
            }))
        }
    }
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(create_feedback)
        .service(list_submission_feedback)
        .service(list_student_feedback)
        .service(get_feedback);
}
