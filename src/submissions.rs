use actix_web::{get, post, web, HttpResponse, Responder};
use log::error;
use serde::Deserialize;
use serde_json::json;

use crate::cascade::{self, error_response};
use crate::homeworks::require_role;
use crate::models::homework::{Status, Submission};
use crate::models::user::UserRole;
use crate::AppState;

#[derive(Debug, Deserialize)]
struct CreateSubmissionRequest {
    student_id: String,
    homework_task_id: String,
    content: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct SubmissionListQuery {
    status: Option<Status>,
    limit: Option<i64>,
    offset: Option<i64>,
}

const SUBMISSION_COLUMNS: &str =
    "id, homework_task_id, student_id, teacher_id, content, status, created_at";

#[post("/api/submissions")]
async fn create_submission(
    app_state: web::Data<AppState>,
    payload: web::Json<CreateSubmissionRequest>,
) -> impl Responder {
    match cascade::record_submission(
        &app_state.db,
        &payload.student_id,
        &payload.homework_task_id,
        payload.content.clone(),
    )
    .await
    {
        Ok(submission) => HttpResponse::Created().json(submission),
        Err(e) => error_response(&e),
    }
}

#[get("/api/submissions/homework/{homework_task_id}")]
async fn list_homework_submissions(
    app_state: web::Data<AppState>,
    homework_task_id: web::Path<String>,
    query: web::Query<SubmissionListQuery>,
) -> impl Responder {
    let mut query_builder = sqlx::QueryBuilder::new(format!(
        "SELECT {} FROM submissions WHERE homework_task_id = ",
        SUBMISSION_COLUMNS
    ));
    query_builder.push_bind(homework_task_id.as_str());

    finish_submission_listing(&app_state, query_builder, &query).await
}

/// Listing a teacher's submissions with `?status=pending` is how the
/// pending-feedback view is built.
#[get("/api/submissions/teacher/{teacher_id}")]
async fn list_teacher_submissions(
    app_state: web::Data<AppState>,
    teacher_id: web::Path<String>,
    query: web::Query<SubmissionListQuery>,
) -> impl Responder {
    if let Some(response) = require_role(&app_state, &teacher_id, UserRole::Teacher).await {
        return response;
    }

    let mut query_builder = sqlx::QueryBuilder::new(format!(
        "SELECT {} FROM submissions WHERE teacher_id = ",
        SUBMISSION_COLUMNS
    ));
    query_builder.push_bind(teacher_id.as_str());

    finish_submission_listing(&app_state, query_builder, &query).await
}

#[get("/api/submissions/student/{student_id}")]
async fn list_student_submissions(
    app_state: web::Data<AppState>,
    student_id: web::Path<String>,
    query: web::Query<SubmissionListQuery>,
) -> impl Responder {
    if let Some(response) = require_role(&app_state, &student_id, UserRole::Student).await {
        return response;
    }

    let mut query_builder = sqlx::QueryBuilder::new(format!(
        "SELECT {} FROM submissions WHERE student_id = ",
        SUBMISSION_COLUMNS
    ));
    query_builder.push_bind(student_id.as_str());

    finish_submission_listing(&app_state, query_builder, &query).await
}

#[get("/api/submissions/{submission_id}")]
async fn get_submission(
    app_state: web::Data<AppState>,
    submission_id: web::Path<String>,
) -> impl Responder {
    let query = format!(
        "SELECT {} FROM submissions WHERE id = $1",
        SUBMISSION_COLUMNS
    );
    match sqlx::query_as::<_, Submission>(&query)
        .bind(submission_id.as_str())
        .fetch_optional(&app_state.db)
        .await
    {
        Ok(Some(submission)) => HttpResponse::Ok().json(submission),
        Ok(None) => HttpResponse::NotFound().json(json!({
            "error": "Submission not found"
        })),
        Err(e) => {
            error!("Database error fetching submission: {}", e);
            HttpResponse::InternalServerError().json(json!({
                "error": "Failed to fetch submission"
            }))
        }
    }
}

async fn finish_submission_listing(
    app_state: &AppState,
    mut query_builder: sqlx::QueryBuilder<'_, sqlx::Postgres>,
    query: &SubmissionListQuery,
) -> HttpResponse {
    if let Some(status) = query.status {
        query_builder.push(" AND status = ");
        query_builder.push_bind(status);
    }

    query_builder.push(" ORDER BY created_at LIMIT ");
    query_builder.push_bind(query.limit.unwrap_or(100).min(100));
    query_builder.push(" OFFSET ");
    query_builder.push_bind(query.offset.unwrap_or(0));

    match query_builder
        .build_query_as::<Submission>()
        .fetch_all(&app_state.db)
        .await
    {
        Ok(submissions) => HttpResponse::Ok().json(submissions),
        Err(e) => {
            error!("Database error listing submissions: {}", e);
            HttpResponse::InternalServerError().json(json!({
                "error": "Failed to fetch submissions"
            }))
        }
    }
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(create_submission)
        .service(list_homework_submissions)
        .service(list_teacher_submissions)
        .service(list_student_submissions)
        .service(get_submission);
}
