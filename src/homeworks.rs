use actix_web::{get, patch, post, web, HttpResponse, Responder};
use log::error;
use serde::Deserialize;
use serde_json::json;

use crate::cascade::{self, error_response};
use crate::models::homework::{status_may_advance, HomeworkTask, Status};
use crate::models::user::{User, UserRole};
use crate::AppState;

#[derive(Debug, Deserialize)]
struct AssignHomeworkRequest {
    teacher_id: String,
    student_ids: Vec<String>,
    content: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct HomeworkListQuery {
    status: Option<Status>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct UpdateStatusRequest {
    status: Status,
}

const TASK_COLUMNS: &str = "id, teacher_id, student_ids, content, status, created_at";

#[post("/api/homework/assign")]
async fn assign_homework(
    app_state: web::Data<AppState>,
    payload: web::Json<AssignHomeworkRequest>,
) -> impl Responder {
    match cascade::assign_homework(
        &app_state.db,
        &payload.teacher_id,
        &payload.student_ids,
        payload.content.clone(),
    )
    .await
    {
        Ok(task) => HttpResponse::Created().json(task),
        Err(e) => error_response(&e),
    }
}

#[get("/api/homework/student/{student_id}")]
async fn list_student_homework(
    app_state: web::Data<AppState>,
    student_id: web::Path<String>,
    query: web::Query<HomeworkListQuery>,
) -> impl Responder {
    if let Some(response) = require_role(&app_state, &student_id, UserRole::Student).await {
        return response;
    }

    let mut query_builder = sqlx::QueryBuilder::new(format!(
        "SELECT {} FROM homework_tasks WHERE ",
        TASK_COLUMNS
    ));
    query_builder.push_bind(student_id.as_str());
    query_builder.push(" = ANY(student_ids)");

    finish_task_listing(&app_state, query_builder, &query).await
}

#[get("/api/homework/teacher/{teacher_id}")]
async fn list_teacher_homework(
    app_state: web::Data<AppState>,
    teacher_id: web::Path<String>,
    query: web::Query<HomeworkListQuery>,
) -> impl Responder {
    if let Some(response) = require_role(&app_state, &teacher_id, UserRole::Teacher).await {
        return response;
    }

    let mut query_builder = sqlx::QueryBuilder::new(format!(
        "SELECT {} FROM homework_tasks WHERE teacher_id = ",
        TASK_COLUMNS
    ));
    query_builder.push_bind(teacher_id.as_str());

    finish_task_listing(&app_state, query_builder, &query).await
}

#[get("/api/homework/{homework_id}")]
async fn get_homework(
    app_state: web::Data<AppState>,
    homework_id: web::Path<String>,
) -> impl Responder {
    let query = format!("SELECT {} FROM homework_tasks WHERE id = $1", TASK_COLUMNS);
    match sqlx::query_as::<_, HomeworkTask>(&query)
        .bind(homework_id.as_str())
        .fetch_optional(&app_state.db)
        .await
    {
        Ok(Some(task)) => HttpResponse::Ok().json(task),
        Ok(None) => HttpResponse::NotFound().json(json!({
            "error": "Homework task not found"
        })),
        Err(e) => {
            error!("Database error fetching homework: {}", e);
            HttpResponse::InternalServerError().json(json!({
                "error": "Failed to fetch homework"
            }))
        }
    }
}

/// Manual status override. Statuses only ever advance; anything else is
/// rejected before touching the row.
#[patch("/api/homework/{homework_id}/status")]
async fn update_homework_status(
    app_state: web::Data<AppState>,
    homework_id: web::Path<String>,
    payload: web::Json<UpdateStatusRequest>,
) -> impl Responder {
    let query = format!("SELECT {} FROM homework_tasks WHERE id = $1", TASK_COLUMNS);
    let task = match sqlx::query_as::<_, HomeworkTask>(&query)
        .bind(homework_id.as_str())
        .fetch_optional(&app_state.db)
        .await
    {
        Ok(Some(task)) => task,
        Ok(None) => {
            return HttpResponse::NotFound().json(json!({
                "error": "Homework task not found"
            }))
        }
        Err(e) => {
            error!("Database error fetching homework: {}", e);
            return HttpResponse::InternalServerError().json(json!({
                "error": "Failed to fetch homework"
            }));
        }
    };

    if !status_may_advance(task.status, payload.status) {
        return HttpResponse::BadRequest().json(json!({
            "error": "Homework status can only advance"
        }));
    }

    let query = format!(
        "UPDATE homework_tasks SET status = $1 WHERE id = $2 RETURNING {}",
        TASK_COLUMNS
    );
    match sqlx::query_as::<_, HomeworkTask>(&query)
        .bind(payload.status)
        .bind(homework_id.as_str())
        .fetch_one(&app_state.db)
        .await
    {
        Ok(task) => HttpResponse::Ok().json(task),
        Err(e) => {
            error!("Database error updating homework status: {}", e);
            HttpResponse::InternalServerError().json(json!({
                "error": "Failed to update homework status"
            }))
        }
    }
}

/// Returns the error response when `user_id` does not resolve to a user
/// with the expected role, `None` when the check passes.
pub(crate) async fn require_role(
    app_state: &AppState,
    user_id: &str,
    role: UserRole,
) -> Option<HttpResponse> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, tg_handle, telegram_id, role, meta, created_at FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(&app_state.db)
    .await;

    let missing = match role {
        UserRole::Student => "Student not found",
        UserRole::Teacher => "Teacher not found",
    };

    match user {
        Ok(Some(user)) if user.role == role => None,
        Ok(_) => Some(HttpResponse::NotFound().json(json!({
            "error": missing
        }))),
        Err(e) => {
            error!("Database error verifying user role: {}", e);
            Some(HttpResponse::InternalServerError().json(json!({
                "error": "Failed to verify user"
            })))
        }
    }
}

async fn finish_task_listing(
    app_state: &AppState,
    mut query_builder: sqlx::QueryBuilder<'_, sqlx::Postgres>,
    query: &HomeworkListQuery,
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
        .build_query_as::<HomeworkTask>()
        .fetch_all(&app_state.db)
        .await
    {
        Ok(tasks) => HttpResponse::Ok().json(tasks),
        Err(e) => {
            error!("Database error listing homework: {}", e);
            HttpResponse::InternalServerError().json(json!({
                "error": "Failed to fetch homework"
            }))
        }
    }
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(assign_homework)
        .service(list_student_homework)
        .service(list_teacher_homework)
        .service(update_homework_status)
        .service(get_homework);
}
