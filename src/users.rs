use actix_web::{get, post, web, HttpResponse, Responder};
use log::error;
use serde::Deserialize;
use serde_json::json;

use crate::models::new_id;
use crate::models::user::{User, UserRole};
use crate::AppState;

#[derive(Debug, Deserialize)]
struct CreateUserRequest {
    tg_handle: String,
    telegram_id: String,
    role: UserRole,
    meta: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct UserListQuery {
    role: Option<UserRole>,
    limit: Option<i64>,
    offset: Option<i64>,
}

const USER_COLUMNS: &str = "id, tg_handle, telegram_id, role, meta, created_at";

#[post("/api/users")]
async fn create_user(
    app_state: web::Data<AppState>,
    payload: web::Json<CreateUserRequest>,
) -> impl Responder {
    if payload.tg_handle.trim().is_empty() {
        return HttpResponse::BadRequest().json(json!({
            "error": "Cannot have an empty telegram handle for user"
        }));
    }

    if payload.telegram_id.trim().is_empty() {
        return HttpResponse::BadRequest().json(json!({
            "error": "Cannot have an empty telegram id for user"
        }));
    }

    let meta = payload.meta.clone().unwrap_or_else(|| json!({}));

    let result = sqlx::query_as::<_, User>(
        "INSERT INTO users (id, tg_handle, telegram_id, role, meta)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING id, tg_handle, telegram_id, role, meta, created_at",
    )
    .bind(new_id("usr"))
    .bind(payload.tg_handle.trim())
    .bind(payload.telegram_id.trim())
    .bind(payload.role)
    .bind(meta)
    .fetch_one(&app_state.db)
    .await;

    match result {
        Ok(user) => HttpResponse::Created().json(user),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            HttpResponse::Conflict().json(json!({
                "error": "User with this telegram handle or id already exists"
            }))
        }
        Err(e) => {
            error!("Database error creating user: {}", e);
            HttpResponse::InternalServerError().json(json!({
                "error": "Failed to create user"
            }))
        }
    }
}

#[get("/api/users/by_telegram_id/{telegram_id}")]
async fn get_user_by_telegram_id(
    app_state: web::Data<AppState>,
    telegram_id: web::Path<String>,
) -> impl Responder {
    let query = format!("SELECT {} FROM users WHERE telegram_id = $1", USER_COLUMNS);
    fetch_single_user(&app_state, &query, &telegram_id).await
}

#[get("/api/users/by_telegram_handle/{tg_handle}")]
async fn get_user_by_telegram_handle(
    app_state: web::Data<AppState>,
    tg_handle: web::Path<String>,
) -> impl Responder {
    let query = format!("SELECT {} FROM users WHERE tg_handle = $1", USER_COLUMNS);
    fetch_single_user(&app_state, &query, &tg_handle).await
}

#[get("/api/users/students")]
async fn list_students(app_state: web::Data<AppState>) -> impl Responder {
    list_by_role(&app_state, UserRole::Student).await
}

#[get("/api/users/teachers")]
async fn list_teachers(app_state: web::Data<AppState>) -> impl Responder {
    list_by_role(&app_state, UserRole::Teacher).await
}

#[get("/api/users/{user_id}")]
async fn get_user(app_state: web::Data<AppState>, user_id: web::Path<String>) -> impl Responder {
    let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
    fetch_single_user(&app_state, &query, &user_id).await
}

#[get("/api/users")]
async fn list_users(
    app_state: web::Data<AppState>,
    query: web::Query<UserListQuery>,
) -> impl Responder {
    let limit = query.limit.unwrap_or(100).min(100);
    let offset = query.offset.unwrap_or(0);

    let mut query_builder =
        sqlx::QueryBuilder::new(format!("SELECT {} FROM users WHERE TRUE", USER_COLUMNS));

    if let Some(role) = query.role {
        query_builder.push(" AND role = ");
        query_builder.push_bind(role);
    }

    query_builder.push(" ORDER BY created_at LIMIT ");
    query_builder.push_bind(limit);
    query_builder.push(" OFFSET ");
    query_builder.push_bind(offset);

    match query_builder
        .build_query_as::<User>()
        .fetch_all(&app_state.db)
        .await
    {
        Ok(users) => HttpResponse::Ok().json(users),
        Err(e) => {
            error!("Database error listing users: {}", e);
            HttpResponse::InternalServerError().json(json!({
                "error": "Failed to fetch users"
            }))
        }
    }
}

async fn fetch_single_user(app_state: &AppState, query: &str, value: &str) -> HttpResponse {
    match sqlx::query_as::<_, User>(query)
        .bind(value)
        .fetch_optional(&app_state.db)
        .await
    {
        Ok(Some(user)) => HttpResponse::Ok().json(user),
        Ok(None) => HttpResponse::NotFound().json(json!({
            "error": "User not found"
        })),
        Err(e) => {
            error!("Database error fetching user: {}", e);
            HttpResponse::InternalServerError().json(json!({
                "error": "Failed to fetch user"
            }))
        }
    }
}

async fn list_by_role(app_state: &AppState, role: UserRole) -> HttpResponse {
    let query = format!(
        "SELECT {} FROM users WHERE role = $1 ORDER BY created_at",
        USER_COLUMNS
    );
    match sqlx::query_as::<_, User>(&query)
        .bind(role)
        .fetch_all(&app_state.db)
        .await
    {
        Ok(users) => HttpResponse::Ok().json(users),
        Err(e) => {
            error!("Database error listing users by role: {}", e);
            HttpResponse::InternalServerError().json(json!({
                "error": "Failed to fetch users"
            }))
        }
    }
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(create_user)
        .service(get_user_by_telegram_id)
        .service(get_user_by_telegram_handle)
        .service(list_students)
        .service(list_teachers)
        .service(get_user)
        .service(list_users);
}
