pub mod bot;
pub mod cascade;
pub mod consumer;
pub mod events;
pub mod feedback;
pub mod homeworks;
pub mod message_builders;
pub mod models;
pub mod queue;
pub mod submissions;
pub mod telegram;
pub mod users;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpResponse};
use log::error;
use sqlx::postgres::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
}

pub fn create_app(app_state: web::Data<AppState>) -> App<
    impl actix_web::dev::ServiceFactory<
        actix_web::dev::ServiceRequest,
        Config = (),
        Response = actix_web::dev::ServiceResponse<impl actix_web::body::MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    App::new()
        .app_data(app_state)
        .wrap(
            Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .max_age(3600),
        )
        .wrap(middleware::Logger::default())
        .configure(users::init_routes)
        .configure(homeworks::init_routes)
        .configure(submissions::init_routes)
        .configure(feedback::init_routes)
        .route("/health", web::get().to(health_check))
        .route("/", web::get().to(index))
}

async fn index() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "message": "Welcome to the TanzApp homework API",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub async fn init_db(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPool::connect(database_url).await?;

    // Run migrations
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

async fn health_check(app_state: web::Data<AppState>) -> HttpResponse {
    match sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&app_state.db)
        .await
    {
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({
            "status": "healthy",
            "database": "connected"
        })),
        Err(e) => {
            error!("Health check failed: {}", e);
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "error": "Service unhealthy"
            }))
        }
    }
}
