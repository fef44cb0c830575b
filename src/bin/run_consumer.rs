use log::info;
use std::env;
use tanzapp_backend::consumer::{Consumer, ConsumerConfig};
use tanzapp_backend::init_db;
use tanzapp_backend::telegram::TelegramClient;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();
    dotenv::dotenv().ok();

    let database_url = env::var("DATABASE_URL").map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "DATABASE_URL environment variable is required",
        )
    })?;

    let db_pool = init_db(&database_url).await.map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("Failed to initialize database: {}", e),
        )
    })?;

    let telegram = TelegramClient::from_env().map_err(|e| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    let config = ConsumerConfig::from_env();

    info!("Starting consumer...");
    Consumer::new(db_pool, telegram, config).run().await;

    Ok(())
}
