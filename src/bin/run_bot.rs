use log::info;
use std::env;
use std::time::Duration;
use tanzapp_backend::bot::api_client::ApiClient;
use tanzapp_backend::bot::session::SessionStore;
use tanzapp_backend::bot::Bot;
use tanzapp_backend::telegram::TelegramClient;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();
    dotenv::dotenv().ok();

    let api_base_url =
        env::var("API_BASE_URL").unwrap_or_else(|_| "http://127.0.0.1:8080".to_string());

    let telegram = TelegramClient::from_env().map_err(|e| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    let api = ApiClient::new(&api_base_url);

    // Verify API connection first
    api.verify_connection().await.map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::NotConnected,
            format!("Could not connect to API: {}", e),
        )
    })?;

    let session_ttl = env::var("SESSION_TTL_SECS")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(30 * 60);
    let sessions = SessionStore::new(Duration::from_secs(session_ttl));

    info!("Starting bot...");
    Bot::new(telegram, api, sessions).run().await;

    Ok(())
}
