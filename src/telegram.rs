use async_trait::async_trait;
use log::{debug, error, warn};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;

/// A delivery failure, split by whether retrying can possibly help.
/// Rate limits, timeouts and server errors are transient; a blocked bot
/// or an unknown chat will not fix itself.
#[derive(Debug)]
pub enum DeliveryError {
    Transient(String),
    Permanent(String),
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryError::Transient(s) => write!(f, "Transient delivery failure: {}", s),
            DeliveryError::Permanent(s) => write!(f, "Permanent delivery failure: {}", s),
        }
    }
}

impl std::error::Error for DeliveryError {}

#[derive(Debug)]
pub enum ConfigError {
    MissingVar(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingVar(name) => write!(f, "{} not set", name),
        }
    }
}

impl std::error::Error for ConfigError {}

/// The chat-platform delivery seam. The consumer only ever needs this;
/// the full client below adds the interactive surface the bot uses.
#[async_trait]
pub trait ChatSender: Send + Sync {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), DeliveryError>;
}

#[derive(Serialize, Debug, Clone)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineKeyboardButton {
    pub fn new(text: &str, callback_data: &str) -> Self {
        Self {
            text: text.to_string(),
            callback_data: callback_data.to_string(),
        }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

impl InlineKeyboardMarkup {
    /// One button per row, the layout every flow here uses.
    pub fn rows(buttons: Vec<InlineKeyboardButton>) -> Self {
        Self {
            inline_keyboard: buttons.into_iter().map(|b| vec![b]).collect(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct TgUser {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TgChat {
    pub id: i64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TgMessage {
    pub message_id: i64,
    pub from: Option<TgUser>,
    pub chat: TgChat,
    pub text: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CallbackQuery {
    pub id: String,
    pub from: TgUser,
    pub message: Option<TgMessage>,
    pub data: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<TgMessage>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Deserialize, Debug)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Serialize)]
struct SendMessagePayload<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a InlineKeyboardMarkup>,
}

#[derive(Serialize)]
struct GetUpdatesPayload {
    offset: i64,
    timeout: u64,
    allowed_updates: Vec<&'static str>,
}

#[derive(Serialize)]
struct AnswerCallbackPayload<'a> {
    callback_query_id: &'a str,
}

/// Telegram Bot API client over reqwest.
#[derive(Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: format!("https://api.telegram.org/bot{}", token),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let token = env::var("TELEGRAM_BOT_TOKEN")
            .map_err(|_| ConfigError::MissingVar("TELEGRAM_BOT_TOKEN"))?;
        Ok(Self::new(&token))
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        payload: &impl Serialize,
    ) -> Result<T, DeliveryError> {
        let url = format!("{}/{}", self.base_url, method);
        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| DeliveryError::Transient(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_send_failure(status, &body));
        }

        let body = response
            .json::<ApiResponse<T>>()
            .await
            .map_err(|e| DeliveryError::Transient(format!("invalid response: {}", e)))?;

        if !body.ok {
            let description = body.description.unwrap_or_else(|| "unknown error".to_string());
            return Err(DeliveryError::Permanent(description));
        }

        body.result
            .ok_or_else(|| DeliveryError::Permanent("empty result".to_string()))
    }

    pub async fn send_message_with_keyboard(
        &self,
        chat_id: &str,
        text: &str,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> Result<(), DeliveryError> {
        debug!("[telegram] sendMessage to chat {}", chat_id);
        let payload = SendMessagePayload {
            chat_id,
            text,
            reply_markup: keyboard,
        };
        self.call::<TgMessage>("sendMessage", &payload).await?;
        Ok(())
    }

    /// Long-poll for updates. `timeout` is the Telegram-side hold, in
    /// seconds; the call blocks up to that long when nothing is queued.
    pub async fn get_updates(&self, offset: i64, timeout: u64) -> Result<Vec<Update>, DeliveryError> {
        let payload = GetUpdatesPayload {
            offset,
            timeout,
            allowed_updates: vec!["message", "callback_query"],
        };
        self.call::<Vec<Update>>("getUpdates", &payload).await
    }

    /// Clears the client-side loading state on a tapped inline button.
    pub async fn answer_callback_query(&self, callback_query_id: &str) {
        let payload = AnswerCallbackPayload { callback_query_id };
        if let Err(e) = self.call::<bool>("answerCallbackQuery", &payload).await {
            warn!("[telegram] answerCallbackQuery failed: {}", e);
        }
    }
}

#[async_trait]
impl ChatSender for TelegramClient {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), DeliveryError> {
        match self.send_message_with_keyboard(chat_id, text, None).await {
            Ok(()) => {
                debug!("[telegram] delivered to chat {}", chat_id);
                Ok(())
            }
            Err(e) => {
                error!("[telegram] delivery to chat {} failed: {}", chat_id, e);
                Err(e)
            }
        }
    }
}

/// HTTP status → retry classification. 429 and server errors are worth
/// retrying; 403 (bot blocked) and 400 (chat not found) are not.
fn classify_send_failure(status: StatusCode, body: &str) -> DeliveryError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        DeliveryError::Transient(format!("{}: {}", status, body))
    } else {
        DeliveryError::Permanent(format!("{}: {}", status, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_is_transient() {
        let err = classify_send_failure(StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(matches!(err, DeliveryError::Transient(_)));
    }

    #[test]
    fn server_errors_are_transient() {
        let err = classify_send_failure(StatusCode::BAD_GATEWAY, "upstream");
        assert!(matches!(err, DeliveryError::Transient(_)));
    }

    #[test]
    fn blocked_bot_is_permanent() {
        let err = classify_send_failure(StatusCode::FORBIDDEN, "bot was blocked by the user");
        assert!(matches!(err, DeliveryError::Permanent(_)));
    }

    #[test]
    fn unknown_chat_is_permanent() {
        let err = classify_send_failure(StatusCode::BAD_REQUEST, "chat not found");
        assert!(matches!(err, DeliveryError::Permanent(_)));
    }

    #[test]
    fn keyboard_lays_buttons_out_one_per_row() {
        let markup = InlineKeyboardMarkup::rows(vec![
            InlineKeyboardButton::new("Anna", "usr_1"),
            InlineKeyboardButton::new("Done", "done"),
        ]);
        assert_eq!(markup.inline_keyboard.len(), 2);
        assert_eq!(markup.inline_keyboard[1][0].callback_data, "done");
    }
}
