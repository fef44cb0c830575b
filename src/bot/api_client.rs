use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::fmt;
use std::time::Duration;

use crate::models::homework::{Feedback, HomeworkTask, Status, Submission};
use crate::models::user::{User, UserRole};

#[derive(Debug)]
pub enum ApiError {
    Request(reqwest::Error),
    Status { status: u16, message: String },
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Request(e) => write!(f, "API request failed: {}", e),
            ApiError::Status { status, message } => write!(f, "API error {}: {}", status, message),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Request(e)
    }
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Status { status: 404, .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ApiError::Status { status: 409, .. })
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// The bot's view of the HTTP API. The conversation engine never talks
/// to the store directly; everything goes through here.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Wait for the API to come up, with doubling delays between
    /// attempts. The bot refuses to start without a reachable API.
    pub async fn verify_connection(&self) -> Result<(), ApiError> {
        let max_attempts = 5;
        let mut delay = Duration::from_secs(1);

        let mut attempt = 1;
        loop {
            match self.check_health().await {
                Ok(()) => {
                    info!("[api] successfully connected to API");
                    return Ok(());
                }
                Err(e) if attempt < max_attempts => {
                    warn!(
                        "[api] connection attempt {} failed ({}), retrying in {:?}...",
                        attempt, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn check_health(&self) -> Result<(), ApiError> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        Self::decode::<JsonValue>(response).await?;
        Ok(())
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .map(|body| body.error)
                .unwrap_or_else(|_| status.to_string());
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json::<T>().await?)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> Result<T, ApiError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await?;
        Self::decode(response).await
    }

    fn status_suffix(status: Option<Status>) -> String {
        match status {
            Some(status) => format!("?status={}", status.as_str()),
            None => String::new(),
        }
    }

    pub async fn get_user_by_telegram_id(&self, telegram_id: &str) -> Result<User, ApiError> {
        self.get_json(&format!("/api/users/by_telegram_id/{}", telegram_id))
            .await
    }

    pub async fn create_user(
        &self,
        tg_handle: &str,
        telegram_id: &str,
        role: UserRole,
    ) -> Result<User, ApiError> {
        self.post_json(
            "/api/users",
            &json!({
                "tg_handle": tg_handle,
                "telegram_id": telegram_id,
                "role": role,
            }),
        )
        .await
    }

    pub async fn list_students(&self) -> Result<Vec<User>, ApiError> {
        self.get_json("/api/users/students").await
    }

    pub async fn get_user(&self, user_id: &str) -> Result<User, ApiError> {
        self.get_json(&format!("/api/users/{}", user_id)).await
    }

    pub async fn assign_homework(
        &self,
        teacher_id: &str,
        student_ids: &[String],
        content: JsonValue,
    ) -> Result<HomeworkTask, ApiError> {
        self.post_json(
            "/api/homework/assign",
            &json!({
                "teacher_id": teacher_id,
                "student_ids": student_ids,
                "content": content,
            }),
        )
        .await
    }

    pub async fn get_homework(&self, homework_id: &str) -> Result<HomeworkTask, ApiError> {
        self.get_json(&format!("/api/homework/{}", homework_id)).await
    }

    pub async fn student_homework(
        &self,
        student_id: &str,
        status: Option<Status>,
    ) -> Result<Vec<HomeworkTask>, ApiError> {
        self.get_json(&format!(
            "/api/homework/student/{}{}",
            student_id,
            Self::status_suffix(status)
        ))
        .await
    }

    pub async fn create_submission(
        &self,
        student_id: &str,
        homework_task_id: &str,
        content: JsonValue,
    ) -> Result<Submission, ApiError> {
        self.post_json(
            "/api/submissions",
            &json!({
                "student_id": student_id,
                "homework_task_id": homework_task_id,
                "content": content,
            }),
        )
        .await
    }

    pub async fn get_submission(&self, submission_id: &str) -> Result<Submission, ApiError> {
        self.get_json(&format!("/api/submissions/{}", submission_id))
            .await
    }

    pub async fn student_submissions(&self, student_id: &str) -> Result<Vec<Submission>, ApiError> {
        self.get_json(&format!("/api/submissions/student/{}", student_id))
            .await
    }

    pub async fn teacher_submissions(
        &self,
        teacher_id: &str,
        status: Option<Status>,
    ) -> Result<Vec<Submission>, ApiError> {
        self.get_json(&format!(
            "/api/submissions/teacher/{}{}",
            teacher_id,
            Self::status_suffix(status)
        ))
        .await
    }

    pub async fn create_feedback(
        &self,
        teacher_id: &str,
        submission_id: &str,
        student_id: &str,
        content: JsonValue,
    ) -> Result<Feedback, ApiError> {
        self.post_json(
            "/api/feedback",
            &json!({
                "teacher_id": teacher_id,
                "submission_id": submission_id,
                "student_id": student_id,
                "content": content,
            }),
        )
        .await
    }

    pub async fn student_feedback(&self, student_id: &str) -> Result<Vec<Feedback>, ApiError> {
        self.get_json(&format!("/api/feedback/student/{}", student_id))
            .await
    }
}
