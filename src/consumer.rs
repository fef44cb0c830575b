use log::{error, info, warn};
use sqlx::PgPool;
use std::env;
use std::time::Duration;

use crate::events::NotificationEvent;
use crate::message_builders::render_event;
use crate::queue::{self, QueuedEvent};
use crate::telegram::{ChatSender, DeliveryError};

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub max_attempts: i32,
    pub poll_interval: Duration,
    pub retry_backoff: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            poll_interval: Duration::from_secs(2),
            retry_backoff: Duration::from_secs(30),
        }
    }
}

impl ConsumerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: env_int("CONSUMER_MAX_ATTEMPTS", defaults.max_attempts),
            poll_interval: Duration::from_secs(env_int(
                "CONSUMER_POLL_INTERVAL_SECS",
                defaults.poll_interval.as_secs() as i32,
            ) as u64),
            retry_backoff: Duration::from_secs(env_int(
                "CONSUMER_RETRY_BACKOFF_SECS",
                defaults.retry_backoff.as_secs() as i32,
            ) as u64),
        }
    }
}

fn env_int(name: &str, default: i32) -> i32 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

/// Sequential notification consumer: one message at a time, acknowledged
/// only after the delivery call succeeds. The claim's row lock is held
/// across delivery, so a crash mid-send leaves the message on the queue.
pub struct Consumer<C: ChatSender> {
    db: PgPool,
    chat: C,
    config: ConsumerConfig,
}

impl<C: ChatSender> Consumer<C> {
    pub fn new(db: PgPool, chat: C, config: ConsumerConfig) -> Self {
        Self { db, chat, config }
    }

    pub async fn run(&self) {
        info!(
            "[consumer] started (max {} attempts per message)",
            self.config.max_attempts
        );
        loop {
            match self.process_next().await {
                Ok(true) => {}
                Ok(false) => tokio::time::sleep(self.config.poll_interval).await,
                Err(e) => {
                    error!("[consumer] processing error: {}", e);
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }
    }

    /// Handle at most one queued message. Returns false when the queue
    /// had nothing deliverable.
    pub async fn process_next(&self) -> Result<bool, sqlx::Error> {
        let mut tx = self.db.begin().await?;

        let msg = match queue::poll_next(&mut tx).await? {
            Some(msg) => msg,
            None => {
                tx.rollback().await?;
                return Ok(false);
            }
        };

        let event: NotificationEvent = match serde_json::from_value(msg.event.clone()) {
            Ok(event) => event,
            Err(e) => {
                // Poison message: no amount of redelivery will make it
                // decodable. Park it where an operator can look at it.
                warn!("[consumer] undecodable event {}: {}", msg.id, e);
                queue::dead_letter(&mut tx, &msg, msg.attempts, "undecodable event payload")
                    .await?;
                tx.commit().await?;
                return Ok(true);
            }
        };

        let text = render_event(&event);

        match self.chat.send_message(&event.recipient_id, &text).await {
            Ok(()) => {
                queue::ack(&mut tx, msg.id).await?;
                info!(
                    "[consumer] delivered {} to {}",
                    event.event_type.as_str(),
                    event.recipient_id
                );
            }
            Err(DeliveryError::Permanent(reason)) => {
                // Recipient unknown or blocked; retrying has no value.
                warn!(
                    "[consumer] dropping {} for {}: {}",
                    event.event_type.as_str(),
                    event.recipient_id,
                    reason
                );
                queue::ack(&mut tx, msg.id).await?;
            }
            Err(DeliveryError::Transient(reason)) => {
                self.settle_transient(&mut tx, &msg, &reason).await?;
            }
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn settle_transient(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        msg: &QueuedEvent,
        reason: &str,
    ) -> Result<(), sqlx::Error> {
        let attempts = msg.attempts + 1;
        if attempts >= self.config.max_attempts {
            error!(
                "[consumer] message {} exhausted {} attempts, dead-lettering: {}",
                msg.id, attempts, reason
            );
            queue::dead_letter(tx, msg, attempts, reason).await
        } else {
            warn!(
                "[consumer] message {} attempt {}/{} failed, will retry: {}",
                msg.id, attempts, self.config.max_attempts, reason
            );
            queue::retry(tx, msg.id, self.config.retry_backoff.as_secs_f64()).await
        }
    }
}
