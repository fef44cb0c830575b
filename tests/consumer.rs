use async_trait::async_trait;
use serde_json::json;
use sqlx::PgPool;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tanzapp_backend::consumer::{Consumer, ConsumerConfig};
use tanzapp_backend::events::{EventType, NotificationEvent};
use tanzapp_backend::queue;
use tanzapp_backend::telegram::{ChatSender, DeliveryError};

#[derive(Clone, Copy)]
enum MockOutcome {
    Delivered,
    Transient,
    Permanent,
}

/// Test double for the chat platform: scripted outcomes, recorded sends.
#[derive(Clone, Default)]
struct MockSender {
    outcomes: Arc<Mutex<VecDeque<MockOutcome>>>,
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockSender {
    fn scripted(outcomes: &[MockOutcome]) -> Self {
        Self {
            outcomes: Arc::new(Mutex::new(outcomes.iter().copied().collect())),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn sent_messages(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatSender for MockSender {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), DeliveryError> {
        self.sent
            .lock()
            .unwrap()
            .push((chat_id.to_string(), text.to_string()));
        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(MockOutcome::Delivered);
        match outcome {
            MockOutcome::Delivered => Ok(()),
            MockOutcome::Transient => Err(DeliveryError::Transient("timeout".to_string())),
            MockOutcome::Permanent => {
                Err(DeliveryError::Permanent("bot blocked by user".to_string()))
            }
        }
    }
}

fn test_config() -> ConsumerConfig {
    ConsumerConfig {
        max_attempts: 3,
        poll_interval: Duration::from_millis(10),
        retry_backoff: Duration::from_secs(0),
    }
}

async fn queue_len(pool: &PgPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM notification_queue")
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn dead_letter_count(pool: &PgPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM dead_letters")
        .fetch_one(pool)
        .await
        .unwrap()
}

#[sqlx::test(migrations = "./migrations")]
async fn delivered_message_is_acked(pool: PgPool) {
    let event = NotificationEvent::new(
        EventType::HomeworkAssigned,
        "chat-1",
        json!({"title": "Waltz basics", "description": "slow practice"}),
    );
    queue::publish(&pool, &event).await.unwrap();

    let sender = MockSender::scripted(&[MockOutcome::Delivered]);
    let consumer = Consumer::new(pool.clone(), sender.clone(), test_config());

    assert!(consumer.process_next().await.unwrap());
    assert!(!consumer.process_next().await.unwrap());

    let sent = sender.sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "chat-1");
    assert!(sent[0].1.contains("Waltz basics"));
    assert_eq!(queue_len(&pool).await, 0);
    assert_eq!(dead_letter_count(&pool).await, 0);
}

// Three consecutive transient failures exhaust the retry budget; the
// message moves to the dead-letter table and is never sent a 4th time.
#[sqlx::test(migrations = "./migrations")]
async fn transient_failures_dead_letter_after_the_third_attempt(pool: PgPool) {
    let event = NotificationEvent::new(
        EventType::FeedbackProvided,
        "chat-2",
        json!({"homework_title": "Tango", "teacher_name": "anna", "content_preview": "ok"}),
    );
    queue::publish(&pool, &event).await.unwrap();

    let sender = MockSender::scripted(&[
        MockOutcome::Transient,
        MockOutcome::Transient,
        MockOutcome::Transient,
    ]);
    let consumer = Consumer::new(pool.clone(), sender.clone(), test_config());

    assert!(consumer.process_next().await.unwrap());
    assert!(consumer.process_next().await.unwrap());
    assert!(consumer.process_next().await.unwrap());
    // Queue is drained: the message was dead-lettered, not redelivered.
    assert!(!consumer.process_next().await.unwrap());

    assert_eq!(sender.sent_messages().len(), 3);
    assert_eq!(queue_len(&pool).await, 0);
    assert_eq!(dead_letter_count(&pool).await, 1);

    let (attempts, reason): (i32, String) =
        sqlx::query_as("SELECT attempts, reason FROM dead_letters")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(attempts, 3);
    assert_eq!(reason, "timeout");
}

#[sqlx::test(migrations = "./migrations")]
async fn a_recovering_message_is_still_delivered(pool: PgPool) {
    let event = NotificationEvent::new(
        EventType::SubmissionReceived,
        "chat-3",
        json!({"student_name": "maria", "homework_title": "Rumba"}),
    );
    queue::publish(&pool, &event).await.unwrap();

    let sender = MockSender::scripted(&[MockOutcome::Transient, MockOutcome::Delivered]);
    let consumer = Consumer::new(pool.clone(), sender.clone(), test_config());

    assert!(consumer.process_next().await.unwrap());
    assert!(consumer.process_next().await.unwrap());

    assert_eq!(sender.sent_messages().len(), 2);
    assert_eq!(queue_len(&pool).await, 0);
    assert_eq!(dead_letter_count(&pool).await, 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn permanent_failure_acks_without_retry(pool: PgPool) {
    let event = NotificationEvent::new(
        EventType::HomeworkAssigned,
        "chat-4",
        json!({"title": "Jive"}),
    );
    queue::publish(&pool, &event).await.unwrap();

    let sender = MockSender::scripted(&[MockOutcome::Permanent]);
    let consumer = Consumer::new(pool.clone(), sender.clone(), test_config());

    assert!(consumer.process_next().await.unwrap());
    assert!(!consumer.process_next().await.unwrap());

    assert_eq!(sender.sent_messages().len(), 1);
    assert_eq!(queue_len(&pool).await, 0);
    assert_eq!(dead_letter_count(&pool).await, 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn undecodable_payload_is_dead_lettered_without_delivery(pool: PgPool) {
    sqlx::query(
        "INSERT INTO notification_queue (recipient_id, event_type, event)
         VALUES ('chat-5', 'homework_assigned', '{\"not\": \"an event\"}')",
    )
    .execute(&pool)
    .await
    .unwrap();

    let sender = MockSender::scripted(&[]);
    let consumer = Consumer::new(pool.clone(), sender.clone(), test_config());

    assert!(consumer.process_next().await.unwrap());

    assert_eq!(sender.sent_messages().len(), 0);
    assert_eq!(queue_len(&pool).await, 0);
    assert_eq!(dead_letter_count(&pool).await, 1);
}
