use log::{debug, error};
use serde_json::{json, Value as JsonValue};
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use crate::events::{content_preview, EventType, NotificationEvent};

/// A row claimed from `notification_queue`. The row lock obtained by
/// `poll_next` is held until the surrounding transaction settles it.
#[derive(Debug, FromRow)]
pub struct QueuedEvent {
    pub id: i64,
    pub recipient_id: String,
    pub event_type: String,
    pub event: JsonValue,
    pub attempts: i32,
}

/// Durably enqueue an event. Enqueueing is independent of whatever
/// domain transaction produced the event; callers run this after commit.
pub async fn publish(db: &PgPool, event: &NotificationEvent) -> Result<(), sqlx::Error> {
    let payload = serde_json::to_value(event).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

    sqlx::query(
        "INSERT INTO notification_queue (recipient_id, event_type, event)
         VALUES ($1, $2, $3)",
    )
    .bind(&event.recipient_id)
    .bind(event.event_type.as_str())
    .bind(payload)
    .execute(db)
    .await?;

    debug!(
        "[queue] enqueued {} for {}",
        event.event_type.as_str(),
        event.recipient_id
    );
    Ok(())
}

/// Publish, logging failures instead of propagating them. The committed
/// domain mutation stands regardless of delivery; losing an event is an
/// operational problem, not a caller error.
async fn publish_best_effort(db: &PgPool, event: NotificationEvent) {
    if let Err(e) = publish(db, &event).await {
        error!(
            "[queue] failed to publish {} for {}: {}",
            event.event_type.as_str(),
            event.recipient_id,
            e
        );
    }
}

pub async fn notify_homework_assigned(
    db: &PgPool,
    recipient_id: &str,
    title: &str,
    description: &str,
) {
    let event = NotificationEvent::new(
        EventType::HomeworkAssigned,
        recipient_id,
        json!({
            "title": title,
            "description": description,
        }),
    );
    publish_best_effort(db, event).await;
}

pub async fn notify_submission_received(
    db: &PgPool,
    recipient_id: &str,
    homework_title: &str,
    student_name: &str,
    submission_id: &str,
    text: &str,
) {
    let event = NotificationEvent::new(
        EventType::SubmissionReceived,
        recipient_id,
        json!({
            "homework_title": homework_title,
            "student_name": student_name,
            "submission_id": submission_id,
            "content_preview": content_preview(text),
        }),
    );
    publish_best_effort(db, event).await;
}

pub async fn notify_feedback_provided(
    db: &PgPool,
    recipient_id: &str,
    homework_title: &str,
    feedback_id: &str,
    text: &str,
    teacher_name: &str,
) {
    let event = NotificationEvent::new(
        EventType::FeedbackProvided,
        recipient_id,
        json!({
            "homework_title": homework_title,
            "feedback_id": feedback_id,
            "content_preview": content_preview(text),
            "teacher_name": teacher_name,
        }),
    );
    publish_best_effort(db, event).await;
}

/// Claim the oldest deliverable message. `SKIP LOCKED` lets multiple
/// consumer instances share the queue without blocking each other, at
/// the cost of strict cross-instance ordering.
pub async fn poll_next(
    tx: &mut Transaction<'_, Postgres>,
) -> Result<Option<QueuedEvent>, sqlx::Error> {
    sqlx::query_as::<_, QueuedEvent>(
        "SELECT id, recipient_id, event_type, event, attempts
         FROM notification_queue
         WHERE available_at <= NOW()
         ORDER BY id
         FOR UPDATE SKIP LOCKED
         LIMIT 1",
    )
    .fetch_optional(&mut **tx)
    .await
}

/// Remove a delivered (or permanently undeliverable) message.
pub async fn ack(tx: &mut Transaction<'_, Postgres>, id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM notification_queue WHERE id = $1")
        .bind(id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Leave the message on the queue for redelivery after a backoff.
pub async fn retry(
    tx: &mut Transaction<'_, Postgres>,
    id: i64,
    backoff_secs: f64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE notification_queue
         SET attempts = attempts + 1,
             available_at = NOW() + make_interval(secs => $2)
         WHERE id = $1",
    )
    .bind(id)
    .bind(backoff_secs)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Move a message off the active queue into `dead_letters`, where it is
/// retained for inspection but never redelivered.
pub async fn dead_letter(
    tx: &mut Transaction<'_, Postgres>,
    msg: &QueuedEvent,
    attempts: i32,
    reason: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO dead_letters (recipient_id, event_type, event, attempts, reason)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(&msg.recipient_id)
    .bind(&msg.event_type)
    .bind(&msg.event)
    .bind(attempts)
    .bind(reason)
    .execute(&mut **tx)
    .await?;

    ack(tx, msg.id).await
}
