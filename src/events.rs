use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub const PREVIEW_MAX_CHARS: usize = 100;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    HomeworkAssigned,
    SubmissionReceived,
    FeedbackProvided,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::HomeworkAssigned => "homework_assigned",
            EventType::SubmissionReceived => "submission_received",
            EventType::FeedbackProvided => "feedback_provided",
        }
    }
}

/// The envelope delivered through the notification queue. The wire shape
/// is stable; the consumer and any external inspector of the dead-letter
/// table both rely on it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NotificationEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub recipient_id: String,
    pub data: JsonValue,
    pub timestamp: DateTime<Utc>,
}

impl NotificationEvent {
    pub fn new(event_type: EventType, recipient_id: &str, data: JsonValue) -> Self {
        Self {
            event_type,
            recipient_id: recipient_id.to_string(),
            data,
            timestamp: Utc::now(),
        }
    }
}

/// First 100 characters of the text, with an ellipsis when truncated.
/// Counts characters, not bytes, so multibyte input never splits.
pub fn content_preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_MAX_CHARS {
        let truncated: String = text.chars().take(PREVIEW_MAX_CHARS).collect();
        format!("{}...", truncated)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_round_trips_through_json() {
        let event = NotificationEvent::new(
            EventType::FeedbackProvided,
            "123456789",
            json!({
                "homework_title": "Waltz basics",
                "feedback_id": "fb_0000",
                "content_preview": "Good posture",
                "teacher_name": "anna"
            }),
        );

        let encoded = serde_json::to_string(&event).unwrap();
        let decoded: NotificationEvent = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded, event);
    }

    #[test]
    fn event_wire_shape_is_stable() {
        let event = NotificationEvent::new(
            EventType::HomeworkAssigned,
            "42",
            json!({"title": "Tango", "description": "Practice ochos"}),
        );

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "homework_assigned");
        assert_eq!(value["recipient_id"], "42");
        assert_eq!(value["data"]["title"], "Tango");
        // chrono serializes DateTime<Utc> as RFC 3339 with a UTC offset
        let ts = value["timestamp"].as_str().unwrap();
        assert!(ts.parse::<DateTime<Utc>>().is_ok());
    }

    #[test]
    fn short_content_is_not_truncated() {
        assert_eq!(content_preview("well done"), "well done");
    }

    #[test]
    fn exactly_max_chars_is_untouched() {
        let text = "a".repeat(PREVIEW_MAX_CHARS);
        assert_eq!(content_preview(&text), text);
    }

    #[test]
    fn long_content_gets_an_ellipsis() {
        let text = "b".repeat(150);
        let preview = content_preview(&text);
        assert_eq!(preview.chars().count(), PREVIEW_MAX_CHARS + 3);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "ü".repeat(150);
        let preview = content_preview(&text);
        assert!(preview.starts_with("ü"));
        assert_eq!(preview.chars().count(), PREVIEW_MAX_CHARS + 3);
    }
}
