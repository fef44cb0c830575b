use serde_json::Value as JsonValue;

use crate::events::{EventType, NotificationEvent};

/// Helper functions to build the chat text for each event type.

fn field<'a>(data: &'a JsonValue, key: &str) -> &'a str {
    data.get(key).and_then(|v| v.as_str()).unwrap_or("")
}

fn field_or<'a>(data: &'a JsonValue, key: &str, fallback: &'a str) -> &'a str {
    match data.get(key).and_then(|v| v.as_str()) {
        Some(value) if !value.is_empty() => value,
        _ => fallback,
    }
}

pub fn build_homework_assigned_message(data: &JsonValue) -> String {
    let title = field_or(data, "title", "Untitled");
    let description = field(data, "description");

    let mut text = format!("📚 New homework assigned!\n\n{}", title);
    if !description.is_empty() {
        text.push_str("\n\n");
        text.push_str(description);
    }
    text.push_str("\n\nUse /submit when you are ready to hand it in.");
    text
}

pub fn build_submission_received_message(data: &JsonValue) -> String {
    let student = field_or(data, "student_name", "A student");
    let title = field_or(data, "homework_title", "Untitled");
    let preview = field(data, "content_preview");

    let mut text = format!("📝 {} submitted homework:\n\n{}", student, title);
    if !preview.is_empty() {
        text.push_str(&format!("\n\n\"{}\"", preview));
    }
    text.push_str("\n\nUse /pending_feedback to review it.");
    text
}

pub fn build_feedback_provided_message(data: &JsonValue) -> String {
    let teacher = field_or(data, "teacher_name", "Your teacher");
    let title = field_or(data, "homework_title", "Untitled");
    let preview = field(data, "content_preview");

    let mut text = format!("✅ {} left feedback on \"{}\"", teacher, title);
    if !preview.is_empty() {
        text.push_str(&format!(":\n\n{}", preview));
    }
    text
}

/// Render a queued event into its user-facing chat text.
pub fn render_event(event: &NotificationEvent) -> String {
    match event.event_type {
        EventType::HomeworkAssigned => build_homework_assigned_message(&event.data),
        EventType::SubmissionReceived => build_submission_received_message(&event.data),
        EventType::FeedbackProvided => build_feedback_provided_message(&event.data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn assigned_message_includes_title_and_description() {
        let text = build_homework_assigned_message(&json!({
            "title": "Cha-cha timing",
            "description": "Count out loud while practicing"
        }));
        assert!(text.contains("Cha-cha timing"));
        assert!(text.contains("Count out loud while practicing"));
    }

    #[test]
    fn assigned_message_tolerates_missing_fields() {
        let text = build_homework_assigned_message(&json!({}));
        assert!(text.contains("Untitled"));
    }

    #[test]
    fn submission_message_names_the_student() {
        let text = build_submission_received_message(&json!({
            "student_name": "maria",
            "homework_title": "Rumba walks",
            "content_preview": "Here is my video link"
        }));
        assert!(text.contains("maria"));
        assert!(text.contains("Rumba walks"));
        assert!(text.contains("Here is my video link"));
    }

    #[test]
    fn feedback_message_names_the_teacher() {
        let text = build_feedback_provided_message(&json!({
            "teacher_name": "anna",
            "homework_title": "Waltz basics",
            "content_preview": "Nice frame, watch the rise and fall"
        }));
        assert!(text.contains("anna"));
        assert!(text.contains("Waltz basics"));
        assert!(text.contains("watch the rise and fall"));
    }

    #[test]
    fn render_dispatches_on_event_type() {
        let event = NotificationEvent::new(
            EventType::HomeworkAssigned,
            "1",
            json!({"title": "Jive kicks"}),
        );
        assert!(render_event(&event).contains("Jive kicks"));
    }
}
