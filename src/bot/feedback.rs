use log::error;
use serde_json::json;

use crate::models::homework::Status;
use crate::models::user::UserRole;
use crate::telegram::{InlineKeyboardButton, InlineKeyboardMarkup, TgUser};

use super::session::{ConversationState, Session};
use super::{resolve_user, Bot};

/// `/feedback`: everything a student's teachers have said so far.
pub async fn list_feedback(bot: &Bot, chat_id: &str, from: &TgUser) {
    let user = match resolve_user(bot, chat_id, from).await {
        Some(user) => user,
        None => return,
    };

    if user.role != UserRole::Student {
        bot.say(chat_id, "Only students receive feedback. Try /pending_feedback.")
            .await;
        return;
    }

    let feedback = match bot.api.student_feedback(&user.id).await {
        Ok(feedback) => feedback,
        Err(e) => {
            error!("[bot] failed to list feedback: {}", e);
            bot.say(chat_id, "Could not fetch your feedback, please try again later.")
                .await;
            return;
        }
    };

    if feedback.is_empty() {
        bot.say(chat_id, "No feedback yet - keep practicing!").await;
        return;
    }

    let mut text = String::from("Your feedback:\n");
    for item in &feedback {
        let body = item
            .content
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or("(no text)");
        text.push_str(&format!("\n• {}", body));
    }
    bot.say(chat_id, &text).await;
}

/// `/pending_feedback` entry point: submissions still waiting on this
/// teacher, one button each.
pub async fn start_pending_feedback(bot: &Bot, chat_id: &str, from: &TgUser) {
    let user = match resolve_user(bot, chat_id, from).await {
        Some(user) => user,
        None => return,
    };

    if user.role != UserRole::Teacher {
        bot.say(chat_id, "Only teachers review submissions.").await;
        return;
    }

    let pending = match bot
        .api
        .teacher_submissions(&user.id, Some(Status::Pending))
        .await
    {
        Ok(pending) => pending,
        Err(e) => {
            error!("[bot] failed to list pending submissions: {}", e);
            bot.say(chat_id, "Could not fetch submissions, please try again later.")
                .await;
            return;
        }
    };

    if pending.is_empty() {
        bot.say(chat_id, "No submissions waiting for feedback 🎉").await;
        return;
    }

    let mut buttons = Vec::with_capacity(pending.len());
    for submission in &pending {
        buttons.push(InlineKeyboardButton::new(
            &submission_label(bot, submission).await,
            &submission.id,
        ));
    }
    let keyboard = InlineKeyboardMarkup::rows(buttons);

    bot.sessions
        .begin(
            chat_id,
            &user.id,
            ConversationState::AwaitingSubmissionSelection,
        )
        .await;
    bot.say_with_keyboard(chat_id, "Which submission do you want to review?", &keyboard)
        .await;
}

/// "handle: title" when both resolve, falling back to the raw id.
async fn submission_label(bot: &Bot, submission: &crate::models::homework::Submission) -> String {
    let student = bot.api.get_user(&submission.student_id).await;
    let task = bot.api.get_homework(&submission.homework_task_id).await;

    match (student, task) {
        (Ok(student), Ok(task)) => {
            let title = task
                .content
                .get("title")
                .and_then(|v| v.as_str())
                .unwrap_or("Untitled");
            format!("{}: {}", student.tg_handle, title)
        }
        _ => submission.id.clone(),
    }
}

/// A submission button was tapped; show it and ask for the feedback.
pub async fn handle_submission_selection(
    bot: &Bot,
    chat_id: &str,
    _session: &Session,
    submission_id: &str,
) {
    let submission = match bot.api.get_submission(submission_id).await {
        Ok(submission) => submission,
        Err(e) => {
            error!("[bot] failed to fetch submission: {}", e);
            bot.say(chat_id, "Could not fetch that submission, please try again.")
                .await;
            return;
        }
    };

    let text = submission
        .content
        .get("text")
        .and_then(|v| v.as_str())
        .unwrap_or("(no text)");

    bot.sessions
        .advance(
            chat_id,
            ConversationState::AwaitingFeedback {
                submission_id: submission.id.clone(),
                student_id: submission.student_id.clone(),
            },
        )
        .await;
    bot.say(
        chat_id,
        &format!(
            "The submission:\n\n{}\n\nReply with your feedback. /cancel to abort.",
            text
        ),
    )
    .await;
}

/// The feedback text arrived; hand it to the API and end the flow.
pub async fn handle_feedback_text(
    bot: &Bot,
    chat_id: &str,
    session: &Session,
    submission_id: &str,
    student_id: &str,
    text: &str,
) {
    let content = json!({ "text": text });
    match bot
        .api
        .create_feedback(&session.user_id, submission_id, student_id, content)
        .await
    {
        Ok(_) => {
            bot.say(chat_id, "Feedback sent ✅").await;
        }
        Err(e) => {
            error!("[bot] feedback failed: {}", e);
            bot.say(chat_id, &format!("Could not record the feedback: {}", e))
                .await;
        }
    }
    bot.sessions.clear(chat_id).await;
}
