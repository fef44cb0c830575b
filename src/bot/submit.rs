use log::error;
use serde_json::json;

use crate::models::homework::Status;
use crate::models::user::UserRole;
use crate::telegram::{InlineKeyboardButton, InlineKeyboardMarkup, TgUser};

use super::session::{ConversationState, Session};
use super::{resolve_user, Bot};

/// `/submit` entry point (also reachable from the homework-list
/// button). Students only.
pub async fn start_submit(bot: &Bot, chat_id: &str, from: &TgUser) {
    let user = match resolve_user(bot, chat_id, from).await {
        Some(user) => user,
        None => return,
    };

    if user.role != UserRole::Student {
        bot.say(chat_id, "Only students can submit homework.").await;
        return;
    }

    let tasks = match bot.api.student_homework(&user.id, Some(Status::Pending)).await {
        Ok(tasks) => tasks,
        Err(e) => {
            error!("[bot] failed to list homework: {}", e);
            bot.say(chat_id, "Could not fetch your homework, please try again later.")
                .await;
            return;
        }
    };

    // A task stays pending until every student finished it, so filter
    // out the ones this student already submitted.
    let submitted: Vec<String> = match bot.api.student_submissions(&user.id).await {
        Ok(submissions) => submissions
            .into_iter()
            .map(|s| s.homework_task_id)
            .collect(),
        Err(e) => {
            error!("[bot] failed to list submissions: {}", e);
            bot.say(chat_id, "Could not fetch your submissions, please try again later.")
                .await;
            return;
        }
    };

    let open: Vec<_> = tasks
        .into_iter()
        .filter(|task| !submitted.contains(&task.id))
        .collect();

    if open.is_empty() {
        bot.say(chat_id, "Nothing to submit right now 🎉").await;
        return;
    }

    let buttons = open
        .iter()
        .map(|task| {
            let title = task
                .content
                .get("title")
                .and_then(|v| v.as_str())
                .unwrap_or("Untitled");
            InlineKeyboardButton::new(title, &task.id)
        })
        .collect();
    let keyboard = InlineKeyboardMarkup::rows(buttons);

    bot.sessions
        .begin(chat_id, &user.id, ConversationState::AwaitingHomeworkSelection)
        .await;
    bot.say_with_keyboard(chat_id, "Which homework are you handing in?", &keyboard)
        .await;
}

/// A homework button was tapped; ask for the submission text.
pub async fn handle_homework_selection(
    bot: &Bot,
    chat_id: &str,
    _session: &Session,
    homework_task_id: &str,
) {
    bot.sessions
        .advance(
            chat_id,
            ConversationState::AwaitingSubmission {
                homework_task_id: homework_task_id.to_string(),
            },
        )
        .await;
    bot.say(chat_id, "Send your submission as text. /cancel to abort.")
        .await;
}

/// The submission text arrived; hand it to the API and end the flow.
pub async fn handle_submission_text(
    bot: &Bot,
    chat_id: &str,
    session: &Session,
    homework_task_id: &str,
    text: &str,
) {
    let content = json!({ "text": text });
    match bot
        .api
        .create_submission(&session.user_id, homework_task_id, content)
        .await
    {
        Ok(_) => {
            bot.say(chat_id, "Submission received 👍 Your teacher will take a look.")
                .await;
        }
        Err(e) => {
            error!("[bot] submission failed: {}", e);
            bot.say(chat_id, &format!("Could not record the submission: {}", e))
                .await;
        }
    }
    bot.sessions.clear(chat_id).await;
}
