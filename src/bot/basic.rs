use log::error;

use crate::models::homework::Status;
use crate::models::user::UserRole;
use crate::telegram::{InlineKeyboardButton, InlineKeyboardMarkup, TgUser};

use super::Bot;

const HELP_TEXT: &str = "Here is what I can do:\n\n\
    /homework - list your assigned homework\n\
    /submit - hand in a submission\n\
    /feedback - see feedback you received\n\
    /assign - assign homework to students (teachers)\n\
    /pending_feedback - review submissions (teachers)\n\
    /cancel - abort whatever we were doing";

/// `/start`: greet a known user, or offer role-selection registration.
pub async fn start(bot: &Bot, chat_id: &str, from: &TgUser) {
    match bot.api.get_user_by_telegram_id(&from.id.to_string()).await {
        Ok(user) => {
            let text = format!(
                "Welcome back, {}! You are registered as a {}.\n\n{}",
                user.tg_handle,
                user.role.as_str(),
                HELP_TEXT
            );
            bot.say(chat_id, &text).await;
        }
        Err(e) if e.is_not_found() => {
            let keyboard = InlineKeyboardMarkup::rows(vec![
                InlineKeyboardButton::new("💃 I'm a student", "role_student"),
                InlineKeyboardButton::new("🎓 I'm a teacher", "role_teacher"),
            ]);
            bot.say_with_keyboard(
                chat_id,
                "Welcome to the dance school! Who are you?",
                &keyboard,
            )
            .await;
        }
        Err(e) => {
            error!("[bot] failed to look up user: {}", e);
            bot.say(chat_id, "Something went wrong, please try again later.")
                .await;
        }
    }
}

/// Role button from the `/start` keyboard: register the user.
pub async fn handle_role_selection(bot: &Bot, chat_id: &str, from: &TgUser, role: UserRole) {
    let handle = from
        .username
        .clone()
        .unwrap_or_else(|| from.first_name.clone());

    match bot
        .api
        .create_user(&handle, &from.id.to_string(), role)
        .await
    {
        Ok(user) => {
            let text = format!(
                "You are registered as a {}, {}!\n\n{}",
                user.role.as_str(),
                user.tg_handle,
                HELP_TEXT
            );
            bot.say(chat_id, &text).await;
        }
        Err(e) if e.is_conflict() => {
            bot.say(chat_id, "You are already registered. Try /help.").await;
        }
        Err(e) => {
            error!("[bot] failed to register user: {}", e);
            bot.say(chat_id, "Registration failed, please try again later.")
                .await;
        }
    }
}

pub async fn help(bot: &Bot, chat_id: &str) {
    bot.say(chat_id, HELP_TEXT).await;
}

pub async fn main_menu(bot: &Bot, chat_id: &str) {
    bot.sessions.clear(chat_id).await;
    bot.say(chat_id, HELP_TEXT).await;
}

/// `/cancel`: the universal abort, valid in any state.
pub async fn cancel(bot: &Bot, chat_id: &str) {
    if bot.sessions.clear(chat_id).await {
        bot.say(chat_id, "Cancelled.").await;
    } else {
        bot.say(chat_id, "Nothing to cancel.").await;
    }
}

/// `/homework`: a student's open homework, with a shortcut into the
/// submit flow.
pub async fn list_homework(bot: &Bot, chat_id: &str, from: &TgUser) {
    let user = match super::resolve_user(bot, chat_id, from).await {
        Some(user) => user,
        None => return,
    };

    if user.role != UserRole::Student {
        bot.say(chat_id, "Only students have assigned homework. Try /pending_feedback.")
            .await;
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

    if tasks.is_empty() {
        bot.say(chat_id, "No open homework right now 🎉").await;
        return;
    }

    let mut text = String::from("Your open homework:\n");
    for task in &tasks {
        let title = task
            .content
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or("Untitled");
        text.push_str(&format!("\n• {}", title));
    }

    let keyboard = InlineKeyboardMarkup::rows(vec![InlineKeyboardButton::new(
        "📤 Submit homework",
        "submit_homework",
    )]);
    bot.say_with_keyboard(chat_id, &text, &keyboard).await;
}
