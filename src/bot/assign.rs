use log::error;
use serde_json::json;

use crate::models::user::UserRole;
use crate::telegram::{InlineKeyboardButton, InlineKeyboardMarkup, TgUser};

use super::session::{ConversationState, Session};
use super::{resolve_user, Bot};

/// `/assign` entry point. Teachers only.
pub async fn start_assign(bot: &Bot, chat_id: &str, from: &TgUser) {
    let user = match resolve_user(bot, chat_id, from).await {
        Some(user) => user,
        None => return,
    };

    if user.role != UserRole::Teacher {
        bot.say(chat_id, "Only teachers can assign homework.").await;
        return;
    }

    bot.sessions
        .begin(chat_id, &user.id, ConversationState::AwaitingContent)
        .await;
    bot.say(
        chat_id,
        "What is the homework? Send the text - the first line becomes \
         the title, the rest the description. /cancel to abort.",
    )
    .await;
}

/// First line is the title, everything after it the description.
pub(crate) fn split_content(text: &str) -> (String, String) {
    let mut lines = text.trim().splitn(2, '\n');
    let title = lines.next().unwrap_or("").trim().to_string();
    let description = lines.next().unwrap_or("").trim().to_string();
    (title, description)
}

/// Free-text content arrived; move on to picking students.
pub async fn handle_content(bot: &Bot, chat_id: &str, text: &str) {
    let (title, description) = split_content(text);
    if title.is_empty() {
        bot.say(chat_id, "The homework needs at least a title - try again.")
            .await;
        return;
    }

    let students = match bot.api.list_students().await {
        Ok(students) => students,
        Err(e) => {
            error!("[bot] failed to list students: {}", e);
            bot.say(chat_id, "Could not fetch the student list, please try again later.")
                .await;
            return;
        }
    };

    if students.is_empty() {
        bot.sessions.clear(chat_id).await;
        bot.say(chat_id, "No students are registered yet - nobody to assign to.")
            .await;
        return;
    }

    let mut buttons: Vec<InlineKeyboardButton> = students
        .iter()
        .map(|student| InlineKeyboardButton::new(&student.tg_handle, &student.id))
        .collect();
    buttons.push(InlineKeyboardButton::new("✅ Done", "done"));
    let keyboard = InlineKeyboardMarkup::rows(buttons);

    bot.sessions
        .advance(
            chat_id,
            ConversationState::AwaitingStudents {
                title,
                description,
                selected: Vec::new(),
            },
        )
        .await;

    bot.say_with_keyboard(
        chat_id,
        "Pick the students one at a time, then press Done.",
        &keyboard,
    )
    .await;
}

/// A student button (`Some(id)`) or the Done sentinel (`None`).
pub async fn handle_student_selection(
    bot: &Bot,
    chat_id: &str,
    session: &Session,
    picked: Option<String>,
) {
    let (title, description, mut selected) = match &session.state {
        ConversationState::AwaitingStudents {
            title,
            description,
            selected,
        } => (title.clone(), description.clone(), selected.clone()),
        _ => return,
    };

    match picked {
        Some(student_id) => {
            if selected.contains(&student_id) {
                bot.say(chat_id, "Already selected - pick another, or press Done.")
                    .await;
                return;
            }
            selected.push(student_id);
            let count = selected.len();
            bot.sessions
                .advance(
                    chat_id,
                    ConversationState::AwaitingStudents {
                        title,
                        description,
                        selected,
                    },
                )
                .await;
            bot.say(chat_id, &format!("Added - {} selected so far.", count))
                .await;
        }
        None => {
            if selected.is_empty() {
                bot.say(chat_id, "Pick at least one student before pressing Done.")
                    .await;
                return;
            }

            let content = json!({
                "title": title,
                "description": description,
            });
            match bot
                .api
                .assign_homework(&session.user_id, &selected, content)
                .await
            {
                Ok(_) => {
                    bot.say(
                        chat_id,
                        &format!("Homework assigned to {} student(s) 📚", selected.len()),
                    )
                    .await;
                }
                Err(e) => {
                    error!("[bot] assign failed: {}", e);
                    bot.say(chat_id, &format!("Could not assign the homework: {}", e))
                        .await;
                }
            }
            bot.sessions.clear(chat_id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_line_becomes_the_title() {
        let (title, description) = split_content("Waltz basics\nPractice box steps daily");
        assert_eq!(title, "Waltz basics");
        assert_eq!(description, "Practice box steps daily");
    }

    #[test]
    fn single_line_has_empty_description() {
        let (title, description) = split_content("Spin drills");
        assert_eq!(title, "Spin drills");
        assert_eq!(description, "");
    }

    #[test]
    fn multiline_description_is_kept_whole() {
        let (_, description) = split_content("Title\nline one\nline two");
        assert_eq!(description, "line one\nline two");
    }

    #[test]
    fn blank_input_yields_empty_title() {
        let (title, _) = split_content("   \n  ");
        assert_eq!(title, "");
    }
}
