pub mod api_client;
pub mod assign;
pub mod basic;
pub mod feedback;
pub mod session;
pub mod submit;

use log::{debug, error};
use std::time::Duration;

use crate::models::user::{User, UserRole};
use crate::telegram::{
    CallbackQuery, InlineKeyboardMarkup, TelegramClient, TgMessage, TgUser, Update,
};
use self::api_client::ApiClient;
use self::session::{ConversationState, SessionStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Homework,
    Assign,
    Submit,
    Feedback,
    PendingFeedback,
    Cancel,
}

/// Parse a `/command` message, tolerating arguments and the
/// `@botname` suffix Telegram appends in group chats.
pub fn parse_command(text: &str) -> Option<Command> {
    let token = text.trim().split_whitespace().next()?;
    let token = token.strip_prefix('/')?;
    let token = token.split('@').next().unwrap_or(token);

    match token {
        "start" => Some(Command::Start),
        "help" => Some(Command::Help),
        "homework" => Some(Command::Homework),
        "assign" => Some(Command::Assign),
        "submit" => Some(Command::Submit),
        "feedback" => Some(Command::Feedback),
        "pending_feedback" => Some(Command::PendingFeedback),
        "cancel" => Some(Command::Cancel),
        _ => None,
    }
}

/// A decoded callback token. Entity ids already carry their prefixes
/// (`usr_`, `hw_`, `sub_`), so the id itself routes the selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Role(UserRole),
    Student(String),
    Homework(String),
    Submission(String),
    Done,
    MainMenu,
    SubmitHomework,
    Unknown,
}

pub fn classify_callback(data: &str) -> Selection {
    match data {
        "role_student" => Selection::Role(UserRole::Student),
        "role_teacher" => Selection::Role(UserRole::Teacher),
        "done" => Selection::Done,
        "main_menu" => Selection::MainMenu,
        "submit_homework" => Selection::SubmitHomework,
        _ if data.starts_with("usr_") => Selection::Student(data.to_string()),
        _ if data.starts_with("hw_") => Selection::Homework(data.to_string()),
        _ if data.starts_with("sub_") => Selection::Submission(data.to_string()),
        _ => Selection::Unknown,
    }
}

/// The conversation engine: one long-poll loop, one session per chat,
/// every domain mutation routed through the HTTP API.
pub struct Bot {
    pub(crate) telegram: TelegramClient,
    pub(crate) api: ApiClient,
    pub(crate) sessions: SessionStore,
}

impl Bot {
    pub fn new(telegram: TelegramClient, api: ApiClient, sessions: SessionStore) -> Self {
        Self {
            telegram,
            api,
            sessions,
        }
    }

    pub async fn run(self) {
        let mut offset: i64 = 0;
        loop {
            match self.telegram.get_updates(offset, 30).await {
                Ok(updates) => {
                    for update in updates {
                        if update.update_id >= offset {
                            offset = update.update_id + 1;
                        }
                        self.handle_update(update).await;
                    }
                }
                Err(e) => {
                    error!("[bot] getUpdates failed: {}", e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }

    async fn handle_update(&self, update: Update) {
        if let Some(message) = update.message {
            self.handle_message(message).await;
        } else if let Some(callback) = update.callback_query {
            self.handle_callback(callback).await;
        }
    }

    async fn handle_message(&self, message: TgMessage) {
        let text = match message.text {
            Some(ref text) => text.clone(),
            None => return,
        };
        let from = match message.from {
            Some(from) => from,
            None => return,
        };
        let chat_id = message.chat.id.to_string();

        if let Some(command) = parse_command(&text) {
            self.handle_command(command, &chat_id, &from).await;
            return;
        }

        // Free text only means something inside a text-accepting state.
        let session = match self.sessions.get(&chat_id).await {
            Some(session) => session,
            None => {
                debug!("[bot] ignoring text from idle chat {}", chat_id);
                return;
            }
        };

        if !session.state.expects_text() {
            debug!(
                "[bot] chat {} sent text while a selection was expected",
                chat_id
            );
            return;
        }

        match session.state.clone() {
            ConversationState::AwaitingContent => {
                assign::handle_content(self, &chat_id, &text).await
            }
            ConversationState::AwaitingSubmission { homework_task_id } => {
                submit::handle_submission_text(self, &chat_id, &session, &homework_task_id, &text)
                    .await
            }
            ConversationState::AwaitingFeedback {
                submission_id,
                student_id,
            } => {
                feedback::handle_feedback_text(
                    self,
                    &chat_id,
                    &session,
                    &submission_id,
                    &student_id,
                    &text,
                )
                .await
            }
            _ => debug!("[bot] chat {} text input has no matching state", chat_id),
        }
    }

    async fn handle_command(&self, command: Command, chat_id: &str, from: &TgUser) {
        match command {
            Command::Start => basic::start(self, chat_id, from).await,
            Command::Help => basic::help(self, chat_id).await,
            Command::Homework => basic::list_homework(self, chat_id, from).await,
            Command::Assign => assign::start_assign(self, chat_id, from).await,
            Command::Submit => submit::start_submit(self, chat_id, from).await,
            Command::Feedback => feedback::list_feedback(self, chat_id, from).await,
            Command::PendingFeedback => feedback::start_pending_feedback(self, chat_id, from).await,
            Command::Cancel => basic::cancel(self, chat_id).await,
        }
    }

    async fn handle_callback(&self, callback: CallbackQuery) {
        self.telegram.answer_callback_query(&callback.id).await;

        let data = match callback.data {
            Some(ref data) => data.clone(),
            None => return,
        };
        let chat_id = callback
            .message
            .as_ref()
            .map(|m| m.chat.id.to_string())
            .unwrap_or_else(|| callback.from.id.to_string());

        match classify_callback(&data) {
            Selection::Role(role) => {
                basic::handle_role_selection(self, &chat_id, &callback.from, role).await
            }
            Selection::MainMenu => basic::main_menu(self, &chat_id).await,
            Selection::SubmitHomework => submit::start_submit(self, &chat_id, &callback.from).await,
            selection => self.handle_flow_selection(&chat_id, selection).await,
        }
    }

    /// Selections that only make sense inside a flow. The session state
    /// gates which selection category is accepted; everything else is
    /// dropped without a transition.
    async fn handle_flow_selection(&self, chat_id: &str, selection: Selection) {
        let session = match self.sessions.get(chat_id).await {
            Some(session) => session,
            None => {
                debug!("[bot] ignoring selection from idle chat {}", chat_id);
                return;
            }
        };

        match (&session.state, selection) {
            (ConversationState::AwaitingStudents { .. }, Selection::Student(user_id)) => {
                assign::handle_student_selection(self, chat_id, &session, Some(user_id)).await
            }
            (ConversationState::AwaitingStudents { .. }, Selection::Done) => {
                assign::handle_student_selection(self, chat_id, &session, None).await
            }
            (ConversationState::AwaitingHomeworkSelection, Selection::Homework(homework_id)) => {
                submit::handle_homework_selection(self, chat_id, &session, &homework_id).await
            }
            (ConversationState::AwaitingSubmissionSelection, Selection::Submission(submission_id)) => {
                feedback::handle_submission_selection(self, chat_id, &session, &submission_id).await
            }
            (state, selection) => {
                debug!(
                    "[bot] chat {} selection {:?} does not fit state {:?}, ignored",
                    chat_id, selection, state
                );
            }
        }
    }

    pub(crate) async fn say(&self, chat_id: &str, text: &str) {
        if let Err(e) = self
            .telegram
            .send_message_with_keyboard(chat_id, text, None)
            .await
        {
            error!("[bot] failed to message chat {}: {}", chat_id, e);
        }
    }

    pub(crate) async fn say_with_keyboard(
        &self,
        chat_id: &str,
        text: &str,
        keyboard: &InlineKeyboardMarkup,
    ) {
        if let Err(e) = self
            .telegram
            .send_message_with_keyboard(chat_id, text, Some(keyboard))
            .await
        {
            error!("[bot] failed to message chat {}: {}", chat_id, e);
        }
    }
}

/// Look up the sender's registered account, nudging them to /start
/// when there is none.
pub(crate) async fn resolve_user(bot: &Bot, chat_id: &str, from: &TgUser) -> Option<User> {
    match bot.api.get_user_by_telegram_id(&from.id.to_string()).await {
        Ok(user) => Some(user),
        Err(e) if e.is_not_found() => {
            bot.say(chat_id, "I don't know you yet - use /start to register.")
                .await;
            None
        }
        Err(e) => {
            error!("[bot] failed to resolve user: {}", e);
            bot.say(chat_id, "Something went wrong, please try again later.")
                .await;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse_with_arguments_and_bot_suffix() {
        assert_eq!(parse_command("/assign"), Some(Command::Assign));
        assert_eq!(parse_command("/assign@TanzAppBot"), Some(Command::Assign));
        assert_eq!(parse_command("  /cancel now"), Some(Command::Cancel));
        assert_eq!(
            parse_command("/pending_feedback"),
            Some(Command::PendingFeedback)
        );
    }

    #[test]
    fn non_commands_do_not_parse() {
        assert_eq!(parse_command("hello there"), None);
        assert_eq!(parse_command("/frobnicate"), None);
        assert_eq!(parse_command(""), None);
    }

    #[test]
    fn callbacks_route_by_prefix() {
        assert_eq!(
            classify_callback("role_student"),
            Selection::Role(UserRole::Student)
        );
        assert_eq!(
            classify_callback("usr_123"),
            Selection::Student("usr_123".to_string())
        );
        assert_eq!(
            classify_callback("hw_abc"),
            Selection::Homework("hw_abc".to_string())
        );
        assert_eq!(
            classify_callback("sub_xyz"),
            Selection::Submission("sub_xyz".to_string())
        );
        assert_eq!(classify_callback("done"), Selection::Done);
        assert_eq!(classify_callback("main_menu"), Selection::MainMenu);
        assert_eq!(classify_callback("submit_homework"), Selection::SubmitHomework);
        assert_eq!(classify_callback("banana"), Selection::Unknown);
    }
}
