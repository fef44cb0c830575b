use log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Where a chat currently is in one of the three flows. A chat with no
/// session is idle; the first entry command creates one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationState {
    // assign flow
    AwaitingContent,
    AwaitingStudents {
        title: String,
        description: String,
        selected: Vec<String>,
    },
    // submit flow
    AwaitingHomeworkSelection,
    AwaitingSubmission {
        homework_task_id: String,
    },
    // feedback flow
    AwaitingSubmissionSelection,
    AwaitingFeedback {
        submission_id: String,
        student_id: String,
    },
}

impl ConversationState {
    /// States that consume free text; every other state consumes a
    /// selection event.
    pub fn expects_text(&self) -> bool {
        matches!(
            self,
            ConversationState::AwaitingContent
                | ConversationState::AwaitingSubmission { .. }
                | ConversationState::AwaitingFeedback { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub state: ConversationState,
    started_at: Instant,
}

/// Per-chat dialog state, shared between update handlers. Sessions are
/// transient: they live in memory, expire after an idle TTL, and an
/// entry command silently replaces whatever was in progress.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Start a fresh session for the chat, replacing any existing one.
    pub async fn begin(&self, chat_id: &str, user_id: &str, state: ConversationState) {
        let mut sessions = self.sessions.write().await;
        let replaced = sessions
            .insert(
                chat_id.to_string(),
                Session {
                    user_id: user_id.to_string(),
                    state,
                    started_at: Instant::now(),
                },
            )
            .is_some();
        if replaced {
            debug!("[session] chat {} restarted a flow mid-session", chat_id);
        }
    }

    /// The chat's live session, if any. Expired sessions are dropped on
    /// access rather than by a background sweep.
    pub async fn get(&self, chat_id: &str) -> Option<Session> {
        {
            let sessions = self.sessions.read().await;
            match sessions.get(chat_id) {
                Some(session) if session.started_at.elapsed() < self.ttl => {
                    return Some(session.clone())
                }
                Some(_) => {}
                None => return None,
            }
        }

        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(chat_id) {
            if session.started_at.elapsed() < self.ttl {
                return Some(session.clone());
            }
            sessions.remove(chat_id);
            debug!("[session] chat {} session expired", chat_id);
        }
        None
    }

    /// Move the chat to the next state, refreshing its idle clock.
    pub async fn advance(&self, chat_id: &str, state: ConversationState) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(chat_id) {
            session.state = state;
            session.started_at = Instant::now();
        }
    }

    /// Drop the chat's session. Returns whether one existed.
    pub async fn clear(&self, chat_id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        sessions.remove(chat_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SessionStore {
        SessionStore::new(Duration::from_secs(60))
    }

    #[tokio::test]
    async fn idle_chat_has_no_session() {
        assert!(store().get("1").await.is_none());
    }

    #[tokio::test]
    async fn begin_then_get_round_trips() {
        let store = store();
        store.begin("1", "usr_a", ConversationState::AwaitingContent).await;

        let session = store.get("1").await.unwrap();
        assert_eq!(session.user_id, "usr_a");
        assert_eq!(session.state, ConversationState::AwaitingContent);
    }

    #[tokio::test]
    async fn entry_overwrites_session_in_progress() {
        let store = store();
        store
            .begin("1", "usr_a", ConversationState::AwaitingHomeworkSelection)
            .await;
        store.begin("1", "usr_a", ConversationState::AwaitingContent).await;

        let session = store.get("1").await.unwrap();
        assert_eq!(session.state, ConversationState::AwaitingContent);
    }

    #[tokio::test]
    async fn advance_updates_state_in_place() {
        let store = store();
        store.begin("1", "usr_a", ConversationState::AwaitingContent).await;
        store
            .advance(
                "1",
                ConversationState::AwaitingStudents {
                    title: "Waltz".to_string(),
                    description: String::new(),
                    selected: vec![],
                },
            )
            .await;

        match store.get("1").await.unwrap().state {
            ConversationState::AwaitingStudents { title, .. } => assert_eq!(title, "Waltz"),
            other => panic!("unexpected state: {:?}", other),
        }
    }

    #[tokio::test]
    async fn clear_ends_the_session() {
        let store = store();
        store.begin("1", "usr_a", ConversationState::AwaitingContent).await;

        assert!(store.clear("1").await);
        assert!(store.get("1").await.is_none());
        assert!(!store.clear("1").await);
    }

    #[tokio::test]
    async fn sessions_expire_after_the_idle_ttl() {
        let store = SessionStore::new(Duration::from_secs(0));
        store.begin("1", "usr_a", ConversationState::AwaitingContent).await;

        assert!(store.get("1").await.is_none());
    }

    #[tokio::test]
    async fn chats_are_independent() {
        let store = store();
        store.begin("1", "usr_a", ConversationState::AwaitingContent).await;
        store
            .begin("2", "usr_b", ConversationState::AwaitingSubmissionSelection)
            .await;

        store.clear("1").await;
        assert!(store.get("2").await.is_some());
    }

    #[test]
    fn text_states_are_exactly_the_three_prompts() {
        assert!(ConversationState::AwaitingContent.expects_text());
        assert!(ConversationState::AwaitingSubmission {
            homework_task_id: "hw_1".to_string()
        }
        .expects_text());
        assert!(ConversationState::AwaitingFeedback {
            submission_id: "sub_1".to_string(),
            student_id: "usr_1".to_string()
        }
        .expects_text());

        assert!(!ConversationState::AwaitingStudents {
            title: String::new(),
            description: String::new(),
            selected: vec![]
        }
        .expects_text());
        assert!(!ConversationState::AwaitingHomeworkSelection.expects_text());
        assert!(!ConversationState::AwaitingSubmissionSelection.expects_text());
    }
}
