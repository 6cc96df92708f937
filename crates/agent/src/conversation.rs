use std::sync::Arc;

use pactum_core::domain::conversation::{ConversationSession, ConversationTurn, SessionId};
use tokio::sync::Mutex;

/// Serializes turns as `<role>: <message>` lines in chronological order.
pub fn format_history(turns: &[ConversationTurn]) -> String {
    turns
        .iter()
        .map(|turn| format!("{}: {}", turn.role.as_str(), turn.message))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_prompt(system_instructions: &str, turns: &[ConversationTurn]) -> String {
    format!("{system_instructions}\n\n{}", format_history(turns))
}

/// Append-only view of one session shared by the tools of a turn.
///
/// All writers go through one mutex, so concurrent tool calls append in a
/// well-defined order and nothing can remove or reorder existing turns.
#[derive(Clone)]
pub struct SessionLog {
    id: SessionId,
    inner: Arc<Mutex<ConversationSession>>,
}

impl SessionLog {
    pub fn new(session: ConversationSession) -> Self {
        Self { id: session.id.clone(), inner: Arc::new(Mutex::new(session)) }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub async fn append(&self, turn: ConversationTurn) {
        self.inner.lock().await.append(turn);
    }

    pub async fn snapshot(&self) -> ConversationSession {
        self.inner.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn render_prompt(&self, system_instructions: &str) -> String {
        let session = self.inner.lock().await;
        render_prompt(system_instructions, session.turns())
    }

    pub async fn into_session(self) -> ConversationSession {
        match Arc::try_unwrap(self.inner) {
            Ok(mutex) => mutex.into_inner(),
            Err(shared) => shared.lock().await.clone(),
        }
    }
}
