use std::collections::HashMap;

use tokio::sync::RwLock;

use pactum_core::domain::conversation::{ConversationSession, SessionId};

use super::{ensure_extends, RepositoryError, SessionRepository};

#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<String, ConversationSession>>,
}

#[async_trait::async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn load(&self, id: &SessionId) -> Result<Option<ConversationSession>, RepositoryError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(&id.0).cloned())
    }

    async fn save(&self, session: &ConversationSession) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        if let Some(stored) = sessions.get(&session.id.0) {
            ensure_extends(stored.turns(), session)?;
        }
        sessions.insert(session.id.0.clone(), session.clone());
        Ok(())
    }
}
