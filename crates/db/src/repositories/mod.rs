use async_trait::async_trait;
use thiserror::Error;

use pactum_core::domain::conversation::{ConversationSession, ConversationTurn, SessionId};

pub mod memory;
pub mod session;

pub use memory::InMemorySessionRepository;
pub use session::SqlSessionRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Conversation sessions persisted between turns.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn load(&self, id: &SessionId) -> Result<Option<ConversationSession>, RepositoryError>;
    /// Stores turns not yet persisted. The stored turns must be a prefix of
    /// `session`, otherwise the save is a [`RepositoryError::Conflict`].
    async fn save(&self, session: &ConversationSession) -> Result<(), RepositoryError>;
}

/// Rejects a save whose history diverged from what is already stored.
pub(crate) fn ensure_extends(
    stored: &[ConversationTurn],
    session: &ConversationSession,
) -> Result<(), RepositoryError> {
    if stored.len() > session.len() {
        return Err(RepositoryError::Conflict(format!(
            "session `{}` has {} stored turns but only {} in memory",
            session.id,
            stored.len(),
            session.len()
        )));
    }
    if let Some(ordinal) =
        stored.iter().zip(session.turns()).position(|(stored, current)| stored != current)
    {
        return Err(RepositoryError::Conflict(format!(
            "session `{}` diverged from the stored history at turn {ordinal}",
            session.id
        )));
    }
    Ok(())
}
