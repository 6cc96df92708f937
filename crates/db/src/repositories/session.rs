use chrono::Utc;
use sqlx::Row;

use pactum_core::domain::conversation::{ConversationSession, ConversationTurn, Role, SessionId};

use super::{ensure_extends, RepositoryError, SessionRepository};
use crate::DbPool;

pub struct SqlSessionRepository {
    pool: DbPool,
}

impl SqlSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_turn(row: &sqlx::sqlite::SqliteRow) -> Result<ConversationTurn, RepositoryError> {
    let role: String = row.try_get("role").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let message: String =
        row.try_get("message").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let role = role.parse::<Role>().map_err(|e| RepositoryError::Decode(e.to_string()))?;
    Ok(ConversationTurn::new(role, message))
}

#[async_trait::async_trait]
impl SessionRepository for SqlSessionRepository {
    async fn load(&self, id: &SessionId) -> Result<Option<ConversationSession>, RepositoryError> {
        let exists = sqlx::query("SELECT id FROM conversation_session WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Ok(None);
        }

        let rows = sqlx::query(
            "SELECT role, message FROM conversation_turn
             WHERE session_id = ? ORDER BY ordinal ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        let turns = rows.iter().map(row_to_turn).collect::<Result<Vec<_>, _>>()?;
        Ok(Some(ConversationSession::with_turns(id.clone(), turns)))
    }

    async fn save(&self, session: &ConversationSession) -> Result<(), RepositoryError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO conversation_session (id, created_at, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at",
        )
        .bind(&session.id.0)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        let rows = sqlx::query(
            "SELECT role, message FROM conversation_turn
             WHERE session_id = ? ORDER BY ordinal ASC",
        )
        .bind(&session.id.0)
        .fetch_all(&mut *tx)
        .await?;
        let stored = rows.iter().map(row_to_turn).collect::<Result<Vec<_>, _>>()?;
        ensure_extends(&stored, session)?;

        for (ordinal, turn) in session.turns().iter().enumerate().skip(stored.len()) {
            sqlx::query(
                "INSERT INTO conversation_turn (session_id, ordinal, role, message, created_at)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&session.id.0)
            .bind(ordinal as i64)
            .bind(turn.role.as_str())
            .bind(&turn.message)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pactum_core::domain::conversation::{
        ConversationSession, ConversationTurn, Role, SessionId,
    };

    use super::SqlSessionRepository;
    use crate::repositories::{RepositoryError, SessionRepository};
    use crate::{connect_with_settings, migrations};

    async fn repository() -> SqlSessionRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        SqlSessionRepository::new(pool)
    }

    #[tokio::test]
    async fn unknown_session_loads_as_none() {
        let repo = repository().await;
        let found = repo.load(&SessionId("missing".to_owned())).await.expect("load");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn saved_turns_reload_in_order_across_saves() {
        let repo = repository().await;
        let id = SessionId("conv-1".to_owned());
        let mut session = ConversationSession::new(id.clone());
        session.append(ConversationTurn::user("Who is the buyer?"));
        session.append(ConversationTurn::assistant("agreement file name is ACME_SPA.pdf"));
        repo.save(&session).await.expect("first save");

        session.append(ConversationTurn::assistant("ACME Corp."));
        repo.save(&session).await.expect("second save");

        let loaded = repo.load(&id).await.expect("load").expect("session exists");
        assert_eq!(loaded, session);
        assert_eq!(loaded.last().map(|turn| turn.role), Some(Role::Assistant));
    }

    #[tokio::test]
    async fn empty_session_is_persisted() {
        let repo = repository().await;
        let session = ConversationSession::new(SessionId("fresh".to_owned()));
        repo.save(&session).await.expect("save");

        let loaded = repo.load(&session.id).await.expect("load");
        assert_eq!(loaded, Some(session));
    }

    #[tokio::test]
    async fn shrinking_session_is_rejected() {
        let repo = repository().await;
        let id = SessionId("conv-2".to_owned());
        let session = ConversationSession::with_turns(
            id.clone(),
            vec![ConversationTurn::user("one"), ConversationTurn::assistant("two")],
        );
        repo.save(&session).await.expect("save");

        let stale = ConversationSession::with_turns(id, vec![ConversationTurn::user("one")]);
        let error = repo.save(&stale).await.expect_err("stale save should fail");
        assert!(matches!(error, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn diverging_history_is_rejected_and_stored_turns_are_kept() {
        let repo = repository().await;
        let id = SessionId("conv-3".to_owned());
        let base = vec![
            ConversationTurn::user("Which agreement covers ACME?"),
            ConversationTurn::assistant("agreement file name is ACME_SPA.pdf"),
        ];
        repo.save(&ConversationSession::with_turns(id.clone(), base.clone())).await.expect("base");

        let mut first = ConversationSession::with_turns(id.clone(), base.clone());
        first.append(ConversationTurn::user("Who is the buyer?"));
        first.append(ConversationTurn::assistant("ACME Corp."));

        let mut second = ConversationSession::with_turns(id.clone(), base);
        second.append(ConversationTurn::user("Who is the seller?"));
        second.append(ConversationTurn::assistant("agreement file name is Initech_SPA.pdf"));
        second.append(ConversationTurn::assistant("Initech LLC."));

        repo.save(&first).await.expect("first turn saves");
        let error = repo.save(&second).await.expect_err("diverged turn should fail");
        assert!(matches!(error, RepositoryError::Conflict(_)));

        let loaded = repo.load(&id).await.expect("load").expect("session exists");
        assert_eq!(loaded, first);
    }
}
