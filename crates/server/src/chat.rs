use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use pactum_agent::notify::{Notice, Notifier, NotifyError};
use pactum_agent::AgreementAssistant;
use pactum_core::domain::conversation::{ConversationSession, SessionId};
use pactum_core::errors::{ApplicationError, InterfaceError};
use pactum_db::{RepositoryError, SessionRepository};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

#[derive(Clone)]
pub struct ChatState {
    assistant: Arc<AgreementAssistant>,
    sessions: Arc<dyn SessionRepository>,
    turn_locks: Arc<Mutex<HashMap<SessionId, Arc<Mutex<()>>>>>,
}

impl ChatState {
    pub fn new(assistant: Arc<AgreementAssistant>, sessions: Arc<dyn SessionRepository>) -> Self {
        Self { assistant, sessions, turn_locks: Arc::default() }
    }

    /// Waits until no other turn holds `session_id`; the guard covers load through save.
    async fn lock_session(&self, session_id: &SessionId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.turn_locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(session_id.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// One outbound item of a chat response, in delivery order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Activity {
    Typing,
    Message {
        text: String,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        suggested_actions: Vec<String>,
    },
}

impl Activity {
    fn message(text: impl Into<String>) -> Self {
        Self::Message { text: text.into(), suggested_actions: Vec::new() }
    }
}

impl From<Notice> for Activity {
    fn from(notice: Notice) -> Self {
        match notice {
            Notice::Typing => Self::Typing,
            Notice::Text(text) => Self::message(text),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ActivitiesResponse {
    pub activities: Vec<Activity>,
}

#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct ChatError {
    pub error: &'static str,
    pub correlation_id: String,
}

type ChatResult<T> = Result<Json<T>, (StatusCode, Json<ChatError>)>;

pub fn router(state: ChatState) -> Router {
    Router::new()
        .route("/api/sessions/{id}/start", post(start_session))
        .route("/api/sessions/{id}/messages", post(post_message))
        .with_state(state)
}

/// Holds notices raised during a turn so they ship with the reply.
#[derive(Default)]
struct BufferedNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl BufferedNotifier {
    async fn take(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.lock().await)
    }
}

#[async_trait]
impl Notifier for BufferedNotifier {
    async fn notify(&self, notice: Notice) -> Result<(), NotifyError> {
        self.notices.lock().await.push(notice);
        Ok(())
    }
}

pub async fn start_session(
    State(state): State<ChatState>,
    Path(id): Path<String>,
) -> ChatResult<ActivitiesResponse> {
    let session_id = SessionId(id);
    let _turn = state.lock_session(&session_id).await;
    let existing =
        state.sessions.load(&session_id).await.map_err(|e| reject(persistence(e), &session_id))?;
    if existing.is_none() {
        state
            .sessions
            .save(&ConversationSession::new(session_id.clone()))
            .await
            .map_err(|e| reject(persistence(e), &session_id))?;
    }

    let welcome = state.assistant.on_session_start();
    info!(
        event_name = "system.server.session_started",
        correlation_id = %session_id,
        resumed = existing.is_some(),
        "session welcome sent"
    );

    Ok(Json(ActivitiesResponse {
        activities: vec![Activity::Message {
            text: welcome.text,
            suggested_actions: welcome.suggested_prompts,
        }],
    }))
}

pub async fn post_message(
    State(state): State<ChatState>,
    Path(id): Path<String>,
    Json(inbound): Json<InboundMessage>,
) -> ChatResult<ActivitiesResponse> {
    let session_id = SessionId(id);
    let _turn = state.lock_session(&session_id).await;
    let session = state
        .sessions
        .load(&session_id)
        .await
        .map_err(|e| reject(persistence(e), &session_id))?
        .unwrap_or_else(|| ConversationSession::new(session_id.clone()));

    let notifier = Arc::new(BufferedNotifier::default());
    let outcome = state
        .assistant
        .process_message(session, &inbound.text, notifier.clone())
        .await
        .map_err(|e| reject(e, &session_id))?;

    state.sessions.save(&outcome.session).await.map_err(|e| reject(persistence(e), &session_id))?;

    let mut activities: Vec<Activity> =
        notifier.take().await.into_iter().map(Activity::from).collect();
    activities.push(Activity::message(outcome.reply));

    Ok(Json(ActivitiesResponse { activities }))
}

fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

fn reject(error: ApplicationError, session_id: &SessionId) -> (StatusCode, Json<ChatError>) {
    let error = error.into_interface(session_id.to_string());
    let status = match &error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(
        event_name = "system.server.request_rejected",
        correlation_id = %error.correlation_id(),
        status = status.as_u16(),
        error = %error,
        "chat request rejected"
    );

    (
        status,
        Json(ChatError {
            error: error.user_message(),
            correlation_id: error.correlation_id().to_owned(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::{
        body::Body,
        extract::{Path, State},
        http::{Request, StatusCode},
        Json,
    };
    use pactum_agent::assistant::APOLOGY_REPLY;
    use pactum_agent::llm::{Generation, GenerationBackend, GenerationRequest, ToolCallRequest};
    use pactum_agent::retrieval::{
        DocumentLoader, DocumentStore, EmbeddingBackend, EmbeddingClient, HybridQuery,
        HybridRetrievalClient, SearchBackend, TextExtractor,
    };
    use pactum_agent::tools::ToolSettings;
    use pactum_agent::{
        AgreementAssistant, AssistantServices, AssistantSettings, BackendError, RuntimeLimits,
    };
    use pactum_core::domain::conversation::{ConversationSession, ConversationTurn, SessionId};
    use pactum_core::RetrievedPassage;
    use pactum_db::{InMemorySessionRepository, SessionRepository};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::{post_message, router, start_session, Activity, ChatState, InboundMessage};

    const TIMEOUT: Duration = Duration::from_secs(5);

    struct ScriptedGeneration {
        steps: Mutex<VecDeque<Result<Generation, BackendError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedGeneration {
        fn new(steps: Vec<Result<Generation, BackendError>>) -> Arc<Self> {
            Arc::new(Self { steps: Mutex::new(steps.into()), prompts: Mutex::new(Vec::new()) })
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().expect("prompts lock").clone()
        }
    }

    #[async_trait]
    impl GenerationBackend for ScriptedGeneration {
        async fn generate(&self, request: &GenerationRequest) -> Result<Generation, BackendError> {
            tokio::task::yield_now().await;
            self.prompts.lock().expect("prompts lock").push(request.prompt.clone());
            self.steps
                .lock()
                .expect("steps lock")
                .pop_front()
                .unwrap_or_else(|| Ok(Generation::Final("done".to_owned())))
        }
    }

    struct StaticEmbedding;

    #[async_trait]
    impl EmbeddingBackend for StaticEmbedding {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
            Ok(texts.iter().map(|_| vec![0.1, 0.2, 0.3]).collect())
        }
    }

    struct StaticSearch(Vec<RetrievedPassage>);

    #[async_trait]
    impl SearchBackend for StaticSearch {
        async fn search(&self, _query: &HybridQuery) -> Result<Vec<RetrievedPassage>, BackendError> {
            Ok(self.0.clone())
        }
    }

    struct EmptyStore;

    #[async_trait]
    impl DocumentStore for EmptyStore {
        async fn exists(&self, _name: &str) -> Result<bool, BackendError> {
            Ok(false)
        }

        async fn download(&self, name: &str) -> Result<Vec<u8>, BackendError> {
            Err(BackendError::unavailable("storage", format!("{name} is not stored")))
        }
    }

    struct NoText;

    impl TextExtractor for NoText {
        fn extract_pages(&self, _bytes: &[u8]) -> Result<Vec<String>, BackendError> {
            Ok(Vec::new())
        }
    }

    struct Fixture {
        state: ChatState,
        sessions: Arc<InMemorySessionRepository>,
        generation: Arc<ScriptedGeneration>,
    }

    fn fixture(steps: Vec<Result<Generation, BackendError>>) -> Fixture {
        let generation = ScriptedGeneration::new(steps);
        let services = AssistantServices {
            generation: generation.clone(),
            embeddings: Arc::new(EmbeddingClient::new(Arc::new(StaticEmbedding), TIMEOUT)),
            retrieval: Arc::new(HybridRetrievalClient::new(
                Arc::new(StaticSearch(vec![RetrievedPassage {
                    title: "ACME_SPA.pdf".to_owned(),
                    chunk: "The purchase price is USD 12,000,000.".to_owned(),
                    path: None,
                    score: 0.91,
                }])),
                "default",
                TIMEOUT,
            )),
            documents: Arc::new(DocumentLoader::new(Arc::new(EmptyStore), Arc::new(NoText), TIMEOUT)),
        };
        let settings = AssistantSettings {
            system_instructions: "You answer questions about agreements.".to_owned(),
            welcome_message: "Hello, ask me about an agreement.".to_owned(),
            suggested_prompts: vec!["Who are the parties?".to_owned()],
            limits: RuntimeLimits::default(),
            tools: ToolSettings {
                file_name_min_score: 0.6,
                party_query: "with copies to or copy to".to_owned(),
            },
        };
        let sessions = Arc::new(InMemorySessionRepository::default());
        let state = ChatState::new(
            Arc::new(AgreementAssistant::new(services, settings)),
            sessions.clone(),
        );
        Fixture { state, sessions, generation }
    }

    fn search_call() -> Generation {
        Generation::ToolCalls(vec![ToolCallRequest {
            id: "call-1".to_owned(),
            tool_name: "search_agreement".to_owned(),
            arguments: json!({"agreement": "ACME_SPA.pdf", "query": "purchase price"}),
        }])
    }

    #[tokio::test]
    async fn start_sends_welcome_with_suggestions_and_creates_session() {
        let fixture = fixture(Vec::new());

        let Json(response) =
            start_session(State(fixture.state.clone()), Path("conv-1".to_owned()))
                .await
                .expect("start should succeed");

        assert_eq!(
            response.activities,
            vec![Activity::Message {
                text: "Hello, ask me about an agreement.".to_owned(),
                suggested_actions: vec!["Who are the parties?".to_owned()],
            }]
        );
        let stored = fixture.sessions.load(&SessionId("conv-1".to_owned())).await.expect("load");
        assert_eq!(stored.map(|session| session.len()), Some(0));
    }

    #[tokio::test]
    async fn message_route_returns_typing_notices_and_reply_in_order() {
        let fixture = fixture(vec![
            Ok(search_call()),
            Ok(Generation::Final("The purchase price is USD 12,000,000.".to_owned())),
        ]);

        let response = router(fixture.state.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/sessions/conv-2/messages")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"text":"What is the ACME purchase price?"}"#))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let payload: Value = serde_json::from_slice(&bytes).expect("json body");
        assert_eq!(
            payload,
            json!({"activities": [
                {"type": "typing"},
                {"type": "message", "text": "Searching ...ACME_SPA.pdf"},
                {"type": "message", "text": "The purchase price is USD 12,000,000."},
            ]})
        );

        let stored = fixture
            .sessions
            .load(&SessionId("conv-2".to_owned()))
            .await
            .expect("load")
            .expect("session saved");
        assert_eq!(
            stored.turns(),
            &[
                ConversationTurn::user("What is the ACME purchase price?"),
                ConversationTurn::assistant("The purchase price is USD 12,000,000."),
            ]
        );
    }

    #[tokio::test]
    async fn stored_history_is_rendered_into_the_next_prompt() {
        let fixture = fixture(vec![Ok(Generation::Final("ACME Corp.".to_owned()))]);
        let id = SessionId("conv-3".to_owned());
        fixture
            .sessions
            .save(&ConversationSession::with_turns(
                id.clone(),
                vec![
                    ConversationTurn::user("Which agreement covers ACME?"),
                    ConversationTurn::assistant("agreement file name is ACME_SPA.pdf"),
                ],
            ))
            .await
            .expect("seed session");

        post_message(
            State(fixture.state.clone()),
            Path("conv-3".to_owned()),
            Json(InboundMessage { text: "Who is the buyer?".to_owned() }),
        )
        .await
        .expect("turn should succeed");

        let prompts = fixture.generation.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("assistant: agreement file name is ACME_SPA.pdf"));
        assert!(prompts[0].ends_with("user: Who is the buyer?"));

        let stored = fixture.sessions.load(&id).await.expect("load").expect("session");
        assert_eq!(stored.len(), 4);
    }

    #[tokio::test]
    async fn empty_message_is_a_bad_request_with_correlation_id() {
        let fixture = fixture(Vec::new());

        let (status, Json(error)) = post_message(
            State(fixture.state.clone()),
            Path("conv-4".to_owned()),
            Json(InboundMessage { text: "   ".to_owned() }),
        )
        .await
        .expect_err("empty text should be rejected");

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error.correlation_id, "conv-4");
        assert!(fixture.generation.prompts().is_empty());
        let stored = fixture.sessions.load(&SessionId("conv-4".to_owned())).await.expect("load");
        assert!(stored.is_none());
    }

    #[tokio::test]
    async fn failed_turn_replies_with_apology_and_keeps_user_turn() {
        let fixture =
            fixture(vec![Err(BackendError::unavailable("generation", "deployment offline"))]);

        let Json(response) = post_message(
            State(fixture.state.clone()),
            Path("conv-5".to_owned()),
            Json(InboundMessage { text: "Summarize the NDA".to_owned() }),
        )
        .await
        .expect("failed turns still answer");

        assert_eq!(response.activities.last(), Some(&Activity::message(APOLOGY_REPLY)));
        let stored = fixture
            .sessions
            .load(&SessionId("conv-5".to_owned()))
            .await
            .expect("load")
            .expect("session saved");
        assert_eq!(stored.turns(), &[ConversationTurn::user("Summarize the NDA")]);
    }

    #[tokio::test]
    async fn concurrent_messages_on_one_session_run_one_turn_at_a_time() {
        let fixture = fixture(vec![
            Ok(Generation::Final("The buyer is ACME Corp.".to_owned())),
            Ok(Generation::Final("The seller is Initech LLC.".to_owned())),
        ]);
        let send = |text: &str| {
            post_message(
                State(fixture.state.clone()),
                Path("conv-6".to_owned()),
                Json(InboundMessage { text: text.to_owned() }),
            )
        };

        let (first, second) = tokio::join!(send("Who is the buyer?"), send("Who is the seller?"));
        first.expect("first turn should succeed");
        second.expect("second turn should succeed");

        let prompts = fixture.generation.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("assistant: The buyer is ACME Corp."));

        let stored = fixture
            .sessions
            .load(&SessionId("conv-6".to_owned()))
            .await
            .expect("load")
            .expect("session saved");
        assert_eq!(
            stored.turns(),
            &[
                ConversationTurn::user("Who is the buyer?"),
                ConversationTurn::assistant("The buyer is ACME Corp."),
                ConversationTurn::user("Who is the seller?"),
                ConversationTurn::assistant("The seller is Initech LLC."),
            ]
        );
    }
}
