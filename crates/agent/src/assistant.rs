use std::sync::Arc;
use std::time::Duration;

use pactum_core::config::AppConfig;
use pactum_core::domain::conversation::{ConversationSession, ConversationTurn};
use pactum_core::errors::{ApplicationError, DomainError};
use tracing::{error, info};

use crate::conversation::SessionLog;
use crate::llm::GenerationBackend;
use crate::notify::{notify_best_effort, Notice, Notifier};
use crate::retrieval::{DocumentLoader, EmbeddingClient, HybridRetrievalClient};
use crate::runtime::{AgentRuntime, RuntimeLimits};
use crate::tools::{ToolContext, ToolRegistry, ToolSettings};

pub const APOLOGY_REPLY: &str =
    "Sorry, I couldn't finish answering that. Please try again or rephrase the question.";

#[derive(Clone, Debug, PartialEq)]
pub struct AssistantSettings {
    pub system_instructions: String,
    pub welcome_message: String,
    pub suggested_prompts: Vec<String>,
    pub limits: RuntimeLimits,
    pub tools: ToolSettings,
}

impl AssistantSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            system_instructions: config.agent.system_instructions(),
            welcome_message: config.agent.welcome_message.clone(),
            suggested_prompts: config.agent.suggested_prompts.clone(),
            limits: RuntimeLimits {
                max_tool_iterations: config.agent.max_tool_iterations,
                generation_timeout: Duration::from_secs(config.llm.timeout_secs),
            },
            tools: ToolSettings {
                file_name_min_score: config.agent.file_name_min_score,
                party_query: config.agent.party_query.clone(),
            },
        }
    }
}

/// Shared backend clients; one set serves every session.
#[derive(Clone)]
pub struct AssistantServices {
    pub generation: Arc<dyn GenerationBackend>,
    pub embeddings: Arc<EmbeddingClient>,
    pub retrieval: Arc<HybridRetrievalClient>,
    pub documents: Arc<DocumentLoader>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Welcome {
    pub text: String,
    pub suggested_prompts: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TurnOutcome {
    pub session: ConversationSession,
    pub reply: String,
    /// True when the turn ended in the apology reply.
    pub failed: bool,
}

pub struct AgreementAssistant {
    services: AssistantServices,
    runtime: AgentRuntime,
    settings: AssistantSettings,
}

impl AgreementAssistant {
    pub fn new(services: AssistantServices, settings: AssistantSettings) -> Self {
        let runtime = AgentRuntime::new(services.generation.clone(), settings.limits.clone());
        Self { services, runtime, settings }
    }

    pub fn on_session_start(&self) -> Welcome {
        Welcome {
            text: self.settings.welcome_message.clone(),
            suggested_prompts: self.settings.suggested_prompts.clone(),
        }
    }

    /// Runs one turn. Fatal orchestration failures produce the apology reply,
    /// which is not recorded in the session.
    pub async fn process_message(
        &self,
        session: ConversationSession,
        inbound_text: &str,
        notifier: Arc<dyn Notifier>,
    ) -> Result<TurnOutcome, ApplicationError> {
        let inbound_text = inbound_text.trim();
        if inbound_text.is_empty() {
            return Err(DomainError::EmptyMessage.into());
        }

        let correlation_id = session.id.to_string();
        info!(
            event_name = "agent.turn.started",
            correlation_id = %correlation_id,
            prior_turns = session.len(),
            "processing inbound message"
        );

        let log = SessionLog::new(session);
        log.append(ConversationTurn::user(inbound_text)).await;
        notify_best_effort(notifier.as_ref(), Notice::Typing).await;

        let registry = ToolRegistry::for_session(ToolContext {
            session: log.clone(),
            notifier,
            embeddings: self.services.embeddings.clone(),
            retrieval: self.services.retrieval.clone(),
            documents: self.services.documents.clone(),
            settings: self.settings.tools.clone(),
        });

        let outcome = self.runtime.run(&self.settings.system_instructions, &log, &registry).await;
        drop(registry);

        match outcome {
            Ok(answer) => {
                log.append(ConversationTurn::assistant(answer.clone())).await;
                let session = log.into_session().await;
                info!(
                    event_name = "agent.turn.completed",
                    correlation_id = %correlation_id,
                    turns = session.len(),
                    "turn answered"
                );
                Ok(TurnOutcome { session, reply: answer, failed: false })
            }
            Err(failure) => {
                error!(
                    event_name = "agent.turn.failed",
                    correlation_id = %correlation_id,
                    error = %failure,
                    "turn ended without an answer"
                );
                Ok(TurnOutcome {
                    session: log.into_session().await,
                    reply: APOLOGY_REPLY.to_owned(),
                    failed: true,
                })
            }
        }
    }
}
