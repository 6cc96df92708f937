use std::sync::Arc;

use async_trait::async_trait;
use pactum_agent::notify::{Notice, Notifier, NotifyError};
use pactum_agent::{AgreementAssistant, AssistantSettings, TurnOutcome};
use pactum_backends::build_services;
use pactum_core::config::{AppConfig, LoadOptions, LogFormat};
use pactum_core::domain::conversation::{ConversationSession, SessionId};
use pactum_db::{connect_with_settings, migrations, SessionRepository, SqlSessionRepository};
use uuid::Uuid;

use crate::commands::{block_on, CommandResult, Failure};

/// Progress notices go to stderr so stdout carries only the reply.
struct StderrNotifier;

#[async_trait]
impl Notifier for StderrNotifier {
    async fn notify(&self, notice: Notice) -> Result<(), NotifyError> {
        match notice {
            Notice::Typing => eprintln!("..."),
            Notice::Text(text) => eprintln!("{text}"),
        }
        Ok(())
    }
}

pub fn run(question: &str, session: Option<&str>) -> CommandResult {
    if question.trim().is_empty() {
        return CommandResult::failure("ask", "invalid_input", "question must not be empty", 2);
    }

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "ask",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };
    init_logging(&config);

    match block_on("ask", answer(&config, question, session)) {
        Ok(outcome) if outcome.failed => CommandResult { exit_code: 7, output: outcome.reply },
        Ok(outcome) => CommandResult { exit_code: 0, output: outcome.reply },
        Err(failure) => failure,
    }
}

async fn answer(
    config: &AppConfig,
    question: &str,
    session: Option<&str>,
) -> Result<TurnOutcome, Failure> {
    let services =
        build_services(config).map_err(|error| ("backend_wiring", error.to_string(), 4u8))?;
    let assistant = AgreementAssistant::new(services, AssistantSettings::from_config(config));

    let (conversation, repository) = match session {
        Some(id) => {
            let pool = connect_with_settings(
                &config.database.url,
                config.database.max_connections,
                config.database.timeout_secs,
            )
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
            migrations::run_pending(&pool)
                .await
                .map_err(|error| ("migration", error.to_string(), 5u8))?;

            let repository = SqlSessionRepository::new(pool);
            let id = SessionId(id.to_string());
            let conversation = repository
                .load(&id)
                .await
                .map_err(|error| ("persistence", error.to_string(), 5u8))?
                .unwrap_or_else(|| ConversationSession::new(id));
            (conversation, Some(repository))
        }
        None => (ConversationSession::new(SessionId(format!("cli-{}", Uuid::new_v4()))), None),
    };

    let outcome = assistant
        .process_message(conversation, question, Arc::new(StderrNotifier))
        .await
        .map_err(|error| ("turn", error.to_string(), 6u8))?;

    if let Some(repository) = repository {
        repository
            .save(&outcome.session)
            .await
            .map_err(|error| ("persistence", error.to_string(), 5u8))?;
    }

    Ok(outcome)
}

fn init_logging(config: &AppConfig) {
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(config.logging.level.as_str());

    // A subscriber may already be installed when commands run in-process.
    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
