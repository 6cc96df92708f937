use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::conversation::SessionLog;
use crate::errors::BackendError;
use crate::llm::{
    Generation, GenerationBackend, GenerationRequest, ToolCallRequest, ToolCallResult,
    ToolExchange,
};
use crate::retrieval::with_timeout;
use crate::tools::{invoke_validated, Tool, ToolRegistry};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeLimits {
    /// Maximum generation calls per turn.
    pub max_tool_iterations: u32,
    pub generation_timeout: Duration,
}

impl Default for RuntimeLimits {
    fn default() -> Self {
        Self { max_tool_iterations: 8, generation_timeout: Duration::from_secs(60) }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OrchestrationError {
    #[error("generation failed: {0}")]
    Generation(#[from] BackendError),
    #[error("generation requested unknown tool `{0}`")]
    UnknownTool(String),
    #[error("generation still requested tools after {limit} rounds")]
    IterationLimitExceeded { limit: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrchestrationState {
    AwaitingPrompt,
    Generating { iteration: u32 },
    ExecutingTools { iteration: u32, calls: usize },
    FinalAnswer,
    Failed,
}

/// Runs the generate → execute tools → regenerate loop for one turn.
pub struct AgentRuntime {
    backend: Arc<dyn GenerationBackend>,
    limits: RuntimeLimits,
}

impl AgentRuntime {
    pub fn new(backend: Arc<dyn GenerationBackend>, limits: RuntimeLimits) -> Self {
        Self { backend, limits }
    }

    /// Returns the final answer text. The prompt is re-rendered from the
    /// session before every generation so grounding appended by tools is seen.
    pub async fn run(
        &self,
        system_instructions: &str,
        session: &SessionLog,
        registry: &ToolRegistry,
    ) -> Result<String, OrchestrationError> {
        let correlation_id = session.id().to_string();
        let limit = self.limits.max_tool_iterations;
        let descriptors = registry.descriptors();
        let mut exchanges: Vec<ToolExchange> = Vec::new();
        let mut state = OrchestrationState::AwaitingPrompt;

        for iteration in 1..=limit {
            state = transition(&correlation_id, state, OrchestrationState::Generating { iteration });
            let prompt = session.render_prompt(system_instructions).await;
            debug!(correlation_id = %correlation_id, iteration, prompt = %prompt, "rendered prompt");

            let request =
                GenerationRequest { prompt, tools: descriptors.clone(), exchanges: exchanges.clone() };
            let generation = match with_timeout(
                "generation",
                self.limits.generation_timeout,
                self.backend.generate(&request),
            )
            .await
            {
                Ok(generation) => generation,
                Err(error) => {
                    transition(&correlation_id, state, OrchestrationState::Failed);
                    return Err(error.into());
                }
            };

            let calls = match generation {
                Generation::Final(text) => {
                    info!(
                        event_name = "agent.generation.completed",
                        correlation_id = %correlation_id,
                        iteration,
                        outcome = "final",
                        "generation produced final answer"
                    );
                    transition(&correlation_id, state, OrchestrationState::FinalAnswer);
                    return Ok(text);
                }
                Generation::ToolCalls(calls) if calls.is_empty() => {
                    transition(&correlation_id, state, OrchestrationState::Failed);
                    return Err(BackendError::invalid_response(
                        "generation",
                        "tool call response carried no calls",
                    )
                    .into());
                }
                Generation::ToolCalls(calls) => calls,
            };

            info!(
                event_name = "agent.generation.completed",
                correlation_id = %correlation_id,
                iteration,
                outcome = "tool_calls",
                requested = calls.len(),
                "generation requested tools"
            );

            if iteration == limit {
                break;
            }

            let tools = match resolve_all(registry, &calls) {
                Ok(tools) => tools,
                Err(error) => {
                    transition(&correlation_id, state, OrchestrationState::Failed);
                    return Err(error);
                }
            };
            state = transition(
                &correlation_id,
                state,
                OrchestrationState::ExecutingTools { iteration, calls: calls.len() },
            );

            let results = execute_calls(&correlation_id, &calls, tools).await;
            exchanges.push(ToolExchange { requests: calls, results });
        }

        warn!(
            event_name = "agent.turn.iteration_limit",
            correlation_id = %correlation_id,
            limit,
            "tool loop hit its iteration bound"
        );
        transition(&correlation_id, state, OrchestrationState::Failed);
        Err(OrchestrationError::IterationLimitExceeded { limit })
    }
}

fn transition(
    correlation_id: &str,
    from: OrchestrationState,
    to: OrchestrationState,
) -> OrchestrationState {
    debug!(correlation_id = %correlation_id, from = ?from, to = ?to, "orchestration state");
    to
}

/// Resolves every requested name before anything runs; one unknown name fails the round.
fn resolve_all(
    registry: &ToolRegistry,
    calls: &[ToolCallRequest],
) -> Result<Vec<Arc<dyn Tool>>, OrchestrationError> {
    calls
        .iter()
        .map(|call| {
            registry
                .resolve(&call.tool_name)
                .ok_or_else(|| OrchestrationError::UnknownTool(call.tool_name.clone()))
        })
        .collect()
}

/// Runs the calls concurrently and returns results in request order.
async fn execute_calls(
    correlation_id: &str,
    calls: &[ToolCallRequest],
    tools: Vec<Arc<dyn Tool>>,
) -> Vec<ToolCallResult> {
    let mut tasks = JoinSet::new();
    for (index, (call, tool)) in calls.iter().zip(tools).enumerate() {
        info!(
            event_name = "agent.tool.invoked",
            correlation_id = %correlation_id,
            tool = %call.tool_name,
            call_id = %call.id,
            "invoking tool"
        );
        let arguments = call.arguments.clone();
        tasks.spawn(async move { (index, invoke_validated(tool.as_ref(), &arguments).await) });
    }

    let mut outputs: Vec<Option<String>> = vec![None; calls.len()];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, Ok(output))) => outputs[index] = Some(output),
            Ok((index, Err(error))) => {
                warn!(
                    event_name = "agent.tool.failed",
                    correlation_id = %correlation_id,
                    tool = %calls[index].tool_name,
                    error = %error,
                    "tool call failed"
                );
                outputs[index] = Some(error.to_tool_output());
            }
            Err(join_error) => {
                warn!(
                    event_name = "agent.tool.failed",
                    correlation_id = %correlation_id,
                    error = %join_error,
                    "tool task aborted"
                );
            }
        }
    }

    calls
        .iter()
        .zip(outputs)
        .map(|(call, output)| ToolCallResult {
            id: call.id.clone(),
            tool_name: call.tool_name.clone(),
            output: output.unwrap_or_else(|| "Error: the tool stopped unexpectedly.".to_owned()),
        })
        .collect()
}
