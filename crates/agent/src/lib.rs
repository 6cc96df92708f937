//! Agreement assistant runtime.
//!
//! A turn runs a bounded generate → act → regenerate loop:
//! 1. **History** (`conversation`) - the session log is rendered into one prompt
//! 2. **Generation** (`llm`) - the backend answers or asks for tool calls
//! 3. **Tools** (`tools`) - retrieval over the agreement index and document store
//! 4. **Reply** (`assistant`) - the final answer is appended and returned
//!
//! Backend I/O sits behind the traits in `llm` and `retrieval`; HTTP
//! implementations live in `pactum-backends`.

pub mod assistant;
pub mod conversation;
pub mod errors;
pub mod llm;
pub mod notify;
pub mod retrieval;
pub mod runtime;
pub mod tools;

#[cfg(test)]
pub(crate) mod test_support;

pub use assistant::{AgreementAssistant, AssistantServices, AssistantSettings, TurnOutcome, Welcome};
pub use errors::{BackendError, ToolError};
pub use runtime::{AgentRuntime, OrchestrationError, RuntimeLimits};
