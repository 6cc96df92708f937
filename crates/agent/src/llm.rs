use async_trait::async_trait;
use serde_json::Value;

use crate::errors::BackendError;
use crate::tools::ToolDescriptor;

/// One call the generator asked for. `id` correlates the result back to it.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCallRequest {
    pub id: String,
    pub tool_name: String,
    pub arguments: Value,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolCallResult {
    pub id: String,
    pub tool_name: String,
    pub output: String,
}

/// A completed tool round: what was requested and what came back, in request order.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolExchange {
    pub requests: Vec<ToolCallRequest>,
    pub results: Vec<ToolCallResult>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub tools: Vec<ToolDescriptor>,
    /// Earlier tool rounds of the current turn, oldest first.
    pub exchanges: Vec<ToolExchange>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Generation {
    Final(String),
    ToolCalls(Vec<ToolCallRequest>),
}

/// Executes a prompt with tools offered under an auto-invoke policy.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, BackendError>;
}
