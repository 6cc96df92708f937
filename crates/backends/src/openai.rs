use async_trait::async_trait;
use pactum_agent::errors::BackendError;
use pactum_agent::llm::{Generation, GenerationBackend, GenerationRequest, ToolCallRequest};
use pactum_agent::retrieval::EmbeddingBackend;
use pactum_core::config::LlmProvider;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::debug;

use crate::http::{join_url, send_json};

/// Where and how to reach an OpenAI-compatible API.
#[derive(Clone)]
pub struct OpenAiEndpoint {
    pub provider: LlmProvider,
    pub base_url: String,
    pub api_key: SecretString,
    pub api_version: String,
}

impl OpenAiEndpoint {
    /// Azure addresses deployments by path; OpenAI takes the model in the body.
    fn url(&self, deployment: &str, operation: &str) -> String {
        match self.provider {
            LlmProvider::AzureOpenAi => format!(
                "{}?api-version={}",
                join_url(&self.base_url, &format!("openai/deployments/{deployment}/{operation}")),
                self.api_version
            ),
            LlmProvider::OpenAi => join_url(&self.base_url, operation),
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.provider {
            LlmProvider::AzureOpenAi => request.header("api-key", self.api_key.expose_secret()),
            LlmProvider::OpenAi => request.bearer_auth(self.api_key.expose_secret()),
        }
    }

    fn body_model<'a>(&self, model: &'a str) -> Option<&'a str> {
        match self.provider {
            LlmProvider::AzureOpenAi => None,
            LlmProvider::OpenAi => Some(model),
        }
    }
}

pub struct ChatCompletionsBackend {
    http: Client,
    endpoint: OpenAiEndpoint,
    model: String,
}

impl ChatCompletionsBackend {
    pub fn new(http: Client, endpoint: OpenAiEndpoint, model: impl Into<String>) -> Self {
        Self { http, endpoint, model: model.into() }
    }
}

#[async_trait]
impl GenerationBackend for ChatCompletionsBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, BackendError> {
        let body = build_chat_body(self.endpoint.body_model(&self.model), request);
        debug!(
            model = %self.model,
            tools = request.tools.len(),
            exchanges = request.exchanges.len(),
            "sending chat completion"
        );
        let http_request =
            self.http.post(self.endpoint.url(&self.model, "chat/completions")).json(&body);
        let response = send_json("generation", self.endpoint.authorize(http_request)).await?;
        parse_chat_response(&response)
    }
}

/// The rendered prompt is one user message; earlier tool rounds follow as
/// assistant tool calls and their tool results.
pub fn build_chat_body(model: Option<&str>, request: &GenerationRequest) -> Value {
    let mut messages = vec![json!({ "role": "user", "content": request.prompt })];
    for exchange in &request.exchanges {
        let tool_calls = exchange
            .requests
            .iter()
            .map(|call| {
                json!({
                    "id": call.id,
                    "type": "function",
                    "function": { "name": call.tool_name, "arguments": call.arguments.to_string() },
                })
            })
            .collect::<Vec<_>>();
        messages.push(json!({ "role": "assistant", "content": null, "tool_calls": tool_calls }));
        for result in &exchange.results {
            messages.push(json!({
                "role": "tool",
                "tool_call_id": result.id,
                "content": result.output,
            }));
        }
    }

    let mut body = json!({ "messages": messages });
    if let Some(model) = model {
        body["model"] = json!(model);
    }
    if !request.tools.is_empty() {
        let tools = request
            .tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": format!("{} Returns: {}", tool.description, tool.return_description),
                        "parameters": tool.parameters_schema(),
                    },
                })
            })
            .collect::<Vec<_>>();
        body["tools"] = json!(tools);
        body["tool_choice"] = json!("auto");
    }
    body
}

pub fn parse_chat_response(response: &Value) -> Result<Generation, BackendError> {
    let message = response
        .pointer("/choices/0/message")
        .ok_or_else(|| BackendError::invalid_response("generation", "missing choices[0].message"))?;

    let calls = message.get("tool_calls").and_then(Value::as_array).cloned().unwrap_or_default();
    if !calls.is_empty() {
        return calls.iter().map(parse_tool_call).collect::<Result<Vec<_>, _>>().map(Generation::ToolCalls);
    }

    message
        .get("content")
        .and_then(Value::as_str)
        .map(|content| Generation::Final(content.to_owned()))
        .ok_or_else(|| BackendError::invalid_response("generation", "message has no content"))
}

/// Unparseable argument text is passed through as a JSON string so argument
/// validation reports it as a tool error.
fn parse_tool_call(call: &Value) -> Result<ToolCallRequest, BackendError> {
    let id = call.get("id").and_then(Value::as_str).unwrap_or_default().to_owned();
    let function = call
        .get("function")
        .ok_or_else(|| BackendError::invalid_response("generation", "tool call without function"))?;
    let tool_name = function
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| BackendError::invalid_response("generation", "tool call without name"))?
        .to_owned();
    let raw_arguments = function.get("arguments").and_then(Value::as_str).unwrap_or("{}");
    let arguments = serde_json::from_str(raw_arguments)
        .unwrap_or_else(|_| Value::String(raw_arguments.to_owned()));

    Ok(ToolCallRequest { id, tool_name, arguments })
}

pub struct EmbeddingsBackend {
    http: Client,
    endpoint: OpenAiEndpoint,
    model: String,
}

impl EmbeddingsBackend {
    pub fn new(http: Client, endpoint: OpenAiEndpoint, model: impl Into<String>) -> Self {
        Self { http, endpoint, model: model.into() }
    }
}

#[async_trait]
impl EmbeddingBackend for EmbeddingsBackend {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
        let mut body = json!({ "input": texts });
        if let Some(model) = self.endpoint.body_model(&self.model) {
            body["model"] = json!(model);
        }
        let http_request = self.http.post(self.endpoint.url(&self.model, "embeddings")).json(&body);
        let response = send_json("embedding", self.endpoint.authorize(http_request)).await?;
        parse_embeddings_response(&response, texts.len())
    }
}

pub fn parse_embeddings_response(
    response: &Value,
    expected: usize,
) -> Result<Vec<Vec<f32>>, BackendError> {
    let data = response
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| BackendError::invalid_response("embedding", "missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index =
            item.get("index").and_then(Value::as_u64).map(|index| index as usize).unwrap_or(position);
        let vector = item
            .get("embedding")
            .and_then(Value::as_array)
            .ok_or_else(|| BackendError::invalid_response("embedding", "item without embedding"))?
            .iter()
            .map(|component| component.as_f64().map(|value| value as f32))
            .collect::<Option<Vec<f32>>>()
            .ok_or_else(|| BackendError::invalid_response("embedding", "non-numeric component"))?;
        indexed.push((index, vector));
    }

    if indexed.len() != expected {
        return Err(BackendError::invalid_response(
            "embedding",
            format!("expected {expected} vectors, got {}", indexed.len()),
        ));
    }
    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, vector)| vector).collect())
}

#[cfg(test)]
mod tests {
    use pactum_agent::errors::BackendError;
    use pactum_agent::llm::{
        Generation, GenerationRequest, ToolCallRequest, ToolCallResult, ToolExchange,
    };
    use pactum_agent::tools::{ParameterKind, ToolDescriptor, ToolParameter};
    use pactum_core::config::LlmProvider;
    use serde_json::json;

    use super::{build_chat_body, parse_chat_response, parse_embeddings_response, OpenAiEndpoint};

    fn endpoint(provider: LlmProvider) -> OpenAiEndpoint {
        OpenAiEndpoint {
            provider,
            base_url: "https://pactum.openai.azure.com/".to_owned(),
            api_key: "key".to_owned().into(),
            api_version: "2024-06-01".to_owned(),
        }
    }

    fn load_descriptor() -> ToolDescriptor {
        ToolDescriptor {
            name: "load_agreement",
            description: "Loads an agreement.",
            parameters: vec![ToolParameter {
                name: "agreement",
                description: "file name",
                kind: ParameterKind::String,
            }],
            return_description: "The text.",
        }
    }

    #[test]
    fn azure_urls_address_the_deployment() {
        assert_eq!(
            endpoint(LlmProvider::AzureOpenAi).url("gpt-4o", "chat/completions"),
            "https://pactum.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-06-01"
        );
        assert_eq!(
            endpoint(LlmProvider::OpenAi).url("gpt-4o", "embeddings"),
            "https://pactum.openai.azure.com/embeddings"
        );
    }

    #[test]
    fn chat_body_replays_tool_rounds_after_prompt() {
        let request = GenerationRequest {
            prompt: "system\n\nuser: load ACME".to_owned(),
            tools: vec![load_descriptor()],
            exchanges: vec![ToolExchange {
                requests: vec![ToolCallRequest {
                    id: "call-1".to_owned(),
                    tool_name: "load_agreement".to_owned(),
                    arguments: json!({"agreement": "ACME.pdf"}),
                }],
                results: vec![ToolCallResult {
                    id: "call-1".to_owned(),
                    tool_name: "load_agreement".to_owned(),
                    output: "agreement not found.".to_owned(),
                }],
            }],
        };

        let body = build_chat_body(Some("gpt-4o"), &request);

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["messages"][0], json!({"role": "user", "content": "system\n\nuser: load ACME"}));
        assert_eq!(body["messages"][1]["tool_calls"][0]["function"]["arguments"], r#"{"agreement":"ACME.pdf"}"#);
        assert_eq!(body["messages"][2]["role"], "tool");
        assert_eq!(body["messages"][2]["tool_call_id"], "call-1");
        assert_eq!(body["tools"][0]["function"]["parameters"]["required"], json!(["agreement"]));
    }

    #[test]
    fn chat_body_without_tools_omits_tool_choice() {
        let request =
            GenerationRequest { prompt: "hi".to_owned(), tools: Vec::new(), exchanges: Vec::new() };
        let body = build_chat_body(None, &request);
        assert!(body.get("tool_choice").is_none());
        assert!(body.get("model").is_none());
    }

    #[test]
    fn tool_call_response_parses_into_requests() {
        let response = json!({
            "choices": [{ "message": { "content": null, "tool_calls": [
                { "id": "c1", "type": "function",
                  "function": { "name": "search_agreement",
                                "arguments": "{\"agreement\":\"A.pdf\",\"query\":\"price\"}" } },
                { "id": "c2", "type": "function",
                  "function": { "name": "load_agreement", "arguments": "not json" } }
            ]}}]
        });

        let Ok(Generation::ToolCalls(calls)) = parse_chat_response(&response) else {
            panic!("expected tool calls");
        };
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].arguments, json!({"agreement": "A.pdf", "query": "price"}));
        assert_eq!(calls[1].arguments, json!("not json"));
    }

    #[test]
    fn text_response_is_final() {
        let response = json!({"choices": [{"message": {"content": "The buyer is ACME."}}]});
        assert_eq!(
            parse_chat_response(&response),
            Ok(Generation::Final("The buyer is ACME.".to_owned()))
        );
        assert!(matches!(
            parse_chat_response(&json!({"choices": []})),
            Err(BackendError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn embeddings_are_ordered_by_index() {
        let response = json!({"data": [
            {"index": 1, "embedding": [0.5, 0.25]},
            {"index": 0, "embedding": [1.0, 0.0]}
        ]});
        assert_eq!(
            parse_embeddings_response(&response, 2),
            Ok(vec![vec![1.0, 0.0], vec![0.5, 0.25]])
        );
        assert!(parse_embeddings_response(&response, 1).is_err());
    }
}
