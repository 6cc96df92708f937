use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use pactum_core::domain::passage::RetrievedPassage;
use serde_json::{json, Map, Value};

use crate::conversation::SessionLog;
use crate::errors::ToolError;
use crate::notify::Notifier;
use crate::retrieval::{DocumentLoader, EmbeddingClient, HybridRetrievalClient};

pub mod file_name;
pub mod load;
pub mod parties;
pub mod search;

pub use file_name::FileNameResolver;
pub use load::AgreementLoader;
pub use parties::PartyFinder;
pub use search::AgreementSearcher;

pub const NO_AGREEMENT_FOUND: &str = "No agreement found.";
pub const NO_INFO_FOUND: &str = "No info found.";
pub const AGREEMENT_NOT_FOUND: &str = "agreement not found.";
pub const SEARCH_RESULTS_BANNER: &str = "[SEARCH RESULTS]";
pub const ENTIRE_PDF_CONTENT: &str = "[ENTIRE PDF CONTENT]";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParameterKind {
    String,
    Integer,
    Number,
    Boolean,
}

impl ParameterKind {
    pub fn json_type(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolParameter {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: ParameterKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Vec<ToolParameter>,
    pub return_description: &'static str,
}

impl ToolDescriptor {
    /// JSON Schema object for the parameters; every parameter is required.
    pub fn parameters_schema(&self) -> Value {
        let properties = self
            .parameters
            .iter()
            .map(|parameter| {
                (
                    parameter.name.to_owned(),
                    json!({
                        "type": parameter.kind.json_type(),
                        "description": parameter.description,
                    }),
                )
            })
            .collect::<Map<String, Value>>();
        let required = self.parameters.iter().map(|parameter| parameter.name).collect::<Vec<_>>();

        json!({ "type": "object", "properties": properties, "required": required })
    }
}

/// The closed set of tools the generator may call, resolved strictly by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ToolKind {
    FileName,
    Parties,
    Search,
    Load,
}

impl ToolKind {
    pub const ALL: [ToolKind; 4] = [Self::FileName, Self::Parties, Self::Search, Self::Load];

    pub fn name(&self) -> &'static str {
        match self {
            Self::FileName => "find_agreement_file_name",
            Self::Parties => "find_agreement_parties",
            Self::Search => "search_agreement",
            Self::Load => "load_agreement",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn kind(&self) -> ToolKind;
    fn descriptor(&self) -> ToolDescriptor;
    /// Runs with arguments already checked against [`Tool::descriptor`].
    async fn invoke(&self, arguments: &Map<String, Value>) -> Result<String, ToolError>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolSettings {
    pub file_name_min_score: f64,
    pub party_query: String,
}

/// Everything a tool closes over for one session turn.
#[derive(Clone)]
pub struct ToolContext {
    pub session: SessionLog,
    pub notifier: Arc<dyn Notifier>,
    pub embeddings: Arc<EmbeddingClient>,
    pub retrieval: Arc<HybridRetrievalClient>,
    pub documents: Arc<DocumentLoader>,
    pub settings: ToolSettings,
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<ToolKind, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// The four agreement tools bound to one session.
    pub fn for_session(context: ToolContext) -> Self {
        let mut registry = Self::default();
        registry.register(FileNameResolver::new(context.clone()));
        registry.register(PartyFinder::new(context.clone()));
        registry.register(AgreementSearcher::new(context.clone()));
        registry.register(AgreementLoader::new(context));
        registry
    }

    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.kind(), Arc::new(tool));
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Tool>> {
        ToolKind::from_name(name).and_then(|kind| self.tools.get(&kind).cloned())
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.values().map(|tool| tool.descriptor()).collect()
    }
}

/// Checks backend-supplied arguments: an object holding every declared
/// parameter with a matching JSON type. Extra keys are ignored.
pub fn validate_arguments<'a>(
    descriptor: &ToolDescriptor,
    arguments: &'a Value,
) -> Result<&'a Map<String, Value>, ToolError> {
    let Some(object) = arguments.as_object() else {
        return Err(ToolError::invalid_arguments(descriptor.name, "arguments must be an object"));
    };

    for parameter in &descriptor.parameters {
        match object.get(parameter.name) {
            None | Some(Value::Null) => {
                return Err(ToolError::invalid_arguments(
                    descriptor.name,
                    format!("missing required parameter `{}`", parameter.name),
                ));
            }
            Some(value) if !parameter.kind.accepts(value) => {
                return Err(ToolError::invalid_arguments(
                    descriptor.name,
                    format!("parameter `{}` must be a {}", parameter.name, parameter.kind.json_type()),
                ));
            }
            Some(_) => {}
        }
    }

    Ok(object)
}

pub async fn invoke_validated(tool: &dyn Tool, arguments: &Value) -> Result<String, ToolError> {
    let descriptor = tool.descriptor();
    let arguments = validate_arguments(&descriptor, arguments)?;
    tool.invoke(arguments).await
}

pub(crate) fn string_argument<'a>(
    tool: ToolKind,
    arguments: &'a Map<String, Value>,
    name: &str,
) -> Result<&'a str, ToolError> {
    arguments
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::invalid_arguments(tool.name(), format!("`{name}` must be a string")))
}

/// Renders passages under the results banner, one Title/Content block each.
pub fn format_search_results(passages: &[RetrievedPassage]) -> String {
    if passages.is_empty() {
        return NO_INFO_FOUND.to_owned();
    }

    let mut output = format!("{SEARCH_RESULTS_BANNER}\n\n");
    for passage in passages {
        output.push_str(&format!(
            "Title: {} \n\nContent: {}\n*****\n\n",
            passage.title, passage.chunk
        ));
    }
    output
}
