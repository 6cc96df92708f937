use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_PARTY_QUERY: &str = "with copies to or copy to";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    pub storage: StorageConfig,
    pub agent: AgentConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub endpoint: String,
    pub api_key: Option<SecretString>,
    /// Model name, or deployment name for Azure OpenAI.
    pub model: String,
    pub api_version: String,
    pub timeout_secs: u64,
}

/// Embedding deployment. Endpoint and key fall back to the `[llm]` section.
#[derive(Clone, Debug)]
pub struct EmbeddingConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<SecretString>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SearchConfig {
    pub endpoint: String,
    pub api_key: Option<SecretString>,
    pub index: String,
    pub semantic_config: String,
    pub vector_field: String,
    pub api_version: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub account_url: String,
    pub container: String,
    pub sas_token: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub system_prompt: Vec<String>,
    pub welcome_message: String,
    pub suggested_prompts: Vec<String>,
    pub max_tool_iterations: u32,
    pub file_name_min_score: f64,
    pub party_query: String,
}

impl AgentConfig {
    /// System prompt blocks joined by a blank line.
    pub fn system_instructions(&self) -> String {
        self.system_prompt.join("\n\n")
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LlmProvider {
    #[serde(rename = "azure_openai")]
    AzureOpenAi,
    #[serde(rename = "openai")]
    OpenAi,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_endpoint: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_model: Option<String>,
    pub search_endpoint: Option<String>,
    pub search_api_key: Option<String>,
    pub search_index: Option<String>,
    pub storage_account_url: Option<String>,
    pub storage_container: Option<String>,
    pub storage_sas_token: Option<String>,
    pub max_tool_iterations: Option<u32>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://pactum.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::AzureOpenAi,
                endpoint: String::new(),
                api_key: None,
                model: "gpt-4o".to_string(),
                api_version: "2024-06-01".to_string(),
                timeout_secs: 60,
            },
            embedding: EmbeddingConfig {
                endpoint: None,
                api_key: None,
                model: "text-embedding-3-small".to_string(),
                timeout_secs: 30,
            },
            search: SearchConfig {
                endpoint: String::new(),
                api_key: None,
                index: "agreements".to_string(),
                semantic_config: "default".to_string(),
                vector_field: "vector".to_string(),
                api_version: "2024-07-01".to_string(),
                timeout_secs: 30,
            },
            storage: StorageConfig {
                account_url: String::new(),
                container: "agreements".to_string(),
                sas_token: None,
                timeout_secs: 60,
            },
            agent: AgentConfig {
                system_prompt: vec![
                    "You are an assistant that answers questions about legal agreements such as \
                     stock purchase, asset purchase and securities purchase agreements."
                        .to_string(),
                    "Always resolve the agreement file name before searching or loading an \
                     agreement. Answer only from the retrieved agreement content and say so when \
                     the information is not available."
                        .to_string(),
                ],
                welcome_message: "Hello! Ask me about any agreement in the library.".to_string(),
                suggested_prompts: vec![
                    "Who are the buyer and seller in the ACME stock purchase agreement?"
                        .to_string(),
                    "What is the purchase price in the Globex asset purchase agreement?"
                        .to_string(),
                    "Summarize the termination clauses of the Initech agreement.".to_string(),
                ],
                max_tool_iterations: 8,
                file_name_min_score: 0.6,
                party_query: DEFAULT_PARTY_QUERY.to_string(),
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 3978,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "azure_openai" | "azure" => Ok(Self::AzureOpenAi),
            "openai" => Ok(Self::OpenAi),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected azure_openai|openai)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("pactum.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(endpoint) = llm.endpoint {
                self.llm.endpoint = endpoint;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(api_version) = llm.api_version {
                self.llm.api_version = api_version;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(embedding) = patch.embedding {
            if let Some(endpoint) = embedding.endpoint {
                self.embedding.endpoint = Some(endpoint);
            }
            if let Some(embedding_api_key_value) = embedding.api_key {
                self.embedding.api_key = Some(secret_value(embedding_api_key_value));
            }
            if let Some(model) = embedding.model {
                self.embedding.model = model;
            }
            if let Some(timeout_secs) = embedding.timeout_secs {
                self.embedding.timeout_secs = timeout_secs;
            }
        }

        if let Some(search) = patch.search {
            if let Some(endpoint) = search.endpoint {
                self.search.endpoint = endpoint;
            }
            if let Some(search_api_key_value) = search.api_key {
                self.search.api_key = Some(secret_value(search_api_key_value));
            }
            if let Some(index) = search.index {
                self.search.index = index;
            }
            if let Some(semantic_config) = search.semantic_config {
                self.search.semantic_config = semantic_config;
            }
            if let Some(vector_field) = search.vector_field {
                self.search.vector_field = vector_field;
            }
            if let Some(api_version) = search.api_version {
                self.search.api_version = api_version;
            }
            if let Some(timeout_secs) = search.timeout_secs {
                self.search.timeout_secs = timeout_secs;
            }
        }

        if let Some(storage) = patch.storage {
            if let Some(account_url) = storage.account_url {
                self.storage.account_url = account_url;
            }
            if let Some(container) = storage.container {
                self.storage.container = container;
            }
            if let Some(sas_token_value) = storage.sas_token {
                self.storage.sas_token = Some(secret_value(sas_token_value));
            }
            if let Some(timeout_secs) = storage.timeout_secs {
                self.storage.timeout_secs = timeout_secs;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(system_prompt) = agent.system_prompt {
                self.agent.system_prompt = system_prompt;
            }
            if let Some(welcome_message) = agent.welcome_message {
                self.agent.welcome_message = welcome_message;
            }
            if let Some(suggested_prompts) = agent.suggested_prompts {
                self.agent.suggested_prompts = suggested_prompts;
            }
            if let Some(max_tool_iterations) = agent.max_tool_iterations {
                self.agent.max_tool_iterations = max_tool_iterations;
            }
            if let Some(file_name_min_score) = agent.file_name_min_score {
                self.agent.file_name_min_score = file_name_min_score;
            }
            if let Some(party_query) = agent.party_query {
                self.agent.party_query = party_query;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("PACTUM_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("PACTUM_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("PACTUM_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("PACTUM_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("PACTUM_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PACTUM_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("PACTUM_LLM_ENDPOINT") {
            self.llm.endpoint = value;
        }
        if let Some(value) = read_env("PACTUM_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("PACTUM_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("PACTUM_LLM_API_VERSION") {
            self.llm.api_version = value;
        }
        if let Some(value) = read_env("PACTUM_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("PACTUM_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PACTUM_EMBEDDING_ENDPOINT") {
            self.embedding.endpoint = Some(value);
        }
        if let Some(value) = read_env("PACTUM_EMBEDDING_API_KEY") {
            self.embedding.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("PACTUM_EMBEDDING_MODEL") {
            self.embedding.model = value;
        }
        if let Some(value) = read_env("PACTUM_EMBEDDING_TIMEOUT_SECS") {
            self.embedding.timeout_secs = parse_u64("PACTUM_EMBEDDING_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PACTUM_SEARCH_ENDPOINT") {
            self.search.endpoint = value;
        }
        if let Some(value) = read_env("PACTUM_SEARCH_API_KEY") {
            self.search.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("PACTUM_SEARCH_INDEX") {
            self.search.index = value;
        }
        if let Some(value) = read_env("PACTUM_SEARCH_SEMANTIC_CONFIG") {
            self.search.semantic_config = value;
        }
        if let Some(value) = read_env("PACTUM_SEARCH_VECTOR_FIELD") {
            self.search.vector_field = value;
        }
        if let Some(value) = read_env("PACTUM_SEARCH_API_VERSION") {
            self.search.api_version = value;
        }
        if let Some(value) = read_env("PACTUM_SEARCH_TIMEOUT_SECS") {
            self.search.timeout_secs = parse_u64("PACTUM_SEARCH_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PACTUM_STORAGE_ACCOUNT_URL") {
            self.storage.account_url = value;
        }
        if let Some(value) = read_env("PACTUM_STORAGE_CONTAINER") {
            self.storage.container = value;
        }
        if let Some(value) = read_env("PACTUM_STORAGE_SAS_TOKEN") {
            self.storage.sas_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("PACTUM_STORAGE_TIMEOUT_SECS") {
            self.storage.timeout_secs = parse_u64("PACTUM_STORAGE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PACTUM_AGENT_SYSTEM_PROMPT") {
            self.agent.system_prompt = vec![value];
        }
        if let Some(value) = read_env("PACTUM_AGENT_WELCOME_MESSAGE") {
            self.agent.welcome_message = value;
        }
        if let Some(value) = read_env("PACTUM_AGENT_SUGGESTED_PROMPTS") {
            self.agent.suggested_prompts =
                parse_string_list("PACTUM_AGENT_SUGGESTED_PROMPTS", &value)?;
        }
        if let Some(value) = read_env("PACTUM_AGENT_MAX_TOOL_ITERATIONS") {
            self.agent.max_tool_iterations =
                parse_u32("PACTUM_AGENT_MAX_TOOL_ITERATIONS", &value)?;
        }
        if let Some(value) = read_env("PACTUM_AGENT_FILE_NAME_MIN_SCORE") {
            self.agent.file_name_min_score =
                parse_f64("PACTUM_AGENT_FILE_NAME_MIN_SCORE", &value)?;
        }
        if let Some(value) = read_env("PACTUM_AGENT_PARTY_QUERY") {
            self.agent.party_query = value;
        }

        if let Some(value) = read_env("PACTUM_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("PACTUM_SERVER_PORT") {
            self.server.port = parse_u16("PACTUM_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("PACTUM_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("PACTUM_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("PACTUM_LOGGING_LEVEL").or_else(|| read_env("PACTUM_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PACTUM_LOGGING_FORMAT").or_else(|| read_env("PACTUM_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_endpoint) = overrides.llm_endpoint {
            self.llm.endpoint = llm_endpoint;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(search_endpoint) = overrides.search_endpoint {
            self.search.endpoint = search_endpoint;
        }
        if let Some(search_api_key) = overrides.search_api_key {
            self.search.api_key = Some(secret_value(search_api_key));
        }
        if let Some(search_index) = overrides.search_index {
            self.search.index = search_index;
        }
        if let Some(storage_account_url) = overrides.storage_account_url {
            self.storage.account_url = storage_account_url;
        }
        if let Some(storage_container) = overrides.storage_container {
            self.storage.container = storage_container;
        }
        if let Some(storage_sas_token) = overrides.storage_sas_token {
            self.storage.sas_token = Some(secret_value(storage_sas_token));
        }
        if let Some(max_tool_iterations) = overrides.max_tool_iterations {
            self.agent.max_tool_iterations = max_tool_iterations;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_embedding(&self.embedding)?;
        validate_search(&self.search)?;
        validate_storage(&self.storage)?;
        validate_agent(&self.agent)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("pactum.toml"), PathBuf::from("config/pactum.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    validate_timeout("database.timeout_secs", database.timeout_secs)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    validate_http_url("llm.endpoint", &llm.endpoint)?;
    validate_timeout("llm.timeout_secs", llm.timeout_secs)?;

    if missing_secret(llm.api_key.as_ref()) {
        return Err(ConfigError::Validation(
            "llm.api_key is required for azure_openai/openai providers".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation(
            "llm.model must name a model (or the Azure deployment)".to_string(),
        ));
    }

    if llm.provider == LlmProvider::AzureOpenAi && llm.api_version.trim().is_empty() {
        return Err(ConfigError::Validation(
            "llm.api_version is required for the azure_openai provider".to_string(),
        ));
    }

    Ok(())
}

fn validate_embedding(embedding: &EmbeddingConfig) -> Result<(), ConfigError> {
    if let Some(endpoint) = &embedding.endpoint {
        validate_http_url("embedding.endpoint", endpoint)?;
    }
    if embedding.model.trim().is_empty() {
        return Err(ConfigError::Validation(
            "embedding.model must name an embedding model (or the Azure deployment)".to_string(),
        ));
    }

    validate_timeout("embedding.timeout_secs", embedding.timeout_secs)
}

fn validate_search(search: &SearchConfig) -> Result<(), ConfigError> {
    validate_http_url("search.endpoint", &search.endpoint)?;
    validate_timeout("search.timeout_secs", search.timeout_secs)?;

    if missing_secret(search.api_key.as_ref()) {
        return Err(ConfigError::Validation(
            "search.api_key is required. Use a query key from the search service".to_string(),
        ));
    }

    for (key, value) in [
        ("search.index", &search.index),
        ("search.semantic_config", &search.semantic_config),
        ("search.vector_field", &search.vector_field),
    ] {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!("{key} must not be empty")));
        }
    }

    Ok(())
}

fn validate_storage(storage: &StorageConfig) -> Result<(), ConfigError> {
    validate_http_url("storage.account_url", &storage.account_url)?;
    validate_timeout("storage.timeout_secs", storage.timeout_secs)?;

    if storage.container.trim().is_empty() {
        return Err(ConfigError::Validation("storage.container must not be empty".to_string()));
    }

    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.system_prompt.iter().all(|block| block.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "agent.system_prompt must contain at least one non-empty block".to_string(),
        ));
    }

    if agent.max_tool_iterations == 0 || agent.max_tool_iterations > 32 {
        return Err(ConfigError::Validation(
            "agent.max_tool_iterations must be in range 1..=32".to_string(),
        ));
    }

    if !(0.0..=1.0).contains(&agent.file_name_min_score) {
        return Err(ConfigError::Validation(
            "agent.file_name_min_score must be in range 0.0..=1.0".to_string(),
        ));
    }

    if agent.party_query.trim().is_empty() {
        return Err(ConfigError::Validation("agent.party_query must not be empty".to_string()));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_timeout(key: &str, timeout_secs: u64) -> Result<(), ConfigError> {
    if timeout_secs == 0 || timeout_secs > 300 {
        return Err(ConfigError::Validation(format!("{key} must be in range 1..=300")));
    }
    Ok(())
}

fn validate_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{key} is required")));
    }
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(ConfigError::Validation(format!("{key} must start with http:// or https://")));
    }
    Ok(())
}

fn missing_secret(secret: Option<&SecretString>) -> bool {
    secret.map(|value| value.expose_secret().trim().is_empty()).unwrap_or(true)
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| invalid_override(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|parsed| parsed.is_finite())
        .ok_or_else(|| invalid_override(key, value))
}

/// Suggested prompts arrive as a JSON array of strings.
fn parse_string_list(key: &str, value: &str) -> Result<Vec<String>, ConfigError> {
    serde_json::from_str::<Vec<String>>(value).map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    embedding: Option<EmbeddingPatch>,
    search: Option<SearchPatch>,
    storage: Option<StoragePatch>,
    agent: Option<AgentPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    endpoint: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    api_version: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct EmbeddingPatch {
    endpoint: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchPatch {
    endpoint: Option<String>,
    api_key: Option<String>,
    index: Option<String>,
    semantic_config: Option<String>,
    vector_field: Option<String>,
    api_version: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct StoragePatch {
    account_url: Option<String>,
    container: Option<String>,
    sas_token: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    system_prompt: Option<Vec<String>>,
    welcome_message: Option<String>,
    suggested_prompts: Option<Vec<String>>,
    max_tool_iterations: Option<u32>,
    file_name_min_score: Option<f64>,
    party_query: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
