use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use pactum_core::config::{AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

struct Field {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

impl Field {
    fn new(key: &'static str, env_keys: &'static [&'static str], value: impl Into<String>) -> Self {
        Self { key, env_keys, value: value.into() }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source =
            field_source(field.key, field.env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<Field> {
    vec![
        Field::new("database.url", &["PACTUM_DATABASE_URL"], &config.database.url),
        Field::new(
            "database.max_connections",
            &["PACTUM_DATABASE_MAX_CONNECTIONS"],
            config.database.max_connections.to_string(),
        ),
        Field::new(
            "database.timeout_secs",
            &["PACTUM_DATABASE_TIMEOUT_SECS"],
            config.database.timeout_secs.to_string(),
        ),
        Field::new("llm.provider", &["PACTUM_LLM_PROVIDER"], format!("{:?}", config.llm.provider)),
        Field::new("llm.endpoint", &["PACTUM_LLM_ENDPOINT"], &config.llm.endpoint),
        Field::new("llm.api_key", &["PACTUM_LLM_API_KEY"], redact_secret(config.llm.api_key.as_ref())),
        Field::new("llm.model", &["PACTUM_LLM_MODEL"], &config.llm.model),
        Field::new("llm.api_version", &["PACTUM_LLM_API_VERSION"], &config.llm.api_version),
        Field::new(
            "llm.timeout_secs",
            &["PACTUM_LLM_TIMEOUT_SECS"],
            config.llm.timeout_secs.to_string(),
        ),
        Field::new(
            "embedding.endpoint",
            &["PACTUM_EMBEDDING_ENDPOINT"],
            config.embedding.endpoint.as_deref().unwrap_or("<inherits llm.endpoint>"),
        ),
        Field::new(
            "embedding.api_key",
            &["PACTUM_EMBEDDING_API_KEY"],
            match config.embedding.api_key.as_ref() {
                Some(key) => redact_secret(Some(key)),
                None => "<inherits llm.api_key>".to_string(),
            },
        ),
        Field::new("embedding.model", &["PACTUM_EMBEDDING_MODEL"], &config.embedding.model),
        Field::new("search.endpoint", &["PACTUM_SEARCH_ENDPOINT"], &config.search.endpoint),
        Field::new(
            "search.api_key",
            &["PACTUM_SEARCH_API_KEY"],
            redact_secret(config.search.api_key.as_ref()),
        ),
        Field::new("search.index", &["PACTUM_SEARCH_INDEX"], &config.search.index),
        Field::new(
            "search.semantic_config",
            &["PACTUM_SEARCH_SEMANTIC_CONFIG"],
            &config.search.semantic_config,
        ),
        Field::new("search.vector_field", &["PACTUM_SEARCH_VECTOR_FIELD"], &config.search.vector_field),
        Field::new(
            "storage.account_url",
            &["PACTUM_STORAGE_ACCOUNT_URL"],
            &config.storage.account_url,
        ),
        Field::new("storage.container", &["PACTUM_STORAGE_CONTAINER"], &config.storage.container),
        Field::new(
            "storage.sas_token",
            &["PACTUM_STORAGE_SAS_TOKEN"],
            redact_secret(config.storage.sas_token.as_ref()),
        ),
        Field::new(
            "agent.max_tool_iterations",
            &["PACTUM_AGENT_MAX_TOOL_ITERATIONS"],
            config.agent.max_tool_iterations.to_string(),
        ),
        Field::new(
            "agent.file_name_min_score",
            &["PACTUM_AGENT_FILE_NAME_MIN_SCORE"],
            config.agent.file_name_min_score.to_string(),
        ),
        Field::new("agent.party_query", &["PACTUM_AGENT_PARTY_QUERY"], &config.agent.party_query),
        Field::new(
            "agent.suggested_prompts",
            &["PACTUM_AGENT_SUGGESTED_PROMPTS"],
            config.agent.suggested_prompts.len().to_string() + " prompt(s)",
        ),
        Field::new("server.bind_address", &["PACTUM_SERVER_BIND_ADDRESS"], &config.server.bind_address),
        Field::new("server.port", &["PACTUM_SERVER_PORT"], config.server.port.to_string()),
        Field::new(
            "logging.level",
            &["PACTUM_LOGGING_LEVEL", "PACTUM_LOG_LEVEL"],
            &config.logging.level,
        ),
        Field::new(
            "logging.format",
            &["PACTUM_LOGGING_FORMAT", "PACTUM_LOG_FORMAT"],
            format!("{:?}", config.logging.format),
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("pactum.toml"), PathBuf::from("config/pactum.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(secret: Option<&SecretString>) -> String {
    match secret.map(|value| value.expose_secret().trim().is_empty()) {
        None => "<unset>".to_string(),
        Some(true) => "<empty>".to_string(),
        Some(false) => "<redacted>".to_string(),
    }
}
