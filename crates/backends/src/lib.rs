//! HTTP implementations of the assistant's backend contracts: OpenAI-compatible
//! chat and embeddings, Azure AI Search, blob storage, plus PDF page
//! extraction.

use std::sync::Arc;
use std::time::Duration;

use pactum_agent::assistant::AssistantServices;
use pactum_agent::retrieval::{DocumentLoader, EmbeddingClient, HybridRetrievalClient};
use pactum_core::config::AppConfig;
use thiserror::Error;

mod http;

pub mod blob;
pub mod openai;
pub mod pdf;
pub mod search;

use blob::BlobContainerStore;
use openai::{ChatCompletionsBackend, EmbeddingsBackend, OpenAiEndpoint};
use pdf::PdfTextExtractor;
use search::AzureSearchBackend;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("could not build http client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("missing secret `{0}`")]
    MissingSecret(&'static str),
    #[error("invalid url for `{field}`: {message}")]
    InvalidUrl { field: &'static str, message: String },
}

/// Wires every backend from validated configuration.
pub fn build_services(config: &AppConfig) -> Result<AssistantServices, BuildError> {
    let llm_key = config.llm.api_key.clone().ok_or(BuildError::MissingSecret("llm.api_key"))?;
    let search_key =
        config.search.api_key.clone().ok_or(BuildError::MissingSecret("search.api_key"))?;

    let chat_endpoint = OpenAiEndpoint {
        provider: config.llm.provider,
        base_url: config.llm.endpoint.clone(),
        api_key: llm_key.clone(),
        api_version: config.llm.api_version.clone(),
    };
    let embedding_endpoint = OpenAiEndpoint {
        base_url: config.embedding.endpoint.clone().unwrap_or_else(|| config.llm.endpoint.clone()),
        api_key: config.embedding.api_key.clone().unwrap_or(llm_key),
        ..chat_endpoint.clone()
    };

    let llm_timeout = Duration::from_secs(config.llm.timeout_secs);
    let embedding_timeout = Duration::from_secs(config.embedding.timeout_secs);
    let search_timeout = Duration::from_secs(config.search.timeout_secs);
    let storage_timeout = Duration::from_secs(config.storage.timeout_secs);

    let generation = ChatCompletionsBackend::new(
        http::client(llm_timeout)?,
        chat_endpoint,
        config.llm.model.clone(),
    );
    let embeddings = EmbeddingsBackend::new(
        http::client(embedding_timeout)?,
        embedding_endpoint,
        config.embedding.model.clone(),
    );
    let search = AzureSearchBackend::new(
        http::client(search_timeout)?,
        config.search.endpoint.clone(),
        config.search.index.clone(),
        search_key,
        config.search.api_version.clone(),
        config.search.vector_field.clone(),
    );
    let store = BlobContainerStore::new(
        http::client(storage_timeout)?,
        &config.storage.account_url,
        config.storage.container.clone(),
        config.storage.sas_token.clone(),
    )?;

    Ok(AssistantServices {
        generation: Arc::new(generation),
        embeddings: Arc::new(EmbeddingClient::new(Arc::new(embeddings), embedding_timeout)),
        retrieval: Arc::new(HybridRetrievalClient::new(
            Arc::new(search),
            config.search.semantic_config.clone(),
            search_timeout,
        )),
        documents: Arc::new(DocumentLoader::new(
            Arc::new(store),
            Arc::new(PdfTextExtractor),
            storage_timeout,
        )),
    })
}
