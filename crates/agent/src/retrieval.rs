use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pactum_core::domain::passage::RetrievedPassage;

use crate::errors::BackendError;

#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// One vector per input text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError>;
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Passages ordered by backend relevance, highest first.
    async fn search(&self, query: &HybridQuery) -> Result<Vec<RetrievedPassage>, BackendError>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn exists(&self, name: &str) -> Result<bool, BackendError>;
    async fn download(&self, name: &str) -> Result<Vec<u8>, BackendError>;
}

pub trait TextExtractor: Send + Sync {
    /// Text of every page, in document order.
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<String>, BackendError>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct HybridQuery {
    pub vector: Vec<f32>,
    pub k: usize,
    pub semantic_config: String,
    pub filter: Option<EqualityFilter>,
    pub size: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EqualityFilter {
    pub field: String,
    pub value: String,
}

impl EqualityFilter {
    pub fn title(value: impl Into<String>) -> Self {
        Self { field: "title".to_owned(), value: value.into() }
    }

    /// OData form understood by the search service; quotes in the value are doubled.
    pub fn to_odata(&self) -> String {
        format!("{} eq '{}'", self.field, self.value.replace('\'', "''"))
    }
}

pub async fn with_timeout<T, F>(
    operation: &'static str,
    limit: Duration,
    call: F,
) -> Result<T, BackendError>
where
    F: Future<Output = Result<T, BackendError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(outcome) => outcome,
        Err(_) => Err(BackendError::TimedOut { operation, after: limit }),
    }
}

pub struct EmbeddingClient {
    backend: Arc<dyn EmbeddingBackend>,
    timeout: Duration,
}

impl EmbeddingClient {
    pub fn new(backend: Arc<dyn EmbeddingBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, BackendError> {
        let texts = [text.to_owned()];
        let vectors = with_timeout("embedding", self.timeout, self.backend.embed(&texts)).await?;
        if vectors.len() != 1 {
            return Err(BackendError::invalid_response(
                "embedding",
                format!("expected 1 vector, got {}", vectors.len()),
            ));
        }
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::invalid_response("embedding", "no vector returned"))
    }
}

/// Vector search with semantic re-ranking under a fixed semantic configuration.
pub struct HybridRetrievalClient {
    backend: Arc<dyn SearchBackend>,
    semantic_config: String,
    timeout: Duration,
}

impl HybridRetrievalClient {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        semantic_config: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self { backend, semantic_config: semantic_config.into(), timeout }
    }

    pub async fn query(
        &self,
        vector: Vec<f32>,
        k: usize,
        filter: Option<EqualityFilter>,
        size: usize,
    ) -> Result<Vec<RetrievedPassage>, BackendError> {
        let query =
            HybridQuery { vector, k, semantic_config: self.semantic_config.clone(), filter, size };
        let mut passages =
            with_timeout("search", self.timeout, self.backend.search(&query)).await?;
        passages.truncate(size);
        Ok(passages)
    }
}

pub struct DocumentLoader {
    store: Arc<dyn DocumentStore>,
    extractor: Arc<dyn TextExtractor>,
    timeout: Duration,
}

impl DocumentLoader {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        extractor: Arc<dyn TextExtractor>,
        timeout: Duration,
    ) -> Self {
        Self { store, extractor, timeout }
    }

    pub async fn exists(&self, name: &str) -> Result<bool, BackendError> {
        with_timeout("storage", self.timeout, self.store.exists(name)).await
    }

    /// Downloads `name` and returns its page text joined in page order.
    pub async fn load_text(&self, name: &str) -> Result<String, BackendError> {
        let bytes = with_timeout("storage", self.timeout, self.store.download(name)).await?;
        let extractor = Arc::clone(&self.extractor);
        let pages = tokio::task::spawn_blocking(move || extractor.extract_pages(&bytes))
            .await
            .map_err(|error| BackendError::unavailable("extraction", error.to_string()))??;
        Ok(pages.join("\n"))
    }
}
