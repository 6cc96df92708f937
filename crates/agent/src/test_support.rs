use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pactum_core::domain::conversation::{ConversationSession, SessionId};
use pactum_core::domain::passage::RetrievedPassage;
use tokio::sync::Mutex;

use crate::conversation::SessionLog;
use crate::errors::BackendError;
use crate::llm::{Generation, GenerationBackend, GenerationRequest};
use crate::notify::{Notice, Notifier, NotifyError};
use crate::retrieval::{
    DocumentLoader, DocumentStore, EmbeddingBackend, EmbeddingClient, HybridQuery,
    HybridRetrievalClient, SearchBackend, TextExtractor,
};
use crate::tools::{ToolContext, ToolSettings};

pub(crate) fn passage(title: &str, chunk: &str, score: f64) -> RetrievedPassage {
    RetrievedPassage { title: title.to_owned(), chunk: chunk.to_owned(), path: None, score }
}

#[derive(Default)]
pub(crate) struct FakeEmbedding {
    texts: Mutex<Vec<String>>,
}

impl FakeEmbedding {
    pub(crate) async fn texts(&self) -> Vec<String> {
        self.texts.lock().await.clone()
    }
}

#[async_trait]
impl EmbeddingBackend for FakeEmbedding {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
        self.texts.lock().await.extend(texts.iter().cloned());
        Ok(texts.iter().map(|text| vec![text.len() as f32, 1.0]).collect())
    }
}

pub(crate) struct ScriptedSearch {
    results: Result<Vec<RetrievedPassage>, BackendError>,
    queries: Mutex<Vec<HybridQuery>>,
}

impl ScriptedSearch {
    pub(crate) fn returning(passages: Vec<RetrievedPassage>) -> Self {
        Self { results: Ok(passages), queries: Mutex::new(Vec::new()) }
    }

    pub(crate) fn failing() -> Self {
        Self {
            results: Err(BackendError::unavailable("search", "index offline")),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub(crate) async fn queries(&self) -> Vec<HybridQuery> {
        self.queries.lock().await.clone()
    }
}

#[async_trait]
impl SearchBackend for ScriptedSearch {
    async fn search(&self, query: &HybridQuery) -> Result<Vec<RetrievedPassage>, BackendError> {
        self.queries.lock().await.push(query.clone());
        self.results.clone()
    }
}

#[derive(Default)]
pub(crate) struct FakeStore {
    documents: HashMap<String, Vec<u8>>,
    downloads: AtomicUsize,
}

impl FakeStore {
    pub(crate) fn with_document(name: &str, text: &str) -> Self {
        let mut documents = HashMap::new();
        documents.insert(name.to_owned(), text.as_bytes().to_vec());
        Self { documents, downloads: AtomicUsize::new(0) }
    }

    pub(crate) fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for FakeStore {
    async fn exists(&self, name: &str) -> Result<bool, BackendError> {
        Ok(self.documents.contains_key(name))
    }

    async fn download(&self, name: &str) -> Result<Vec<u8>, BackendError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.documents
            .get(name)
            .cloned()
            .ok_or_else(|| BackendError::unavailable("storage", format!("blob `{name}` missing")))
    }
}

/// Treats the bytes as UTF-8 with pages separated by form feeds.
pub(crate) struct FakeExtractor;

impl TextExtractor for FakeExtractor {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<String>, BackendError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|error| BackendError::invalid_response("extraction", error.to_string()))?;
        Ok(text.split('\u{c}').map(str::to_owned).collect())
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub(crate) async fn notices(&self) -> Vec<Notice> {
        self.notices.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notice: Notice) -> Result<(), NotifyError> {
        self.notices.lock().await.push(notice);
        Ok(())
    }
}

pub(crate) struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, _notice: Notice) -> Result<(), NotifyError> {
        Err(NotifyError("channel closed".to_owned()))
    }
}

pub(crate) struct ScriptedGeneration {
    steps: Mutex<VecDeque<Generation>>,
    repeat: Option<Generation>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGeneration {
    pub(crate) fn new(steps: Vec<Generation>) -> Self {
        Self { steps: Mutex::new(steps.into()), repeat: None, requests: Mutex::new(Vec::new()) }
    }

    pub(crate) fn always(generation: Generation) -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
            repeat: Some(generation),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) async fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedGeneration {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, BackendError> {
        self.requests.lock().await.push(request.clone());
        if let Some(step) = self.steps.lock().await.pop_front() {
            return Ok(step);
        }
        self.repeat
            .clone()
            .ok_or_else(|| BackendError::invalid_response("generation", "script exhausted"))
    }
}

pub(crate) struct Harness {
    pub(crate) embedding: Arc<FakeEmbedding>,
    pub(crate) search: Arc<ScriptedSearch>,
    pub(crate) store: Arc<FakeStore>,
    pub(crate) notifier: Arc<RecordingNotifier>,
    pub(crate) session: SessionLog,
    pub(crate) settings: ToolSettings,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self {
            embedding: Arc::new(FakeEmbedding::default()),
            search: Arc::new(ScriptedSearch::returning(Vec::new())),
            store: Arc::new(FakeStore::default()),
            notifier: Arc::new(RecordingNotifier::default()),
            session: SessionLog::new(ConversationSession::new(SessionId("s-test".to_owned()))),
            settings: ToolSettings {
                file_name_min_score: 0.6,
                party_query: "with copies to or copy to".to_owned(),
            },
        }
    }

    pub(crate) fn with_search(mut self, search: ScriptedSearch) -> Self {
        self.search = Arc::new(search);
        self
    }

    pub(crate) fn with_store(mut self, store: FakeStore) -> Self {
        self.store = Arc::new(store);
        self
    }

    pub(crate) fn embeddings(&self) -> Arc<EmbeddingClient> {
        Arc::new(EmbeddingClient::new(self.embedding.clone(), Duration::from_secs(5)))
    }

    pub(crate) fn retrieval(&self) -> Arc<HybridRetrievalClient> {
        Arc::new(HybridRetrievalClient::new(self.search.clone(), "default", Duration::from_secs(5)))
    }

    pub(crate) fn documents(&self) -> Arc<DocumentLoader> {
        Arc::new(DocumentLoader::new(
            self.store.clone(),
            Arc::new(FakeExtractor),
            Duration::from_secs(5),
        ))
    }

    pub(crate) fn context(&self) -> ToolContext {
        ToolContext {
            session: self.session.clone(),
            notifier: self.notifier.clone(),
            embeddings: self.embeddings(),
            retrieval: self.retrieval(),
            documents: self.documents(),
            settings: self.settings.clone(),
        }
    }
}
