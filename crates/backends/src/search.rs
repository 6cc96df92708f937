use async_trait::async_trait;
use pactum_agent::errors::BackendError;
use pactum_agent::retrieval::{HybridQuery, SearchBackend};
use pactum_core::domain::passage::RetrievedPassage;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

use crate::http::{join_url, send_json};

/// Azure AI Search index queried with a vector query plus semantic ranking.
pub struct AzureSearchBackend {
    http: Client,
    endpoint: String,
    index: String,
    api_key: SecretString,
    api_version: String,
    vector_field: String,
}

impl AzureSearchBackend {
    pub fn new(
        http: Client,
        endpoint: impl Into<String>,
        index: impl Into<String>,
        api_key: SecretString,
        api_version: impl Into<String>,
        vector_field: impl Into<String>,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            index: index.into(),
            api_key,
            api_version: api_version.into(),
            vector_field: vector_field.into(),
        }
    }

    fn url(&self) -> String {
        format!(
            "{}?api-version={}",
            join_url(&self.endpoint, &format!("indexes/{}/docs/search", self.index)),
            self.api_version
        )
    }
}

#[async_trait]
impl SearchBackend for AzureSearchBackend {
    async fn search(&self, query: &HybridQuery) -> Result<Vec<RetrievedPassage>, BackendError> {
        let body = build_search_body(query, &self.vector_field);
        let request =
            self.http.post(self.url()).header("api-key", self.api_key.expose_secret()).json(&body);
        let response = send_json("search", request).await?;
        parse_search_response(&response)
    }
}

pub fn build_search_body(query: &HybridQuery, vector_field: &str) -> Value {
    let mut body = json!({
        "vectorQueries": [{
            "kind": "vector",
            "vector": query.vector,
            "k": query.k,
            "fields": vector_field,
            "exhaustive": true,
        }],
        "queryType": "semantic",
        "semanticConfiguration": query.semantic_config,
        "captions": "extractive",
        "answers": "extractive",
        "top": query.size,
        "select": "title,chunk,path",
    });
    if let Some(filter) = &query.filter {
        body["filter"] = json!(filter.to_odata());
    }
    body
}

/// Keeps backend order; `@search.score` becomes the passage score.
pub fn parse_search_response(response: &Value) -> Result<Vec<RetrievedPassage>, BackendError> {
    let documents = response
        .get("value")
        .and_then(Value::as_array)
        .ok_or_else(|| BackendError::invalid_response("search", "missing value array"))?;

    documents
        .iter()
        .map(|document| {
            let title = document
                .get("title")
                .and_then(Value::as_str)
                .ok_or_else(|| BackendError::invalid_response("search", "document without title"))?;
            Ok(RetrievedPassage {
                title: title.to_owned(),
                chunk: document.get("chunk").and_then(Value::as_str).unwrap_or_default().to_owned(),
                path: document.get("path").and_then(Value::as_str).map(str::to_owned),
                score: document.get("@search.score").and_then(Value::as_f64).unwrap_or(0.0),
            })
        })
        .collect()
}
