use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{
    format_search_results, string_argument, ParameterKind, Tool, ToolContext, ToolDescriptor,
    ToolKind, ToolParameter,
};
use crate::errors::ToolError;
use crate::notify::{notify_best_effort, Notice};
use crate::retrieval::EqualityFilter;

const NEAREST_K: usize = 3;
const RESULT_SIZE: usize = 5;

/// General question answering over one agreement's passages.
pub struct AgreementSearcher {
    context: ToolContext,
}

impl AgreementSearcher {
    pub fn new(context: ToolContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl Tool for AgreementSearcher {
    fn kind(&self) -> ToolKind {
        ToolKind::Search
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: ToolKind::Search.name(),
            description: "Searches an agreement for passages relevant to a question. Use this \
                          when no more specific tool answers the question.",
            parameters: vec![
                ToolParameter {
                    name: "agreement",
                    description: "The agreement file name",
                    kind: ParameterKind::String,
                },
                ToolParameter {
                    name: "query",
                    description: "The user question",
                    kind: ParameterKind::String,
                },
            ],
            return_description: "Relevant passages, or a message that no info was found",
        }
    }

    async fn invoke(&self, arguments: &Map<String, Value>) -> Result<String, ToolError> {
        let agreement = string_argument(self.kind(), arguments, "agreement")?;
        let query = string_argument(self.kind(), arguments, "query")?;
        notify_best_effort(
            self.context.notifier.as_ref(),
            Notice::Text(format!("Searching ...{agreement}")),
        )
        .await;

        let vector = self.context.embeddings.embed_one(query).await?;
        let passages = self
            .context
            .retrieval
            .query(vector, NEAREST_K, Some(EqualityFilter::title(agreement)), RESULT_SIZE)
            .await?;

        Ok(format_search_results(&passages))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::AgreementSearcher;
    use crate::errors::ToolError;
    use crate::notify::Notice;
    use crate::test_support::{passage, FailingNotifier, Harness, ScriptedSearch};
    use crate::tools::{invoke_validated, ToolContext, NO_INFO_FOUND};

    fn args() -> serde_json::Value {
        json!({"agreement": "Globex_APA.pdf", "query": "What is the purchase price?"})
    }

    #[tokio::test]
    async fn results_are_capped_at_five_blocks() {
        let harness = Harness::new().with_search(ScriptedSearch::returning(
            (0..8).map(|i| passage("Globex_APA.pdf", &format!("chunk {i}"), 0.7)).collect(),
        ));
        let tool = AgreementSearcher::new(harness.context());

        let output = invoke_validated(&tool, &args()).await.unwrap_or_default();

        assert_eq!(output.matches("Title: Globex_APA.pdf").count(), 5);
        assert!(output.contains("Content: chunk 4"));
        assert!(!output.contains("Content: chunk 5"));
        let queries = harness.search.queries().await;
        assert_eq!((queries[0].k, queries[0].size), (3, 5));
        assert_eq!(harness.embedding.texts().await, vec!["What is the purchase price?".to_owned()]);
        assert_eq!(
            harness.notifier.notices().await,
            vec![Notice::Text("Searching ...Globex_APA.pdf".to_owned())]
        );
    }

    #[tokio::test]
    async fn repeated_identical_searches_return_identical_text() {
        let harness = Harness::new().with_search(ScriptedSearch::returning(vec![
            passage("Globex_APA.pdf", "price is $10M", 0.9),
            passage("Globex_APA.pdf", "adjustments", 0.8),
        ]));
        let tool = AgreementSearcher::new(harness.context());

        let first = invoke_validated(&tool, &args()).await;
        let second = invoke_validated(&tool, &args()).await;
        assert!(first.is_ok());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn empty_results_return_sentinel() {
        let harness = Harness::new();
        let tool = AgreementSearcher::new(harness.context());
        assert_eq!(invoke_validated(&tool, &args()).await, Ok(NO_INFO_FOUND.to_owned()));
    }

    #[tokio::test]
    async fn search_outage_surfaces_as_backend_error() {
        let harness = Harness::new().with_search(ScriptedSearch::failing());
        let tool = AgreementSearcher::new(harness.context());

        let output = invoke_validated(&tool, &args()).await;
        assert!(matches!(output, Err(ToolError::Backend(_))));
    }

    #[tokio::test]
    async fn missing_query_fails_validation_without_backend_calls() {
        let harness = Harness::new();
        let tool = AgreementSearcher::new(harness.context());

        let output = invoke_validated(&tool, &json!({"agreement": "Globex_APA.pdf"})).await;

        assert!(matches!(output, Err(ToolError::InvalidArguments { .. })));
        assert!(harness.embedding.texts().await.is_empty());
        assert!(harness.search.queries().await.is_empty());
    }

    #[tokio::test]
    async fn failing_notifier_does_not_abort_search() {
        let harness = Harness::new()
            .with_search(ScriptedSearch::returning(vec![passage("Globex_APA.pdf", "x", 0.9)]));
        let context = ToolContext {
            notifier: std::sync::Arc::new(FailingNotifier),
            ..harness.context()
        };
        let tool = AgreementSearcher::new(context);

        let output = invoke_validated(&tool, &args()).await.unwrap_or_default();
        assert!(output.starts_with("[SEARCH RESULTS]"));
    }
}
