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
const RESULT_SIZE: usize = 3;

/// Looks up the notice clauses of one agreement, where the parties and their
/// counsel are usually named. Results are not recorded in the session.
pub struct PartyFinder {
    context: ToolContext,
}

impl PartyFinder {
    pub fn new(context: ToolContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl Tool for PartyFinder {
    fn kind(&self) -> ToolKind {
        ToolKind::Parties
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: ToolKind::Parties.name(),
            description: "Finds the parties of an agreement and the law firms representing them.",
            parameters: vec![ToolParameter {
                name: "agreement",
                description: "The agreement file name",
                kind: ParameterKind::String,
            }],
            return_description: "Passages naming the parties, or a message that no info was found",
        }
    }

    async fn invoke(&self, arguments: &Map<String, Value>) -> Result<String, ToolError> {
        let agreement = string_argument(self.kind(), arguments, "agreement")?;
        notify_best_effort(
            self.context.notifier.as_ref(),
            Notice::Text(format!("Searching ...{agreement}")),
        )
        .await;

        let vector = self.context.embeddings.embed_one(&self.context.settings.party_query).await?;
        let passages = self
            .context
            .retrieval
            .query(vector, NEAREST_K, Some(EqualityFilter::title(agreement)), RESULT_SIZE)
            .await?;

        Ok(format_search_results(&passages))
    }
}
