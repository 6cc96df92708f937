use async_trait::async_trait;
use pactum_core::domain::conversation::ConversationTurn;
use serde_json::{Map, Value};
use tracing::debug;

use super::{
    string_argument, ParameterKind, Tool, ToolContext, ToolDescriptor, ToolKind, ToolParameter,
    NO_AGREEMENT_FOUND,
};
use crate::errors::ToolError;
use crate::notify::{notify_best_effort, Notice};

const NEAREST_K: usize = 1;
const RESULT_SIZE: usize = 1;

/// Maps a loose agreement description to the indexed file name.
///
/// Only the single nearest passage is considered. Matches scoring under
/// `file_name_min_score` count as no match.
pub struct FileNameResolver {
    context: ToolContext,
}

impl FileNameResolver {
    pub fn new(context: ToolContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl Tool for FileNameResolver {
    fn kind(&self) -> ToolKind {
        ToolKind::FileName
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: ToolKind::FileName.name(),
            description: "Finds the file name of an agreement. Call this first whenever the user \
                          names an agreement, before searching or loading it.",
            parameters: vec![ToolParameter {
                name: "agreement",
                description: "The name of the agreement without the words agreement or contract",
                kind: ParameterKind::String,
            }],
            return_description: "The agreement file name, or a message that no agreement was found",
        }
    }

    async fn invoke(&self, arguments: &Map<String, Value>) -> Result<String, ToolError> {
        let agreement = string_argument(self.kind(), arguments, "agreement")?;
        notify_best_effort(
            self.context.notifier.as_ref(),
            Notice::Text("Finding the agreement file info...".to_owned()),
        )
        .await;

        let vector = self.context.embeddings.embed_one(agreement).await?;
        let passages = self.context.retrieval.query(vector, NEAREST_K, None, RESULT_SIZE).await?;

        let min_score = self.context.settings.file_name_min_score;
        match passages.into_iter().next() {
            Some(top) if top.score >= min_score => {
                self.context
                    .session
                    .append(ConversationTurn::assistant(format!(
                        "agreement file name is {}",
                        top.title
                    )))
                    .await;
                Ok(top.title)
            }
            best => {
                debug!(
                    correlation_id = %self.context.session.id(),
                    best_score = best.map(|passage| passage.score),
                    min_score,
                    "no agreement matched above threshold"
                );
                Ok(NO_AGREEMENT_FOUND.to_owned())
            }
        }
    }
}
