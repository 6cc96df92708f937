use async_trait::async_trait;
use pactum_core::domain::conversation::ConversationTurn;
use serde_json::{Map, Value};

use super::{
    string_argument, ParameterKind, Tool, ToolContext, ToolDescriptor, ToolKind, ToolParameter,
    AGREEMENT_NOT_FOUND, ENTIRE_PDF_CONTENT,
};
use crate::errors::ToolError;
use crate::notify::{notify_best_effort, Notice};

/// Loads the full text of an agreement into the session.
pub struct AgreementLoader {
    context: ToolContext,
}

impl AgreementLoader {
    pub fn new(context: ToolContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl Tool for AgreementLoader {
    fn kind(&self) -> ToolKind {
        ToolKind::Load
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: ToolKind::Load.name(),
            description: "Loads the entire content of an agreement. Use this when the question \
                          needs the whole document, such as a summary.",
            parameters: vec![ToolParameter {
                name: "agreement",
                description: "The agreement file name",
                kind: ParameterKind::String,
            }],
            return_description: "The full agreement text, or a message that it was not found",
        }
    }

    async fn invoke(&self, arguments: &Map<String, Value>) -> Result<String, ToolError> {
        let agreement = string_argument(self.kind(), arguments, "agreement")?;
        let notifier = self.context.notifier.as_ref();
        notify_best_effort(notifier, Notice::Text(format!("Loading ...{agreement}"))).await;

        if !self.context.documents.exists(agreement).await? {
            notify_best_effort(notifier, Notice::Text(format!("{agreement} not found."))).await;
            return Ok(AGREEMENT_NOT_FOUND.to_owned());
        }

        let text = self.context.documents.load_text(agreement).await?;
        self.context
            .session
            .append(ConversationTurn::assistant(format!("{ENTIRE_PDF_CONTENT} {text}")))
            .await;

        Ok(format!("{ENTIRE_PDF_CONTENT}\n\n{text}"))
    }
}
