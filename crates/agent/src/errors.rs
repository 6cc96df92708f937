use std::time::Duration;

use thiserror::Error;

/// Failure of a generation, embedding, search or storage call.
///
/// Every variant is the same failure class to callers: the backend could not
/// serve the request. Nothing at this layer retries.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("{operation} backend unavailable: {message}")]
    Unavailable { operation: &'static str, message: String },
    #[error("{operation} backend timed out after {}ms", .after.as_millis())]
    TimedOut { operation: &'static str, after: Duration },
    #[error("{operation} backend returned an invalid response: {message}")]
    InvalidResponse { operation: &'static str, message: String },
}

impl BackendError {
    pub fn unavailable(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Unavailable { operation, message: message.into() }
    }

    pub fn invalid_response(operation: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidResponse { operation, message: message.into() }
    }

    pub fn operation(&self) -> &'static str {
        match self {
            Self::Unavailable { operation, .. }
            | Self::TimedOut { operation, .. }
            | Self::InvalidResponse { operation, .. } => operation,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("invalid arguments for `{tool}`: {reason}")]
    InvalidArguments { tool: String, reason: String },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl ToolError {
    pub fn invalid_arguments(tool: &str, reason: impl Into<String>) -> Self {
        Self::InvalidArguments { tool: tool.to_owned(), reason: reason.into() }
    }

    /// Short text handed back to the generator in place of a tool result.
    pub fn to_tool_output(&self) -> String {
        match self {
            Self::InvalidArguments { .. } => format!("Error: {self}"),
            Self::Backend(error) => {
                format!("Error: the {} service is unavailable right now.", error.operation())
            }
        }
    }
}
