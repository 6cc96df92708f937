use std::time::Duration;

use pactum_agent::errors::BackendError;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tracing::warn;

const ERROR_BODY_LIMIT: usize = 240;

pub(crate) fn client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder().timeout(timeout).connect_timeout(Duration::from_secs(10)).build()
}

/// Sends the request and decodes a JSON body; non-2xx statuses are backend failures.
pub(crate) async fn send_json(
    operation: &'static str,
    request: RequestBuilder,
) -> Result<Value, BackendError> {
    let response = request
        .send()
        .await
        .map_err(|error| BackendError::unavailable(operation, error.to_string()))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|error| BackendError::unavailable(operation, error.to_string()))?;

    if !status.is_success() {
        warn!(operation, status = %status, "backend request rejected");
        return Err(BackendError::unavailable(
            operation,
            format!("status {status}: {}", truncate(&body, ERROR_BODY_LIMIT)),
        ));
    }

    serde_json::from_str(&body)
        .map_err(|error| BackendError::invalid_response(operation, error.to_string()))
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::{join_url, truncate};

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("clause §12 applies", 8), "clause §");
        assert_eq!(truncate("short", 10), "short");
    }

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(join_url("https://a.example/", "/openai/x"), "https://a.example/openai/x");
        assert_eq!(join_url("https://a.example", "v1"), "https://a.example/v1");
    }
}
