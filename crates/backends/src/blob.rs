use async_trait::async_trait;
use pactum_agent::errors::BackendError;
use pactum_agent::retrieval::DocumentStore;
use reqwest::{Client, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};

use crate::BuildError;

/// Blob container addressed as `{account_url}/{container}/{name}`, optionally
/// authorized with a SAS token.
pub struct BlobContainerStore {
    http: Client,
    account_url: Url,
    container: String,
    sas_token: Option<SecretString>,
}

impl BlobContainerStore {
    pub fn new(
        http: Client,
        account_url: &str,
        container: impl Into<String>,
        sas_token: Option<SecretString>,
    ) -> Result<Self, BuildError> {
        let account_url = Url::parse(account_url).map_err(|error| BuildError::InvalidUrl {
            field: "storage.account_url",
            message: error.to_string(),
        })?;
        if account_url.cannot_be_a_base() {
            return Err(BuildError::InvalidUrl {
                field: "storage.account_url",
                message: format!("`{account_url}` cannot carry a blob path"),
            });
        }
        Ok(Self { http, account_url, container: container.into(), sas_token })
    }

    /// Each `/`-separated part of `name` becomes its own encoded path segment.
    fn blob_url(&self, name: &str) -> Url {
        let mut url = self.account_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(&self.container).extend(name.split('/'));
        }
        url.set_query(
            self.sas_token.as_ref().map(|token| token.expose_secret().trim_start_matches('?')),
        );
        url
    }
}

#[async_trait]
impl DocumentStore for BlobContainerStore {
    async fn exists(&self, name: &str) -> Result<bool, BackendError> {
        let response = self
            .http
            .head(self.blob_url(name))
            .send()
            .await
            .map_err(|error| BackendError::unavailable("storage", error.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(BackendError::unavailable("storage", format!("status {status}"))),
        }
    }

    async fn download(&self, name: &str) -> Result<Vec<u8>, BackendError> {
        let response = self
            .http
            .get(self.blob_url(name))
            .send()
            .await
            .map_err(|error| BackendError::unavailable("storage", error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::unavailable("storage", format!("status {status}")));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|error| BackendError::unavailable("storage", error.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use reqwest::Client;

    use super::BlobContainerStore;
    use crate::BuildError;

    fn store(sas_token: Option<&str>) -> BlobContainerStore {
        BlobContainerStore::new(
            Client::new(),
            "https://pactum.blob.core.windows.net/",
            "agreements",
            sas_token.map(|token| token.to_owned().into()),
        )
        .expect("valid account url")
    }

    #[test]
    fn blob_names_are_encoded_per_path_segment() {
        assert_eq!(
            store(None).blob_url("2024/ACME Stock Purchase #2.pdf").as_str(),
            "https://pactum.blob.core.windows.net/agreements/2024/ACME%20Stock%20Purchase%20%232.pdf"
        );
        assert_eq!(store(None).blob_url("100%?.pdf").path(), "/agreements/100%25%3F.pdf");
    }

    #[test]
    fn sas_token_is_appended_as_query() {
        assert_eq!(
            store(Some("?sv=2024&sig=abc")).blob_url("ACME.pdf").as_str(),
            "https://pactum.blob.core.windows.net/agreements/ACME.pdf?sv=2024&sig=abc"
        );
    }

    #[test]
    fn unparseable_account_url_is_rejected() {
        let outcome = BlobContainerStore::new(Client::new(), "not a url", "agreements", None);
        assert!(matches!(
            outcome,
            Err(BuildError::InvalidUrl { field: "storage.account_url", .. })
        ));
    }
}
