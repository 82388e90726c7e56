use crate::storage::traits::StorageError;
use reqwest::{StatusCode, Url};
use std::time::Duration;

pub type Result<T> = std::result::Result<T, StorageError>;

/// HTTP client for the document store's `/all`, `/create`, `/insert` and
/// `/shutdown` verbs.
#[derive(Debug, Clone)]
pub struct BackendClient {
    base_url: Url,
    client: reqwest::Client,
}

impl BackendClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url =
            Url::parse(base_url).map_err(|e| StorageError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, verb: &str) -> Result<Url> {
        self.base_url
            .join(verb)
            .map_err(|e| StorageError::InvalidUrl(e.to_string()))
    }

    /// Readiness probe: true when `/all` answers 200.
    pub async fn is_ready(&self) -> bool {
        let url = match self.endpoint("/all") {
            Ok(url) => url,
            Err(_) => return false,
        };
        match self.client.get(url).send().await {
            Ok(response) => response.status() == StatusCode::OK,
            Err(e) => {
                tracing::trace!(error = %e, "Backend not answering yet");
                false
            }
        }
    }

    /// Names of the collections that already exist.
    pub async fn list_collections(&self) -> Result<Vec<String>> {
        let response = self.client.get(self.endpoint("/all")?).send().await?;

        if response.status() != StatusCode::OK {
            return Err(StorageError::UnexpectedStatus {
                operation: "list collections",
                status: response.status().as_u16(),
            });
        }

        Ok(response.json().await?)
    }

    /// Ask the backend to create `collection`. Returns the raw status; only
    /// 201 means the collection was created by this call.
    pub async fn create_collection(&self, collection: &str) -> Result<StatusCode> {
        let response = self
            .client
            .get(self.endpoint("/create")?)
            .query(&[("col", collection)])
            .send()
            .await?;

        Ok(response.status())
    }

    /// Insert one JSON document as a form-encoded `doc` field.
    pub async fn insert(&self, collection: &str, document: &str) -> Result<StatusCode> {
        let response = self
            .client
            .post(self.endpoint("/insert")?)
            .query(&[("col", collection)])
            .form(&[("doc", document)])
            .send()
            .await?;

        Ok(response.status())
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.client.get(self.endpoint("/shutdown")?).send().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_join_onto_base_url() {
        let client = BackendClient::new("http://localhost:7778", Duration::from_secs(5)).unwrap();
        assert_eq!(client.endpoint("/all").unwrap().as_str(), "http://localhost:7778/all");
        assert_eq!(
            client.endpoint("/insert").unwrap().as_str(),
            "http://localhost:7778/insert"
        );
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let err = BackendClient::new("localhost without scheme", Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, StorageError::InvalidUrl(_)));
    }
}
