//! HTTP table service client.

use async_trait::async_trait;
use reqwest::{Client, header};

use super::{StorageError, TableEntity, TableService};

const API_VERSION: &str = "2019-02-02";

/// Inserts entities through the table service REST API.
///
/// Authentication is a shared access signature passed as the query string.
#[derive(Debug, Clone)]
pub struct HttpTableService {
    client: Client,
    endpoint: String,
    sas_token: Option<String>,
}

impl HttpTableService {
    /// Create a client for `endpoint`.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(endpoint: &str, sas_token: Option<String>) -> Result<Self, StorageError> {
        let client = Client::builder()
            .build()
            .map_err(|e| StorageError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            sas_token: sas_token.map(|t| t.trim_start_matches('?').to_string()),
        })
    }

    /// Insert URL for `table`.
    #[must_use]
    pub fn table_url(&self, table: &str) -> String {
        match &self.sas_token {
            Some(token) if !token.is_empty() => format!("{}/{table}?{token}", self.endpoint),
            _ => format!("{}/{table}", self.endpoint),
        }
    }
}

#[async_trait]
impl TableService for HttpTableService {
    async fn insert_entity(&self, table: &str, entity: TableEntity) -> Result<(), StorageError> {
        let response = self
            .client
            .post(self.table_url(table))
            .header(header::ACCEPT, "application/json;odata=nometadata")
            .header("x-ms-version", API_VERSION)
            .header("Prefer", "return-no-content")
            .json(&entity.to_json())
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        Err(StorageError::Http {
            status: status.as_u16(),
            message,
        })
    }
}
