//! Minimal client for the ClickHouse HTTP interface.

use crate::error::ClickHouseError;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct ClickHouseClient {
    http: Client,
    base_url: String,
    user: String,
    password: String,
    database: String,
}

impl ClickHouseClient {
    pub fn new(
        host: &str,
        port: u16,
        user: &str,
        password: &str,
        database: &str,
    ) -> Result<Self, ClickHouseError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: format!("http://{host}:{port}/"),
            user: user.to_string(),
            password: password.to_string(),
            database: database.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send `statement` as the request body; results come back as `JSONCompact`.
    pub async fn query(&self, statement: &str) -> Result<String, ClickHouseError> {
        let request = self
            .http
            .post(&self.base_url)
            .query(&[
                ("database", self.database.as_str()),
                ("default_format", "JSONCompact"),
            ])
            .body(statement.to_string());
        self.send(request).await
    }

    /// Run `statement` (an `INSERT ... FORMAT` header) with `data` as the body.
    pub async fn insert(&self, statement: &str, data: String) -> Result<String, ClickHouseError> {
        debug!("Sending {} bytes with '{}'", data.len(), statement);
        let request = self
            .http
            .post(&self.base_url)
            .query(&[("database", self.database.as_str()), ("query", statement)])
            .body(data);
        self.send(request).await
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, ClickHouseError> {
        let response = request
            .header("X-ClickHouse-User", &self.user)
            .header("X-ClickHouse-Key", &self.password)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ClickHouseError::Server {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }
        Ok(body)
    }
}
