//! HTTP client for a `daylog serve` store.
//!
//! Every collection lives under `/owners/{owner}` on the server, which
//! enforces one day per `(owner, date)` and one note per `(owner, text)`.
//! Templates are never sent; they stay with the session that created them.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use super::{Repository, RepositoryError};
use crate::clock::{self, Instant};
use crate::models::{DayMeta, Entry, NewEntry, Note, Snapshot, Templates, UpsertNoteInput};

/// Default URL for a server on the local machine.
pub const DEFAULT_URL: &str = "http://localhost:17020/api/v1";

#[derive(Debug, Clone)]
pub struct RemoteRepository {
    base_url: String,
    owner: String,
    api_key: Option<String>,
    client: Client,
}

impl RemoteRepository {
    pub fn new(base_url: impl Into<String>, owner: impl Into<String>, api_key: Option<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            owner: owner.into(),
            api_key,
            client: Client::new(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Build an owner-scoped request with optional auth header.
    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/owners/{}{}", self.base_url, self.owner, path);
        let mut req = self.client.request(method, &url);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        req
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, RepositoryError> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json().await?)
        } else {
            Err(Self::status_error(status, response).await)
        }
    }

    async fn status_error(status: StatusCode, response: reqwest::Response) -> RepositoryError {
        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::NOT_FOUND => RepositoryError::NotFound(body),
            StatusCode::BAD_REQUEST => RepositoryError::BadRequest(body),
            StatusCode::UNAUTHORIZED => RepositoryError::Unauthorized,
            _ => RepositoryError::Server(format!("{}: {}", status, body)),
        }
    }
}

#[async_trait]
impl Repository for RemoteRepository {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn load_all(&self) -> Result<Snapshot, RepositoryError> {
        let response = self
            .request(reqwest::Method::GET, "/snapshot")
            .send()
            .await?;
        let mut snapshot: Snapshot = self.handle_response(response).await?;
        snapshot.templates = Templates::default();
        Ok(snapshot)
    }

    async fn get_or_create_day(&self, date: NaiveDate) -> Result<DayMeta, RepositoryError> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/days/{}", clock::format_date(date)),
            )
            .send()
            .await?;
        self.handle_response(response).await
    }

    async fn create_or_update_day(&self, meta: &DayMeta) -> Result<DayMeta, RepositoryError> {
        let response = self
            .request(
                reqwest::Method::PUT,
                &format!("/days/{}", clock::format_date(meta.date)),
            )
            .json(meta)
            .send()
            .await?;
        self.handle_response(response).await
    }

    async fn create_entry(&self, input: &NewEntry) -> Result<Entry, RepositoryError> {
        let response = self
            .request(reqwest::Method::POST, "/entries")
            .json(input)
            .send()
            .await?;
        self.handle_response(response).await
    }

    async fn delete_entry(&self, id: Uuid) -> Result<(), RepositoryError> {
        let response = self
            .request(reqwest::Method::DELETE, &format!("/entries/{}", id))
            .send()
            .await?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(Self::status_error(status, response).await)
        }
    }

    async fn upsert_note(&self, text: &str, now: Instant) -> Result<Note, RepositoryError> {
        let response = self
            .request(reqwest::Method::PUT, "/notes")
            .json(&UpsertNoteInput {
                text: text.to_string(),
                now,
            })
            .send()
            .await?;
        self.handle_response(response).await
    }

    async fn save_templates(&self, _templates: &Templates) -> Result<(), RepositoryError> {
        tracing::debug!("Templates are kept local in remote mode");
        Ok(())
    }

    async fn replace_all(&self, snapshot: &Snapshot) -> Result<Snapshot, RepositoryError> {
        let response = self
            .request(reqwest::Method::PUT, "/snapshot")
            .json(snapshot)
            .send()
            .await?;
        let mut stored: Snapshot = self.handle_response(response).await?;
        stored.templates = snapshot.templates.clone();
        Ok(stored)
    }
}
