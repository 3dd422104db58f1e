//! Client for the Dicoding notes REST API.
//!
//! Every endpoint answers with the same envelope (`error`/`status`,
//! `message`, `data`). The envelope is decoded once here into an
//! [`ApiReply`]; callers only ever see typed data or an [`Error::Api`].

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::models::{Note, NoteDraft, NoteId};
use crate::util::{compact_text, normalize_base_url};

/// The eight remote operations the client relies on.
#[async_trait]
pub trait NotesApi: Send + Sync {
    /// `GET /notes`
    async fn list_active(&self) -> Result<Vec<Note>>;

    /// `GET /notes/archived`
    async fn list_archived(&self) -> Result<Vec<Note>>;

    /// `GET /notes/{id}`
    async fn get(&self, id: &NoteId) -> Result<Note>;

    /// `POST /notes`
    async fn create(&self, draft: &NoteDraft) -> Result<Note>;

    /// `PUT /notes/{id}`
    async fn update(&self, id: &NoteId, draft: &NoteDraft) -> Result<Note>;

    /// `DELETE /notes/{id}`, returns the server message
    async fn delete(&self, id: &NoteId) -> Result<String>;

    /// `POST /notes/{id}/archive`, returns the server message
    async fn archive(&self, id: &NoteId) -> Result<String>;

    /// `POST /notes/{id}/unarchive`, returns the server message
    async fn unarchive(&self, id: &NoteId) -> Result<String>;
}

/// Decoded response envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiReply {
    Success {
        data: Option<serde_json::Value>,
        message: Option<String>,
    },
    Failure {
        message: String,
    },
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(default)]
    error: Option<bool>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

impl ApiReply {
    /// Decode a raw HTTP status and body.
    ///
    /// A reply is a failure when the envelope says `error: true`, when its
    /// `status` is `fail`/`error`, or when the HTTP status is not a success.
    pub fn decode(status: StatusCode, body: &str) -> Self {
        let envelope = match serde_json::from_str::<RawEnvelope>(body) {
            Ok(envelope) => envelope,
            Err(error) => {
                let message = if status.is_success() {
                    format!("invalid response payload: {error}")
                } else {
                    fallback_message(status, body)
                };
                return Self::Failure { message };
            }
        };

        let flagged = envelope.error.unwrap_or(false)
            || matches!(envelope.status.as_deref(), Some("fail" | "error"));

        if flagged || !status.is_success() {
            let message = envelope
                .message
                .map(|message| message.trim().to_string())
                .filter(|message| !message.is_empty())
                .unwrap_or_else(|| fallback_message(status, body));
            return Self::Failure { message };
        }

        Self::Success {
            data: envelope.data,
            message: envelope.message,
        }
    }

    /// Extract and deserialize the `data` field.
    pub fn into_data<T: DeserializeOwned>(self) -> Result<T> {
        match self {
            Self::Success {
                data: Some(data), ..
            } => Ok(serde_json::from_value(data)?),
            Self::Success { data: None, .. } => {
                Err(Error::Api("response did not include data".to_string()))
            }
            Self::Failure { message } => Err(Error::Api(message)),
        }
    }

    /// Extract the server message of a data-less reply.
    pub fn into_message(self) -> Result<String> {
        match self {
            Self::Success { message, .. } => Ok(message.unwrap_or_default()),
            Self::Failure { message } => Err(Error::Api(message)),
        }
    }
}

fn fallback_message(status: StatusCode, body: &str) -> String {
    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{trimmed} ({})", status.as_u16())
    }
}

/// HTTP implementation of [`NotesApi`].
#[derive(Debug, Clone)]
pub struct NotesApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl NotesApiClient {
    /// Builds a client for an explicit API base URL with default settings.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let config = ClientConfig::default().with_api_base_url(&base_url.into())?;
        Self::from_config(&config)
    }

    /// Builds a client from the shared client configuration.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let base_url = normalize_base_url(&config.api_base_url).map_err(Error::InvalidInput)?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self { base_url, client })
    }

    /// Returns the base URL this client was configured with.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn note_route(id: &NoteId, suffix: &str) -> String {
        format!("/notes/{}{suffix}", urlencoding::encode(id.as_str()))
    }

    async fn send(
        &self,
        method: Method,
        route: &str,
        body: Option<&NoteDraft>,
    ) -> Result<ApiReply> {
        let url = format!("{}{route}", self.base_url);
        tracing::debug!(%method, %url, "notes API request");

        let mut request = self
            .client
            .request(method, &url)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        let reply = ApiReply::decode(status, &text);
        if let ApiReply::Failure { message } = &reply {
            tracing::debug!(status = status.as_u16(), %message, "notes API reported failure");
        }
        Ok(reply)
    }
}

#[async_trait]
impl NotesApi for NotesApiClient {
    async fn list_active(&self) -> Result<Vec<Note>> {
        self.send(Method::GET, "/notes", None).await?.into_data()
    }

    async fn list_archived(&self) -> Result<Vec<Note>> {
        self.send(Method::GET, "/notes/archived", None)
            .await?
            .into_data()
    }

    async fn get(&self, id: &NoteId) -> Result<Note> {
        self.send(Method::GET, &Self::note_route(id, ""), None)
            .await?
            .into_data()
    }

    async fn create(&self, draft: &NoteDraft) -> Result<Note> {
        self.send(Method::POST, "/notes", Some(draft))
            .await?
            .into_data()
    }

    async fn update(&self, id: &NoteId, draft: &NoteDraft) -> Result<Note> {
        self.send(Method::PUT, &Self::note_route(id, ""), Some(draft))
            .await?
            .into_data()
    }

    async fn delete(&self, id: &NoteId) -> Result<String> {
        self.send(Method::DELETE, &Self::note_route(id, ""), None)
            .await?
            .into_message()
    }

    async fn archive(&self, id: &NoteId) -> Result<String> {
        self.send(Method::POST, &Self::note_route(id, "/archive"), None)
            .await?
            .into_message()
    }

    async fn unarchive(&self, id: &NoteId) -> Result<String> {
        self.send(Method::POST, &Self::note_route(id, "/unarchive"), None)
            .await?
            .into_message()
    }
}
