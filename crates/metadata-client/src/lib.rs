//! Client for the PDF metadata backend.
//!
//! The preview runtime only needs [`MetadataStore`] (fetch a record, flip
//! its favorite flag). [`HttpMetadataStore`] implements that over the REST
//! API and also exposes the library-management calls the CLI uses.
//! Failures are reported, never retried here.

use doc_model::{DocumentId, LibraryStats, PdfRecord, PdfUpdate};
use log::debug;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document {0} not found")]
    NotFound(DocumentId),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("update contains no fields")]
    EmptyUpdate,
    #[error("invalid backend URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

impl StoreError {
    /// Whether the failure might go away on its own.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

/// The read/update contract the preview runtime depends on.
pub trait MetadataStore {
    fn fetch_document(&self, id: &DocumentId) -> Result<PdfRecord, StoreError>;
    fn toggle_favorite(&self, id: &DocumentId) -> Result<PdfRecord, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthStatus {
    pub message: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
}

pub struct HttpMetadataStore {
    base: Url,
    agent: ureq::Agent,
}

impl HttpMetadataStore {
    pub fn new(base_url: &str) -> Result<Self, StoreError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let invalid =
            |reason: String| StoreError::InvalidBaseUrl { url: base_url.to_owned(), reason };

        let base = Url::parse(base_url.trim()).map_err(|e| invalid(e.to_string()))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme '{}'", base.scheme())));
        }
        if base.cannot_be_a_base() {
            return Err(invalid("not a base URL".to_owned()));
        }

        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("pdfshelf/", env!("CARGO_PKG_VERSION")))
            .build();

        Ok(Self { base, agent })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn list_documents(&self) -> Result<Vec<PdfRecord>, StoreError> {
        let url = self.endpoint(&["pdfs"]);
        self.get_json(&url, None)
    }

    pub fn list_favorites(&self) -> Result<Vec<PdfRecord>, StoreError> {
        let url = self.endpoint(&["pdfs", "favorites"]);
        self.get_json(&url, None)
    }

    pub fn update_document(
        &self,
        id: &DocumentId,
        update: &PdfUpdate,
    ) -> Result<PdfRecord, StoreError> {
        if update.is_empty() {
            return Err(StoreError::EmptyUpdate);
        }

        let url = self.endpoint(&["pdfs", id.as_str()]);
        let body = serde_json::to_string(update)
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;
        debug!("PUT {url}");

        let resp = self
            .agent
            .put(url.as_str())
            .set("Accept", "application/json")
            .set("Content-Type", "application/json")
            .send_string(&body)
            .map_err(|e| classify(e, Some(id)))?;

        decode(resp)
    }

    pub fn delete_document(&self, id: &DocumentId) -> Result<(), StoreError> {
        let url = self.endpoint(&["pdfs", id.as_str()]);
        debug!("DELETE {url}");

        self.agent.delete(url.as_str()).call().map_err(|e| classify(e, Some(id)))?;
        Ok(())
    }

    pub fn stats(&self) -> Result<LibraryStats, StoreError> {
        let url = self.endpoint(&["stats"]);
        self.get_json(&url, None)
    }

    pub fn health(&self) -> Result<HealthStatus, StoreError> {
        let url = self.endpoint(&[""]);
        self.get_json(&url, None)
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("api").extend(segments);
        }
        url
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        url: &Url,
        id: Option<&DocumentId>,
    ) -> Result<T, StoreError> {
        debug!("GET {url}");
        let resp = self
            .agent
            .get(url.as_str())
            .set("Accept", "application/json")
            .call()
            .map_err(|e| classify(e, id))?;

        decode(resp)
    }
}

impl MetadataStore for HttpMetadataStore {
    fn fetch_document(&self, id: &DocumentId) -> Result<PdfRecord, StoreError> {
        let url = self.endpoint(&["pdfs", id.as_str()]);
        self.get_json(&url, Some(id))
    }

    fn toggle_favorite(&self, id: &DocumentId) -> Result<PdfRecord, StoreError> {
        let url = self.endpoint(&["pdfs", id.as_str(), "favorite"]);
        debug!("PATCH {url}");

        let resp = self
            .agent
            .request("PATCH", url.as_str())
            .set("Accept", "application/json")
            .call()
            .map_err(|e| classify(e, Some(id)))?;

        decode(resp)
    }
}

fn decode<T: DeserializeOwned>(resp: ureq::Response) -> Result<T, StoreError> {
    let body = resp.into_string().map_err(|e| StoreError::InvalidResponse(e.to_string()))?;
    serde_json::from_str(&body).map_err(|e| StoreError::InvalidResponse(e.to_string()))
}

fn classify(err: ureq::Error, id: Option<&DocumentId>) -> StoreError {
    match err {
        ureq::Error::Status(404, resp) => match id {
            Some(id) => StoreError::NotFound(id.clone()),
            None => StoreError::Rejected(format!("404 {}", error_detail(resp))),
        },
        ureq::Error::Status(code, resp) if code >= 500 => {
            StoreError::Network(format!("server returned {code}: {}", error_detail(resp)))
        }
        ureq::Error::Status(code, resp) => {
            StoreError::Rejected(format!("{code} {}", error_detail(resp)))
        }
        ureq::Error::Transport(transport) => StoreError::Network(transport.to_string()),
    }
}

/// The backend wraps error messages as `{"detail": "..."}`.
fn error_detail(resp: ureq::Response) -> String {
    let body = resp.into_string().unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(parsed) => parsed.detail,
        Err(_) => body.trim().to_owned(),
    }
}
