//! Shared data model for PdfShelf.
//!
//! Records mirror the JSON the metadata backend produces (camelCase keys), so
//! they can be decoded straight off the wire and handed to the preview
//! controller without an intermediate DTO layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_TIMEOUT_PER_ATTEMPT_MS: u64 = 8_000;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the bytes of a record originally came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Local,
    Cloud,
    Url,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Local => "local",
            Self::Cloud => "cloud",
            Self::Url => "url",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfRecord {
    pub id: DocumentId,
    pub name: String,
    pub uri: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub date_added: String,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(rename = "type", default)]
    pub kind: SourceKind,
    /// Base64 encoded file content for records uploaded from the device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_data: Option<String>,
}

impl PdfRecord {
    pub fn has_inline_content(&self) -> bool {
        self.file_data.as_deref().is_some_and(|data| !data.is_empty())
    }

    /// Human readable size; URL imports report 0 because the size is unknown.
    pub fn display_size(&self) -> String {
        const KIB: u64 = 1024;
        const MIB: u64 = 1024 * 1024;

        match self.size {
            0 => "unknown".to_owned(),
            n if n < KIB => format!("{n} B"),
            n if n < MIB => format!("{:.1} KB", n as f64 / KIB as f64),
            n => format!("{:.1} MB", n as f64 / MIB as f64),
        }
    }
}

/// Partial update; only the fields that are `Some` are sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
}

impl PdfUpdate {
    pub fn rename(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), is_favorite: None }
    }

    pub fn favorite(is_favorite: bool) -> Self {
        Self { name: None, is_favorite: Some(is_favorite) }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.is_favorite.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryStats {
    pub total_pdfs: u64,
    pub favorite_pdfs: u64,
    pub local_pdfs: u64,
    pub cloud_pdfs: u64,
    pub url_pdfs: u64,
}

impl LibraryStats {
    pub fn from_records(records: &[PdfRecord]) -> Self {
        let mut stats = Self::default();
        for record in records {
            stats.total_pdfs += 1;
            if record.is_favorite {
                stats.favorite_pdfs += 1;
            }
            match record.kind {
                SourceKind::Local => stats.local_pdfs += 1,
                SourceKind::Cloud => stats.cloud_pdfs += 1,
                SourceKind::Url => stats.url_pdfs += 1,
            }
        }
        stats
    }
}

/// Technique used to show a document inside the preview surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Hand the source straight to the embedded browser.
    DirectEmbed,
    /// Wrap remote URLs in a hosted viewer page.
    ProxyViewer,
    /// Render pages client-side from the raw bytes.
    ClientRenderer,
    /// Offer the document as a link to open outside the app.
    ExternalLink,
}

impl Strategy {
    pub const ALL: [Strategy; 4] =
        [Self::DirectEmbed, Self::ProxyViewer, Self::ClientRenderer, Self::ExternalLink];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DirectEmbed => "direct-embed",
            Self::ProxyViewer => "proxy-viewer",
            Self::ClientRenderer => "client-renderer",
            Self::ExternalLink => "external-link",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "unknown strategy '{0}' (expected one of direct-embed, proxy-viewer, client-renderer, \
     external-link)"
)]
pub struct ParseStrategyError(pub String);

impl FromStr for Strategy {
    type Err = ParseStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| ParseStrategyError(needle.to_owned()))
    }
}

/// Parses a comma separated strategy list such as `direct-embed,proxy-viewer`.
pub fn parse_strategy_list(value: &str) -> Result<Vec<Strategy>, ParseStrategyError> {
    value.split(',').filter(|part| !part.trim().is_empty()).map(Strategy::from_str).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerSettings {
    pub backend_url: String,
    pub timeout_per_attempt_ms: u64,
    pub max_attempts: u32,
    pub strategies: Vec<Strategy>,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_owned(),
            timeout_per_attempt_ms: DEFAULT_TIMEOUT_PER_ATTEMPT_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            strategies: vec![Strategy::DirectEmbed, Strategy::ProxyViewer, Strategy::ExternalLink],
        }
    }
}
