//! Document references and how each strategy turns one into something a
//! rendering surface can load.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use doc_model::{PdfRecord, Strategy};
use std::fmt;
use std::sync::Arc;
use url::Url;

const PDF_DATA_URI_PREFIX: &str = "data:application/pdf;base64,";
const PROXY_VIEWER_ENDPOINT: &str = "https://drive.google.com/viewerng/viewer";
const PROXY_VIEWER_HOST: &str = "drive.google.com";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("invalid document URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("unsupported URL scheme '{0}' (only http and https can be previewed)")]
    UnsupportedScheme(String),
    #[error("inline document content is not valid base64: {0}")]
    InvalidInlineContent(String),
    #[error("{strategy} cannot present inline content")]
    NotProxyable { strategy: Strategy },
}

/// The byte source a preview session is opened for. Immutable for the
/// lifetime of the session.
#[derive(Clone, PartialEq, Eq)]
pub enum DocumentRef {
    Url(Url),
    Inline(Arc<[u8]>),
}

impl DocumentRef {
    /// Parses a remote document URL; only http(s) is accepted.
    pub fn url(raw: &str) -> Result<Self, SourceError> {
        let url = Url::parse(raw.trim()).map_err(|e| SourceError::InvalidUrl {
            url: raw.to_owned(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "http" | "https" => Ok(Self::Url(url)),
            other => Err(SourceError::UnsupportedScheme(other.to_owned())),
        }
    }

    pub fn inline(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::Inline(bytes.into())
    }

    /// Picks the byte source for a stored record.
    ///
    /// Uploaded content (`fileData`) wins over the URI, a base64 PDF data URI
    /// is decoded in place, anything else must be a remote URL.
    pub fn from_record(record: &PdfRecord) -> Result<Self, SourceError> {
        if let Some(data) = record.file_data.as_deref().filter(|data| !data.is_empty()) {
            return decode_inline(data);
        }

        if let Some(data) = record.uri.strip_prefix(PDF_DATA_URI_PREFIX) {
            return decode_inline(data);
        }

        Self::url(&record.uri)
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, Self::Inline(_))
    }
}

impl fmt::Debug for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => f.debug_tuple("Url").field(&url.as_str()).finish(),
            Self::Inline(bytes) => write!(f, "Inline({} bytes)", bytes.len()),
        }
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => f.write_str(url.as_str()),
            Self::Inline(bytes) => write!(f, "<inline pdf, {} bytes>", bytes.len()),
        }
    }
}

fn decode_inline(data: &str) -> Result<DocumentRef, SourceError> {
    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| SourceError::InvalidInlineContent(e.to_string()))?;
    Ok(DocumentRef::Inline(bytes.into()))
}

/// What a rendering surface is actually asked to load.
#[derive(Clone, PartialEq, Eq)]
pub enum ResolvedSource {
    Url(Url),
    DataUri(String),
    Bytes(Arc<[u8]>),
}

impl ResolvedSource {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Url(_) => "url",
            Self::DataUri(_) => "data-uri",
            Self::Bytes(_) => "bytes",
        }
    }

    /// Short printable form; inline payloads are summarized, not dumped.
    pub fn describe(&self) -> String {
        match self {
            Self::Url(url) => url.to_string(),
            Self::DataUri(uri) => format!("{PDF_DATA_URI_PREFIX}... ({} chars)", uri.len()),
            Self::Bytes(bytes) => format!("{} bytes", bytes.len()),
        }
    }
}

impl fmt::Debug for ResolvedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind(), self.describe())
    }
}

pub fn resolve(strategy: Strategy, document: &DocumentRef) -> Result<ResolvedSource, SourceError> {
    match (strategy, document) {
        (Strategy::DirectEmbed | Strategy::ExternalLink, DocumentRef::Url(url))
        | (Strategy::ClientRenderer, DocumentRef::Url(url)) => Ok(ResolvedSource::Url(url.clone())),
        (Strategy::DirectEmbed | Strategy::ExternalLink, DocumentRef::Inline(bytes)) => {
            Ok(ResolvedSource::DataUri(data_uri(bytes)))
        }
        (Strategy::ClientRenderer, DocumentRef::Inline(bytes)) => {
            Ok(ResolvedSource::Bytes(Arc::clone(bytes)))
        }
        (Strategy::ProxyViewer, DocumentRef::Url(url)) => {
            proxy_viewer_url(url).map(ResolvedSource::Url)
        }
        (Strategy::ProxyViewer, DocumentRef::Inline(_)) => {
            Err(SourceError::NotProxyable { strategy })
        }
    }
}

fn proxy_viewer_url(url: &Url) -> Result<Url, SourceError> {
    if url.host_str() == Some(PROXY_VIEWER_HOST) {
        return Ok(url.clone());
    }

    Url::parse_with_params(PROXY_VIEWER_ENDPOINT, &[("embedded", "true"), ("url", url.as_str())])
        .map_err(|e| SourceError::InvalidUrl { url: url.to_string(), reason: e.to_string() })
}

fn data_uri(bytes: &[u8]) -> String {
    format!("{PDF_DATA_URI_PREFIX}{}", STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_model::{DocumentId, SourceKind};

    fn record(uri: &str, file_data: Option<&str>) -> PdfRecord {
        PdfRecord {
            id: DocumentId::new("doc-1"),
            name: "doc.pdf".to_owned(),
            uri: uri.to_owned(),
            size: 4,
            date_added: String::new(),
            is_favorite: false,
            kind: SourceKind::Local,
            file_data: file_data.map(ToOwned::to_owned),
            thumbnail_data: None,
        }
    }

    #[test]
    fn inline_file_data_wins_over_uri() {
        let doc = DocumentRef::from_record(&record("https://example.com/a.pdf", Some("JVBERg==")))
            .expect("valid record");
        assert_eq!(doc, DocumentRef::inline(b"%PDF".to_vec()));
    }

    #[test]
    fn data_uri_is_decoded_inline() {
        let doc = DocumentRef::from_record(&record("data:application/pdf;base64,JVBERg==", None))
            .expect("valid record");
        assert!(doc.is_inline());
    }

    #[test]
    fn non_http_uri_is_rejected() {
        let err = DocumentRef::from_record(&record("file:///sdcard/a.pdf", None)).unwrap_err();
        assert_eq!(err, SourceError::UnsupportedScheme("file".to_owned()));
    }

    #[test]
    fn broken_base64_is_reported() {
        let err = DocumentRef::from_record(&record("", Some("not base64!"))).unwrap_err();
        assert!(matches!(err, SourceError::InvalidInlineContent(_)));
    }

    #[test]
    fn proxy_viewer_wraps_remote_urls() {
        let doc = DocumentRef::url("https://example.com/doc.pdf").expect("valid url");
        let resolved = resolve(Strategy::ProxyViewer, &doc).expect("proxyable");

        let ResolvedSource::Url(url) = resolved else {
            panic!("expected url source");
        };
        assert_eq!(url.host_str(), Some("drive.google.com"));
        assert!(url.as_str().contains("embedded=true&url=https%3A%2F%2Fexample.com%2Fdoc.pdf"));
    }

    #[test]
    fn proxy_viewer_passes_drive_urls_through() {
        let doc = DocumentRef::url("https://drive.google.com/file/d/abc/view").expect("valid url");
        let resolved = resolve(Strategy::ProxyViewer, &doc).expect("proxyable");
        let drive = Url::parse("https://drive.google.com/file/d/abc/view").unwrap();
        assert_eq!(resolved, ResolvedSource::Url(drive));
    }

    #[test]
    fn proxy_viewer_cannot_take_inline_content() {
        let doc = DocumentRef::inline(b"%PDF".to_vec());
        let err = resolve(Strategy::ProxyViewer, &doc).unwrap_err();
        assert_eq!(err, SourceError::NotProxyable { strategy: Strategy::ProxyViewer });
    }

    #[test]
    fn inline_content_becomes_data_uri_or_bytes() {
        let doc = DocumentRef::inline(b"%PDF".to_vec());

        assert_eq!(
            resolve(Strategy::DirectEmbed, &doc).expect("embeddable"),
            ResolvedSource::DataUri("data:application/pdf;base64,JVBERg==".to_owned())
        );
        assert_eq!(resolve(Strategy::ClientRenderer, &doc).expect("renderable").kind(), "bytes");
    }
}
