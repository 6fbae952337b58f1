//! Opening a stored document in a preview runtime.

use crate::handle::{PreviewHandle, RuntimeError};
use doc_model::{DocumentId, PdfRecord};
use log::info;
use metadata_client::{MetadataStore, StoreError};
use viewer_core::{DocumentRef, PreviewPolicy, SourceError};

#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("document cannot be previewed: {0}")]
    Source(#[from] SourceError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Fetches `id` from `store` and starts previewing it. Returns the record
/// that was opened; the preview itself settles asynchronously.
pub fn open_document(
    store: &dyn MetadataStore,
    id: &DocumentId,
    handle: &PreviewHandle,
    policy: PreviewPolicy,
) -> Result<PdfRecord, OpenError> {
    let record = store.fetch_document(id)?;
    let document = DocumentRef::from_record(&record)?;

    info!("opening '{}' ({})", record.name, record.display_size());
    handle.start(document, policy)?;
    Ok(record)
}
