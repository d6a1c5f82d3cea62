//! Stored invoice documents.
//!
//! Documents are immutable blobs addressed by a garage-scoped, UUID-qualified
//! URL. Writing the same invoice twice is an error: an invoice document is
//! produced exactly once and never replaced.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;

use thiserror::Error;

use garagekit_core::GarageId;
use garagekit_invoicing::InvoiceId;

#[derive(Debug, Error)]
pub enum DocumentStoreError {
    #[error("document already exists at '{0}'")]
    AlreadyExists(String),

    #[error("document storage failed: {0}")]
    Storage(String),
}

/// Immutable blob store for rendered invoice documents.
pub trait DocumentStore: Send + Sync {
    /// Store a document and return its URL.
    fn put(
        &self,
        garage_id: GarageId,
        invoice_id: InvoiceId,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, DocumentStoreError>;

    /// Fetch a stored document by URL (garage-scoped).
    fn get(&self, garage_id: GarageId, url: &str) -> Option<Vec<u8>>;
}

impl<S> DocumentStore for std::sync::Arc<S>
where
    S: DocumentStore + ?Sized,
{
    fn put(
        &self,
        garage_id: GarageId,
        invoice_id: InvoiceId,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, DocumentStoreError> {
        (**self).put(garage_id, invoice_id, file_name, bytes)
    }

    fn get(&self, garage_id: GarageId, url: &str) -> Option<Vec<u8>> {
        (**self).get(garage_id, url)
    }
}

/// URL scheme shared by implementations: the invoice id qualifies the path so
/// names can never collide across job cards, whatever the display file name.
pub fn document_url(garage_id: GarageId, invoice_id: InvoiceId, file_name: &str) -> String {
    format!("documents/{garage_id}/{invoice_id}/{file_name}")
}

/// In-memory document store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    blobs: RwLock<HashMap<(GarageId, String), Vec<u8>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn put(
        &self,
        garage_id: GarageId,
        invoice_id: InvoiceId,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, DocumentStoreError> {
        let url = document_url(garage_id, invoice_id, file_name);
        let mut blobs = self
            .blobs
            .write()
            .map_err(|_| DocumentStoreError::Storage("lock poisoned".to_string()))?;

        if blobs.contains_key(&(garage_id, url.clone())) {
            return Err(DocumentStoreError::AlreadyExists(url));
        }
        blobs.insert((garage_id, url.clone()), bytes);
        Ok(url)
    }

    fn get(&self, garage_id: GarageId, url: &str) -> Option<Vec<u8>> {
        let blobs = self.blobs.read().ok()?;
        blobs.get(&(garage_id, url.to_string())).cloned()
    }
}

/// Filesystem-backed document store rooted at a directory.
///
/// The URL scheme already carries the garage segment, so the path is just
/// the root plus the URL; reads verify the garage prefix before touching
/// the filesystem.
#[derive(Debug)]
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl DocumentStore for FsDocumentStore {
    fn put(
        &self,
        garage_id: GarageId,
        invoice_id: InvoiceId,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, DocumentStoreError> {
        let url = document_url(garage_id, invoice_id, file_name);
        let path = self.root.join(&url);

        if path.exists() {
            return Err(DocumentStoreError::AlreadyExists(url));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| DocumentStoreError::Storage(e.to_string()))?;
        }
        fs::write(&path, bytes).map_err(|e| DocumentStoreError::Storage(e.to_string()))?;
        Ok(url)
    }

    fn get(&self, garage_id: GarageId, url: &str) -> Option<Vec<u8>> {
        if !url.starts_with(&format!("documents/{garage_id}/")) {
            return None;
        }
        fs::read(self.root.join(url)).ok()
    }
}
