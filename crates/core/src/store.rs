//! Directory-backed single-slot document store.
//!
//! The store holds at most one document. Uploads are written to a hidden staging
//! file and renamed into place while holding the write lock, and every other
//! document or stale staging file in the directory is removed, so concurrent uploads resolve to whichever finished
//! last and a partially written file is never visible. Each upload mints a fresh
//! `document_id`; readers and cleanup name the document they mean by that id, so a
//! request can never read or delete a newer upload by accident.

use crate::error::IngestError;
use crate::models::{DocumentFormat, StoredDocument};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

const MAX_FILE_NAME_BYTES: usize = 255;
const STAGING_PREFIX: &str = ".upload-";

pub struct FileStore {
    root: PathBuf,
    max_bytes: usize,
    slot: RwLock<Option<StoredDocument>>,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            root: root.into(),
            max_bytes,
            slot: RwLock::new(None),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Validates and persists an upload, replacing whatever the store held before.
    pub async fn put(&self, file_name: &str, bytes: &[u8]) -> Result<StoredDocument, IngestError> {
        let name = sanitize_file_name(file_name)?;
        let format = DocumentFormat::from_file_name(&name)
            .ok_or_else(|| IngestError::UnsupportedFileType(name.clone()))?;
        if bytes.len() > self.max_bytes {
            return Err(IngestError::FileTooLarge {
                size: bytes.len(),
                limit: self.max_bytes,
            });
        }
        validate_content(format, &name, bytes)?;

        let mut slot = self.slot.write().await;
        tokio::fs::create_dir_all(&self.root).await?;

        let staging = self
            .root
            .join(format!("{STAGING_PREFIX}{}.part", Uuid::new_v4().simple()));
        let target = self.root.join(&name);

        if let Err(error) = write_then_rename(&staging, &target, bytes).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(error);
        }

        for stale in owned_files(self.root.clone()).await? {
            if stale != target {
                if let Err(error) = tokio::fs::remove_file(&stale).await {
                    warn!(path = %stale.display(), %error, "failed to remove replaced document");
                }
            }
        }

        let document = StoredDocument {
            document_id: Uuid::new_v4().to_string(),
            file_name: name,
            path: target,
            size_bytes: bytes.len() as u64,
            checksum: digest_bytes(bytes),
            uploaded_at: Utc::now(),
        };
        info!(
            document_id = %document.document_id,
            file_name = %document.file_name,
            size_bytes = document.size_bytes,
            "stored document"
        );

        *slot = Some(document.clone());
        Ok(document)
    }

    /// The document currently held, if any. After a restart the slot is empty and
    /// the lexicographically first allowed file on disk is adopted.
    pub async fn current(&self) -> Result<Option<StoredDocument>, IngestError> {
        {
            let slot = self.slot.read().await;
            if let Some(document) = slot.as_ref() {
                if tokio::fs::try_exists(&document.path).await? {
                    return Ok(Some(document.clone()));
                }
            }
        }

        let mut slot = self.slot.write().await;
        if let Some(document) = slot.as_ref() {
            if tokio::fs::try_exists(&document.path).await? {
                return Ok(Some(document.clone()));
            }
        }
        *slot = None;

        if !tokio::fs::try_exists(&self.root).await? {
            return Ok(None);
        }

        let root = self.root.clone();
        let candidates = tokio::task::spawn_blocking(move || discover_documents(&root))
            .await
            .map_err(|error| IngestError::Join(error.to_string()))?;

        let mut adoptable = None;
        for path in candidates {
            let size = tokio::fs::metadata(&path).await?.len();
            if size > self.max_bytes as u64 {
                warn!(
                    path = %path.display(),
                    size_bytes = size,
                    limit = self.max_bytes,
                    "skipping oversized file left in store"
                );
                continue;
            }
            adoptable = Some(path);
            break;
        }
        let Some(path) = adoptable else {
            return Ok(None);
        };

        let bytes = tokio::fs::read(&path).await?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?
            .to_string();

        let document = StoredDocument {
            document_id: Uuid::new_v4().to_string(),
            file_name,
            path,
            size_bytes: bytes.len() as u64,
            checksum: digest_bytes(&bytes),
            uploaded_at: Utc::now(),
        };
        info!(
            document_id = %document.document_id,
            file_name = %document.file_name,
            "adopted document found on disk"
        );

        *slot = Some(document.clone());
        Ok(Some(document))
    }

    /// Copies the bytes of `document` out of the store. `None` when it has been
    /// replaced or removed since it was located.
    pub async fn read(&self, document: &StoredDocument) -> Result<Option<Vec<u8>>, IngestError> {
        let slot = self.slot.read().await;
        if !is_current(&slot, document) {
            return Ok(None);
        }

        match tokio::fs::read(&document.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    /// Deletes `document` if it is still the current one. Returns whether a file was removed.
    pub async fn remove(&self, document: &StoredDocument) -> Result<bool, IngestError> {
        let mut slot = self.slot.write().await;
        if !is_current(&slot, document) {
            debug!(document_id = %document.document_id, "document already replaced, nothing to remove");
            return Ok(false);
        }

        *slot = None;
        match tokio::fs::remove_file(&document.path).await {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(error) => Err(error.into()),
        }
    }
}

fn is_current(slot: &Option<StoredDocument>, document: &StoredDocument) -> bool {
    slot.as_ref()
        .is_some_and(|current| current.document_id == document.document_id)
}

async fn write_then_rename(staging: &Path, target: &Path, bytes: &[u8]) -> Result<(), IngestError> {
    tokio::fs::write(staging, bytes).await?;
    tokio::fs::rename(staging, target).await?;
    Ok(())
}

/// Documents and leftover staging files. Anything else in the directory is left alone.
async fn owned_files(root: PathBuf) -> Result<Vec<PathBuf>, IngestError> {
    tokio::task::spawn_blocking(move || {
        WalkDir::new(&root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.file_name().to_str().is_some_and(is_owned_name))
            .map(|entry| entry.path().to_path_buf())
            .collect()
    })
    .await
    .map_err(|error| IngestError::Join(error.to_string()))
}

fn is_document_name(name: &str) -> bool {
    !name.starts_with('.') && DocumentFormat::from_file_name(name).is_some()
}

fn is_staging_name(name: &str) -> bool {
    name.starts_with(STAGING_PREFIX) && name.ends_with(".part")
}

fn is_owned_name(name: &str) -> bool {
    is_document_name(name) || is_staging_name(name)
}

/// Allowed documents directly inside `folder`, sorted by path. Hidden and staging
/// files are skipped.
pub fn discover_documents(folder: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry.file_name().to_str().is_some_and(is_document_name)
        })
        .map(|entry| entry.path().to_path_buf())
        .collect();

    files.sort_unstable();
    files
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Reduces a client-supplied name to a safe final path component.
pub fn sanitize_file_name(raw: &str) -> Result<String, IngestError> {
    let name = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let rejected = name.is_empty()
        || name.starts_with('.')
        || name.len() > MAX_FILE_NAME_BYTES
        || name.chars().any(|character| character.is_control() || character == ':');

    if rejected {
        return Err(IngestError::MissingFileName(raw.to_string()));
    }

    Ok(name.to_string())
}

fn validate_content(format: DocumentFormat, name: &str, bytes: &[u8]) -> Result<(), IngestError> {
    if bytes.is_empty() {
        return Err(IngestError::InvalidContent(format!("{name} is empty")));
    }

    match format {
        DocumentFormat::Pdf if !bytes.starts_with(b"%PDF-") => Err(IngestError::InvalidContent(
            format!("{name} does not start with a PDF header"),
        )),
        DocumentFormat::PlainText if std::str::from_utf8(bytes).is_err() => Err(
            IngestError::InvalidContent(format!("{name} is not valid UTF-8 text")),
        ),
        _ => Ok(()),
    }
}
