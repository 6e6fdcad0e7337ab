//! File ingestion pipeline.
//!
//! Turns uploaded bytes into chunks, absorbing every per-file failure:
//! images go through the vision collaborator, unsupported extensions and
//! broken files become placeholder documents, and everything else is
//! extracted and chunked with the policy its format class dictates.
//! Nothing in here returns an error to the caller for a bad file.
//!
//! Bytes are spooled to a temp file for the duration of extraction; the
//! spool is deleted on drop with a bounded retry for platforms that hold
//! the file locked briefly after use.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::chunk::{chunk_policy, split_documents};
use crate::config::Config;
use crate::extract::{self, ExtractError, FormatClass};
use crate::llm::VisionModel;
use crate::models::{Chunk, DocMetadata, ExtractedDocument};

const SPOOL_DELETE_ATTEMPTS: u32 = 5;
const SPOOL_DELETE_BACKOFF: Duration = Duration::from_millis(500);

/// A temp file holding one upload during extraction. Deleted on drop,
/// retrying a few times before giving up with a warning.
pub struct TempSpool {
    path: PathBuf,
}

impl TempSpool {
    pub fn write(bytes: &[u8], extension: &str) -> std::io::Result<Self> {
        let path = std::env::temp_dir().join(format!("docqa-{}.{}", Uuid::new_v4(), extension));
        std::fs::write(&path, bytes)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempSpool {
    fn drop(&mut self) {
        for attempt in 1..=SPOOL_DELETE_ATTEMPTS {
            match std::fs::remove_file(&self.path) {
                Ok(()) => return,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
                Err(e) => {
                    if attempt < SPOOL_DELETE_ATTEMPTS {
                        std::thread::sleep(SPOOL_DELETE_BACKOFF);
                    } else {
                        warn!(
                            path = %self.path.display(),
                            error = %e,
                            "could not delete temp spool; leaving it for the OS"
                        );
                    }
                }
            }
        }
    }
}

fn extension(file_name: &str) -> String {
    file_name
        .rsplit('.')
        .next()
        .unwrap_or("tmp")
        .to_ascii_lowercase()
}

fn placeholder(file_name: &str, kind: &str, text: String) -> ExtractedDocument {
    let metadata = DocMetadata {
        source: file_name.to_string(),
        kind: Some(kind.to_string()),
        ..Default::default()
    };
    ExtractedDocument::new(text, metadata)
}

fn unsupported_placeholder(file_name: &str) -> ExtractedDocument {
    placeholder(
        file_name,
        "unsupported",
        format!(
            "[Unsupported file type: {}]\n\nFile: {}\n\n\
             Supported formats: PDF, DOCX, TXT, CSV, XLSX, XLS, JSON, XML, YAML, RTF, images",
            extension(file_name),
            file_name
        ),
    )
}

fn error_placeholder(file_name: &str, error: &ExtractError) -> ExtractedDocument {
    placeholder(
        file_name,
        "error",
        format!(
            "[Error loading file: {}]\n\nError: {}\n\nFile type: {}\n\
             This file could not be processed. Try:\n\
             1. Check if file is corrupted\n\
             2. Try a different file format",
            file_name,
            error,
            extension(file_name)
        ),
    )
}

async fn describe_image(
    bytes: &[u8],
    file_name: &str,
    vision: &dyn VisionModel,
    vision_model: &str,
) -> ExtractedDocument {
    match vision.describe(vision_model, bytes, file_name).await {
        Ok(description) => placeholder(
            file_name,
            "image",
            format!("[IMAGE: {}]\n\n{}", file_name, description),
        ),
        Err(e) => {
            warn!(file = file_name, error = %e, "vision description failed");
            placeholder(
                file_name,
                "image",
                format!("[IMAGE: {}]\n\nVision model error: {}", file_name, e),
            )
        }
    }
}

async fn load_documents(
    bytes: &[u8],
    file_name: &str,
    class: FormatClass,
    vision: &dyn VisionModel,
    vision_model: &str,
) -> Vec<ExtractedDocument> {
    match class {
        FormatClass::Image => {
            vec![describe_image(bytes, file_name, vision, vision_model).await]
        }
        FormatClass::Unsupported => {
            warn!(file = file_name, "unsupported file type");
            vec![unsupported_placeholder(file_name)]
        }
        _ => {
            // Extract from a spooled copy; fall back to the in-memory
            // bytes if spooling itself fails.
            let spool = match TempSpool::write(bytes, &extension(file_name)) {
                Ok(spool) => Some(spool),
                Err(e) => {
                    warn!(file = file_name, error = %e, "temp spool failed, extracting in memory");
                    None
                }
            };
            let content = match &spool {
                Some(spool) => std::fs::read(spool.path()).unwrap_or_else(|_| bytes.to_vec()),
                None => bytes.to_vec(),
            };

            match extract::extract(&content, file_name) {
                Ok(docs) if !docs.is_empty() => docs,
                Ok(_) => {
                    warn!(file = file_name, "no content extracted");
                    Vec::new()
                }
                Err(e) => {
                    warn!(file = file_name, error = %e, "extraction failed");
                    vec![error_placeholder(file_name, &e)]
                }
            }
        }
    }
}

/// Extract and chunk one file. Every document inherits the original
/// filename as its source, whatever an extractor put there.
pub async fn chunk_file(
    bytes: &[u8],
    file_name: &str,
    vision: &dyn VisionModel,
    config: &Config,
) -> Vec<Chunk> {
    let class = FormatClass::from_name(file_name);
    let mut documents =
        load_documents(bytes, file_name, class, vision, &config.models.vision).await;
    for doc in &mut documents {
        doc.metadata.source = file_name.to_string();
    }

    let (chunk_size, chunk_overlap) = chunk_policy(class, &config.chunking);
    let chunks = split_documents(&documents, chunk_size, chunk_overlap);
    info!(
        file = file_name,
        documents = documents.len(),
        chunks = chunks.len(),
        "chunked file"
    );
    chunks
}

/// Resolve an ingest target to the list of regular files it names: the
/// path itself, or every file under a directory (sorted walk).
pub fn collect_files(path: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        anyhow::bail!("no such file or directory: {}", path.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}
