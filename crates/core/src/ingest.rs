use crate::extractor::ProfileExtractor;
use crate::profile::ProfileRole;
use crate::stores::FileDocumentStore;
use crate::traits::VectorIndex;
use crate::{Document, IngestError};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

const TEXT_EXTENSIONS: [&str; 2] = ["txt", "md"];
const MAX_NAME_WORDS: usize = 4;
const MAX_NAME_CHARS: usize = 60;

pub fn discover_cv_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_text = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                TEXT_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            });

        if is_text {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

/// Collapses runs of spaces and tabs inside each line and drops blank lines.
pub fn clean_text(raw: &str) -> String {
    raw.lines()
        .map(normalize_whitespace)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Identical CV texts share an id, so re-uploads deduplicate.
pub fn document_id(cleaned: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(cleaned.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// First line when it reads like a person's name: a few words, no digits or mail address.
pub fn guess_candidate_name(cleaned: &str) -> Option<String> {
    let first = cleaned.lines().next()?.trim().trim_start_matches('#').trim();
    let words = first.split_whitespace().count();
    let looks_like_name = (2..=MAX_NAME_WORDS).contains(&words)
        && first.chars().count() <= MAX_NAME_CHARS
        && !first.contains('@')
        && !first.chars().any(|ch| ch.is_ascii_digit());
    looks_like_name.then(|| first.to_string())
}

pub fn load_document(path: &Path, scope: &str) -> Result<Document, IngestError> {
    let raw = fs::read_to_string(path)?;
    let cleaned = clean_text(&raw);
    if cleaned.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "{} contains no text",
            path.display()
        )));
    }

    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            IngestError::InvalidArgument(format!("path missing filename: {}", path.display()))
        })?;

    Ok(Document {
        document_id: document_id(&cleaned),
        scope: scope.to_string(),
        filename: filename.to_string(),
        candidate_name: guess_candidate_name(&cleaned),
        raw_text: cleaned,
        skills: Vec::new(),
        added_at: Utc::now(),
    })
}

pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

pub struct IngestionReport {
    pub documents: Vec<Document>,
    pub skipped_files: Vec<SkippedFile>,
}

pub fn ingest_folder_best_effort(folder: &Path, scope: &str) -> Result<IngestionReport, IngestError> {
    if scope.trim().is_empty() {
        return Err(IngestError::InvalidArgument("scope cannot be empty".to_string()));
    }

    let files = discover_cv_files(folder);
    if files.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "no .txt or .md files found in {}",
            folder.display()
        )));
    }

    let mut documents: Vec<Document> = Vec::new();
    let mut skipped_files = Vec::new();

    for path in files {
        match load_document(&path, scope) {
            Ok(document) => {
                if documents
                    .iter()
                    .any(|known| known.document_id == document.document_id)
                {
                    skipped_files.push(SkippedFile {
                        path,
                        reason: "duplicate of an earlier file".to_string(),
                    });
                } else {
                    documents.push(document);
                }
            }
            Err(error) => skipped_files.push(SkippedFile {
                path,
                reason: error.to_string(),
            }),
        }
    }

    Ok(IngestionReport {
        documents,
        skipped_files,
    })
}

/// Extracts each document's skills, indexes its text and stores it.
/// Returns how many documents were new to the store.
pub async fn store_documents<P, V>(
    documents: Vec<Document>,
    extractor: &P,
    index: &V,
    store: &FileDocumentStore,
) -> Result<usize, IngestError>
where
    P: ProfileExtractor,
    V: VectorIndex,
{
    let mut added = 0;
    for mut document in documents {
        document.skills = extractor
            .extract(&document.raw_text, ProfileRole::Candidate)
            .await
            .skills;
        index
            .add(&document.scope, &document.document_id, &document.raw_text)
            .await?;

        let document_id = document.document_id.clone();
        if store.insert(document).await? {
            added += 1;
        } else {
            debug!(document_id = %document_id, "document already stored");
        }
    }
    Ok(added)
}
