//! Reference identities and their embeddings
//!
//! On disk a facebank is a JSON document:
//!
//! ```json
//! {"identities": [{"name": "alice", "embeddings": [[0.1, 0.2, ...], ...]}]}
//! ```
//!
//! Several embeddings per identity are allowed; matching takes the minimum
//! distance over all of them.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};
use video_faces_common::UNKNOWN_LABEL;

#[derive(Error, Debug)]
pub enum FacebankError {
    #[error("Failed to read facebank {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse facebank {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Identity with an empty name")]
    EmptyName,

    #[error("Identity name '{0}' is reserved for unmatched faces")]
    ReservedLabel(String),

    #[error("Identity '{0}' has no embeddings")]
    NoEmbeddings(String),

    #[error("Identity '{name}' has an embedding of dimension {actual}, expected {expected}")]
    DimensionMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Identity '{0}' has a non-finite embedding value")]
    NonFinite(String),
}

/// Serialized form of one identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub name: String,
    pub embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FacebankFile {
    identities: Vec<IdentityRecord>,
}

/// One reference embedding and the label it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct FacebankEntry {
    pub label: String,
    pub embedding: Vec<f32>,
}

/// Per-label summary, in facebank order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentitySummary {
    pub name: String,
    pub embeddings: usize,
}

/// Read-only reference set used by the matcher
#[derive(Debug, Clone, Default)]
pub struct Facebank {
    entries: Vec<FacebankEntry>,
    dim: Option<usize>,
}

impl Facebank {
    /// Load and validate a facebank JSON file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if any
    /// identity fails validation.
    pub fn load(path: &Path) -> Result<Self, FacebankError> {
        let data = std::fs::read_to_string(path).map_err(|source| FacebankError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let file: FacebankFile =
            serde_json::from_str(&data).map_err(|source| FacebankError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let facebank = Self::from_records(file.identities)?;

        if facebank.is_empty() {
            warn!(
                "Facebank {} holds no identities, every face will be reported as {}",
                path.display(),
                UNKNOWN_LABEL
            );
        } else {
            info!(
                "Loaded facebank {} ({} identities, {} embeddings, dim {})",
                path.display(),
                facebank.identities().len(),
                facebank.len(),
                facebank.dim().unwrap_or(0)
            );
        }

        Ok(facebank)
    }

    /// Build a facebank from identity records, validating each one
    ///
    /// # Errors
    ///
    /// See [`FacebankError`] for the validation rules.
    pub fn from_records(records: Vec<IdentityRecord>) -> Result<Self, FacebankError> {
        let mut entries = Vec::new();
        let mut dim: Option<usize> = None;

        for record in records {
            if record.name.trim().is_empty() {
                return Err(FacebankError::EmptyName);
            }
            if record.name == UNKNOWN_LABEL {
                return Err(FacebankError::ReservedLabel(record.name));
            }
            if record.embeddings.is_empty() {
                return Err(FacebankError::NoEmbeddings(record.name));
            }

            for embedding in record.embeddings {
                let expected = *dim.get_or_insert(embedding.len());
                if embedding.is_empty() || embedding.len() != expected {
                    return Err(FacebankError::DimensionMismatch {
                        name: record.name,
                        expected,
                        actual: embedding.len(),
                    });
                }
                if embedding.iter().any(|v| !v.is_finite()) {
                    return Err(FacebankError::NonFinite(record.name));
                }
                entries.push(FacebankEntry {
                    label: record.name.clone(),
                    embedding,
                });
            }
        }

        Ok(Self { entries, dim })
    }

    #[must_use]
    pub fn entries(&self) -> &[FacebankEntry] {
        &self.entries
    }

    /// Embedding dimension, `None` for an empty facebank
    #[must_use]
    pub fn dim(&self) -> Option<usize> {
        self.dim
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct labels with their embedding counts, in first-seen order
    #[must_use]
    pub fn identities(&self) -> Vec<IdentitySummary> {
        let mut summaries: Vec<IdentitySummary> = Vec::new();
        for entry in &self.entries {
            match summaries.iter_mut().find(|s| s.name == entry.label) {
                Some(summary) => summary.embeddings += 1,
                None => summaries.push(IdentitySummary {
                    name: entry.label.clone(),
                    embeddings: 1,
                }),
            }
        }
        summaries
    }
}
