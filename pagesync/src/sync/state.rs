use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::warn;

pub const STATE_FILE_NAME: &str = ".sync-metadata.json";

#[derive(Debug, Error)]
pub enum StateError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode sync state: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRecord {
    pub title: String,
    pub version: u64,
    /// RFC 3339, UTC.
    pub synced_at: String,
}

/// Last synced version per page id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncState {
    records: BTreeMap<String, SyncRecord>,
}

impl SyncState {
    pub fn get(&self, page_id: &str) -> Option<&SyncRecord> {
        self.records.get(page_id)
    }

    pub fn is_current(&self, page_id: &str, version: u64) -> bool {
        self.get(page_id)
            .is_some_and(|record| record.version == version)
    }

    pub fn record(&mut self, page_id: &str, title: &str, version: u64, synced_at: String) {
        self.records.insert(
            page_id.to_string(),
            SyncRecord {
                title: title.to_string(),
                version,
                synced_at,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn for_project(project_dir: &Path) -> Self {
        Self::new(project_dir.join(STATE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<SyncState, StateError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(SyncState::default()),
            Err(source) => {
                return Err(StateError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        if content.trim().is_empty() {
            return Ok(SyncState::default());
        }
        match serde_json::from_str(&content) {
            Ok(state) => Ok(state),
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "sync state is unreadable, starting from an empty state"
                );
                Ok(SyncState::default())
            }
        }
    }

    /// Rewrites the whole state file; readers never observe a half-written file.
    pub async fn save(&self, state: &SyncState) -> Result<(), StateError> {
        let mut encoded = serde_json::to_string_pretty(state)?;
        encoded.push('\n');

        let io_err = |source| StateError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let partial = self.path.with_extension("json.partial");
        tokio::fs::write(&partial, encoded).await.map_err(io_err)?;
        tokio::fs::rename(&partial, &self.path)
            .await
            .map_err(io_err)?;
        Ok(())
    }
}

pub fn timestamp_now() -> Result<String, time::error::Format> {
    OffsetDateTime::now_utc().format(&Rfc3339)
}
