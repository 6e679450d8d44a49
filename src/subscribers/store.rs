//! JSON file persistence for the subscriber list

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;

use super::ChatId;
use crate::error::{RelayError, Result};

/// On-disk layout of the subscriber file
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedSubscribers {
    #[serde(default)]
    subscribed_chat_ids: Vec<ChatId>,
}

/// Stores subscriber ids as `{"subscribed_chat_ids": [...]}`
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted ids; a missing file is an empty set
    pub async fn load(&self) -> Result<BTreeSet<ChatId>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No subscriber file yet, starting empty");
                return Ok(BTreeSet::new());
            }
            Err(e) => {
                return Err(RelayError::Persistence(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let persisted: PersistedSubscribers = serde_json::from_str(&raw).map_err(|e| {
            RelayError::Persistence(format!("Corrupt subscriber file {}: {}", self.path.display(), e))
        })?;

        Ok(persisted.subscribed_chat_ids.into_iter().collect())
    }

    /// Rewrite the file atomically (temp file + rename)
    pub async fn save(&self, ids: &BTreeSet<ChatId>) -> Result<()> {
        let persisted = PersistedSubscribers {
            subscribed_chat_ids: ids.iter().copied().collect(),
        };
        let body = serde_json::to_string_pretty(&persisted)
            .map_err(|e| RelayError::Persistence(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
