//! Generated model files and their in-memory index.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("{operation} failed for {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct StoredModel {
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub accessed_at: DateTime<Utc>,
}

/// Model files under a temp dir, indexed by model id and expired after a TTL
pub struct ModelStorage {
    dir: PathBuf,
    ttl: Duration,
    models: Mutex<HashMap<String, StoredModel>>,
}

impl ModelStorage {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| StorageError::Io {
            operation: "create temp dir",
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            ttl,
            models: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Fresh unique path inside the temp dir
    pub fn temp_file_path(&self, prefix: &str, suffix: &str) -> PathBuf {
        self.dir
            .join(format!("{}{}{}", prefix, uuid::Uuid::new_v4(), suffix))
    }

    pub async fn store_model(&self, model_id: &str, path: PathBuf) {
        let now = Utc::now();
        self.models.lock().await.insert(
            model_id.to_string(),
            StoredModel {
                path,
                created_at: now,
                accessed_at: now,
            },
        );
    }

    /// Write `bytes` to a new file and index it under `model_id`
    pub async fn write_model(&self, model_id: &str, bytes: &[u8]) -> Result<PathBuf, StorageError> {
        let path = self.temp_file_path(&format!("model_{}_", model_id), ".stl");
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| StorageError::Io {
                operation: "write model",
                path: path.clone(),
                source,
            })?;
        self.store_model(model_id, path.clone()).await;
        Ok(path)
    }

    /// Path of a stored model. Entries whose file vanished are dropped.
    pub async fn model_path(&self, model_id: &str) -> Option<PathBuf> {
        let mut models = self.models.lock().await;
        let entry = models.get_mut(model_id)?;
        if tokio::fs::try_exists(&entry.path).await.unwrap_or(false) {
            entry.accessed_at = Utc::now();
            Some(entry.path.clone())
        } else {
            tracing::warn!("Model file for {} vanished: {}", model_id, entry.path.display());
            models.remove(model_id);
            None
        }
    }

    pub async fn delete_model(&self, model_id: &str) -> bool {
        let removed = self.models.lock().await.remove(model_id);
        match removed {
            Some(model) => {
                remove_file_quietly(&model.path).await;
                true
            }
            None => false,
        }
    }

    /// Remove models older than the TTL; returns how many were removed
    pub async fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);

        let expired: Vec<StoredModel> = {
            let mut models = self.models.lock().await;
            let ids: Vec<String> = models
                .iter()
                .filter(|(_, m)| now - m.created_at > ttl)
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| models.remove(id)).collect()
        };

        for model in &expired {
            remove_file_quietly(&model.path).await;
        }
        if !expired.is_empty() {
            tracing::info!("Cleaned up {} expired model files", expired.len());
        }
        expired.len()
    }

    pub async fn len(&self) -> usize {
        self.models.lock().await.len()
    }

    #[cfg(test)]
    async fn backdate(&self, model_id: &str, age: chrono::Duration) {
        if let Some(m) = self.models.lock().await.get_mut(model_id) {
            m.created_at = m.created_at - age;
        }
    }
}

async fn remove_file_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Could not remove {}: {}", path.display(), e);
        }
    }
}
