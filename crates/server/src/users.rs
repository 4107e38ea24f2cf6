//! Per-user records, generation counters and browser sessions.
//!
//! Records live in one JSON file keyed by user id. Every mutation rewrites the
//! file through a temp file and a rename so a crash never leaves half a file.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use shared::{AdminSummaryResponse, PromptType, UserData, UserPrompt, UserSummary};
use tokio::sync::Mutex;

const RECENT_PROMPTS: usize = 5;
const SESSION_DAYS: i64 = 7;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("User {user_id} reached the model limit ({current}/{max})")]
    LimitExceeded { user_id: String, current: u32, max: u32 },

    #[error("User not found: {0}")]
    UnknownUser(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

struct Session {
    user_id: String,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    users: BTreeMap<String, UserData>,
    sessions: HashMap<String, Session>,
}

pub struct UserStore {
    path: PathBuf,
    max_models: u32,
    inner: Mutex<Inner>,
}

impl UserStore {
    /// Load records from `path`. A missing file starts empty, as does a
    /// corrupted one (with a warning).
    pub fn open(path: impl Into<PathBuf>, max_models: u32) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let users = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::warn!("User data file {} is corrupted, starting empty: {}", path.display(), e);
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::info!("Loaded {} users from {}", users.len(), path.display());
        Ok(Self {
            path,
            max_models,
            inner: Mutex::new(Inner { users, sessions: HashMap::new() }),
        })
    }

    pub fn max_models(&self) -> u32 {
        self.max_models
    }

    pub async fn get_user(&self, user_id: &str) -> Option<UserData> {
        self.inner.lock().await.users.get(user_id).cloned()
    }

    /// Insert a user or refresh email/name on an existing one
    pub async fn create_or_update_user(
        &self,
        user_id: &str,
        email: &str,
        name: Option<&str>,
    ) -> Result<UserData, StoreError> {
        self.update(|users| {
            let now = timestamp();
            let user = users
                .entry(user_id.to_string())
                .and_modify(|u| {
                    u.email = email.to_string();
                    if let Some(name) = name {
                        u.name = Some(name.to_string());
                    }
                    u.last_activity = now.clone();
                })
                .or_insert_with(|| UserData {
                    email: email.to_string(),
                    name: name.map(str::to_string),
                    prompts: Vec::new(),
                    model_count: 0,
                    created_at: now.clone(),
                    last_activity: now.clone(),
                });
            Ok(user.clone())
        })
        .await
    }

    /// Existing user, or a placeholder record for an id seen for the first time
    pub async fn ensure_user(&self, user_id: &str) -> Result<UserData, StoreError> {
        if let Some(user) = self.get_user(user_id).await {
            return Ok(user);
        }
        tracing::info!("Auto-creating user {}", user_id);
        let email = format!("{}@generated.local", user_id);
        let name = format!("User {}", user_id);
        self.create_or_update_user(user_id, &email, Some(&name)).await
    }

    pub async fn can_generate(&self, user_id: &str) -> bool {
        self.inner
            .lock()
            .await
            .users
            .get(user_id)
            .map_or(true, |u| u.model_count < self.max_models)
    }

    pub async fn record_prompt(&self, user_id: &str, prompt: &str, kind: PromptType) -> Result<(), StoreError> {
        self.update(|users| {
            let user = known(users, user_id)?;
            let now = timestamp();
            user.prompts.push(UserPrompt {
                prompt: prompt.to_string(),
                kind,
                timestamp: now.clone(),
            });
            user.last_activity = now;
            Ok(())
        })
        .await
    }

    /// Check the limit and take one slot in a single step.
    /// Returns the new count.
    pub async fn reserve_generation(&self, user_id: &str) -> Result<u32, StoreError> {
        let max = self.max_models;
        self.update(|users| {
            let user = known(users, user_id)?;
            if user.model_count >= max {
                return Err(StoreError::LimitExceeded {
                    user_id: user_id.to_string(),
                    current: user.model_count,
                    max,
                });
            }
            user.model_count += 1;
            user.last_activity = timestamp();
            Ok(user.model_count)
        })
        .await
    }

    /// Give back a slot taken by [`reserve_generation`](Self::reserve_generation)
    pub async fn release_generation(&self, user_id: &str) -> Result<(), StoreError> {
        if self.get_user(user_id).await.is_none() {
            return Ok(());
        }
        self.update(|users| {
            if let Some(user) = users.get_mut(user_id) {
                user.model_count = user.model_count.saturating_sub(1);
            }
            Ok(())
        })
        .await
    }

    pub async fn increment_model_count(&self, user_id: &str) -> Result<u32, StoreError> {
        self.reserve_generation(user_id).await
    }

    pub async fn reset_count(&self, user_id: &str) -> Result<(), StoreError> {
        self.update(|users| {
            known(users, user_id)?.model_count = 0;
            Ok(())
        })
        .await
    }

    pub async fn delete_user(&self, user_id: &str) -> Result<(), StoreError> {
        self.update(|users| {
            users
                .remove(user_id)
                .map(drop)
                .ok_or_else(|| StoreError::UnknownUser(user_id.to_string()))
        })
        .await?;
        self.inner.lock().await.sessions.retain(|_, s| s.user_id != user_id);
        Ok(())
    }

    pub async fn summary(&self) -> AdminSummaryResponse {
        let inner = self.inner.lock().await;
        let users: Vec<UserSummary> = inner
            .users
            .iter()
            .map(|(id, u)| {
                let skip = u.prompts.len().saturating_sub(RECENT_PROMPTS);
                UserSummary {
                    user_id: id.clone(),
                    email: u.email.clone(),
                    name: u.name.clone(),
                    model_count: u.model_count,
                    total_prompts: u.prompts.len(),
                    created_at: u.created_at.clone(),
                    last_activity: u.last_activity.clone(),
                    recent_prompts: u.prompts[skip..].to_vec(),
                }
            })
            .collect();

        AdminSummaryResponse {
            total_users: users.len(),
            total_prompts: users.iter().map(|u| u.total_prompts).sum(),
            total_models_generated: users.iter().map(|u| u64::from(u.model_count)).sum(),
            users,
        }
    }

    pub async fn create_session(&self, user_id: &str) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        inner.sessions.retain(|_, s| s.expires_at > now);
        inner.sessions.insert(
            id.clone(),
            Session {
                user_id: user_id.to_string(),
                expires_at: now + Duration::days(SESSION_DAYS),
            },
        );
        id
    }

    /// User behind a live session
    pub async fn session_user(&self, session_id: &str) -> Option<String> {
        let inner = self.inner.lock().await;
        inner
            .sessions
            .get(session_id)
            .filter(|s| s.expires_at > Utc::now())
            .map(|s| s.user_id.clone())
    }

    pub fn session_max_age_secs() -> i64 {
        Duration::days(SESSION_DAYS).num_seconds()
    }

    /// Apply `change` to a copy of the records and publish the copy only
    /// once it is on disk. A failed change or write leaves memory as it was.
    async fn update<T>(
        &self,
        change: impl FnOnce(&mut BTreeMap<String, UserData>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut inner = self.inner.lock().await;
        let mut users = inner.users.clone();
        let value = change(&mut users)?;
        self.persist(&users).await?;
        inner.users = users;
        Ok(value)
    }

    async fn persist(&self, users: &BTreeMap<String, UserData>) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(users)?;
        write_atomic(&self.path, &json).await?;
        Ok(())
    }
}

fn known<'a>(users: &'a mut BTreeMap<String, UserData>, user_id: &str) -> Result<&'a mut UserData, StoreError> {
    users
        .get_mut(user_id)
        .ok_or_else(|| StoreError::UnknownUser(user_id.to_string()))
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await
}

fn timestamp() -> String {
    Utc::now().to_rfc3339()
}
