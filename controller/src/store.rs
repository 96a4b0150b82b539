use std::{
    collections::BTreeMap,
    ffi::OsString,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use climate_common::Session;
use tokio::sync::Mutex;

use crate::error::StoreError;

pub const SESSION_FILE: &str = "sessions.json";

/// Durable map from thermostat name to its OAuth session.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Session>, StoreError>;
    async fn put(&self, key: &str, session: &Session) -> Result<(), StoreError>;
}

/// All sessions live in one JSON document that is read and rewritten on every access.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Sibling of the document that new contents are staged in before the rename.
    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from(SESSION_FILE));
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn load(&self) -> Result<BTreeMap<String, Session>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl SessionStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Session>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(key))
    }

    async fn put(&self, key: &str, session: &Session) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut sessions = self.load().await?;
        sessions.insert(key.to_string(), session.clone());

        if let Some(parent) = self.path.parent().filter(|dir| *dir != Path::new("")) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(&sessions)?;
        let staging = self.staging_path();
        write_synced(&staging, &payload).await?;
        tokio::fs::rename(&staging, &self.path).await?;
        Ok(())
    }
}

async fn write_synced(path: &Path, payload: &[u8]) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(payload).await?;
    file.sync_all().await
}
