use crate::error::AppResult;
use crate::models::ClientMap;
use crate::store::ClientStore;
use async_trait::async_trait;
use std::path::PathBuf;

/// Registry persisted as one JSON file mapping identity to record.
/// A missing file reads as an empty registry.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ClientStore for JsonFileStore {
    async fn load(&self) -> AppResult<ClientMap> {
        match tokio::fs::read(&self.path).await {
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ClientMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, clients: &ClientMap) -> AppResult<()> {
        let raw = serde_json::to_vec_pretty(clients)?;
        tokio::fs::write(&self.path, raw).await?;
        Ok(())
    }
}
