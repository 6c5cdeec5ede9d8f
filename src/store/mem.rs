use crate::error::AppResult;
use crate::models::ClientMap;
use crate::store::ClientStore;
use async_trait::async_trait;
use parking_lot::RwLock;

/// In-process registry, used by tests in place of the JSON file.
#[derive(Default)]
pub struct MemoryStore {
    clients: RwLock<ClientMap>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(clients: ClientMap) -> Self {
        Self {
            clients: RwLock::new(clients),
        }
    }
}

#[async_trait]
impl ClientStore for MemoryStore {
    async fn load(&self) -> AppResult<ClientMap> {
        Ok(self.clients.read().clone())
    }

    async fn save(&self, clients: &ClientMap) -> AppResult<()> {
        *self.clients.write() = clients.clone();
        Ok(())
    }
}
