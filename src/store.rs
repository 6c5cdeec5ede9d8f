use crate::error::AppResult;
use crate::models::ClientMap;
use async_trait::async_trait;

mod json_file; // Persistent storage
mod mem; // Ephemeral storage

pub use json_file::JsonFileStore;
pub use mem::MemoryStore;

/// Durable client registry. Offers whole-map load/save only; it makes no
/// consistency promise for concurrent writers. Callers that mutate must
/// hold the ledger's per-identity lock across the load/mutate/save cycle.
#[async_trait]
pub trait ClientStore: Send + Sync {
    async fn load(&self) -> AppResult<ClientMap>;
    async fn save(&self, clients: &ClientMap) -> AppResult<()>;
}
