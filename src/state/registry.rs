use crate::config::Config;
use crate::services::{QuotaLedger, Vault};
use crate::store::ClientStore;
use std::sync::Arc;

/// Shared application state handed to the network layer: the injected
/// client store plus the services built on top of it.
pub struct Registry {
    pub config: Arc<Config>,
    pub store: Arc<dyn ClientStore>,
    pub ledger: Arc<QuotaLedger>,
    pub vault: Arc<Vault>,
}

impl Registry {
    pub fn new(store: Arc<dyn ClientStore>, config: Arc<Config>) -> Self {
        let ledger = Arc::new(QuotaLedger::new(store.clone(), config.default_quota));
        let vault = Arc::new(Vault::new(config.data_root.clone()));

        Self {
            config,
            store,
            ledger,
            vault,
        }
    }
}
