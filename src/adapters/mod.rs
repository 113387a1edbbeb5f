pub mod sandbox;
pub mod signature;
pub mod stripe;

use {
    crate::domain::{error::EngineError, gateway::GatewayAdapter, id::ProviderKey},
    std::{collections::BTreeMap, sync::Arc},
};

/// Provider key -> adapter instance. Built once at start-up.
#[derive(Clone, Default)]
pub struct Gateways {
    adapters: BTreeMap<ProviderKey, Arc<dyn GatewayAdapter>>,
}

impl Gateways {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, adapter: Arc<dyn GatewayAdapter>) -> Self {
        self.adapters.insert(adapter.provider().clone(), adapter);
        self
    }

    pub fn get(&self, provider: &ProviderKey) -> Result<Arc<dyn GatewayAdapter>, EngineError> {
        self.adapters
            .get(provider)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("gateway for provider {provider}")))
    }

    pub fn providers(&self) -> impl Iterator<Item = &ProviderKey> {
        self.adapters.keys()
    }
}
