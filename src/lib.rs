pub mod adapters;
pub mod config;
pub mod domain;
pub mod infra;
pub mod services;
pub mod transport;

use {
    adapters::Gateways,
    domain::store::Store,
    services::{
        orchestrator::Orchestrator, refunds::RefundManager, registry::MethodRegistry,
        webhook_processor::WebhookProcessor,
    },
    std::{sync::Arc, time::Duration},
};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub refunds: RefundManager,
    pub webhooks: WebhookProcessor,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<MethodRegistry>,
        gateways: Gateways,
        gateway_timeout: Duration,
    ) -> Self {
        let orchestrator = Orchestrator::new(store, registry, gateways, gateway_timeout);
        let refunds = RefundManager::new(orchestrator.clone());
        let webhooks = WebhookProcessor::new(orchestrator.clone(), refunds.clone());
        Self {
            orchestrator,
            refunds,
            webhooks,
        }
    }
}
