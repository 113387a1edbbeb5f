pub mod orchestrator;
pub mod refunds;
pub mod registry;
pub mod stats;
pub mod webhook_processor;
pub mod worker;
