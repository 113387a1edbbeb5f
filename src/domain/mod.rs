pub mod dispute;
pub mod error;
pub mod fee;
pub mod gateway;
pub mod id;
pub mod method;
pub mod money;
pub mod refund;
pub mod store;
pub mod transaction;
pub mod webhook;
