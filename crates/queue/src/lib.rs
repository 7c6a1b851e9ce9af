//! Persisted delivery retry queue for fedigraph.
//!
//! - **Queue**: failed and deferred deliveries stored as `delivery_task` rows
//! - **Retry**: exponential backoff with a bounded attempt count
//! - **Worker**: polls due tasks and re-delivers them in per-inbox order

pub mod delivery_queue;
pub mod retry;
pub mod worker;

pub use delivery_queue::DeliveryTaskQueue;
pub use retry::RetryConfig;
pub use worker::{RetryRunSummary, RetryWorker};
