//! Outbound integration with the subscription provider.

pub mod client;
pub mod retry;
pub mod subscriber;

pub use client::{ProviderClient, RestProviderClient};
pub use retry::RetryPolicy;
pub use subscriber::{SubscriberSnapshot, extract_snapshot};
