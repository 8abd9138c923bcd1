pub mod config;
pub mod http;
pub mod metrics_server;
pub mod observability;
pub mod store;

pub use store::{Reading, ReadingStore, StoreError};
