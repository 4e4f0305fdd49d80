//! Wygrzeb Search Aggregator
//!
//! Fans one query out to news, fact-check, social and Polish public-data
//! providers in parallel, normalizes every reply into one tagged result type
//! and merges, sorts and paginates the combined list. Sources that fail after
//! retries and fallback are reported next to the results.

pub mod aggregator;
pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod http_client;
pub mod identity;
pub mod metrics;
pub mod retry;
pub mod schemas;
pub mod server;
pub mod sources;

pub use aggregator::Aggregator;
pub use config::Config;
pub use error::{AdapterError, AggregatorError, Result};
pub use retry::RetryPolicy;
pub use schemas::{AggregatedResponse, RawSearchRequest, SearchRequest, SearchResult};
pub use sources::SourceRegistry;
