pub mod backoff;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod metrics;
pub mod model;
pub mod notify;
pub mod popularity;
pub mod provider;
pub mod reconciler;
pub mod repository;
pub mod scheduler;
pub mod season;
pub mod settlement;
pub mod syncer;

pub use config::SyncerConfig;
pub use error::{ConfigError, Result, SyncError};
pub use repository::{InMemoryRepository, PgRepository, Repository};
pub use syncer::Syncer;
