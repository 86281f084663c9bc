//! MongoDB / DocumentDB synchronization for keyed observation documents
//!
//! This crate reconciles batches of documents (for example per-station weather
//! readings keyed by a timestamp id) against one collection.
//!
//! # Features
//! - Immutable, validated connection configuration ([`MongoConfig`])
//! - Scoped connection with explicit or drop-time release ([`ConnectionManager`])
//! - Identity-based matching on `_id` ([`identity`], [`exists`])
//! - Insert, replace and three upsert strategies ([`Synchronizer`])
//! - Injected observability sink ([`EventSink`])
//!
//! # Example
//!
//! ```ignore
//! let config = MongoConfig::builder("localhost", "test", "Apollo13", "TEST_LOCAL", "amedas")
//!     .build()?;
//! let connection = ConnectionManager::open(&config).await?;
//! let synchronizer = Synchronizer::new(&connection);
//! synchronizer.upsert_stations(&documents).await?;
//! connection.close().await;
//! ```

pub mod config;
pub mod connection;
pub mod document;
pub mod identity;
pub mod sink;
pub mod store;
pub mod sync;
pub mod validation;

pub use config::{MongoConfig, MongoConfigBuilder, ReadPreferenceMode, DEFAULT_PORT};
pub use connection::{ConnectionManager, PoolConfig};
pub use document::{Observation, UpdateSpec, CREATE_TIME_FIELD, DATA_FIELD, ID_FIELD};
pub use identity::{exists, identity, Identity};
pub use sink::{EventSink, NullSink, TracingSink};
pub use stationsync_common::{BackendError, Result, SyncError};
pub use store::{DocumentStore, MongoStore, StoreResult};
pub use sync::{InsertOutcome, SyncReport, Synchronizer};
