//! Connection lifecycle for one database collection
//!
//! [`ConnectionManager`] owns exactly one backend client and collection handle.
//! It is opened from a [`MongoConfig`], exposes the primitive operations the
//! synchronizer builds on, and releases the client on [`ConnectionManager::close`]
//! or when dropped.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bson::Document as BsonDocument;
use mongodb::{
    options::{ClientOptions, Tls, TlsOptions},
    Client,
};
use stationsync_common::{Result, SyncError};
use tracing::instrument;

use crate::config::MongoConfig;
use crate::document::{match_all, UpdateSpec};
use crate::sink::{default_sink, EventSink};
use crate::store::{DocumentStore, MongoStore};
use crate::validation::validate_filter;

/// Driver tuning applied on top of the settings derived from [`MongoConfig`]
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool (default: 10)
    pub max_pool_size: Option<u32>,
    /// Connection timeout (default: 10s)
    pub connect_timeout: Option<Duration>,
    /// Server selection timeout; `None` keeps the driver default (30s)
    pub server_selection_timeout: Option<Duration>,
    /// Application name for server logs
    pub app_name: Option<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_pool_size: Some(10),
            connect_timeout: Some(Duration::from_secs(10)),
            server_selection_timeout: None,
            app_name: Some("stationsync".to_string()),
        }
    }
}

/// Build driver options from [`MongoConfig::uri`] and [`MongoConfig::options`].
///
/// Every entry of the options table is applied here. TLS entries are set on
/// the parsed options so the CA path needs no escaping; all other entries
/// travel as connection-string options.
pub async fn client_options(config: &MongoConfig) -> Result<ClientOptions> {
    let mut query = Vec::new();
    let mut tls_enabled = false;
    let mut ca_file = None;
    for (key, value) in config.options() {
        match key {
            "tls" => tls_enabled = value == "true",
            "tlsCAFile" => ca_file = Some(PathBuf::from(value)),
            _ => query.push(format!("{}={}", key, urlencoding::encode(&value))),
        }
    }
    let connection_string = if query.is_empty() {
        config.uri()
    } else {
        format!("{}?{}", config.uri(), query.join("&"))
    };

    let mut options = ClientOptions::parse(connection_string)
        .await
        .map_err(|e| SyncError::Connection(format!("Invalid connection URI: {}", e)))?;

    if tls_enabled || ca_file.is_some() {
        let tls = match ca_file {
            Some(path) => TlsOptions::builder().ca_file_path(path).build(),
            None => TlsOptions::builder().build(),
        };
        options.tls = Some(Tls::Enabled(tls));
    }

    let pool = config.pool();
    if let Some(max) = pool.max_pool_size {
        options.max_pool_size = Some(max);
    }
    if let Some(connect) = pool.connect_timeout {
        options.connect_timeout = Some(connect);
    }
    if let Some(server_sel) = pool.server_selection_timeout {
        options.server_selection_timeout = Some(server_sel);
    }
    if let Some(app) = &pool.app_name {
        options.app_name = Some(app.clone());
    }

    Ok(options)
}

/// Scoped connection to one collection
///
/// Not meant to be shared between concurrent callers; use one manager per
/// worker or synchronize externally.
pub struct ConnectionManager<S: DocumentStore = MongoStore> {
    store: S,
    sink: Arc<dyn EventSink>,
}

impl ConnectionManager<MongoStore> {
    /// Open a connection with the default `tracing` sink
    pub async fn open(config: &MongoConfig) -> Result<Self> {
        Self::open_with_sink(config, default_sink()).await
    }

    /// Open a connection and verify the server answers a ping.
    ///
    /// # Errors
    /// Returns [`SyncError::Connection`] if the client cannot be built or the
    /// ping fails (unreachable server, rejected credentials, selection timeout).
    #[instrument(skip(config, sink), fields(
        host = config.host(),
        port = config.port(),
        database = config.database(),
        collection = config.collection()
    ))]
    pub async fn open_with_sink(config: &MongoConfig, sink: Arc<dyn EventSink>) -> Result<Self> {
        let options = client_options(config).await?;
        let client = Client::with_options(options)
            .map_err(|e| SyncError::Connection(format!("Failed to create client: {}", e)))?;

        let store = MongoStore::new(client, config.database(), config.collection());

        // The driver connects lazily; ping so an unreachable server fails here
        if let Err(e) = store.ping().await {
            sink.error(&format!(
                "Cannot connect to {}:{}: {}",
                config.host(),
                config.port(),
                e
            ));
            store.close().await;
            return Err(SyncError::Connection(format!(
                "Cannot connect to server {}:{}: {}",
                config.host(),
                config.port(),
                e
            )));
        }

        sink.info(&format!(
            "Connected to {}/{} on {}:{}",
            config.database(),
            config.collection(),
            config.host(),
            config.port()
        ));
        Ok(Self { store, sink })
    }
}

impl<S: DocumentStore> ConnectionManager<S> {
    /// Wrap an already opened store
    pub fn with_store(store: S, sink: Arc<dyn EventSink>) -> Self {
        Self { store, sink }
    }

    /// Get a reference to the backing store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the injected event sink
    pub fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }

    /// Release the connection
    pub async fn close(self) {
        self.store.close().await;
        self.sink.debug("Connection closed");
    }

    /// Documents matching `filter`, in backend order
    pub async fn find(&self, filter: BsonDocument) -> Result<Vec<BsonDocument>> {
        validate_filter(&filter)?;
        let documents = self
            .store
            .find(filter)
            .await
            .map_err(|e| self.storage_failure("find", e))?;
        self.sink
            .debug(&format!("find returned {} documents", documents.len()));
        Ok(documents)
    }

    /// Every document in the collection
    pub async fn all_documents(&self) -> Result<Vec<BsonDocument>> {
        self.find(match_all()).await
    }

    /// First document matching `filter`, if any
    pub async fn find_one(&self, filter: BsonDocument) -> Result<Option<BsonDocument>> {
        validate_filter(&filter)?;
        self.store
            .find_one(filter)
            .await
            .map_err(|e| self.storage_failure("find_one", e))
    }

    /// First document in backend order, if any
    pub async fn first_document(&self) -> Result<Option<BsonDocument>> {
        self.find_one(match_all()).await
    }

    pub async fn insert_one(&self, document: BsonDocument) -> Result<()> {
        self.store
            .insert_one(document)
            .await
            .map_err(|e| self.storage_failure("insert_one", e))
    }

    pub async fn insert_many(&self, documents: Vec<BsonDocument>) -> Result<()> {
        self.store
            .insert_many(documents)
            .await
            .map_err(|e| self.storage_failure("insert_many", e))
    }

    /// Returns the number of matched documents (0 or 1)
    pub async fn replace_one(&self, filter: BsonDocument, document: BsonDocument) -> Result<u64> {
        self.store
            .replace_one(filter, document)
            .await
            .map_err(|e| self.storage_failure("replace_one", e))
    }

    /// Returns the number of matched documents (0 when an upsert inserted)
    pub async fn update_one(
        &self,
        filter: BsonDocument,
        update: &UpdateSpec,
        upsert: bool,
    ) -> Result<u64> {
        self.store
            .update_one(filter, update.to_document(), upsert)
            .await
            .map_err(|e| self.storage_failure("update_one", e))
    }

    /// Returns the number of deleted documents
    pub async fn delete_one(&self, filter: BsonDocument) -> Result<u64> {
        validate_filter(&filter)?;
        self.store
            .delete_one(filter)
            .await
            .map_err(|e| self.storage_failure("delete_one", e))
    }

    /// Returns the number of deleted documents
    pub async fn delete_all(&self) -> Result<u64> {
        self.store
            .delete_all()
            .await
            .map_err(|e| self.storage_failure("delete_all", e))
    }

    fn storage_failure(
        &self,
        operation: &'static str,
        cause: stationsync_common::BackendError,
    ) -> SyncError {
        self.sink
            .error(&format!("{} failed: {}", operation, cause));
        SyncError::storage(operation, cause)
    }
}
