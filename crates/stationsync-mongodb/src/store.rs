//! Backend capability consumed by the connection manager
//!
//! [`DocumentStore`] is the seam between stationsync and the database driver.
//! [`MongoStore`] is the production implementation over one MongoDB
//! collection; other implementations (an in-memory store in tests, for
//! example) plug in through [`crate::ConnectionManager::with_store`].

use async_trait::async_trait;
use bson::{doc, Document as BsonDocument};
use futures::TryStreamExt;
use mongodb::{Client, Collection, Database};
use stationsync_common::BackendError;

/// Result of a backend call, failing with the backend's native error
pub type StoreResult<T> = std::result::Result<T, BackendError>;

/// Document-database operations over a single collection
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// All documents matching `filter`, in backend order
    async fn find(&self, filter: BsonDocument) -> StoreResult<Vec<BsonDocument>>;

    /// First document matching `filter`, without reading the rest
    async fn find_one(&self, filter: BsonDocument) -> StoreResult<Option<BsonDocument>>;

    async fn insert_one(&self, document: BsonDocument) -> StoreResult<()>;

    async fn insert_many(&self, documents: Vec<BsonDocument>) -> StoreResult<()>;

    /// Replace the first document matching `filter`; returns the matched count
    async fn replace_one(&self, filter: BsonDocument, document: BsonDocument) -> StoreResult<u64>;

    /// Apply an update document (`$set`, `$setOnInsert`, ...) to the first
    /// match, inserting a new document when `upsert` is set and nothing matches.
    /// Returns the matched count.
    async fn update_one(
        &self,
        filter: BsonDocument,
        update: BsonDocument,
        upsert: bool,
    ) -> StoreResult<u64>;

    /// Returns the deleted count
    async fn delete_one(&self, filter: BsonDocument) -> StoreResult<u64>;

    /// Returns the deleted count
    async fn delete_all(&self) -> StoreResult<u64>;

    /// Round-trip to the backend to prove it is reachable
    async fn ping(&self) -> StoreResult<()>;

    /// Release the underlying client. The store is not used afterwards.
    async fn close(&self);
}

/// [`DocumentStore`] over one MongoDB collection
pub struct MongoStore {
    client: Client,
    database: Database,
    collection: Collection<BsonDocument>,
}

impl MongoStore {
    /// Select `database` and `collection` on an already configured client
    pub fn new(client: Client, database: &str, collection: &str) -> Self {
        let database = client.database(database);
        let collection = database.collection(collection);
        Self {
            client,
            database,
            collection,
        }
    }

    /// Get a reference to the client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Get a reference to the collection
    pub fn collection(&self) -> &Collection<BsonDocument> {
        &self.collection
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn find(&self, filter: BsonDocument) -> StoreResult<Vec<BsonDocument>> {
        let cursor = self.collection.find(filter).await?;
        let documents: Vec<BsonDocument> = cursor.try_collect().await?;
        Ok(documents)
    }

    async fn find_one(&self, filter: BsonDocument) -> StoreResult<Option<BsonDocument>> {
        Ok(self.collection.find_one(filter).await?)
    }

    async fn insert_one(&self, document: BsonDocument) -> StoreResult<()> {
        self.collection.insert_one(document).await?;
        Ok(())
    }

    async fn insert_many(&self, documents: Vec<BsonDocument>) -> StoreResult<()> {
        self.collection.insert_many(documents).await?;
        Ok(())
    }

    async fn replace_one(&self, filter: BsonDocument, document: BsonDocument) -> StoreResult<u64> {
        let result = self.collection.replace_one(filter, document).await?;
        Ok(result.matched_count)
    }

    async fn update_one(
        &self,
        filter: BsonDocument,
        update: BsonDocument,
        upsert: bool,
    ) -> StoreResult<u64> {
        let result = self
            .collection
            .update_one(filter, update)
            .upsert(upsert)
            .await?;
        Ok(result.matched_count)
    }

    async fn delete_one(&self, filter: BsonDocument) -> StoreResult<u64> {
        let result = self.collection.delete_one(filter).await?;
        Ok(result.deleted_count)
    }

    async fn delete_all(&self) -> StoreResult<u64> {
        let result = self.collection.delete_many(doc! {}).await?;
        Ok(result.deleted_count)
    }

    async fn ping(&self) -> StoreResult<()> {
        self.database.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    async fn close(&self) {
        self.client.clone().shutdown().await;
    }
}
