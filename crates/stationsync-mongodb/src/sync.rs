//! Batch synchronization strategies
//!
//! | operation          | match        | writes                                  |
//! |--------------------|--------------|-----------------------------------------|
//! | `insert_all`       | none         | one `insertMany` of stamped copies      |
//! | `upsert_all`       | `_id`        | every top-level field                   |
//! | `upsert_each`      | `_id`        | the `data` sub-map, wholesale           |
//! | `upsert_stations`  | `_id`        | one `data.<station>` path per update    |
//! | `replace_all`      | everything   | delete all, then `insert_all`           |
//!
//! Upserts write `createTime` through `$setOnInsert`, so it is set only when
//! the identity is first created. Per-document updates run one after another
//! in input order; a storage failure stops the batch and leaves earlier
//! documents written. Caller defects (missing `_id`, malformed `data`) are
//! detected for the whole batch before anything is written.

use std::sync::Arc;

use bson::Document as BsonDocument;
use stationsync_common::{Result, SyncError};
use tracing::instrument;

use crate::connection::ConnectionManager;
use crate::document::{self, UpdateSpec, CREATE_TIME_FIELD, DATA_FIELD, ID_FIELD};
use crate::identity::{exists, identity, Identity};
use crate::sink::EventSink;
use crate::store::{DocumentStore, MongoStore};
use crate::validation::validate_path_segment;

/// Outcome of one synchronizer call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Input documents handled
    pub documents: usize,
    /// Backend write calls issued
    pub writes: usize,
}

impl SyncReport {
    fn new(documents: usize, writes: usize) -> Self {
        Self { documents, writes }
    }
}

/// Outcome of a single-document [`Synchronizer::insert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Created,
    Replaced,
}

/// Writes document batches through a [`ConnectionManager`]
pub struct Synchronizer<'a, S: DocumentStore = MongoStore> {
    connection: &'a ConnectionManager<S>,
    sink: Arc<dyn EventSink>,
}

impl<'a, S: DocumentStore> Synchronizer<'a, S> {
    /// Synchronizer reporting to the connection's sink
    pub fn new(connection: &'a ConnectionManager<S>) -> Self {
        let sink = Arc::clone(connection.sink());
        Self { connection, sink }
    }

    /// Synchronizer reporting to a separate sink
    pub fn with_sink(connection: &'a ConnectionManager<S>, sink: Arc<dyn EventSink>) -> Self {
        Self { connection, sink }
    }

    /// Create the document, or replace the stored one with the same `_id`
    pub async fn insert(&self, document: &BsonDocument) -> Result<InsertOutcome> {
        let id = identity(document)?;
        if exists(self.connection, &id).await? {
            self.connection
                .replace_one(id.filter(), document.clone())
                .await?;
            self.sink.debug(&format!("Replaced document {}", id));
            Ok(InsertOutcome::Replaced)
        } else {
            self.connection.insert_one(document.clone()).await?;
            self.sink.debug(&format!("Created document {}", id));
            Ok(InsertOutcome::Created)
        }
    }

    /// Insert stamped copies of every document in one multi-document insert.
    ///
    /// No partial-success reporting: the batch either succeeds or fails.
    #[instrument(skip_all, fields(documents = documents.len()))]
    pub async fn insert_all(&self, documents: &[BsonDocument]) -> Result<SyncReport> {
        if documents.is_empty() {
            self.sink.debug("insert_all: empty batch, nothing to write");
            return Ok(SyncReport::default());
        }
        require_identities(documents)?;

        let created_at = document::now();
        let stamped: Vec<BsonDocument> = documents
            .iter()
            .map(|document| document::with_create_time(document, created_at))
            .collect();

        self.connection.insert_many(stamped).await?;
        self.sink
            .info(&format!("Inserted {} documents", documents.len()));
        Ok(SyncReport::new(documents.len(), 1))
    }

    /// Upsert every top-level field of each document.
    ///
    /// Re-applying the same batch leaves the stored state unchanged, including
    /// the creation timestamp.
    #[instrument(skip_all, fields(documents = documents.len()))]
    pub async fn upsert_all(&self, documents: &[BsonDocument]) -> Result<SyncReport> {
        let updates = documents
            .iter()
            .map(|document| {
                let id = identity(document)?;
                let fields = top_level_fields(document, &[ID_FIELD, CREATE_TIME_FIELD])?;
                Ok((id, UpdateSpec::set(fields)))
            })
            .collect::<Result<Vec<_>>>()?;

        self.apply_upserts("upsert_all", documents.len(), updates).await
    }

    /// Upsert only the `data` sub-map of each document, replacing it wholesale.
    ///
    /// Other top-level fields of a stored document are left untouched.
    #[instrument(skip_all, fields(documents = documents.len()))]
    pub async fn upsert_each(&self, documents: &[BsonDocument]) -> Result<SyncReport> {
        let updates = documents
            .iter()
            .map(|document| {
                let id = identity(document)?;
                let data = document::data_of(document)?;
                let mut fields = BsonDocument::new();
                fields.insert(DATA_FIELD, data.clone());
                Ok((id, UpdateSpec::set(fields)))
            })
            .collect::<Result<Vec<_>>>()?;

        self.apply_upserts("upsert_each", documents.len(), updates).await
    }

    /// Upsert each station of each document's `data` as its own `data.<station>` path.
    ///
    /// Stored stations missing from the input are preserved.
    #[instrument(skip_all, fields(documents = documents.len()))]
    pub async fn upsert_stations(&self, documents: &[BsonDocument]) -> Result<SyncReport> {
        let mut updates = Vec::new();
        for document in documents {
            let id = identity(document)?;
            for (path, value) in document::station_paths(document)? {
                let mut fields = BsonDocument::new();
                fields.insert(path, value);
                updates.push((id.clone(), UpdateSpec::set(fields)));
            }
        }

        self.apply_upserts("upsert_stations", documents.len(), updates)
            .await
    }

    /// Delete every document, then [`Synchronizer::insert_all`] the new batch.
    ///
    /// Not atomic: if the insert fails the collection is left empty.
    #[instrument(skip_all, fields(documents = documents.len()))]
    pub async fn replace_all(&self, documents: &[BsonDocument]) -> Result<SyncReport> {
        // A malformed batch must not empty the collection
        require_identities(documents)?;

        let deleted = self.connection.delete_all().await?;
        self.sink
            .debug(&format!("replace_all: deleted {} documents", deleted));

        match self.insert_all(documents).await {
            Ok(report) => Ok(SyncReport::new(report.documents, report.writes + 1)),
            Err(e) => {
                self.sink.warn(&format!(
                    "replace_all: collection left empty after {} documents were deleted: {}",
                    deleted, e
                ));
                Err(e)
            }
        }
    }

    /// Set the given top-level fields on the document with the same `_id`.
    ///
    /// Never creates a document. Returns true if one matched.
    pub async fn update(&self, fields: &BsonDocument) -> Result<bool> {
        let id = identity(fields)?;
        let set = top_level_fields(fields, &[ID_FIELD])?;
        if set.is_empty() {
            return Err(SyncError::Usage(format!("Nothing to update for document {}", id)));
        }
        let matched = self
            .connection
            .update_one(id.filter(), &UpdateSpec::set(set), false)
            .await?;
        Ok(matched > 0)
    }

    /// Delete the first document matching `filter`; returns true if one was deleted
    pub async fn delete(&self, filter: BsonDocument) -> Result<bool> {
        Ok(self.connection.delete_one(filter).await? > 0)
    }

    /// Delete every document; returns the deleted count
    pub async fn delete_all(&self) -> Result<u64> {
        let deleted = self.connection.delete_all().await?;
        self.sink.info(&format!("Deleted {} documents", deleted));
        Ok(deleted)
    }

    /// Documents matching `filter`, in backend order
    pub async fn select(&self, filter: BsonDocument) -> Result<Vec<BsonDocument>> {
        self.connection.find(filter).await
    }

    async fn apply_upserts(
        &self,
        operation: &str,
        documents: usize,
        updates: Vec<(Identity, UpdateSpec)>,
    ) -> Result<SyncReport> {
        let mut created = 0usize;
        for (id, update) in &updates {
            let update = update.clone().with_create_time(document::now());
            let matched = self
                .connection
                .update_one(id.filter(), &update, true)
                .await?;
            if matched == 0 {
                created += 1;
            }
        }

        self.sink.info(&format!(
            "{}: {} documents, {} updates, {} created",
            operation,
            documents,
            updates.len(),
            created
        ));
        Ok(SyncReport::new(documents, updates.len()))
    }
}

/// Copy of the top-level fields of `document` except `skip`, for use as `$set`.
///
/// Each key must be a plain field name: `$set` reads `a.b` as a nested path
/// and `$x` as an operator.
fn top_level_fields(document: &BsonDocument, skip: &[&str]) -> Result<BsonDocument> {
    let mut fields = BsonDocument::new();
    for (key, value) in document {
        if skip.contains(&key.as_str()) {
            continue;
        }
        validate_path_segment(key)?;
        fields.insert(key.clone(), value.clone());
    }
    Ok(fields)
}

fn require_identities(documents: &[BsonDocument]) -> Result<()> {
    documents.iter().try_for_each(|document| identity(document).map(|_| ()))
}
