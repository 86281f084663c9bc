//! In-memory DocumentStore for testing.
//!
//! Implements the subset of MongoDB semantics the synchronizer relies on:
//! equality filters (with dotted paths), `$set` / `$setOnInsert` with dotted
//! paths, upsert seeding from the filter, and unique `_id`s.
//! Records every call and can be told to fail an operation after N calls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bson::{oid::ObjectId, Bson, Document as BsonDocument};
use stationsync_mongodb::{DocumentStore, StoreResult};

/// Failure injected into one backend operation
#[derive(Debug, Clone)]
struct FailurePlan {
    /// Calls of this operation that still succeed before failing
    remaining: usize,
}

#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<Vec<BsonDocument>>,
    calls: Mutex<Vec<&'static str>>,
    failures: Mutex<HashMap<&'static str, FailurePlan>>,
    closed: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `documents`
    pub fn with_documents(documents: Vec<BsonDocument>) -> Self {
        let store = Self::default();
        *store.documents.lock().unwrap() = documents;
        store
    }

    /// Make `operation` fail once `succeed_first` calls of it have succeeded
    pub fn fail_after(&self, operation: &'static str, succeed_first: usize) {
        self.failures.lock().unwrap().insert(
            operation,
            FailurePlan {
                remaining: succeed_first,
            },
        );
    }

    /// Snapshot of stored documents in insertion order
    pub fn documents(&self) -> Vec<BsonDocument> {
        self.documents.lock().unwrap().clone()
    }

    /// Stored document with this `_id`
    pub fn get(&self, id: impl Into<Bson>) -> Option<BsonDocument> {
        let id = id.into();
        self.documents
            .lock()
            .unwrap()
            .iter()
            .find(|document| document.get("_id") == Some(&id))
            .cloned()
    }

    /// Names of the backend operations called so far, in order
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls of one operation
    pub fn call_count(&self, operation: &str) -> usize {
        self.calls().iter().filter(|c| **c == operation).count()
    }

    /// Flag flipped by `close`, observable after the store is moved away
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }

    fn enter(&self, operation: &'static str) -> StoreResult<()> {
        self.calls.lock().unwrap().push(operation);
        let mut failures = self.failures.lock().unwrap();
        if let Some(plan) = failures.get_mut(operation) {
            if plan.remaining == 0 {
                return Err(format!("injected failure in {}", operation).into());
            }
            plan.remaining -= 1;
        }
        Ok(())
    }
}

fn get_path<'a>(document: &'a BsonDocument, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            _ => return None,
        };
    }
    Some(current)
}

fn set_path(document: &mut BsonDocument, path: &str, value: Bson) -> StoreResult<()> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            let child = document
                .entry(head.to_string())
                .or_insert_with(|| Bson::Document(BsonDocument::new()));
            match child {
                Bson::Document(inner) => set_path(inner, rest, value),
                other => Err(format!(
                    "Cannot create field '{}' in element {{{}: {}}}",
                    rest, head, other
                )
                .into()),
            }
        }
    }
}

fn matches(document: &BsonDocument, filter: &BsonDocument) -> StoreResult<bool> {
    for (key, expected) in filter {
        if key.starts_with('$') {
            return Err(format!("unsupported filter operator {}", key).into());
        }
        if get_path(document, key) != Some(expected) {
            return Ok(false);
        }
    }
    Ok(true)
}

fn operator<'a>(update: &'a BsonDocument, name: &str) -> StoreResult<Option<&'a BsonDocument>> {
    match update.get(name) {
        None => Ok(None),
        Some(Bson::Document(fields)) => Ok(Some(fields)),
        Some(other) => Err(format!("{} must be a document, found {}", name, other).into()),
    }
}

fn apply_fields(document: &mut BsonDocument, fields: &BsonDocument) -> StoreResult<()> {
    for (path, value) in fields {
        if path == "_id" && document.get("_id").is_some_and(|id| id != value) {
            return Err("Performing an update on the path '_id' would modify the immutable field '_id'".into());
        }
        set_path(document, path, value.clone())?;
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(&self, filter: BsonDocument) -> StoreResult<Vec<BsonDocument>> {
        self.enter("find")?;
        let documents = self.documents.lock().unwrap();
        let mut found = Vec::new();
        for document in documents.iter() {
            if matches(document, &filter)? {
                found.push(document.clone());
            }
        }
        Ok(found)
    }

    async fn find_one(&self, filter: BsonDocument) -> StoreResult<Option<BsonDocument>> {
        self.enter("find_one")?;
        let documents = self.documents.lock().unwrap();
        for document in documents.iter() {
            if matches(document, &filter)? {
                return Ok(Some(document.clone()));
            }
        }
        Ok(None)
    }

    async fn insert_one(&self, mut document: BsonDocument) -> StoreResult<()> {
        self.enter("insert_one")?;
        let mut documents = self.documents.lock().unwrap();
        if !document.contains_key("_id") {
            document.insert("_id", ObjectId::new());
        }
        let id = document.get("_id").cloned();
        if documents.iter().any(|stored| stored.get("_id").cloned() == id) {
            return Err(format!("E11000 duplicate key error: {:?}", id).into());
        }
        documents.push(document);
        Ok(())
    }

    async fn insert_many(&self, batch: Vec<BsonDocument>) -> StoreResult<()> {
        self.enter("insert_many")?;
        if batch.is_empty() {
            return Err("documents must be non-empty".into());
        }
        let mut documents = self.documents.lock().unwrap();
        // Ordered insert: everything before a duplicate is kept
        for mut document in batch {
            if !document.contains_key("_id") {
                document.insert("_id", ObjectId::new());
            }
            let id = document.get("_id").cloned();
            if documents.iter().any(|stored| stored.get("_id").cloned() == id) {
                return Err(format!("E11000 duplicate key error: {:?}", id).into());
            }
            documents.push(document);
        }
        Ok(())
    }

    async fn replace_one(&self, filter: BsonDocument, mut replacement: BsonDocument) -> StoreResult<u64> {
        self.enter("replace_one")?;
        let mut documents = self.documents.lock().unwrap();
        for stored in documents.iter_mut() {
            if matches(stored, &filter)? {
                let id = stored.get("_id").cloned().unwrap_or(Bson::Null);
                match replacement.get("_id") {
                    Some(new_id) if *new_id != id => {
                        return Err("the (immutable) field '_id' was found to have been altered".into());
                    }
                    _ => {}
                }
                let mut rebuilt = BsonDocument::new();
                rebuilt.insert("_id", id);
                replacement.remove("_id");
                for (key, value) in replacement {
                    rebuilt.insert(key, value);
                }
                *stored = rebuilt;
                return Ok(1);
            }
        }
        Ok(0)
    }

    async fn update_one(
        &self,
        filter: BsonDocument,
        update: BsonDocument,
        upsert: bool,
    ) -> StoreResult<u64> {
        self.enter("update_one")?;
        if update.is_empty() || update.keys().any(|key| !key.starts_with('$')) {
            return Err("update document requires atomic operators".into());
        }
        let set = operator(&update, "$set")?;
        let set_on_insert = operator(&update, "$setOnInsert")?;

        let mut documents = self.documents.lock().unwrap();
        for stored in documents.iter_mut() {
            if matches(stored, &filter)? {
                if let Some(fields) = set {
                    apply_fields(stored, fields)?;
                }
                return Ok(1);
            }
        }

        if upsert {
            let mut created = BsonDocument::new();
            for (key, value) in &filter {
                set_path(&mut created, key, value.clone())?;
            }
            if let Some(fields) = set {
                apply_fields(&mut created, fields)?;
            }
            if let Some(fields) = set_on_insert {
                apply_fields(&mut created, fields)?;
            }
            if !created.contains_key("_id") {
                created.insert("_id", ObjectId::new());
            }
            documents.push(created);
        }
        Ok(0)
    }

    async fn delete_one(&self, filter: BsonDocument) -> StoreResult<u64> {
        self.enter("delete_one")?;
        let mut documents = self.documents.lock().unwrap();
        for index in 0..documents.len() {
            if matches(&documents[index], &filter)? {
                documents.remove(index);
                return Ok(1);
            }
        }
        Ok(0)
    }

    async fn delete_all(&self) -> StoreResult<u64> {
        self.enter("delete_all")?;
        let mut documents = self.documents.lock().unwrap();
        let deleted = documents.len() as u64;
        documents.clear();
        Ok(deleted)
    }

    async fn ping(&self) -> StoreResult<()> {
        self.enter("ping")
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
