//! Document identity: the `_id` projection used as a match filter

use std::fmt;

use bson::{Bson, Document as BsonDocument};
use stationsync_common::{Result, SyncError};

use crate::connection::ConnectionManager;
use crate::document::ID_FIELD;
use crate::store::DocumentStore;

/// The identity field of one document
#[derive(Debug, Clone, PartialEq)]
pub struct Identity(Bson);

impl Identity {
    /// Identity with an explicit `_id` value
    pub fn new(value: impl Into<Bson>) -> Self {
        Self(value.into())
    }

    /// The raw `_id` value
    pub fn value(&self) -> &Bson {
        &self.0
    }

    /// `{ "_id": <value> }`
    pub fn filter(&self) -> BsonDocument {
        let mut filter = BsonDocument::new();
        filter.insert(ID_FIELD, self.0.clone());
        filter
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Project a document to its identity
///
/// # Errors
/// Returns [`SyncError::Usage`] if the document has no `_id` field
pub fn identity(document: &BsonDocument) -> Result<Identity> {
    document
        .get(ID_FIELD)
        .map(|value| Identity(value.clone()))
        .ok_or_else(|| {
            let fields: Vec<&str> = document.keys().map(String::as_str).collect();
            SyncError::Usage(format!(
                "Document has no '{}' field (fields: {:?})",
                ID_FIELD, fields
            ))
        })
}

/// True iff at least one stored document matches `identity`
pub async fn exists<S: DocumentStore>(
    connection: &ConnectionManager<S>,
    identity: &Identity,
) -> Result<bool> {
    let found = connection.find(identity.filter()).await?;
    Ok(!found.is_empty())
}
