//! Document helpers for observation batches
//!
//! Documents are plain [`bson::Document`]s: ordered maps whose values are the
//! [`bson::Bson`] tagged union. The only structure stationsync relies on is
//! the identity field and, for station-level merges, the `data` sub-map.

use bson::{doc, Bson, Document as BsonDocument};
use serde::{Deserialize, Serialize};
use stationsync_common::{Result, SyncError};

use crate::validation::validate_path_segment;

/// Identity field of every document
pub const ID_FIELD: &str = "_id";

/// Sub-map holding per-station values
pub const DATA_FIELD: &str = "data";

/// Creation timestamp, written once when a document is first created
pub const CREATE_TIME_FIELD: &str = "createTime";

/// Current time as a BSON datetime (UTC)
pub fn now() -> bson::DateTime {
    bson::DateTime::from_chrono(chrono::Utc::now())
}

/// Deep copy of `document` with the creation timestamp set to `created_at`
pub fn with_create_time(document: &BsonDocument, created_at: bson::DateTime) -> BsonDocument {
    let mut copy = document.clone();
    copy.insert(CREATE_TIME_FIELD, created_at);
    copy
}

/// Borrow the `data` sub-map of a document
///
/// # Errors
/// Returns [`SyncError::Usage`] if `data` is missing or is not a map
pub fn data_of(document: &BsonDocument) -> Result<&BsonDocument> {
    match document.get(DATA_FIELD) {
        Some(Bson::Document(data)) => Ok(data),
        Some(other) => Err(SyncError::Usage(format!(
            "Field '{}' must be a map of station values, found {:?}",
            DATA_FIELD,
            other.element_type()
        ))),
        None => Err(SyncError::Usage(format!(
            "Document has no '{}' field",
            DATA_FIELD
        ))),
    }
}

/// Dotted `$set` paths for every station in the `data` sub-map, in document order
///
/// # Errors
/// Returns [`SyncError::Usage`] if `data` is missing or a station key is not
/// a valid path segment
pub fn station_paths(document: &BsonDocument) -> Result<Vec<(String, Bson)>> {
    data_of(document)?
        .iter()
        .map(|(station, value)| {
            validate_path_segment(station)?;
            Ok((format!("{}.{}", DATA_FIELD, station), value.clone()))
        })
        .collect()
}

/// Update document for `update_one`: a `$set` part and a `$setOnInsert` part
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateSpec {
    set: BsonDocument,
    set_on_insert: BsonDocument,
}

impl UpdateSpec {
    /// Update that overwrites the given fields (or dotted paths)
    pub fn set(fields: BsonDocument) -> Self {
        Self {
            set: fields,
            set_on_insert: BsonDocument::new(),
        }
    }

    /// Also write `createTime`, but only if the update creates the document
    pub fn with_create_time(mut self, created_at: bson::DateTime) -> Self {
        self.set_on_insert.insert(CREATE_TIME_FIELD, created_at);
        self
    }

    pub fn set_fields(&self) -> &BsonDocument {
        &self.set
    }

    pub fn set_on_insert_fields(&self) -> &BsonDocument {
        &self.set_on_insert
    }

    /// Render as a MongoDB update document, omitting empty operators
    pub fn to_document(&self) -> BsonDocument {
        let mut update = BsonDocument::new();
        if !self.set.is_empty() {
            update.insert("$set", self.set.clone());
        }
        if !self.set_on_insert.is_empty() {
            update.insert("$setOnInsert", self.set_on_insert.clone());
        }
        update
    }
}

/// Observations of many stations at one instant, keyed by a timestamp id
/// such as `202107041000`
///
/// # Example
///
/// ```ignore
/// let observation = Observation::new(202107041000)
///     .station("station_0", "0.0")
///     .station("station_1", "1.0");
/// synchronizer.upsert_stations(&[observation.to_document()?]).await?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(rename = "_id")]
    pub id: i64,
    #[serde(default)]
    pub data: BsonDocument,
}

impl Observation {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            data: BsonDocument::new(),
        }
    }

    /// Add or overwrite one station's value
    pub fn station(mut self, station_id: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.data.insert(station_id.into(), value.into());
        self
    }

    /// Convert to a BSON document
    pub fn to_document(&self) -> Result<BsonDocument> {
        Ok(bson::to_document(self)?)
    }

    /// Read back from a stored document; extra fields such as `createTime` are ignored
    pub fn from_document(document: BsonDocument) -> Result<Self> {
        if !document.contains_key(ID_FIELD) {
            return Err(SyncError::Usage(format!(
                "Document has no '{}' field",
                ID_FIELD
            )));
        }
        Ok(bson::from_document(document)?)
    }
}

impl TryFrom<BsonDocument> for Observation {
    type Error = SyncError;

    fn try_from(document: BsonDocument) -> Result<Self> {
        Self::from_document(document)
    }
}

/// Build the empty filter that matches every document
pub fn match_all() -> BsonDocument {
    doc! {}
}
