//! Shared test utilities for synchronizer tests.
//!
//! This module provides:
//! - An in-memory `DocumentStore` with MongoDB update semantics
//! - A sink that records events
//! - Observation document helpers

#![allow(dead_code)]

pub mod memory_store;
pub mod recording_sink;

pub use memory_store::*;
pub use recording_sink::*;

use bson::{doc, Bson, Document as BsonDocument};
use stationsync_mongodb::CREATE_TIME_FIELD;

/// `{ "_id": id, "data": { station: value, ... } }`
pub fn observation<V: Into<Bson> + Clone>(id: i64, stations: &[(&str, V)]) -> BsonDocument {
    let data: BsonDocument = stations
        .iter()
        .map(|(station, value)| (station.to_string(), value.clone().into()))
        .collect();
    doc! { "_id": id, "data": data }
}

/// Copy of `document` without the creation timestamp
pub fn without_create_time(document: &BsonDocument) -> BsonDocument {
    let mut copy = document.clone();
    copy.remove(CREATE_TIME_FIELD);
    copy
}
