//! MongoDB aggregation backend for pipeql
//!
//! Every step appends one or more aggregation stages to a [`MongoQuery`].
//! MongoDB documents carry no fixed schema, so unlike the SQL backend no
//! column metadata is threaded through the translation.

use serde::{Deserialize, Serialize};
use serde_json::Value as Document;

pub mod expr;
pub mod registry;
mod steps;
mod translator;

pub use translator::*;

/// Target collection and the aggregation pipeline to run on it
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MongoQuery {
    pub collection: String,
    pub stages: Vec<Document>,
}

impl MongoQuery {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            stages: Vec::new(),
        }
    }

    /// Append a single stage
    pub fn stage(mut self, stage: Document) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn extend(mut self, stages: impl IntoIterator<Item = Document>) -> Self {
        self.stages.extend(stages);
        self
    }

    /// Stages as a JSON array, the shape `db.collection.aggregate()` expects
    pub fn pipeline_json(&self) -> Document {
        Document::Array(self.stages.clone())
    }
}
