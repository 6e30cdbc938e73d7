//! Multi-dialect SQL backend for pipeql
//!
//! Every step appends one common table expression to a `WITH` chain while the
//! running [`TableMetadata`] tracks column names and types.

use pipeql_ir::TableMetadata;
use serde::{Deserialize, Serialize};

mod dialect;
pub mod expr;
mod query;
pub mod registry;
mod steps;
mod translator;

pub use dialect::*;
pub use query::*;
pub use translator::*;

/// Final output of a SQL translation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlQuery {
    pub statement: String,
    pub schema: TableMetadata,
}

impl SqlQuery {
    /// Live output columns, in order
    pub fn columns(&self) -> Vec<String> {
        self.schema.column_names()
    }
}
