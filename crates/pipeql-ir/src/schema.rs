//! Schema provider trait and types for domain lookup

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::Pipeline;

/// Column metadata as reported by the data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Native type name, classified with `LogicalType::from_native`
    pub data_type: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
        }
    }
}

/// Table schema information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

/// Resolves domains at translation time
pub trait SchemaProvider {
    /// Get schema for a table by name
    fn get_table_schema(&self, table_name: &str) -> Result<TableSchema, String>;

    /// Saved pipeline registered under `name`, inlined when used as a domain
    fn get_saved_pipeline(&self, _name: &str) -> Option<Pipeline> {
        None
    }
}

/// In-memory catalog of tables and saved pipelines
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: HashMap<String, TableSchema>,
    pipelines: HashMap<String, Pipeline>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, schema: TableSchema) {
        self.tables.insert(schema.name.clone(), schema);
    }

    pub fn add_pipeline(&mut self, name: impl Into<String>, pipeline: Pipeline) {
        self.pipelines.insert(name.into(), pipeline);
    }

    pub fn with_table(mut self, schema: TableSchema) -> Self {
        self.add_table(schema);
        self
    }

    pub fn with_pipeline(mut self, name: impl Into<String>, pipeline: Pipeline) -> Self {
        self.add_pipeline(name, pipeline);
        self
    }

    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl SchemaProvider for Catalog {
    fn get_table_schema(&self, table_name: &str) -> Result<TableSchema, String> {
        self.tables
            .get(table_name)
            .cloned()
            .ok_or_else(|| format!("Table '{}' not found", table_name))
    }

    fn get_saved_pipeline(&self, name: &str) -> Option<Pipeline> {
        self.pipelines.get(name).cloned()
    }
}
