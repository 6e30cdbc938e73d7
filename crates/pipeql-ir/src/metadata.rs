//! Running table metadata threaded through SQL translation

use serde::{Deserialize, Serialize};

use crate::{LogicalType, StepError, TableSchema};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    /// Working name
    pub name: String,
    pub logical_type: LogicalType,
    pub original_name: String,
    pub original_type: LogicalType,
    /// Name before the latest rename
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default)]
    pub deleted: bool,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        let name = name.into();
        Self {
            original_name: name.clone(),
            name,
            logical_type,
            original_type: logical_type,
            alias: None,
            deleted: false,
        }
    }
}

/// Ordered column metadata; soft-deleted entries are kept for traceability
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableMetadata {
    pub table_name: String,
    pub columns: Vec<ColumnMetadata>,
}

impl TableMetadata {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            columns: Vec::new(),
        }
    }

    pub fn from_schema(schema: &TableSchema) -> Self {
        Self {
            table_name: schema.name.clone(),
            columns: schema
                .columns
                .iter()
                .map(|c| ColumnMetadata::new(&c.name, LogicalType::from_native(&c.data_type)))
                .collect(),
        }
    }

    pub fn live_columns(&self) -> impl Iterator<Item = &ColumnMetadata> {
        self.columns.iter().filter(|c| !c.deleted)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.live_columns().map(|c| c.name.clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&ColumnMetadata> {
        self.live_columns().find(|c| c.name == name)
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut ColumnMetadata> {
        self.columns.iter_mut().find(|c| !c.deleted && c.name == name)
    }

    pub fn require(&self, name: &str) -> Result<&ColumnMetadata, StepError> {
        self.get(name).ok_or_else(|| StepError::ColumnNotFound {
            column: name.to_string(),
            available: self.column_names(),
        })
    }

    /// Check that every name is a live column
    pub fn require_all<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Result<(), StepError> {
        for name in names {
            self.require(name)?;
        }
        Ok(())
    }

    /// Type of a live column, `Undefined` when unknown
    pub fn type_of(&self, name: &str) -> LogicalType {
        self.get(name)
            .map(|c| c.logical_type)
            .unwrap_or(LogicalType::Undefined)
    }

    /// Add a column at the end, or retype it in place when it already exists
    pub fn add_column(&mut self, name: &str, logical_type: LogicalType) {
        match self.get_mut(name) {
            Some(column) => column.logical_type = logical_type,
            None => self.columns.push(ColumnMetadata::new(name, logical_type)),
        }
    }

    pub fn rename(&mut self, old: &str, new: &str) -> Result<(), StepError> {
        self.require(old)?;
        if old != new && self.contains(new) {
            return Err(StepError::DuplicateColumn(new.to_string()));
        }
        if let Some(column) = self.get_mut(old) {
            column.alias = Some(column.name.clone());
            column.name = new.to_string();
        }
        Ok(())
    }

    pub fn delete(&mut self, name: &str) -> Result<(), StepError> {
        self.require(name)?;
        if let Some(column) = self.get_mut(name) {
            column.deleted = true;
        }
        Ok(())
    }

    pub fn set_type(&mut self, name: &str, logical_type: LogicalType) -> Result<(), StepError> {
        self.require(name)?;
        if let Some(column) = self.get_mut(name) {
            column.logical_type = logical_type;
        }
        Ok(())
    }

    /// Keep only `names`, in that order
    pub fn select(&mut self, names: &[String]) -> Result<(), StepError> {
        self.require_all(names.iter().map(String::as_str))?;
        let mut kept = Vec::with_capacity(self.columns.len());
        for name in names {
            if let Some(column) = self.get(name) {
                if !kept.iter().any(|c: &ColumnMetadata| c.name == *name) {
                    kept.push(column.clone());
                }
            }
        }
        let dropped = self.columns.drain(..).map(|mut c| {
            if !c.deleted && !names.contains(&c.name) {
                c.deleted = true;
            }
            c
        });
        let trace: Vec<ColumnMetadata> = dropped.filter(|c| c.deleted).collect();
        kept.extend(trace);
        self.columns = kept;
        Ok(())
    }

    /// Replace the live column set with `outputs`; columns surviving by name
    /// keep their lineage.
    pub fn reshape(&mut self, outputs: Vec<(String, LogicalType)>) {
        let previous: Vec<ColumnMetadata> = self.live_columns().cloned().collect();
        for column in &mut self.columns {
            column.deleted = true;
        }
        for (name, logical_type) in outputs {
            let column = match previous.iter().find(|c| c.name == name) {
                Some(prev) => ColumnMetadata {
                    logical_type,
                    deleted: false,
                    ..prev.clone()
                },
                None => ColumnMetadata::new(name, logical_type),
            };
            self.columns.push(column);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ColumnInfo;

    fn sales() -> TableMetadata {
        TableMetadata::from_schema(&TableSchema {
            name: "sales".to_string(),
            columns: vec![
                ColumnInfo::new("A", "INTEGER"),
                ColumnInfo::new("city", "VARCHAR"),
                ColumnInfo::new("day", "DATE"),
            ],
        })
    }

    #[test]
    fn test_from_schema() {
        let meta = sales();
        assert_eq!(meta.column_names(), vec!["A", "city", "day"]);
        assert_eq!(meta.type_of("A"), LogicalType::Integer);
        assert_eq!(meta.type_of("day"), LogicalType::Date);
        assert_eq!(meta.type_of("missing"), LogicalType::Undefined);
    }

    #[test]
    fn test_rename_round_trip() {
        let mut meta = sales();
        meta.rename("A", "B").unwrap();
        assert_eq!(meta.column_names(), vec!["B", "city", "day"]);
        let b = meta.get("B").unwrap();
        assert_eq!(b.original_name, "A");
        assert_eq!(b.alias.as_deref(), Some("A"));
        assert_eq!(b.logical_type, LogicalType::Integer);

        meta.rename("B", "A").unwrap();
        assert_eq!(meta.column_names(), vec!["A", "city", "day"]);
        assert!(matches!(meta.rename("A", "city"), Err(StepError::DuplicateColumn(_))));
    }

    #[test]
    fn test_soft_delete_and_select() {
        let mut meta = sales();
        meta.delete("city").unwrap();
        assert_eq!(meta.column_names(), vec!["A", "day"]);
        assert_eq!(meta.columns.len(), 3);
        assert!(meta.delete("city").is_err());

        meta.select(&["day".to_string(), "A".to_string()]).unwrap();
        assert_eq!(meta.column_names(), vec!["day", "A"]);
        assert!(meta.select(&["nope".to_string()]).is_err());
    }

    #[test]
    fn test_add_and_reshape() {
        let mut meta = sales();
        meta.add_column("A", LogicalType::Float);
        meta.add_column("total", LogicalType::Integer);
        assert_eq!(meta.column_names(), vec!["A", "city", "day", "total"]);
        assert_eq!(meta.type_of("A"), LogicalType::Float);

        meta.reshape(vec![
            ("city".to_string(), LogicalType::Text),
            ("n".to_string(), LogicalType::Integer),
        ]);
        assert_eq!(meta.column_names(), vec!["city", "n"]);
        assert_eq!(meta.get("city").unwrap().original_name, "city");
    }
}
