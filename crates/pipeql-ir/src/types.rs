//! Type system for pipeql IR

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed logical type taxonomy tracked through a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalType {
    Boolean,
    Date,
    Float,
    Integer,
    Text,
    Undefined,
}

impl LogicalType {
    /// Classify a data-source type name (`VARCHAR(32)`, `bigint`, `TIMESTAMP_NTZ`, ...)
    pub fn from_native(native: &str) -> Self {
        let native = native.trim().to_ascii_lowercase();

        if native.starts_with("bool") {
            return LogicalType::Boolean;
        }
        if native.contains("date") || native.contains("time") {
            return LogicalType::Date;
        }
        // Snowflake reports integers as NUMBER(38,0)
        if native.starts_with("number") || native.starts_with("numeric") || native.starts_with("decimal") {
            return if native.ends_with(",0)") {
                LogicalType::Integer
            } else {
                LogicalType::Float
            };
        }
        if native.contains("int") {
            return LogicalType::Integer;
        }
        if ["float", "double", "real"].iter().any(|t| native.contains(t)) {
            return LogicalType::Float;
        }
        if ["char", "text", "string"].iter().any(|t| native.contains(t)) {
            return LogicalType::Text;
        }
        LogicalType::Undefined
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, LogicalType::Integer | LogicalType::Float)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogicalType::Boolean => "boolean",
            LogicalType::Date => "date",
            LogicalType::Float => "float",
            LogicalType::Integer => "integer",
            LogicalType::Text => "text",
            LogicalType::Undefined => "undefined",
        }
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Literal value carried by steps and conditions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Value {
    pub fn logical_type(&self) -> LogicalType {
        match self {
            Value::Null => LogicalType::Undefined,
            Value::Bool(_) => LogicalType::Boolean,
            Value::Int(_) => LogicalType::Integer,
            Value::Float(_) => LogicalType::Float,
            Value::String(_) => LogicalType::Text,
        }
    }

    /// Text used when a value becomes a column label (pivot, totals)
    pub fn label(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::json!(f),
            Value::String(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}
