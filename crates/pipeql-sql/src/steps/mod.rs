//! Per-step SQL translators

use pipeql_ir::{LogicalType, StepKind};

use crate::{Query, SqlContext};

pub mod aggregate;
pub mod columns;
pub mod combine;
pub mod compute;
pub mod dates;
pub mod reshape;
pub mod source;
pub mod strings;
pub mod window;

/// A computed output column
#[derive(Debug, Clone)]
pub struct Assignment {
    pub name: String,
    pub expr: String,
    pub logical_type: LogicalType,
}

impl Assignment {
    pub fn new(name: impl Into<String>, expr: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            expr: expr.into(),
            logical_type,
        }
    }
}

/// Select every live column, replacing assigned ones in place and appending
/// new ones. Rows are untouched so the ordering is carried over.
pub fn with_columns(ctx: &SqlContext<'_>, query: Query, kind: StepKind, assignments: Vec<Assignment>) -> Query {
    let mut schema = query.schema.clone();
    let mut items: Vec<String> = query
        .schema
        .live_columns()
        .map(|column| match assignments.iter().rev().find(|a| a.name == column.name) {
            Some(a) => format!("{} AS {}", a.expr, ctx.ident(&a.name)),
            None => ctx.ident(&column.name),
        })
        .collect();

    let mut appended: Vec<&str> = Vec::new();
    for assignment in &assignments {
        if !query.schema.contains(&assignment.name) && !appended.contains(&assignment.name.as_str()) {
            appended.push(&assignment.name);
        }
        schema.add_column(&assignment.name, assignment.logical_type);
    }
    for name in appended {
        if let Some(a) = assignments.iter().rev().find(|a| a.name == name) {
            items.push(format!("{} AS {}", a.expr, ctx.ident(&a.name)));
        }
    }

    let sql = format!("SELECT {} FROM {}", items.join(", "), query.current_alias);
    let ordering = query.ordering.clone();
    query
        .push(ctx.dialect(), kind, sql, schema)
        .keep_ordering(ordering)
}

/// Quoted, comma-separated column list
pub fn column_list(ctx: &SqlContext<'_>, columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| ctx.ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `PARTITION BY ...` clause, empty without groups
pub fn partition_by(ctx: &SqlContext<'_>, groups: &[String]) -> String {
    if groups.is_empty() {
        String::new()
    } else {
        format!("PARTITION BY {}", column_list(ctx, groups))
    }
}

/// ` GROUP BY ...` suffix, empty without groups
pub fn group_by(ctx: &SqlContext<'_>, groups: &[String]) -> String {
    if groups.is_empty() {
        String::new()
    } else {
        format!(" GROUP BY {}", column_list(ctx, groups))
    }
}

/// Null-safe equality between two qualified expressions
pub fn null_safe_eq(left: &str, right: &str) -> String {
    format!("({0} = {1} OR ({0} IS NULL AND {1} IS NULL))", left, right)
}
