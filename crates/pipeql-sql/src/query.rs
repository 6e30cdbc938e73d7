//! The SQL accumulator: a growing `WITH` chain plus the running schema

use pipeql_ir::{ColumnSort, SortOrder, StepKind, TableMetadata};
use serde::{Deserialize, Serialize};

use crate::SqlDialect;

/// One common table expression of the chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cte {
    pub alias: String,
    pub sql: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Query {
    pub ctes: Vec<Cte>,
    pub current_alias: String,
    /// Live columns of `schema`, rendered as a select list
    pub projection: String,
    pub schema: TableMetadata,
    /// Ordering re-applied by the final `SELECT`
    pub ordering: Vec<ColumnSort>,
}

/// Alias of the CTE appended for a step kind at a given ordinal
pub fn step_alias(kind: StepKind, ordinal: usize) -> String {
    let name = match kind {
        StepKind::Domain => "SELECT".to_string(),
        other => other.as_str().to_uppercase(),
    };
    format!("{}_STEP_{}", name, ordinal)
}

impl Query {
    /// Alias the next CTE will get
    pub fn next_alias(&self, kind: StepKind) -> String {
        step_alias(kind, self.ctes.len())
    }

    /// Append a CTE and make it current. Ordering is dropped; row-preserving
    /// translators restore it with [`Query::keep_ordering`].
    pub fn push(mut self, dialect: SqlDialect, kind: StepKind, sql: String, schema: TableMetadata) -> Query {
        let alias = self.next_alias(kind);
        self.ctes.push(Cte {
            alias: alias.clone(),
            sql,
        });
        self.projection = select_list(dialect, &schema);
        self.current_alias = alias;
        self.schema = schema;
        self.ordering = Vec::new();
        self
    }

    /// Carry an ordering forward when all its columns survived
    pub fn keep_ordering(mut self, ordering: Vec<ColumnSort>) -> Query {
        if ordering.iter().all(|sort| self.schema.contains(&sort.column)) {
            self.ordering = ordering;
        } else {
            self.ordering = Vec::new();
        }
        self
    }

    pub fn order_by(&self, dialect: SqlDialect) -> String {
        render_ordering(dialect, &self.ordering)
    }

    /// `WITH ... ` prefix followed by `tail`
    pub fn with_tail(&self, tail: &str) -> String {
        if self.ctes.is_empty() {
            return tail.to_string();
        }
        let ctes: Vec<String> = self
            .ctes
            .iter()
            .map(|cte| format!("{} AS ({})", cte.alias, cte.sql))
            .collect();
        format!("WITH {} {}", ctes.join(", "), tail)
    }

    /// Full statement selecting the live columns of the last CTE
    pub fn statement_text(&self, dialect: SqlDialect, limit: Option<u64>, offset: Option<u64>) -> String {
        let mut tail = format!("SELECT {} FROM {}", self.projection, self.current_alias);
        if !self.ordering.is_empty() {
            tail.push_str(" ORDER BY ");
            tail.push_str(&self.order_by(dialect));
        }
        tail.push_str(&dialect.pagination(limit, offset));
        self.with_tail(&tail)
    }

    /// Statement usable as a subquery: no ordering or pagination
    pub fn subquery_text(&self) -> String {
        self.with_tail(&format!("SELECT {} FROM {}", self.projection, self.current_alias))
    }
}

pub fn select_list(dialect: SqlDialect, schema: &TableMetadata) -> String {
    schema
        .live_columns()
        .map(|c| dialect.quote_identifier(&c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn render_ordering(dialect: SqlDialect, ordering: &[ColumnSort]) -> String {
    ordering
        .iter()
        .map(|sort| {
            let direction = match sort.order {
                SortOrder::Asc => "ASC",
                SortOrder::Desc => "DESC",
            };
            format!("{} {}", dialect.quote_identifier(&sort.column), direction)
        })
        .collect::<Vec<_>>()
        .join(", ")
}
