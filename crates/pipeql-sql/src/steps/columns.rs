use pipeql_ir::{
    ColumnSort, ConvertStep, DeleteStep, DuplicateStep, FromDateStep, LogicalType, RenameStep, SelectStep,
    SortStep, StepError, StepKind, TextStep, ToDateStep,
};

use super::{with_columns, Assignment};
use crate::{render_ordering, select_list, Query, SqlContext};

pub fn select(ctx: &SqlContext<'_>, query: Query, step: &SelectStep) -> Result<Query, StepError> {
    let mut schema = query.schema.clone();
    schema.select(&step.columns)?;
    let sql = format!(
        "SELECT {} FROM {}",
        select_list(ctx.dialect(), &schema),
        query.current_alias
    );
    let ordering = query.ordering.clone();
    Ok(query
        .push(ctx.dialect(), StepKind::Select, sql, schema)
        .keep_ordering(ordering))
}

pub fn delete(ctx: &SqlContext<'_>, query: Query, step: &DeleteStep) -> Result<Query, StepError> {
    let mut schema = query.schema.clone();
    for column in &step.columns {
        schema.delete(column)?;
    }
    let sql = format!(
        "SELECT {} FROM {}",
        select_list(ctx.dialect(), &schema),
        query.current_alias
    );
    let ordering = query.ordering.clone();
    Ok(query
        .push(ctx.dialect(), StepKind::Delete, sql, schema)
        .keep_ordering(ordering))
}

/// Renames apply in order, so `a -> b, b -> c` ends with `a AS c`
pub fn rename(ctx: &SqlContext<'_>, query: Query, step: &RenameStep) -> Result<Query, StepError> {
    let mut schema = query.schema.clone();
    for (old, new) in &step.to_rename {
        schema.rename(old, new)?;
    }

    // rename never reorders or drops entries, so both lists line up
    let items: Vec<String> = query
        .schema
        .columns
        .iter()
        .zip(&schema.columns)
        .filter(|(before, _)| !before.deleted)
        .map(|(before, after)| {
            if before.name == after.name {
                ctx.ident(&before.name)
            } else {
                format!("{} AS {}", ctx.ident(&before.name), ctx.ident(&after.name))
            }
        })
        .collect();

    let ordering: Vec<ColumnSort> = query
        .ordering
        .iter()
        .map(|sort| {
            let column = query
                .schema
                .columns
                .iter()
                .zip(&schema.columns)
                .find(|(before, _)| !before.deleted && before.name == sort.column)
                .map(|(_, after)| after.name.clone())
                .unwrap_or_else(|| sort.column.clone());
            ColumnSort {
                column,
                order: sort.order,
            }
        })
        .collect();

    let sql = format!("SELECT {} FROM {}", items.join(", "), query.current_alias);
    Ok(query
        .push(ctx.dialect(), StepKind::Rename, sql, schema)
        .keep_ordering(ordering))
}

pub fn duplicate(ctx: &SqlContext<'_>, query: Query, step: &DuplicateStep) -> Result<Query, StepError> {
    let source = query.schema.require(&step.column)?;
    if query.schema.contains(&step.new_column_name) {
        return Err(StepError::DuplicateColumn(step.new_column_name.clone()));
    }
    let assignment = Assignment::new(&step.new_column_name, ctx.ident(&step.column), source.logical_type);
    Ok(with_columns(ctx, query, StepKind::Duplicate, vec![assignment]))
}

pub fn text(ctx: &SqlContext<'_>, query: Query, step: &TextStep) -> Result<Query, StepError> {
    let logical_type = step.text.logical_type();
    let expr = match logical_type {
        LogicalType::Undefined => ctx.dialect().typed_null(LogicalType::Text),
        _ => ctx.dialect().literal(&step.text),
    };
    let assignment = Assignment::new(&step.new_column, expr, logical_type);
    Ok(with_columns(ctx, query, StepKind::Text, vec![assignment]))
}

pub fn convert(ctx: &SqlContext<'_>, query: Query, step: &ConvertStep) -> Result<Query, StepError> {
    let mut assignments = Vec::with_capacity(step.columns.len());
    for column in &step.columns {
        query.schema.require(column)?;
        assignments.push(Assignment::new(
            column,
            ctx.dialect().cast(&ctx.ident(column), step.data_type),
            step.data_type,
        ));
    }
    Ok(with_columns(ctx, query, StepKind::Convert, assignments))
}

pub fn todate(ctx: &SqlContext<'_>, query: Query, step: &ToDateStep) -> Result<Query, StepError> {
    query.schema.require(&step.column)?;
    let expr = ctx
        .dialect()
        .parse_date(&ctx.ident(&step.column), step.format.as_deref());
    let assignment = Assignment::new(&step.column, expr, LogicalType::Date);
    Ok(with_columns(ctx, query, StepKind::ToDate, vec![assignment]))
}

pub fn fromdate(ctx: &SqlContext<'_>, query: Query, step: &FromDateStep) -> Result<Query, StepError> {
    query.schema.require(&step.column)?;
    let expr = ctx.dialect().format_date(&ctx.ident(&step.column), &step.format);
    let assignment = Assignment::new(&step.column, expr, LogicalType::Text);
    Ok(with_columns(ctx, query, StepKind::FromDate, vec![assignment]))
}

/// Sorted CTE; the ordering is re-applied by the final select
pub fn sort(ctx: &SqlContext<'_>, query: Query, step: &SortStep) -> Result<Query, StepError> {
    if step.columns.is_empty() {
        return Err(StepError::InvalidStep("sort needs at least one column".to_string()));
    }
    query
        .schema
        .require_all(step.columns.iter().map(|sort| sort.column.as_str()))?;
    let sql = format!(
        "SELECT {} FROM {} ORDER BY {}",
        query.projection,
        query.current_alias,
        render_ordering(ctx.dialect(), &step.columns)
    );
    let schema = query.schema.clone();
    Ok(query
        .push(ctx.dialect(), StepKind::Sort, sql, schema)
        .keep_ordering(step.columns.clone()))
}
