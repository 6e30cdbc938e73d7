use pipeql_ir::{
    AggregationFunction, CumsumStep, ExtremumStep, LogicalType, MovingAverageStep, PercentageStep, RankMethod,
    RankStep, SortOrder, StepError, StepKind, TopStep,
};

use super::{partition_by, with_columns, Assignment};
use crate::{Query, SqlContext};

fn over(ctx: &SqlContext<'_>, groups: &[String], order: Option<(&str, SortOrder)>, frame: &str) -> String {
    let mut clauses = Vec::new();
    let partition = partition_by(ctx, groups);
    if !partition.is_empty() {
        clauses.push(partition);
    }
    if let Some((column, order)) = order {
        let direction = match order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        clauses.push(format!("ORDER BY {} {}", ctx.ident(column), direction));
    }
    if !frame.is_empty() {
        clauses.push(frame.to_string());
    }
    format!("OVER ({})", clauses.join(" "))
}

/// Keep the rows of the previous CTE where `predicate` holds over a helper column
fn filter_on_window(
    ctx: &SqlContext<'_>,
    query: Query,
    kind: StepKind,
    helper: &str,
    predicate: String,
) -> Query {
    let sql = format!(
        "SELECT {} FROM (SELECT {}.*, {} AS __pql_window FROM {}) AS windowed WHERE {}",
        query.projection, query.current_alias, helper, query.current_alias, predicate
    );
    let schema = query.schema.clone();
    query.push(ctx.dialect(), kind, sql, schema)
}

pub fn rank(ctx: &SqlContext<'_>, query: Query, step: &RankStep) -> Result<Query, StepError> {
    query.schema.require(&step.value_col)?;
    query.schema.require_all(step.groupby.iter().map(String::as_str))?;
    let function = match step.method {
        RankMethod::Standard => "RANK()",
        RankMethod::Dense => "DENSE_RANK()",
    };
    let expr = format!(
        "{} {}",
        function,
        over(ctx, &step.groupby, Some((step.value_col.as_str(), step.order)), "")
    );
    let assignment = Assignment::new(step.output_column(), expr, LogicalType::Integer);
    Ok(with_columns(ctx, query, StepKind::Rank, vec![assignment]))
}

pub fn top(ctx: &SqlContext<'_>, query: Query, step: &TopStep) -> Result<Query, StepError> {
    query.schema.require(&step.rank_on)?;
    query.schema.require_all(step.groups.iter().map(String::as_str))?;
    let helper = format!(
        "ROW_NUMBER() {}",
        over(ctx, &step.groups, Some((step.rank_on.as_str(), step.sort)), "")
    );
    Ok(filter_on_window(
        ctx,
        query,
        StepKind::Top,
        &helper,
        format!("__pql_window <= {}", step.limit),
    ))
}

fn extremum(ctx: &SqlContext<'_>, query: Query, kind: StepKind, step: &ExtremumStep, function: &str) -> Result<Query, StepError> {
    query.schema.require(&step.column)?;
    query.schema.require_all(step.groups.iter().map(String::as_str))?;
    let column = ctx.ident(&step.column);
    let helper = format!("{}({}) {}", function, column, over(ctx, &step.groups, None, ""));
    Ok(filter_on_window(
        ctx,
        query,
        kind,
        &helper,
        format!("{} = __pql_window", column),
    ))
}

pub fn argmax(ctx: &SqlContext<'_>, query: Query, step: &ExtremumStep) -> Result<Query, StepError> {
    extremum(ctx, query, StepKind::Argmax, step, "MAX")
}

pub fn argmin(ctx: &SqlContext<'_>, query: Query, step: &ExtremumStep) -> Result<Query, StepError> {
    extremum(ctx, query, StepKind::Argmin, step, "MIN")
}

pub fn cumsum(ctx: &SqlContext<'_>, query: Query, step: &CumsumStep) -> Result<Query, StepError> {
    query.schema.require(&step.reference_column)?;
    query.schema.require_all(step.groups.iter().map(String::as_str))?;
    let window = over(
        ctx,
        &step.groups,
        Some((step.reference_column.as_str(), SortOrder::Asc)),
        "ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW",
    );
    let mut assignments = Vec::with_capacity(step.to_cumsum.len());
    for (column, new_column) in &step.to_cumsum {
        let meta = query.schema.require(column)?;
        let name = if new_column.is_empty() { column } else { new_column };
        assignments.push(Assignment::new(
            name,
            format!("SUM({}) {}", ctx.ident(column), window),
            AggregationFunction::Sum.output_type(meta.logical_type),
        ));
    }
    Ok(with_columns(ctx, query, StepKind::Cumsum, assignments))
}

/// Average over the last `moving_window` rows; null until the window is full
pub fn movingaverage(ctx: &SqlContext<'_>, query: Query, step: &MovingAverageStep) -> Result<Query, StepError> {
    if step.moving_window == 0 {
        return Err(StepError::InvalidStep("moving_window must be positive".to_string()));
    }
    query
        .schema
        .require_all([step.value_column.as_str(), step.column_to_sort.as_str()])?;
    query.schema.require_all(step.groups.iter().map(String::as_str))?;

    let order = Some((step.column_to_sort.as_str(), SortOrder::Asc));
    let frame = format!("ROWS BETWEEN {} PRECEDING AND CURRENT ROW", step.moving_window - 1);
    let expr = format!(
        "CASE WHEN ROW_NUMBER() {} >= {} THEN AVG({}) {} END",
        over(ctx, &step.groups, order, ""),
        step.moving_window,
        ctx.ident(&step.value_column),
        over(ctx, &step.groups, order, &frame)
    );
    let assignment = Assignment::new(step.output_column(), expr, LogicalType::Float);
    Ok(with_columns(ctx, query, StepKind::MovingAverage, vec![assignment]))
}

/// Share of the group total; a zero total yields null
pub fn percentage(ctx: &SqlContext<'_>, query: Query, step: &PercentageStep) -> Result<Query, StepError> {
    query.schema.require(&step.column)?;
    query.schema.require_all(step.group.iter().map(String::as_str))?;
    let dialect = ctx.dialect();
    let column = ctx.ident(&step.column);
    let expr = format!(
        "{} / NULLIF(SUM({}) {}, 0)",
        dialect.cast(&column, LogicalType::Float),
        column,
        over(ctx, &step.group, None, "")
    );
    let assignment = Assignment::new(step.output_column(), expr, LogicalType::Float);
    Ok(with_columns(ctx, query, StepKind::Percentage, vec![assignment]))
}
