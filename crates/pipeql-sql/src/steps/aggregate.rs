use pipeql_ir::{
    AggregateStep, Aggregation, AggregationFunction, LogicalType, RollupStep, Statistic, StatisticsStep,
    StepError, StepKind, TableMetadata, TotalsStep, UniqueGroupsStep,
};

use super::{column_list, group_by, null_safe_eq};
use crate::{Query, SqlContext};

/// SQL aggregate call over an expression; `count` ignores nulls
pub fn aggregate_call(function: AggregationFunction, expr: &str) -> Result<String, StepError> {
    Ok(match function {
        AggregationFunction::Sum => format!("SUM({})", expr),
        AggregationFunction::Avg => format!("AVG({})", expr),
        AggregationFunction::Count => format!("COUNT({})", expr),
        AggregationFunction::CountDistinct => format!("COUNT(DISTINCT {})", expr),
        AggregationFunction::Min => format!("MIN({})", expr),
        AggregationFunction::Max => format!("MAX({})", expr),
        AggregationFunction::First | AggregationFunction::Last => {
            let name = if function == AggregationFunction::First { "first" } else { "last" };
            return Err(StepError::UnsupportedOperator(format!(
                "{} has no order-independent SQL aggregate",
                name
            )));
        }
    })
}

/// Compiled `expr AS name` items and output columns for a list of aggregations
fn aggregation_items(
    ctx: &SqlContext<'_>,
    schema: &TableMetadata,
    aggregations: &[Aggregation],
) -> Result<(Vec<String>, Vec<(String, LogicalType)>), StepError> {
    let mut items = Vec::new();
    let mut outputs: Vec<(String, LogicalType)> = Vec::new();
    for aggregation in aggregations {
        for (column, new_column) in aggregation.pairs()? {
            let meta = schema.require(column)?;
            items.push(format!(
                "{} AS {}",
                aggregate_call(aggregation.aggfunction, &ctx.ident(column))?,
                ctx.ident(new_column)
            ));
            if outputs.iter().any(|(name, _)| name == new_column) {
                return Err(StepError::DuplicateColumn(new_column.to_string()));
            }
            outputs.push((
                new_column.to_string(),
                aggregation.aggfunction.output_type(meta.logical_type),
            ));
        }
    }
    Ok((items, outputs))
}

fn typed_columns(schema: &TableMetadata, names: &[String]) -> Result<Vec<(String, LogicalType)>, StepError> {
    names
        .iter()
        .map(|name| Ok((name.clone(), schema.require(name)?.logical_type)))
        .collect()
}

pub fn aggregate(ctx: &SqlContext<'_>, query: Query, step: &AggregateStep) -> Result<Query, StepError> {
    let groups = typed_columns(&query.schema, &step.on)?;
    let (items, outputs) = aggregation_items(ctx, &query.schema, &step.aggregations)?;
    let prev = query.current_alias.clone();

    let mut select: Vec<String> = step.on.iter().map(|c| ctx.ident(c)).collect();
    select.extend(items);
    let grouped = format!(
        "SELECT {} FROM {}{}",
        select.join(", "),
        prev,
        group_by(ctx, &step.on)
    );

    if !step.keep_original_granularity {
        let mut schema = query.schema.clone();
        schema.reshape(groups.into_iter().chain(outputs).collect());
        return Ok(query.push(ctx.dialect(), StepKind::Aggregate, grouped, schema));
    }

    // join the aggregates back onto every original row
    let mut schema = query.schema.clone();
    let mut columns: Vec<String> = query
        .schema
        .live_columns()
        .filter(|c| !outputs.iter().any(|(name, _)| *name == c.name))
        .map(|c| format!("{}.{}", prev, ctx.ident(&c.name)))
        .collect();
    for (name, logical_type) in &outputs {
        columns.push(format!("aggregated.{}", ctx.ident(name)));
        schema.add_column(name, *logical_type);
    }
    let join = if step.on.is_empty() {
        format!("CROSS JOIN ({}) AS aggregated", grouped)
    } else {
        let keys: Vec<String> = step
            .on
            .iter()
            .map(|c| {
                null_safe_eq(
                    &format!("{}.{}", prev, ctx.ident(c)),
                    &format!("aggregated.{}", ctx.ident(c)),
                )
            })
            .collect();
        format!("LEFT JOIN ({}) AS aggregated ON {}", grouped, keys.join(" AND "))
    };
    let sql = format!("SELECT {} FROM {} {}", columns.join(", "), prev, join);
    Ok(query.push(ctx.dialect(), StepKind::Aggregate, sql, schema))
}

pub fn uniquegroups(ctx: &SqlContext<'_>, query: Query, step: &UniqueGroupsStep) -> Result<Query, StepError> {
    let mut schema = query.schema.clone();
    schema.select(&step.on)?;
    let sql = format!(
        "SELECT {} FROM {}{}",
        column_list(ctx, &step.on),
        query.current_alias,
        group_by(ctx, &step.on)
    );
    Ok(query.push(ctx.dialect(), StepKind::UniqueGroups, sql, schema))
}

pub fn statistics(ctx: &SqlContext<'_>, query: Query, step: &StatisticsStep) -> Result<Query, StepError> {
    let meta = query.schema.require(&step.column)?;
    let column_type = meta.logical_type;
    let groups = typed_columns(&query.schema, &step.groupby_columns)?;
    let dialect = ctx.dialect();
    let column = ctx.ident(&step.column);

    let mut select: Vec<String> = step.groupby_columns.iter().map(|c| ctx.ident(c)).collect();
    let mut outputs = groups;
    for statistic in &step.statistics {
        let (expr, logical_type) = match statistic {
            Statistic::Count => (format!("COUNT({})", column), LogicalType::Integer),
            Statistic::Max => (format!("MAX({})", column), column_type),
            Statistic::Min => (format!("MIN({})", column), column_type),
            Statistic::Average => (format!("AVG({})", column), LogicalType::Float),
            Statistic::Variance => (format!("VAR_POP({})", column), LogicalType::Float),
            Statistic::StandardDeviation => (format!("STDDEV_POP({})", column), LogicalType::Float),
        };
        select.push(format!("{} AS {}", expr, ctx.ident(statistic.column_name())));
        outputs.push((statistic.column_name().to_string(), logical_type));
    }
    for quantile in &step.quantiles {
        if quantile.order == 0 || quantile.nth > quantile.order {
            return Err(StepError::InvalidStep(format!(
                "invalid quantile {}/{}",
                quantile.nth, quantile.order
            )));
        }
        let expr = dialect
            .quantile(&column, quantile.nth, quantile.order)
            .ok_or_else(|| StepError::NotImplementedForDialect {
                step: "statistics (quantiles)".to_string(),
                dialect: dialect.to_string(),
            })?;
        select.push(format!("{} AS {}", expr, ctx.ident(&quantile.column_name())));
        outputs.push((quantile.column_name(), column_type));
    }
    if outputs.len() == step.groupby_columns.len() {
        return Err(StepError::InvalidStep(
            "statistics needs at least one statistic or quantile".to_string(),
        ));
    }

    let sql = format!(
        "SELECT {} FROM {}{}",
        select.join(", "),
        query.current_alias,
        group_by(ctx, &step.groupby_columns)
    );
    let mut schema = query.schema.clone();
    schema.reshape(outputs);
    Ok(query.push(ctx.dialect(), StepKind::Statistics, sql, schema))
}

/// One `UNION ALL` branch per hierarchy level plus the grand total
pub fn rollup(ctx: &SqlContext<'_>, query: Query, step: &RollupStep) -> Result<Query, StepError> {
    if step.hierarchy.is_empty() {
        return Err(StepError::InvalidStep("rollup needs a hierarchy".to_string()));
    }
    let dialect = ctx.dialect();
    let groups = typed_columns(&query.schema, &step.groupby)?;
    let hierarchy = typed_columns(&query.schema, &step.hierarchy)?;
    let (aggregates, outputs) = aggregation_items(ctx, &query.schema, &step.aggregations)?;

    let mut branches = Vec::new();
    for level in step.levels() {
        let depth = level.len();
        let mut select: Vec<String> = step.groupby.iter().map(|c| ctx.ident(c)).collect();
        for (i, (name, logical_type)) in hierarchy.iter().enumerate() {
            if i < depth {
                select.push(ctx.ident(name));
            } else {
                select.push(format!("{} AS {}", dialect.typed_null(*logical_type), ctx.ident(name)));
            }
        }
        let text_null = dialect.typed_null(LogicalType::Text);
        let (label, level_name, parent) = match depth {
            0 => (text_null.clone(), text_null.clone(), text_null),
            _ => {
                let deepest = &step.hierarchy[depth - 1];
                let parent = match depth {
                    1 => text_null,
                    _ => dialect.cast(&ctx.ident(&step.hierarchy[depth - 2]), LogicalType::Text),
                };
                (
                    dialect.cast(&ctx.ident(deepest), LogicalType::Text),
                    dialect.string_literal(deepest),
                    parent,
                )
            }
        };
        select.push(format!("{} AS {}", label, ctx.ident(&step.label_col)));
        select.push(format!("{} AS {}", level_name, ctx.ident(&step.level_col)));
        select.push(format!("{} AS {}", parent, ctx.ident(&step.parent_label_col)));
        select.extend(aggregates.iter().cloned());

        let keys: Vec<String> = step.groupby.iter().chain(level.iter()).cloned().collect();
        branches.push(format!(
            "SELECT {} FROM {}{}",
            select.join(", "),
            query.current_alias,
            group_by(ctx, &keys)
        ));
    }

    let mut columns = groups;
    columns.extend(hierarchy);
    columns.push((step.label_col.clone(), LogicalType::Text));
    columns.push((step.level_col.clone(), LogicalType::Text));
    columns.push((step.parent_label_col.clone(), LogicalType::Text));
    columns.extend(outputs);
    let mut schema = query.schema.clone();
    schema.reshape(columns);
    Ok(query.push(ctx.dialect(), StepKind::Rollup, branches.join(" UNION ALL "), schema))
}

/// One `UNION ALL` branch per subset of totalled dimensions
pub fn totals(ctx: &SqlContext<'_>, query: Query, step: &TotalsStep) -> Result<Query, StepError> {
    if step.total_dimensions.is_empty() {
        return Err(StepError::InvalidStep("totals needs at least one dimension".to_string()));
    }
    let dialect = ctx.dialect();
    for dimension in &step.total_dimensions {
        query.schema.require(&dimension.total_column)?;
    }
    let groups = typed_columns(&query.schema, &step.groups)?;
    let (aggregates, outputs) = aggregation_items(ctx, &query.schema, &step.aggregations)?;

    let mut branches = Vec::new();
    for mask in step.combinations() {
        let mut select = Vec::new();
        let mut keys: Vec<String> = Vec::new();
        for (dimension, totalled) in step.total_dimensions.iter().zip(&mask) {
            let column = ctx.ident(&dimension.total_column);
            if *totalled {
                select.push(format!(
                    "{} AS {}",
                    dialect.string_literal(&dimension.total_rows_label),
                    column
                ));
            } else {
                select.push(format!("{} AS {}", dialect.cast(&column, LogicalType::Text), column));
                keys.push(dimension.total_column.clone());
            }
        }
        select.extend(step.groups.iter().map(|c| ctx.ident(c)));
        select.extend(aggregates.iter().cloned());
        keys.extend(step.groups.iter().cloned());
        branches.push(format!(
            "SELECT {} FROM {}{}",
            select.join(", "),
            query.current_alias,
            group_by(ctx, &keys)
        ));
    }

    let mut columns: Vec<(String, LogicalType)> = step
        .total_dimensions
        .iter()
        .map(|d| (d.total_column.clone(), LogicalType::Text))
        .collect();
    columns.extend(groups);
    columns.extend(outputs);
    let mut schema = query.schema.clone();
    schema.reshape(columns);
    Ok(query.push(ctx.dialect(), StepKind::Totals, branches.join(" UNION ALL "), schema))
}
