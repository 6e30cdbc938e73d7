use pipeql_ir::{LogicalType, PivotStep, Step, StepError, StepKind, UnpivotStep, Value};

use super::{aggregate::aggregate_call, column_list, group_by};
use crate::{ProbeKind, ProbeRequest, ProbeResult, Query, SqlContext, Translation};

/// Pivot needs the distinct values of `column_to_pivot` before it can name
/// its output columns, so it first asks the driver to probe them.
pub fn pivot(ctx: &SqlContext<'_>, query: Query, step: &PivotStep) -> Result<Translation, StepError> {
    query.schema.require_all(step.index.iter().map(String::as_str))?;
    query
        .schema
        .require_all([step.column_to_pivot.as_str(), step.value_column.as_str()])?;
    // reject first/last before probing
    aggregate_call(step.agg_function, "x")?;

    let column = ctx.ident(&step.column_to_pivot);
    let sql = query.with_tail(&format!(
        "SELECT DISTINCT {0} FROM {1} ORDER BY {0}",
        column, query.current_alias
    ));
    Ok(Translation::NeedsProbe(ProbeRequest {
        sql,
        kind: ProbeKind::DistinctValues,
        query,
        resume: resume_pivot,
    }))
}

fn resume_pivot(ctx: &SqlContext<'_>, query: Query, step: &Step, result: ProbeResult) -> Result<Translation, StepError> {
    let Step::Pivot(step) = step else {
        return Err(StepError::InvalidStep(format!("cannot resume {} as pivot", step.kind())));
    };
    let ProbeResult::Values(values) = result else {
        return Err(StepError::Probe("expected distinct values".to_string()));
    };

    let dialect = ctx.dialect();
    let pivot_column = ctx.ident(&step.column_to_pivot);
    let value_column = ctx.ident(&step.value_column);
    let value_type = step
        .agg_function
        .output_type(query.schema.type_of(&step.value_column));

    let mut select: Vec<String> = step.index.iter().map(|c| ctx.ident(c)).collect();
    let mut outputs: Vec<(String, LogicalType)> = step
        .index
        .iter()
        .map(|c| (c.clone(), query.schema.type_of(c)))
        .collect();
    for value in values.iter().filter(|v| **v != Value::Null) {
        let name = value.label();
        if outputs.iter().any(|(existing, _)| *existing == name) {
            return Err(StepError::DuplicateColumn(name));
        }
        let case = format!(
            "CASE WHEN {} = {} THEN {} END",
            pivot_column,
            dialect.literal(value),
            value_column
        );
        select.push(format!(
            "{} AS {}",
            aggregate_call(step.agg_function, &case)?,
            ctx.ident(&name)
        ));
        outputs.push((name, value_type));
    }

    let sql = format!(
        "SELECT {} FROM {}{}",
        select.join(", "),
        query.current_alias,
        group_by(ctx, &step.index)
    );
    let mut schema = query.schema.clone();
    schema.reshape(outputs);
    Ok(Translation::Done(query.push(dialect, StepKind::Pivot, sql, schema)))
}

/// One `UNION ALL` branch per unpivoted column
pub fn unpivot(ctx: &SqlContext<'_>, query: Query, step: &UnpivotStep) -> Result<Query, StepError> {
    if step.unpivot.is_empty() {
        return Err(StepError::InvalidStep("unpivot needs at least one column".to_string()));
    }
    query.schema.require_all(step.keep.iter().map(String::as_str))?;
    query.schema.require_all(step.unpivot.iter().map(String::as_str))?;

    let dialect = ctx.dialect();
    let types: Vec<LogicalType> = step.unpivot.iter().map(|c| query.schema.type_of(c)).collect();
    let value_type = if types.windows(2).all(|pair| pair[0] == pair[1]) {
        types[0]
    } else {
        LogicalType::Text
    };

    let keep = column_list(ctx, &step.keep);
    let branches: Vec<String> = step
        .unpivot
        .iter()
        .zip(&types)
        .map(|(column, logical_type)| {
            let value = if *logical_type == value_type {
                ctx.ident(column)
            } else {
                dialect.cast(&ctx.ident(column), value_type)
            };
            let mut items = Vec::new();
            if !keep.is_empty() {
                items.push(keep.clone());
            }
            items.push(format!(
                "{} AS {}",
                dialect.string_literal(column),
                ctx.ident(&step.unpivot_column_name)
            ));
            items.push(format!("{} AS {}", value, ctx.ident(&step.value_column_name)));
            format!("SELECT {} FROM {}", items.join(", "), query.current_alias)
        })
        .collect();

    let union = branches.join(" UNION ALL ");
    let sql = if step.dropna {
        format!(
            "SELECT * FROM ({}) AS unpivoted WHERE {} IS NOT NULL",
            union,
            ctx.ident(&step.value_column_name)
        )
    } else {
        union
    };

    let mut outputs: Vec<(String, LogicalType)> = step
        .keep
        .iter()
        .map(|c| (c.clone(), query.schema.type_of(c)))
        .collect();
    outputs.push((step.unpivot_column_name.clone(), LogicalType::Text));
    outputs.push((step.value_column_name.clone(), value_type));
    let mut schema = query.schema.clone();
    schema.reshape(outputs);
    Ok(query.push(dialect, StepKind::Unpivot, sql, schema))
}
