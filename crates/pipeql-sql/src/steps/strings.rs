use pipeql_ir::{
    ColumnStep, CompareTextStep, ConcatenateStep, LogicalType, ReplaceTextStep, SplitStep, StepError, StepKind,
    SubstringStep, TrimStep,
};

use super::{with_columns, Assignment};
use crate::{Query, SqlContext};

fn in_place(
    ctx: &SqlContext<'_>,
    query: Query,
    kind: StepKind,
    columns: &[String],
    function: &str,
) -> Result<Query, StepError> {
    let mut assignments = Vec::with_capacity(columns.len());
    for column in columns {
        query.schema.require(column)?;
        assignments.push(Assignment::new(
            column,
            format!("{}({})", function, ctx.ident(column)),
            LogicalType::Text,
        ));
    }
    Ok(with_columns(ctx, query, kind, assignments))
}

pub fn lowercase(ctx: &SqlContext<'_>, query: Query, step: &ColumnStep) -> Result<Query, StepError> {
    in_place(ctx, query, StepKind::Lowercase, std::slice::from_ref(&step.column), "LOWER")
}

pub fn uppercase(ctx: &SqlContext<'_>, query: Query, step: &ColumnStep) -> Result<Query, StepError> {
    in_place(ctx, query, StepKind::Uppercase, std::slice::from_ref(&step.column), "UPPER")
}

pub fn trim(ctx: &SqlContext<'_>, query: Query, step: &TrimStep) -> Result<Query, StepError> {
    in_place(ctx, query, StepKind::Trim, &step.columns, "TRIM")
}

pub fn concatenate(ctx: &SqlContext<'_>, query: Query, step: &ConcatenateStep) -> Result<Query, StepError> {
    if step.columns.is_empty() {
        return Err(StepError::InvalidStep("concatenate needs at least one column".to_string()));
    }
    let dialect = ctx.dialect();
    let mut parts = Vec::with_capacity(step.columns.len() * 2);
    for (i, column) in step.columns.iter().enumerate() {
        let meta = query.schema.require(column)?;
        if i > 0 && !step.separator.is_empty() {
            parts.push(dialect.string_literal(&step.separator));
        }
        let ident = ctx.ident(column);
        parts.push(match meta.logical_type {
            LogicalType::Text => ident,
            _ => dialect.cast(&ident, LogicalType::Text),
        });
    }
    let expr = if parts.len() == 1 {
        parts.remove(0)
    } else {
        dialect.concat(&parts)
    };
    let assignment = Assignment::new(&step.new_column_name, expr, LogicalType::Text);
    Ok(with_columns(ctx, query, StepKind::Concatenate, vec![assignment]))
}

pub fn comparetext(ctx: &SqlContext<'_>, query: Query, step: &CompareTextStep) -> Result<Query, StepError> {
    query
        .schema
        .require_all([step.str_col_1.as_str(), step.str_col_2.as_str()])?;
    let expr = format!("({} = {})", ctx.ident(&step.str_col_1), ctx.ident(&step.str_col_2));
    let assignment = Assignment::new(&step.new_column_name, expr, LogicalType::Boolean);
    Ok(with_columns(ctx, query, StepKind::CompareText, vec![assignment]))
}

pub fn replacetext(ctx: &SqlContext<'_>, query: Query, step: &ReplaceTextStep) -> Result<Query, StepError> {
    query.schema.require(&step.search_column)?;
    let dialect = ctx.dialect();
    let expr = format!(
        "REPLACE({}, {}, {})",
        ctx.ident(&step.search_column),
        dialect.string_literal(&step.old_str),
        dialect.string_literal(&step.new_str)
    );
    let assignment = Assignment::new(&step.search_column, expr, LogicalType::Text);
    Ok(with_columns(ctx, query, StepKind::ReplaceText, vec![assignment]))
}

/// 1-based position expression; negative indices count from the end
fn position(length: &str, index: i64) -> String {
    if index > 0 {
        index.to_string()
    } else {
        format!("({} + {})", length, index + 1)
    }
}

/// Inclusive `[start_index, end_index]` slice, both 1-based
pub fn substring(ctx: &SqlContext<'_>, query: Query, step: &SubstringStep) -> Result<Query, StepError> {
    query.schema.require(&step.column)?;
    if step.start_index == 0 || step.end_index == 0 {
        return Err(StepError::InvalidStep(
            "substring indices are 1-based; 0 is not a valid position".to_string(),
        ));
    }
    let dialect = ctx.dialect();
    let column = ctx.ident(&step.column);
    let length = dialect.length(&column);

    let start = position(&length, step.start_index);
    let count = if step.start_index > 0 && step.end_index > 0 {
        (step.end_index - step.start_index + 1).max(0).to_string()
    } else {
        format!(
            "GREATEST({} - {} + 1, 0)",
            position(&length, step.end_index),
            start
        )
    };
    let assignment = Assignment::new(
        step.output_column(),
        dialect.substring(&column, &start, &count),
        LogicalType::Text,
    );
    Ok(with_columns(ctx, query, StepKind::Substring, vec![assignment]))
}

fn split_with(
    ctx: &SqlContext<'_>,
    query: Query,
    step: &SplitStep,
    part: impl Fn(&str, u32) -> String,
) -> Result<Query, StepError> {
    query.schema.require(&step.column)?;
    if step.number_cols_to_keep == 0 {
        return Err(StepError::InvalidStep("split must keep at least one column".to_string()));
    }
    let column = ctx.ident(&step.column);
    let assignments = step
        .output_columns()
        .into_iter()
        .zip(1..)
        .map(|(name, index)| Assignment::new(name, part(&column, index), LogicalType::Text))
        .collect();
    Ok(with_columns(ctx, query, StepKind::Split, assignments))
}

pub fn split(ctx: &SqlContext<'_>, query: Query, step: &SplitStep) -> Result<Query, StepError> {
    let dialect = ctx.dialect();
    split_with(ctx, query, step, |column, index| {
        dialect.split_part(column, &step.delimiter, index)
    })
}

/// Array-based split for engines without `SPLIT_PART`
pub fn split_array(ctx: &SqlContext<'_>, query: Query, step: &SplitStep) -> Result<Query, StepError> {
    let delimiter = ctx.dialect().string_literal(&step.delimiter);
    split_with(ctx, query, step, |column, index| {
        format!("SPLIT({}, {})[SAFE_OFFSET({})]", column, delimiter, index - 1)
    })
}
