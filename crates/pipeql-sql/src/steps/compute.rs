use pipeql_ast::{infer_type, parse_formula};
use pipeql_ir::{
    AbsoluteValueStep, ElseBranch, FillNaStep, FilterStep, FormulaStep, IfThenElse, IfThenElseStep,
    LogicalType, ReplaceStep, StepError, StepKind, TableMetadata, Value,
};

use super::{with_columns, Assignment};
use crate::expr::{compile_condition, compile_formula};
use crate::{Query, SqlContext};

pub fn filter(ctx: &SqlContext<'_>, query: Query, step: &FilterStep) -> Result<Query, StepError> {
    let predicate = compile_condition(ctx.dialect(), &step.condition, &query.schema)?;
    let sql = format!(
        "SELECT {} FROM {} WHERE {}",
        query.projection, query.current_alias, predicate
    );
    let schema = query.schema.clone();
    let ordering = query.ordering.clone();
    Ok(query
        .push(ctx.dialect(), StepKind::Filter, sql, schema)
        .keep_ordering(ordering))
}

/// Parse and compile a formula string, returning the expression and its type
fn compile_text(ctx: &SqlContext<'_>, text: &str, schema: &TableMetadata) -> Result<(String, LogicalType), StepError> {
    let formula = parse_formula(text)?;
    let expr = compile_formula(ctx.dialect(), &formula, schema)?;
    Ok((expr, infer_type(&formula, &|name| schema.type_of(name))))
}

pub fn formula(ctx: &SqlContext<'_>, query: Query, step: &FormulaStep) -> Result<Query, StepError> {
    let (expr, logical_type) = compile_text(ctx, &step.formula, &query.schema)?;
    let assignment = Assignment::new(&step.new_column, expr, logical_type);
    Ok(with_columns(ctx, query, StepKind::Formula, vec![assignment]))
}

pub fn absolutevalue(ctx: &SqlContext<'_>, query: Query, step: &AbsoluteValueStep) -> Result<Query, StepError> {
    let source = query.schema.require(&step.column)?;
    let assignment = Assignment::new(
        &step.new_column,
        format!("ABS({})", ctx.ident(&step.column)),
        source.logical_type,
    );
    Ok(with_columns(ctx, query, StepKind::AbsoluteValue, vec![assignment]))
}

fn case_expression(
    ctx: &SqlContext<'_>,
    schema: &TableMetadata,
    condition: &pipeql_ir::Condition,
    then: &str,
    otherwise: &ElseBranch,
) -> Result<(String, LogicalType), StepError> {
    let predicate = compile_condition(ctx.dialect(), condition, schema)?;
    let (then_expr, then_type) = compile_text(ctx, then, schema)?;
    let (else_expr, else_type) = match otherwise {
        ElseBranch::Formula(text) => compile_text(ctx, text, schema)?,
        ElseBranch::Nested(nested) => {
            let IfThenElse {
                condition,
                then,
                otherwise,
            } = nested.as_ref();
            case_expression(ctx, schema, condition, then, otherwise)?
        }
    };
    let logical_type = if then_type == LogicalType::Undefined {
        else_type
    } else {
        then_type
    };
    Ok((
        format!("CASE WHEN {} THEN {} ELSE {} END", predicate, then_expr, else_expr),
        logical_type,
    ))
}

pub fn ifthenelse(ctx: &SqlContext<'_>, query: Query, step: &IfThenElseStep) -> Result<Query, StepError> {
    let (expr, logical_type) = case_expression(
        ctx,
        &query.schema,
        &step.condition,
        &step.then,
        &step.otherwise,
    )?;
    let assignment = Assignment::new(&step.new_column, expr, logical_type);
    Ok(with_columns(ctx, query, StepKind::IfThenElse, vec![assignment]))
}

pub fn fillna(ctx: &SqlContext<'_>, query: Query, step: &FillNaStep) -> Result<Query, StepError> {
    let mut assignments = Vec::with_capacity(step.columns.len());
    for column in &step.columns {
        let meta = query.schema.require(column)?;
        assignments.push(Assignment::new(
            column,
            format!(
                "COALESCE({}, {})",
                ctx.ident(column),
                ctx.dialect().literal(&step.value)
            ),
            meta.logical_type,
        ));
    }
    Ok(with_columns(ctx, query, StepKind::FillNa, assignments))
}

pub fn replace(ctx: &SqlContext<'_>, query: Query, step: &ReplaceStep) -> Result<Query, StepError> {
    let meta = query.schema.require(&step.search_column)?;
    let column = ctx.ident(&step.search_column);
    if step.to_replace.is_empty() {
        return Err(StepError::InvalidStep("replace needs at least one pair".to_string()));
    }

    let branches: Vec<String> = step
        .to_replace
        .iter()
        .map(|(old, new)| {
            let test = match old {
                Value::Null => format!("{} IS NULL", column),
                value => format!("{} = {}", column, ctx.dialect().literal(value)),
            };
            format!("WHEN {} THEN {}", test, ctx.dialect().literal(new))
        })
        .collect();
    let expr = format!("CASE {} ELSE {} END", branches.join(" "), column);
    let assignment = Assignment::new(&step.search_column, expr, meta.logical_type);
    Ok(with_columns(ctx, query, StepKind::Replace, vec![assignment]))
}
