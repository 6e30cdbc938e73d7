use pipeql_ast::parse_formula;
use pipeql_ir::{
    AbsoluteValueStep, Condition, ElseBranch, FillNaStep, FilterStep, FormulaStep, IfThenElseStep, ReplaceStep,
    StepError, Value,
};
use serde_json::{json, Map, Value as Document};

use super::{add_fields, set_field};
use crate::expr::{compile_condition_expr, compile_condition_query, compile_formula, field, literal};
use crate::{MongoContext, MongoQuery};

pub fn filter(ctx: &MongoContext<'_>, query: MongoQuery, step: &FilterStep) -> Result<MongoQuery, StepError> {
    let condition = compile_condition_query(&step.condition, ctx.target_version())?;
    Ok(query.stage(json!({ "$match": condition })))
}

fn formula_expr(text: &str) -> Result<Document, StepError> {
    Ok(compile_formula(&parse_formula(text)?))
}

pub fn formula(_ctx: &MongoContext<'_>, query: MongoQuery, step: &FormulaStep) -> Result<MongoQuery, StepError> {
    let expr = formula_expr(&step.formula)?;
    Ok(query.stage(set_field(&step.new_column, expr)))
}

pub fn absolutevalue(
    _ctx: &MongoContext<'_>,
    query: MongoQuery,
    step: &AbsoluteValueStep,
) -> Result<MongoQuery, StepError> {
    Ok(query.stage(set_field(&step.new_column, json!({ "$abs": field(&step.column) }))))
}

fn branch(
    ctx: &MongoContext<'_>,
    condition: &Condition,
    then: &str,
    otherwise: &ElseBranch,
) -> Result<Document, StepError> {
    let otherwise = match otherwise {
        ElseBranch::Formula(text) => formula_expr(text)?,
        ElseBranch::Nested(nested) => branch(ctx, &nested.condition, &nested.then, &nested.otherwise)?,
    };
    Ok(json!({
        "$cond": {
            "if": compile_condition_expr(condition, ctx.target_version())?,
            "then": formula_expr(then)?,
            "else": otherwise
        }
    }))
}

pub fn ifthenelse(ctx: &MongoContext<'_>, query: MongoQuery, step: &IfThenElseStep) -> Result<MongoQuery, StepError> {
    let expr = branch(ctx, &step.condition, &step.then, &step.otherwise)?;
    Ok(query.stage(set_field(&step.new_column, expr)))
}

pub fn fillna(_ctx: &MongoContext<'_>, query: MongoQuery, step: &FillNaStep) -> Result<MongoQuery, StepError> {
    let fields: Map<String, Document> = step
        .columns
        .iter()
        .map(|c| (c.clone(), json!({ "$ifNull": [field(c), literal(&step.value)] })))
        .collect();
    Ok(query.stage(add_fields(fields)))
}

pub fn replace(_ctx: &MongoContext<'_>, query: MongoQuery, step: &ReplaceStep) -> Result<MongoQuery, StepError> {
    if step.to_replace.is_empty() {
        return Ok(query);
    }
    let column = field(&step.search_column);
    let branches: Vec<Document> = step
        .to_replace
        .iter()
        .map(|(old, new)| {
            let case = match old {
                Value::Null => json!({ "$eq": [{ "$ifNull": [column.clone(), null] }, null] }),
                other => json!({ "$eq": [column.clone(), literal(other)] }),
            };
            json!({ "case": case, "then": literal(new) })
        })
        .collect();
    let expr = json!({ "$switch": { "branches": branches, "default": column } });
    Ok(query.stage(set_field(&step.search_column, expr)))
}
