use pipeql_ir::{
    ConvertStep, DeleteStep, DuplicateStep, FromDateStep, LogicalType, RenameStep, SelectStep, SortOrder, SortStep,
    StepError, TextStep, ToDateStep,
};
use serde_json::{json, Map, Value as Document};

use super::{exclude, set_field};
use crate::expr::{field, literal};
use crate::{MongoContext, MongoQuery};

pub fn select(_ctx: &MongoContext<'_>, query: MongoQuery, step: &SelectStep) -> Result<MongoQuery, StepError> {
    let mut projection: Map<String, Document> = step
        .columns
        .iter()
        .map(|c| (c.clone(), json!(1)))
        .collect();
    if !projection.contains_key("_id") {
        projection.insert("_id".to_string(), json!(0));
    }
    Ok(query.stage(json!({ "$project": projection })))
}

pub fn delete(_ctx: &MongoContext<'_>, query: MongoQuery, step: &DeleteStep) -> Result<MongoQuery, StepError> {
    if step.columns.is_empty() {
        return Ok(query);
    }
    Ok(query.stage(exclude(step.columns.iter().map(String::as_str))))
}

/// Renames apply one after the other
pub fn rename(_ctx: &MongoContext<'_>, query: MongoQuery, step: &RenameStep) -> Result<MongoQuery, StepError> {
    let mut query = query;
    for (old, new) in &step.to_rename {
        if old == new {
            continue;
        }
        query = query.stage(set_field(new, field(old))).stage(exclude([old.as_str()]));
    }
    Ok(query)
}

pub fn duplicate(_ctx: &MongoContext<'_>, query: MongoQuery, step: &DuplicateStep) -> Result<MongoQuery, StepError> {
    Ok(query.stage(set_field(&step.new_column_name, field(&step.column))))
}

pub fn text(_ctx: &MongoContext<'_>, query: MongoQuery, step: &TextStep) -> Result<MongoQuery, StepError> {
    Ok(query.stage(set_field(&step.new_column, literal(&step.text))))
}

/// `$convert` target type name
fn bson_type(logical_type: LogicalType) -> Result<&'static str, StepError> {
    match logical_type {
        LogicalType::Boolean => Ok("bool"),
        LogicalType::Date => Ok("date"),
        LogicalType::Float => Ok("double"),
        LogicalType::Integer => Ok("long"),
        LogicalType::Text => Ok("string"),
        LogicalType::Undefined => Err(StepError::InvalidStep("cannot convert to undefined".to_string())),
    }
}

pub fn convert(_ctx: &MongoContext<'_>, query: MongoQuery, step: &ConvertStep) -> Result<MongoQuery, StepError> {
    let to = bson_type(step.data_type)?;
    let fields: Map<String, Document> = step
        .columns
        .iter()
        .map(|c| {
            let converted = json!({
                "$convert": { "input": field(c), "to": to, "onError": null, "onNull": null }
            });
            (c.clone(), converted)
        })
        .collect();
    Ok(query.stage(json!({ "$addFields": fields })))
}

pub fn todate(_ctx: &MongoContext<'_>, query: MongoQuery, step: &ToDateStep) -> Result<MongoQuery, StepError> {
    let converted = match &step.format {
        Some(format) => json!({
            "$dateFromString": { "dateString": field(&step.column), "format": format, "onError": null }
        }),
        None => json!({
            "$convert": { "input": field(&step.column), "to": "date", "onError": null, "onNull": null }
        }),
    };
    Ok(query.stage(set_field(&step.column, converted)))
}

pub fn fromdate(_ctx: &MongoContext<'_>, query: MongoQuery, step: &FromDateStep) -> Result<MongoQuery, StepError> {
    let formatted = json!({ "$dateToString": { "date": field(&step.column), "format": step.format } });
    Ok(query.stage(set_field(&step.column, formatted)))
}

pub fn sort(_ctx: &MongoContext<'_>, query: MongoQuery, step: &SortStep) -> Result<MongoQuery, StepError> {
    if step.columns.is_empty() {
        return Err(StepError::InvalidStep("sort needs at least one column".to_string()));
    }
    let keys: Map<String, Document> = step
        .columns
        .iter()
        .map(|c| (c.column.clone(), json!(direction(c.order))))
        .collect();
    Ok(query.stage(json!({ "$sort": keys })))
}

pub fn direction(order: SortOrder) -> i32 {
    match order {
        SortOrder::Asc => 1,
        SortOrder::Desc => -1,
    }
}

