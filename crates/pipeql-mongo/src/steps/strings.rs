use pipeql_ir::{
    ColumnStep, CompareTextStep, ConcatenateStep, ReplaceTextStep, SplitStep, StepError, SubstringStep, TrimStep,
};
use serde_json::{json, Map, Value as Document};

use super::{add_fields, exclude, set_field};
use crate::expr::field;
use crate::{MongoContext, MongoQuery};

pub fn lowercase(_ctx: &MongoContext<'_>, query: MongoQuery, step: &ColumnStep) -> Result<MongoQuery, StepError> {
    Ok(query.stage(set_field(&step.column, json!({ "$toLower": field(&step.column) }))))
}

pub fn uppercase(_ctx: &MongoContext<'_>, query: MongoQuery, step: &ColumnStep) -> Result<MongoQuery, StepError> {
    Ok(query.stage(set_field(&step.column, json!({ "$toUpper": field(&step.column) }))))
}

pub fn trim(_ctx: &MongoContext<'_>, query: MongoQuery, step: &TrimStep) -> Result<MongoQuery, StepError> {
    let fields: Map<String, Document> = step
        .columns
        .iter()
        .map(|c| (c.clone(), json!({ "$trim": { "input": field(c) } })))
        .collect();
    Ok(query.stage(add_fields(fields)))
}

/// Non-text values are stringified before joining
pub fn concatenate(_ctx: &MongoContext<'_>, query: MongoQuery, step: &ConcatenateStep) -> Result<MongoQuery, StepError> {
    let mut parts = Vec::with_capacity(step.columns.len() * 2);
    for (i, column) in step.columns.iter().enumerate() {
        if i > 0 && !step.separator.is_empty() {
            parts.push(json!({ "$literal": step.separator }));
        }
        parts.push(json!({ "$toString": field(column) }));
    }
    Ok(query.stage(set_field(&step.new_column_name, json!({ "$concat": parts }))))
}

pub fn comparetext(_ctx: &MongoContext<'_>, query: MongoQuery, step: &CompareTextStep) -> Result<MongoQuery, StepError> {
    let expr = json!({ "$eq": [field(&step.str_col_1), field(&step.str_col_2)] });
    Ok(query.stage(set_field(&step.new_column_name, expr)))
}

pub fn replacetext(_ctx: &MongoContext<'_>, query: MongoQuery, step: &ReplaceTextStep) -> Result<MongoQuery, StepError> {
    let expr = json!({
        "$replaceAll": {
            "input": field(&step.search_column),
            "find": { "$literal": step.old_str },
            "replacement": { "$literal": step.new_str }
        }
    });
    Ok(query.stage(set_field(&step.search_column, expr)))
}

/// 0-based `$substrCP` bounds from 1-based inclusive indexes; negative
/// indexes count from the end of the string.
pub fn substring(_ctx: &MongoContext<'_>, query: MongoQuery, step: &SubstringStep) -> Result<MongoQuery, StepError> {
    if step.start_index == 0 || step.end_index == 0 {
        return Err(StepError::InvalidStep("substring indexes are 1-based".to_string()));
    }
    let column = field(&step.column);
    let length = json!({ "$strLenCP": column });

    let expr = if step.start_index > 0 && step.end_index > 0 {
        let count = (step.end_index - step.start_index + 1).max(0);
        json!({ "$substrCP": [column, step.start_index - 1, count] })
    } else {
        let start = if step.start_index > 0 {
            json!(step.start_index - 1)
        } else {
            json!({ "$max": [{ "$add": [length.clone(), step.start_index] }, 0] })
        };
        let end = if step.end_index > 0 {
            json!(step.end_index)
        } else {
            json!({ "$add": [length, step.end_index + 1] })
        };
        json!({
            "$let": {
                "vars": { "start": start, "end": end },
                "in": {
                    "$substrCP": [
                        column,
                        "$$start",
                        { "$max": [{ "$subtract": ["$$end", "$$start"] }, 0] }
                    ]
                }
            }
        })
    };
    Ok(query.stage(set_field(&step.output_column(), expr)))
}

/// Missing parts are left out of the document
pub fn split(_ctx: &MongoContext<'_>, query: MongoQuery, step: &SplitStep) -> Result<MongoQuery, StepError> {
    const PARTS: &str = "__pql_split";
    let parts = json!({ "$split": [field(&step.column), { "$literal": step.delimiter }] });
    let fields: Map<String, Document> = step
        .output_columns()
        .into_iter()
        .enumerate()
        .map(|(i, name)| (name, json!({ "$arrayElemAt": [field(PARTS), i] })))
        .collect();
    Ok(query
        .stage(set_field(PARTS, parts))
        .stage(add_fields(fields))
        .stage(exclude([PARTS])))
}
