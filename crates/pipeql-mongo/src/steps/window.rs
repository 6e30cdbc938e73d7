use pipeql_ir::{
    CumsumStep, ExtremumStep, MovingAverageStep, PercentageStep, RankMethod, RankStep, SortOrder, StepError, TopStep,
};
use serde_json::{json, Map, Value as Document};

use super::columns::direction;
use super::{push_rows, unwind_rows, ROWS};
use crate::expr::{field, var_field};
use crate::{MongoContext, MongoQuery};

fn sort_on(column: &str, order: SortOrder) -> Document {
    let mut keys = Map::new();
    keys.insert(column.to_string(), json!(direction(order)));
    json!({ "$sort": keys })
}

/// Replace the grouped rows with `rows`, then explode them again
fn rebuild(query: MongoQuery, rows: Document) -> MongoQuery {
    let mut projection = Map::new();
    projection.insert(ROWS.to_string(), rows);
    query.stage(json!({ "$project": projection })).extend(unwind_rows())
}

/// Fold over the sorted rows of each group, carrying `state` and
/// accumulating rewritten rows in `state.rows`
fn fold_rows(initial: Map<String, Document>, step_in: Document) -> Document {
    let mut initial_value = initial;
    initial_value.insert("rows".to_string(), json!([]));
    json!({
        "$let": {
            "vars": {
                "state": {
                    "$reduce": {
                        "input": format!("${}", ROWS),
                        "initialValue": initial_value,
                        "in": step_in
                    }
                }
            },
            "in": "$$state.rows"
        }
    })
}

fn append_row(assigned: Map<String, Document>) -> Document {
    json!({ "$concatArrays": ["$$value.rows", [{ "$mergeObjects": ["$$this", assigned] }]] })
}

/// Ties share a rank; standard ranking then skips, dense ranking does not
pub fn rank(_ctx: &MongoContext<'_>, query: MongoQuery, step: &RankStep) -> Result<MongoQuery, StepError> {
    let value = var_field("this", &step.value_col);
    let untied = match step.method {
        RankMethod::Standard => json!("$$position"),
        RankMethod::Dense => json!({ "$add": ["$$value.rank", 1] }),
    };
    let mut assigned = Map::new();
    assigned.insert(step.output_column(), json!("$$rank"));

    let mut initial = Map::new();
    initial.insert("position".to_string(), json!(0));
    initial.insert("rank".to_string(), json!(0));
    initial.insert("previous".to_string(), Document::Null);
    let step_in = json!({
        "$let": {
            "vars": {
                "position": { "$add": ["$$value.position", 1] },
                "tied": { "$and": [{ "$gt": ["$$value.position", 0] }, { "$eq": [value, "$$value.previous"] }] }
            },
            "in": {
                "$let": {
                    "vars": { "rank": { "$cond": ["$$tied", "$$value.rank", untied] } },
                    "in": {
                        "position": "$$position",
                        "rank": "$$rank",
                        "previous": value,
                        "rows": append_row(assigned)
                    }
                }
            }
        }
    });

    let query = query
        .stage(sort_on(&step.value_col, step.order))
        .stage(push_rows(&step.groupby, Map::new()));
    Ok(rebuild(query, fold_rows(initial, step_in)))
}

pub fn top(_ctx: &MongoContext<'_>, query: MongoQuery, step: &TopStep) -> Result<MongoQuery, StepError> {
    let query = query
        .stage(sort_on(&step.rank_on, step.sort))
        .stage(push_rows(&step.groups, Map::new()));
    Ok(rebuild(query, json!({ "$slice": [format!("${}", ROWS), step.limit] })))
}

fn extremum(query: MongoQuery, step: &ExtremumStep, operator: &str) -> MongoQuery {
    const EXTREMUM: &str = "__pql_extremum";
    let mut accumulators = Map::new();
    accumulators.insert(EXTREMUM.to_string(), json!({ operator: field(&step.column) }));
    let kept = json!({
        "$filter": {
            "input": format!("${}", ROWS),
            "cond": { "$eq": [var_field("this", &step.column), format!("${}", EXTREMUM)] }
        }
    });
    rebuild(query.stage(push_rows(&step.groups, accumulators)), kept)
}

pub fn argmax(_ctx: &MongoContext<'_>, query: MongoQuery, step: &ExtremumStep) -> Result<MongoQuery, StepError> {
    Ok(extremum(query, step, "$max"))
}

pub fn argmin(_ctx: &MongoContext<'_>, query: MongoQuery, step: &ExtremumStep) -> Result<MongoQuery, StepError> {
    Ok(extremum(query, step, "$min"))
}

/// Running sums carried as `s0, s1, ...` in the fold state; nulls count as zero
pub fn cumsum(_ctx: &MongoContext<'_>, query: MongoQuery, step: &CumsumStep) -> Result<MongoQuery, StepError> {
    let mut initial = Map::new();
    let mut vars = Map::new();
    let mut next_state = Map::new();
    let mut assigned = Map::new();
    for (i, (column, new_column)) in step.to_cumsum.iter().enumerate() {
        let sum = format!("s{}", i);
        initial.insert(sum.clone(), json!(0));
        vars.insert(
            sum.clone(),
            json!({ "$add": [format!("$$value.{}", sum), { "$ifNull": [var_field("this", column), 0] }] }),
        );
        next_state.insert(sum.clone(), json!(format!("$${}", sum)));
        let name = if new_column.is_empty() { column } else { new_column };
        assigned.insert(name.clone(), json!(format!("$${}", sum)));
    }
    next_state.insert("rows".to_string(), append_row(assigned));
    let step_in = json!({ "$let": { "vars": vars, "in": next_state } });

    let query = query
        .stage(sort_on(&step.reference_column, SortOrder::Asc))
        .stage(push_rows(&step.groups, Map::new()));
    Ok(rebuild(query, fold_rows(initial, step_in)))
}

/// Null until a full window of rows precedes the current one
pub fn movingaverage(_ctx: &MongoContext<'_>, query: MongoQuery, step: &MovingAverageStep) -> Result<MongoQuery, StepError> {
    if step.moving_window == 0 {
        return Err(StepError::InvalidStep("moving_window must be positive".to_string()));
    }
    let lookback = step.moving_window - 1;
    let values = json!({
        "$map": { "input": format!("${}", ROWS), "as": "row", "in": var_field("row", &step.value_column) }
    });
    let mut assigned = Map::new();
    assigned.insert(
        step.output_column(),
        json!({
            "$cond": [
                { "$lt": ["$$i", lookback] },
                null,
                { "$avg": { "$slice": [values, { "$subtract": ["$$i", lookback] }, step.moving_window] } }
            ]
        }),
    );
    let rows = json!({
        "$map": {
            "input": { "$range": [0, { "$size": format!("${}", ROWS) }] },
            "as": "i",
            "in": { "$mergeObjects": [{ "$arrayElemAt": [format!("${}", ROWS), "$$i"] }, assigned] }
        }
    });

    let query = query
        .stage(sort_on(&step.column_to_sort, SortOrder::Asc))
        .stage(push_rows(&step.groups, Map::new()));
    Ok(rebuild(query, rows))
}

/// Share of the group total; a zero total yields null
pub fn percentage(_ctx: &MongoContext<'_>, query: MongoQuery, step: &PercentageStep) -> Result<MongoQuery, StepError> {
    const TOTAL: &str = "__pql_total";
    let mut accumulators = Map::new();
    accumulators.insert(TOTAL.to_string(), json!({ "$sum": field(&step.column) }));
    let mut assigned = Map::new();
    assigned.insert(
        step.output_column(),
        json!({
            "$cond": [
                { "$eq": [format!("${}", TOTAL), 0] },
                null,
                { "$divide": [format!("${}.{}", ROWS, step.column), format!("${}", TOTAL)] }
            ]
        }),
    );
    Ok(query.stage(push_rows(&step.group, accumulators)).extend([
        json!({ "$unwind": format!("${}", ROWS) }),
        json!({ "$replaceRoot": { "newRoot": { "$mergeObjects": [format!("${}", ROWS), assigned] } } }),
    ]))
}
