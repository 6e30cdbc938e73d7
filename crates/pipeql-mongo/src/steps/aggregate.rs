use pipeql_ir::{
    AggregateStep, Aggregation, AggregationFunction, RollupStep, Statistic, StatisticsStep, StepError, TotalsStep,
    UniqueGroupsStep,
};
use serde_json::{json, Map, Value as Document};

use super::{group_field, group_id, group_key_fields, project_without_id, push_rows, unwind_rows, ROWS};
use crate::expr::field;
use crate::{MongoContext, MongoQuery};

/// Non-null entries of an array expression
fn non_null(array: Document) -> Document {
    json!({ "$filter": { "input": array, "cond": { "$ne": ["$$this", null] } } })
}

/// `$group` accumulator; `count` ignores nulls like SQL `COUNT(col)`
pub fn accumulator(function: AggregationFunction, input: Document) -> Document {
    match function {
        AggregationFunction::Sum => json!({ "$sum": input }),
        AggregationFunction::Avg => json!({ "$avg": input }),
        AggregationFunction::Min => json!({ "$min": input }),
        AggregationFunction::Max => json!({ "$max": input }),
        AggregationFunction::First => json!({ "$first": input }),
        AggregationFunction::Last => json!({ "$last": input }),
        AggregationFunction::Count => json!({
            "$sum": { "$cond": [{ "$eq": [{ "$ifNull": [input, null] }, null] }, 0, 1] }
        }),
        AggregationFunction::CountDistinct => json!({ "$addToSet": input }),
    }
}

/// Expression reading an accumulated value back
pub fn finalize(function: AggregationFunction, accumulated: Document) -> Document {
    match function {
        AggregationFunction::CountDistinct => json!({ "$size": non_null(accumulated) }),
        _ => accumulated,
    }
}

/// `$group` accumulators and the output fields reading them, in declaration order
fn aggregation_fields(aggregations: &[Aggregation]) -> Result<(Map<String, Document>, Map<String, Document>), StepError> {
    let mut accumulators = Map::new();
    let mut outputs = Map::new();
    for aggregation in aggregations {
        for (column, new_column) in aggregation.pairs()? {
            if outputs.contains_key(new_column) {
                return Err(StepError::DuplicateColumn(new_column.to_string()));
            }
            let key = group_field(new_column);
            accumulators.insert(key.clone(), accumulator(aggregation.aggfunction, field(column)));
            outputs.insert(
                new_column.to_string(),
                finalize(aggregation.aggfunction, Document::String(format!("${}", key))),
            );
        }
    }
    Ok((accumulators, outputs))
}

fn group_stage(groups: &[String], accumulators: Map<String, Document>) -> Document {
    let mut group = Map::new();
    group.insert("_id".to_string(), group_id(groups));
    group.extend(accumulators);
    json!({ "$group": group })
}

pub fn aggregate(_ctx: &MongoContext<'_>, query: MongoQuery, step: &AggregateStep) -> Result<MongoQuery, StepError> {
    let (accumulators, outputs) = aggregation_fields(&step.aggregations)?;

    if step.keep_original_granularity {
        return Ok(query.stage(push_rows(&step.on, accumulators)).extend([
            json!({ "$unwind": format!("${}", ROWS) }),
            json!({ "$replaceRoot": { "newRoot": { "$mergeObjects": [format!("${}", ROWS), outputs] } } }),
        ]));
    }

    let mut fields = group_key_fields(&step.on);
    fields.extend(outputs);
    Ok(query
        .stage(group_stage(&step.on, accumulators))
        .stage(project_without_id(fields)))
}

pub fn uniquegroups(_ctx: &MongoContext<'_>, query: MongoQuery, step: &UniqueGroupsStep) -> Result<MongoQuery, StepError> {
    Ok(query
        .stage(group_stage(&step.on, Map::new()))
        .stage(project_without_id(group_key_fields(&step.on))))
}

/// Nearest-rank quantile of the sorted non-null values in `values`
fn quantile(values: &str, fraction: f64) -> Document {
    json!({
        "$let": {
            "vars": { "values": non_null(Document::String(format!("${}", values))) },
            "in": {
                "$arrayElemAt": [
                    "$$values",
                    {
                        "$toInt": {
                            "$max": [
                                { "$subtract": [{ "$ceil": { "$multiply": [fraction, { "$size": "$$values" }] } }, 1] },
                                0
                            ]
                        }
                    }
                ]
            }
        }
    })
}

/// Population variance and standard deviation
pub fn statistics(_ctx: &MongoContext<'_>, query: MongoQuery, step: &StatisticsStep) -> Result<MongoQuery, StepError> {
    const VALUES: &str = "__pql_values";
    let column = field(&step.column);

    let mut accumulators = Map::new();
    let mut fields = group_key_fields(&step.groupby_columns);
    for (i, statistic) in step.statistics.iter().enumerate() {
        let key = format!("__pql_stat_{}", i);
        let accumulated = Document::String(format!("${}", key));
        let (accumulated_by, output) = match statistic {
            Statistic::Count => (accumulator(AggregationFunction::Count, column.clone()), accumulated),
            Statistic::Max => (json!({ "$max": column }), accumulated),
            Statistic::Min => (json!({ "$min": column }), accumulated),
            Statistic::Average => (json!({ "$avg": column }), accumulated),
            Statistic::Variance => (json!({ "$stdDevPop": column }), json!({ "$pow": [accumulated, 2] })),
            Statistic::StandardDeviation => (json!({ "$stdDevPop": column }), accumulated),
        };
        accumulators.insert(key, accumulated_by);
        fields.insert(statistic.column_name().to_string(), output);
    }

    let mut query = query;
    if !step.quantiles.is_empty() {
        let mut keys = Map::new();
        keys.insert(step.column.clone(), json!(1));
        query = query.stage(json!({ "$sort": keys }));
        accumulators.insert(VALUES.to_string(), json!({ "$push": column }));
        for q in &step.quantiles {
            fields.insert(q.column_name(), quantile(VALUES, q.fraction()));
        }
    }

    Ok(query
        .stage(group_stage(&step.groupby_columns, accumulators))
        .stage(project_without_id(fields)))
}

/// One `$facet` branch per entry, concatenated back into a single row stream
fn concat_facets(branches: Vec<(String, Vec<Document>)>) -> Vec<Document> {
    let names: Vec<Document> = branches
        .iter()
        .map(|(name, _)| Document::String(format!("${}", name)))
        .collect();
    let facet: Map<String, Document> = branches
        .into_iter()
        .map(|(name, stages)| (name, Document::Array(stages)))
        .collect();
    let mut concat = Map::new();
    concat.insert(ROWS.to_string(), json!({ "$concatArrays": names }));
    let [unwind, replace_root] = unwind_rows();
    vec![
        json!({ "$facet": facet }),
        json!({ "$project": concat }),
        unwind,
        replace_root,
    ]
}

fn key_text(column: &str) -> Document {
    json!({ "$toString": format!("$_id.{}", group_field(column)) })
}

/// One branch per hierarchy prefix plus the grand total
pub fn rollup(_ctx: &MongoContext<'_>, query: MongoQuery, step: &RollupStep) -> Result<MongoQuery, StepError> {
    if step.hierarchy.is_empty() {
        return Err(StepError::InvalidStep("rollup needs a hierarchy".to_string()));
    }
    let (accumulators, outputs) = aggregation_fields(&step.aggregations)?;

    let mut branches = Vec::new();
    for (i, level) in step.levels().into_iter().enumerate() {
        let groups: Vec<String> = step.groupby.iter().chain(level.iter()).cloned().collect();

        let mut fields = group_key_fields(&step.groupby);
        for dimension in &step.hierarchy {
            let value = if level.contains(dimension) {
                Document::String(format!("$_id.{}", group_field(dimension)))
            } else {
                json!({ "$literal": null })
            };
            fields.insert(dimension.clone(), value);
        }
        let (label, level_name, parent) = match level {
            [] => (json!({ "$literal": null }), json!({ "$literal": null }), json!({ "$literal": null })),
            [.., parent, deepest] => (key_text(deepest), json!({ "$literal": deepest }), key_text(parent)),
            [deepest] => (key_text(deepest), json!({ "$literal": deepest }), json!({ "$literal": null })),
        };
        fields.insert(step.label_col.clone(), label);
        fields.insert(step.level_col.clone(), level_name);
        fields.insert(step.parent_label_col.clone(), parent);
        fields.extend(outputs.clone());

        branches.push((
            format!("__pql_level_{}", i),
            vec![group_stage(&groups, accumulators.clone()), project_without_id(fields)],
        ));
    }
    Ok(query.extend(concat_facets(branches)))
}

/// One branch per subset of the total dimensions, detail rows first
pub fn totals(_ctx: &MongoContext<'_>, query: MongoQuery, step: &TotalsStep) -> Result<MongoQuery, StepError> {
    if step.total_dimensions.is_empty() {
        return Err(StepError::InvalidStep("totals needs at least one dimension".to_string()));
    }
    let (accumulators, outputs) = aggregation_fields(&step.aggregations)?;

    let mut branches = Vec::new();
    for (i, mask) in step.combinations().into_iter().enumerate() {
        let mut groups: Vec<String> = step
            .total_dimensions
            .iter()
            .zip(&mask)
            .filter(|(_, totalled)| !**totalled)
            .map(|(dimension, _)| dimension.total_column.clone())
            .collect();
        groups.extend(step.groups.iter().cloned());

        let mut fields = Map::new();
        for (dimension, totalled) in step.total_dimensions.iter().zip(&mask) {
            let value = if *totalled {
                json!({ "$literal": dimension.total_rows_label })
            } else {
                key_text(&dimension.total_column)
            };
            fields.insert(dimension.total_column.clone(), value);
        }
        fields.extend(group_key_fields(&step.groups));
        fields.extend(outputs.clone());

        branches.push((
            format!("__pql_total_{}", i),
            vec![group_stage(&groups, accumulators.clone()), project_without_id(fields)],
        ));
    }
    Ok(query.extend(concat_facets(branches)))
}
