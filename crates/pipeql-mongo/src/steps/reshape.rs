use pipeql_ir::{PivotStep, StepError, UnpivotStep};
use serde_json::{json, Map, Value as Document};

use super::aggregate::{accumulator, finalize};
use super::{group_field, group_key_fields};
use crate::expr::field;
use crate::{MongoContext, MongoQuery};

/// Group twice: first by index and pivot value, then by index alone, pushing
/// `{k, v}` pairs that `$arrayToObject` turns into columns. Null pivot values
/// produce no column.
pub fn pivot(_ctx: &MongoContext<'_>, query: MongoQuery, step: &PivotStep) -> Result<MongoQuery, StepError> {
    const PIVOT: &str = "__pql_pivot";
    const VALUE: &str = "__pql_value";
    const PAIRS: &str = "__pql_pairs";

    let mut cell_key: Map<String, Document> = step.index.iter().map(|c| (group_field(c), field(c))).collect();
    cell_key.insert(PIVOT.to_string(), field(&step.column_to_pivot));
    let mut cells = Map::new();
    cells.insert("_id".to_string(), Document::Object(cell_key));
    cells.insert(VALUE.to_string(), accumulator(step.agg_function, field(&step.value_column)));

    let row_key: Map<String, Document> = step
        .index
        .iter()
        .map(|c| {
            let key = group_field(c);
            (key.clone(), Document::String(format!("$_id.{}", key)))
        })
        .collect();
    let row_key = if step.index.is_empty() {
        Document::Null
    } else {
        Document::Object(row_key)
    };
    let pair = json!({
        "k": { "$toString": format!("$_id.{}", PIVOT) },
        "v": finalize(step.agg_function, Document::String(format!("${}", VALUE)))
    });
    let mut rows = Map::new();
    rows.insert("_id".to_string(), row_key);
    rows.insert(PAIRS.to_string(), json!({ "$push": pair }));

    let columns = json!({
        "$arrayToObject": {
            "$filter": { "input": format!("${}", PAIRS), "cond": { "$ne": ["$$this.k", null] } }
        }
    });
    let new_root = json!({ "$mergeObjects": [group_key_fields(&step.index), columns] });

    Ok(query
        .stage(json!({ "$group": cells }))
        .stage(json!({ "$group": rows }))
        .stage(json!({ "$replaceRoot": { "newRoot": new_root } })))
}

/// Each document becomes one document per unpivoted column
pub fn unpivot(_ctx: &MongoContext<'_>, query: MongoQuery, step: &UnpivotStep) -> Result<MongoQuery, StepError> {
    const PAIRS: &str = "__pql_unpivot";
    if step.unpivot.is_empty() {
        return Err(StepError::InvalidStep("unpivot needs at least one column".to_string()));
    }

    let pairs: Vec<Document> = step
        .unpivot
        .iter()
        .map(|c| json!({ "k": { "$literal": c }, "v": field(c) }))
        .collect();
    let mut spread: Map<String, Document> = step.keep.iter().map(|c| (c.clone(), json!(1))).collect();
    spread.insert(PAIRS.to_string(), Document::Array(pairs));
    if !spread.contains_key("_id") {
        spread.insert("_id".to_string(), json!(0));
    }

    let mut output: Map<String, Document> = step.keep.iter().map(|c| (c.clone(), json!(1))).collect();
    output.insert(step.unpivot_column_name.clone(), json!(format!("${}.k", PAIRS)));
    output.insert(step.value_column_name.clone(), json!(format!("${}.v", PAIRS)));
    if !output.contains_key("_id") {
        output.insert("_id".to_string(), json!(0));
    }

    let mut query = query
        .stage(json!({ "$project": spread }))
        .stage(json!({ "$unwind": format!("${}", PAIRS) }))
        .stage(json!({ "$project": output }));
    if step.dropna {
        let mut not_null = Map::new();
        not_null.insert(step.value_column_name.clone(), json!({ "$ne": null }));
        query = query.stage(json!({ "$match": not_null }));
    }
    Ok(query)
}
