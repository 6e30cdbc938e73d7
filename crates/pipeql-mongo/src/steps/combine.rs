use pipeql_ir::{AppendStep, JoinStep, JoinType, StepError};
use serde_json::{json, Map, Value as Document};

use super::{exclude, push_rows, unwind_rows, ROWS};
use crate::expr::field;
use crate::{MongoContext, MongoQuery};

const JOINED: &str = "__pql_joined";

/// `$lookup` with a correlated sub-pipeline; left fields win over right
/// fields of the same name
pub fn join(ctx: &MongoContext<'_>, query: MongoQuery, step: &JoinStep) -> Result<MongoQuery, StepError> {
    if step.on.is_empty() {
        return Err(StepError::InvalidStep("join needs at least one column pair".to_string()));
    }
    let right = ctx.compile_reference(&step.right_pipeline)?;

    let mut bindings = Map::new();
    let mut matches = Vec::with_capacity(step.on.len());
    for (i, (left_column, right_column)) in step.on.iter().enumerate() {
        let variable = format!("key_{}", i);
        matches.push(json!({ "$eq": [field(right_column), format!("$${}", variable)] }));
        bindings.insert(variable, field(left_column));
    }
    let mut stages = right.stages;
    stages.push(json!({ "$match": { "$expr": { "$and": matches } } }));
    let lookup = json!({
        "$lookup": {
            "from": right.collection,
            "let": bindings,
            "pipeline": stages,
            "as": JOINED
        }
    });

    let joined = format!("${}", JOINED);
    let merge = json!({ "$replaceRoot": { "newRoot": { "$mergeObjects": [joined, "$$ROOT"] } } });
    let query = query.stage(lookup);
    let query = match step.join_type {
        JoinType::Inner => query.stage(json!({ "$unwind": joined })).stage(merge),
        JoinType::Left => query
            .stage(json!({ "$unwind": { "path": joined, "preserveNullAndEmptyArrays": true } }))
            .stage(merge),
        JoinType::LeftOuter => {
            let mut unmatched = Map::new();
            unmatched.insert(JOINED.to_string(), json!({ "$eq": [] }));
            query.stage(json!({ "$match": unmatched }))
        }
    };
    Ok(query.stage(exclude([JOINED])))
}

/// Rows of every appended pipeline follow the current rows. An empty current
/// result set yields no rows since there is no document to carry the lookups.
pub fn append(ctx: &MongoContext<'_>, query: MongoQuery, step: &AppendStep) -> Result<MongoQuery, StepError> {
    let mut query = query.stage(push_rows(&[], Map::new()));
    let mut sources = vec![Document::String(format!("${}", ROWS))];
    for (i, reference) in step.pipelines.iter().enumerate() {
        let appended = ctx.compile_reference(reference)?;
        let name = format!("__pql_appended_{}", i);
        sources.push(Document::String(format!("${}", name)));
        query = query.stage(json!({
            "$lookup": {
                "from": appended.collection,
                "pipeline": appended.stages,
                "as": name
            }
        }));
    }
    let mut projection = Map::new();
    projection.insert(ROWS.to_string(), json!({ "$concatArrays": sources }));
    Ok(query.stage(json!({ "$project": projection })).extend(unwind_rows()))
}
