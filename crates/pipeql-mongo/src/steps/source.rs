use pipeql_ir::{CustomStep, DomainStep, StepError};
use serde_json::Value as Document;

use crate::{MongoContext, MongoQuery};

/// A domain names a collection, or a saved pipeline whose stages are inlined
pub fn domain(ctx: &MongoContext<'_>, _query: MongoQuery, step: &DomainStep) -> Result<MongoQuery, StepError> {
    match ctx.provider().get_saved_pipeline(&step.domain) {
        Some(pipeline) => ctx.compile_saved(&step.domain, &pipeline),
        None => Ok(MongoQuery::new(&step.domain)),
    }
}

/// Raw stages: a single stage document or an array of them
pub fn custom(_ctx: &MongoContext<'_>, query: MongoQuery, step: &CustomStep) -> Result<MongoQuery, StepError> {
    let stages = match &step.query {
        Document::Object(_) => vec![step.query.clone()],
        Document::Array(stages) => stages.clone(),
        other => {
            return Err(StepError::InvalidStep(format!(
                "custom query must be a stage or a list of stages, got {}",
                other
            )))
        }
    };
    if let Some(bad) = stages.iter().find(|stage| !stage.is_object()) {
        return Err(StepError::InvalidStep(format!("custom stage {} is not a document", bad)));
    }
    Ok(query.extend(stages))
}
