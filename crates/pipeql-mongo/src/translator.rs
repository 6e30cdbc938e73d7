//! Pipeline to MongoDB aggregation translation driver

use pipeql_ir::{
    Pipeline, PipelineRef, PipelineTranslationFailure, ReferenceStack, SchemaProvider, Step, StepError, Version,
};
use pipeql_registry::{RegistryError, StepRegistry};
use serde_json::json;
use tracing::{debug, info};

use crate::{registry, MongoQuery};

pub type MongoStepFn = fn(&MongoContext<'_>, MongoQuery, &Step) -> Result<MongoQuery, StepError>;
pub type MongoRegistry = StepRegistry<MongoStepFn>;

/// What a step translator sees of the running translation
pub struct MongoContext<'t> {
    translator: &'t MongoTranslator<'t>,
    references: ReferenceStack,
}

impl<'t> MongoContext<'t> {
    pub fn provider(&self) -> &dyn SchemaProvider {
        self.translator.provider
    }

    pub fn target_version(&self) -> Option<Version> {
        self.translator.target_version
    }

    /// Compile a join/append sub-pipeline through the same driver
    pub fn compile_reference(&self, reference: &PipelineRef) -> Result<MongoQuery, StepError> {
        let stack = self.references.descend(None)?;
        self.translator
            .compile(&reference.to_pipeline(), &stack)
            .map_err(|failure| StepError::SubPipeline(Box::new(failure)))
    }

    /// Compile a saved pipeline used as a domain
    pub fn compile_saved(&self, name: &str, pipeline: &Pipeline) -> Result<MongoQuery, StepError> {
        let stack = self.references.descend(Some(name))?;
        self.translator
            .compile(pipeline, &stack)
            .map_err(|failure| StepError::SubPipeline(Box::new(failure)))
    }
}

/// Translates pipelines into an aggregation stage list
pub struct MongoTranslator<'a> {
    registry: MongoRegistry,
    provider: &'a dyn SchemaProvider,
    target_version: Option<Version>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl<'a> MongoTranslator<'a> {
    pub fn new(provider: &'a dyn SchemaProvider) -> Self {
        Self {
            registry: registry::mongo_registry(),
            provider,
            target_version: None,
            limit: None,
            offset: None,
        }
    }

    /// Server version used to gate steps; `None` targets the latest release
    pub fn with_target_version(mut self, version: Option<Version>) -> Self {
        self.target_version = version;
        self
    }

    pub fn with_pagination(mut self, limit: Option<u64>, offset: Option<u64>) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    pub fn target_version(&self) -> Option<Version> {
        self.target_version
    }

    pub fn registry(&self) -> &MongoRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut MongoRegistry {
        &mut self.registry
    }

    /// Translate a full pipeline, appending `$skip`/`$limit` when paginated
    pub fn translate_pipeline(&self, pipeline: &Pipeline) -> Result<MongoQuery, PipelineTranslationFailure> {
        info!(
            target_version = ?self.target_version,
            steps = pipeline.steps.len(),
            "translating pipeline to MongoDB"
        );
        let mut query = self.compile(pipeline, &ReferenceStack::new())?;
        if let Some(offset) = self.offset {
            query = query.stage(json!({ "$skip": offset }));
        }
        if let Some(limit) = self.limit {
            query = query.stage(json!({ "$limit": limit }));
        }
        Ok(query)
    }

    pub(crate) fn compile(
        &self,
        pipeline: &Pipeline,
        references: &ReferenceStack,
    ) -> Result<MongoQuery, PipelineTranslationFailure> {
        pipeline.check_shape()?;
        let ctx = MongoContext {
            translator: self,
            references: references.clone(),
        };

        let mut query = MongoQuery::default();
        for (index, step) in pipeline.steps.iter().enumerate() {
            let kind = step.kind();
            debug!(
                step_index = index + 1,
                step = %kind,
                depth = references.depth(),
                stages = query.stages.len(),
                "translating step"
            );
            query = self
                .translate_step(&ctx, query, step)
                .map_err(|cause| PipelineTranslationFailure::new(index + 1, kind, cause))?;
        }
        Ok(query)
    }

    fn translate_step(&self, ctx: &MongoContext<'_>, query: MongoQuery, step: &Step) -> Result<MongoQuery, StepError> {
        let kind = step.kind();
        let translator = self
            .registry
            .lookup(kind, self.target_version.as_ref())
            .map_err(|err| match err {
                RegistryError::NotRegistered { .. } => StepError::NotImplementedForDialect {
                    step: kind.to_string(),
                    dialect: "mongo".to_string(),
                },
                other => other.into(),
            })?;
        translator(ctx, query, step)
    }
}
