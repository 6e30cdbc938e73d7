//! Pipeline to SQL translation driver

use pipeql_ir::{
    ColumnInfo, Pipeline, PipelineRef, PipelineTranslationFailure, ReferenceStack, SchemaProvider, Step,
    StepError, Value,
};
use pipeql_registry::{RegistryError, StepRegistry};
use std::fmt;
use tracing::{debug, info};

use crate::{registry, Query, SqlDialect, SqlQuery};

pub type SqlStepFn = fn(&SqlContext<'_>, Query, &Step) -> Result<Translation, StepError>;
pub type ResumeFn = fn(&SqlContext<'_>, Query, &Step, ProbeResult) -> Result<Translation, StepError>;
pub type SqlRegistry = StepRegistry<SqlStepFn>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    /// One column of distinct values
    DistinctValues,
    /// Output columns of a statement
    Describe,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProbeResult {
    Values(Vec<Value>),
    Columns(Vec<ColumnInfo>),
}

/// A step that cannot finish without looking at the data
#[derive(Clone)]
pub struct ProbeRequest {
    pub sql: String,
    pub kind: ProbeKind,
    /// Accumulator handed back to `resume`
    pub query: Query,
    pub resume: ResumeFn,
}

impl fmt::Debug for ProbeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeRequest")
            .field("sql", &self.sql)
            .field("kind", &self.kind)
            .field("query", &self.query)
            .finish_non_exhaustive()
    }
}

/// Outcome of a step translator
#[derive(Debug, Clone)]
pub enum Translation {
    Done(Query),
    NeedsProbe(ProbeRequest),
}

impl From<Query> for Translation {
    fn from(query: Query) -> Self {
        Translation::Done(query)
    }
}

/// Synchronous access to the live data source
pub trait DataProbe {
    fn distinct_values(&self, sql: &str) -> Result<Vec<Value>, String>;

    fn describe(&self, sql: &str) -> Result<Vec<ColumnInfo>, String>;
}

/// Probe used when no data source is attached; every request fails
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProbe;

impl DataProbe for NoProbe {
    fn distinct_values(&self, _sql: &str) -> Result<Vec<Value>, String> {
        Err("no data probe configured".to_string())
    }

    fn describe(&self, _sql: &str) -> Result<Vec<ColumnInfo>, String> {
        Err("no data probe configured".to_string())
    }
}

/// What a step translator sees of the running translation
pub struct SqlContext<'t> {
    translator: &'t SqlTranslator<'t>,
    references: ReferenceStack,
}

impl<'t> SqlContext<'t> {
    pub fn dialect(&self) -> SqlDialect {
        self.translator.dialect
    }

    /// Quote an identifier for the current dialect
    pub fn ident(&self, name: &str) -> String {
        self.translator.dialect.quote_identifier(name)
    }

    pub fn provider(&self) -> &dyn SchemaProvider {
        self.translator.provider
    }

    /// Compile a join/append sub-pipeline through the same driver
    pub fn compile_reference(&self, reference: &PipelineRef) -> Result<Query, StepError> {
        let stack = self.references.descend(None)?;
        self.translator
            .compile(&reference.to_pipeline(), &stack)
            .map_err(|failure| StepError::SubPipeline(Box::new(failure)))
    }

    /// Compile a saved pipeline used as a domain
    pub fn compile_saved(&self, name: &str, pipeline: &Pipeline) -> Result<Query, StepError> {
        let stack = self.references.descend(Some(name))?;
        self.translator
            .compile(pipeline, &stack)
            .map_err(|failure| StepError::SubPipeline(Box::new(failure)))
    }
}

/// Translates pipelines into a single `WITH` statement for one dialect
pub struct SqlTranslator<'a> {
    dialect: SqlDialect,
    registry: SqlRegistry,
    provider: &'a dyn SchemaProvider,
    probe: &'a dyn DataProbe,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl<'a> SqlTranslator<'a> {
    pub fn new(dialect: SqlDialect, provider: &'a dyn SchemaProvider) -> Self {
        Self {
            dialect,
            registry: registry::registry_for(dialect),
            provider,
            probe: &NoProbe,
            limit: None,
            offset: None,
        }
    }

    pub fn with_probe(mut self, probe: &'a dyn DataProbe) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_pagination(mut self, limit: Option<u64>, offset: Option<u64>) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    pub fn registry(&self) -> &SqlRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut SqlRegistry {
        &mut self.registry
    }

    /// Translate a full pipeline into a final statement
    pub fn translate_pipeline(&self, pipeline: &Pipeline) -> Result<SqlQuery, PipelineTranslationFailure> {
        info!(
            dialect = %self.dialect,
            steps = pipeline.steps.len(),
            "translating pipeline to SQL"
        );
        let query = self.compile(pipeline, &ReferenceStack::new())?;
        Ok(SqlQuery {
            statement: query.statement_text(self.dialect, self.limit, self.offset),
            schema: query.schema,
        })
    }

    /// Run every step, stopping at the first failure
    pub(crate) fn compile(&self, pipeline: &Pipeline, references: &ReferenceStack) -> Result<Query, PipelineTranslationFailure> {
        pipeline.check_shape()?;
        let ctx = SqlContext {
            translator: self,
            references: references.clone(),
        };

        let mut query = Query::default();
        for (index, step) in pipeline.steps.iter().enumerate() {
            let kind = step.kind();
            debug!(
                step_index = index + 1,
                step = %kind,
                dialect = %self.dialect,
                depth = references.depth(),
                "translating step"
            );
            query = self
                .translate_step(&ctx, query, step)
                .map_err(|cause| PipelineTranslationFailure::new(index + 1, kind, cause))?;
        }
        Ok(query)
    }

    fn translate_step(&self, ctx: &SqlContext<'_>, query: Query, step: &Step) -> Result<Query, StepError> {
        let kind = step.kind();
        let translator = self.registry.lookup(kind, None).map_err(|err| match err {
            RegistryError::NotRegistered { .. } => StepError::NotImplementedForDialect {
                step: kind.to_string(),
                dialect: self.dialect.to_string(),
            },
            other => other.into(),
        })?;

        let mut outcome = translator(ctx, query, step)?;
        loop {
            match outcome {
                Translation::Done(query) => return Ok(query),
                Translation::NeedsProbe(request) => {
                    debug!(step = %kind, sql = %request.sql, "probing data source");
                    let result = match request.kind {
                        ProbeKind::DistinctValues => self
                            .probe
                            .distinct_values(&request.sql)
                            .map(ProbeResult::Values),
                        ProbeKind::Describe => self.probe.describe(&request.sql).map(ProbeResult::Columns),
                    }
                    .map_err(StepError::Probe)?;
                    outcome = (request.resume)(ctx, request.query, step, result)?;
                }
            }
        }
    }
}
