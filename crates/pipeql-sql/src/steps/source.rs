use pipeql_ir::{
    CustomSqlStep, DomainStep, LogicalType, Step, StepError, StepKind, TableMetadata,
};
use tracing::debug;

use crate::{select_list, ProbeKind, ProbeRequest, ProbeResult, Query, SqlContext, Translation};

/// Placeholder a custom query uses to read the previous step
pub const PREVIOUS_STEP: &str = "##PREVIOUS_STEP##";

/// First CTE: a table, or a saved pipeline inlined as a subquery
pub fn domain(ctx: &SqlContext<'_>, query: Query, step: &DomainStep) -> Result<Query, StepError> {
    if let Some(saved) = ctx.provider().get_saved_pipeline(&step.domain) {
        debug!(domain = %step.domain, "inlining saved pipeline");
        let inner = ctx.compile_saved(&step.domain, &saved)?;
        let sql = format!(
            "SELECT * FROM ({}) AS {}",
            inner.subquery_text(),
            ctx.ident(&step.domain)
        );
        let mut schema = inner.schema;
        schema.table_name = step.domain.clone();
        return Ok(query.push(ctx.dialect(), StepKind::Domain, sql, schema));
    }

    let table = ctx
        .provider()
        .get_table_schema(&step.domain)
        .map_err(|_| StepError::UnknownReference(step.domain.clone()))?;
    let sql = format!("SELECT * FROM {}", ctx.ident(&table.name));
    Ok(query.push(
        ctx.dialect(),
        StepKind::Domain,
        sql,
        TableMetadata::from_schema(&table),
    ))
}

/// User SQL reading the previous CTE; its output columns come from a describe probe
pub fn custom_sql(ctx: &SqlContext<'_>, query: Query, step: &CustomSqlStep) -> Result<Translation, StepError> {
    if !step.query.contains(PREVIOUS_STEP) {
        return Err(StepError::MissingIdentifier(PREVIOUS_STEP.to_string()));
    }
    let sql = step
        .query
        .trim()
        .trim_end_matches(';')
        .replace(PREVIOUS_STEP, &query.current_alias);
    let schema = query.schema.clone();
    let query = query.push(ctx.dialect(), StepKind::CustomSql, sql, schema);

    Ok(Translation::NeedsProbe(ProbeRequest {
        sql: query.with_tail(&format!("SELECT * FROM {}", query.current_alias)),
        kind: ProbeKind::Describe,
        query,
        resume: resume_custom_sql,
    }))
}

fn resume_custom_sql(ctx: &SqlContext<'_>, mut query: Query, _step: &Step, result: ProbeResult) -> Result<Translation, StepError> {
    let ProbeResult::Columns(columns) = result else {
        return Err(StepError::Probe("expected column descriptions".to_string()));
    };
    if columns.is_empty() {
        return Err(StepError::Probe("custom query returned no columns".to_string()));
    }
    query.schema.reshape(
        columns
            .iter()
            .map(|c| (c.name.clone(), LogicalType::from_native(&c.data_type)))
            .collect(),
    );
    query.projection = select_list(ctx.dialect(), &query.schema);
    Ok(Translation::Done(query))
}
