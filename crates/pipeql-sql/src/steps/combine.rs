use pipeql_ir::{AppendStep, JoinStep, JoinType, LogicalType, StepError, StepKind, TableMetadata};

use crate::{Query, SqlContext};

/// Join against a sub-pipeline compiled as a subquery; left columns win on
/// name collisions.
pub fn join(ctx: &SqlContext<'_>, query: Query, step: &JoinStep) -> Result<Query, StepError> {
    if step.on.is_empty() {
        return Err(StepError::InvalidStep("join needs at least one key pair".to_string()));
    }
    let right = ctx.compile_reference(&step.right_pipeline)?;
    for (left_key, right_key) in &step.on {
        query.schema.require(left_key)?;
        right.schema.require(right_key)?;
    }

    let prev = query.current_alias.clone();
    let condition = step
        .on
        .iter()
        .map(|(l, r)| format!("lhs.{} = rhs.{}", ctx.ident(l), ctx.ident(r)))
        .collect::<Vec<_>>()
        .join(" AND ");

    let mut schema = query.schema.clone();
    let mut select: Vec<String> = query
        .schema
        .live_columns()
        .map(|c| format!("lhs.{}", ctx.ident(&c.name)))
        .collect();

    let sql = match step.join_type {
        JoinType::Left | JoinType::Inner => {
            for column in right.schema.live_columns() {
                if !query.schema.contains(&column.name) {
                    select.push(format!("rhs.{}", ctx.ident(&column.name)));
                    schema.add_column(&column.name, column.logical_type);
                }
            }
            let keyword = if step.join_type == JoinType::Inner {
                "INNER JOIN"
            } else {
                "LEFT JOIN"
            };
            format!(
                "SELECT {} FROM {} AS lhs {} ({}) AS rhs ON {}",
                select.join(", "),
                prev,
                keyword,
                right.subquery_text(),
                condition
            )
        }
        // anti join: unmatched left rows only
        JoinType::LeftOuter => format!(
            "SELECT {} FROM {} AS lhs LEFT JOIN ({}) AS rhs ON {} WHERE rhs.{} IS NULL",
            select.join(", "),
            prev,
            right.subquery_text(),
            condition,
            ctx.ident(&step.on[0].1)
        ),
    };
    Ok(query.push(ctx.dialect(), StepKind::Join, sql, schema))
}

/// Union of the current rows with every sub-pipeline; columns are aligned by
/// name and missing ones filled with typed nulls.
pub fn append(ctx: &SqlContext<'_>, query: Query, step: &AppendStep) -> Result<Query, StepError> {
    let others = step
        .pipelines
        .iter()
        .map(|reference| ctx.compile_reference(reference))
        .collect::<Result<Vec<_>, _>>()?;

    let mut columns: Vec<(String, LogicalType)> = query
        .schema
        .live_columns()
        .map(|c| (c.name.clone(), c.logical_type))
        .collect();
    for other in &others {
        for column in other.schema.live_columns() {
            match columns.iter_mut().find(|(name, _)| *name == column.name) {
                Some((_, logical_type)) => {
                    if *logical_type == LogicalType::Undefined {
                        *logical_type = column.logical_type;
                    }
                }
                None => columns.push((column.name.clone(), column.logical_type)),
            }
        }
    }

    let branch = |schema: &TableMetadata, source: String| -> String {
        let items: Vec<String> = columns
            .iter()
            .map(|(name, logical_type)| match schema.get(name) {
                Some(column) if column.logical_type == *logical_type || *logical_type == LogicalType::Undefined => {
                    ctx.ident(name)
                }
                Some(_) => format!(
                    "{} AS {}",
                    ctx.dialect().cast(&ctx.ident(name), *logical_type),
                    ctx.ident(name)
                ),
                None => format!(
                    "{} AS {}",
                    ctx.dialect().typed_null(*logical_type),
                    ctx.ident(name)
                ),
            })
            .collect();
        format!("SELECT {} FROM {}", items.join(", "), source)
    };

    let mut branches = vec![branch(&query.schema, query.current_alias.clone())];
    for (i, other) in others.iter().enumerate() {
        branches.push(branch(
            &other.schema,
            format!("({}) AS appended_{}", other.subquery_text(), i + 1),
        ));
    }

    let mut schema = query.schema.clone();
    schema.reshape(columns.clone());
    Ok(query.push(ctx.dialect(), StepKind::Append, branches.join(" UNION ALL "), schema))
}
