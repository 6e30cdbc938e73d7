use pipeql_ir::{
    AddMissingDatesStep, DateExtractStep, DateInfo, DateUnit, DurationStep, EvolutionFormat, EvolutionStep,
    LogicalType, StepError, StepKind,
};

use super::{group_by, null_safe_eq, with_columns, Assignment};
use crate::{Query, SqlContext, SqlDialect};

fn extract(dialect: SqlDialect, part: &str, expr: &str) -> String {
    dialect.cast(&format!("EXTRACT({} FROM {})", part, expr), LogicalType::Integer)
}

/// Week of year with weeks starting on Sunday; days before the first Sunday are week 0
fn sunday_week(dialect: SqlDialect, expr: &str) -> String {
    dialect.cast(
        &format!(
            "FLOOR(({} + 6 - {}) / 7)",
            dialect.day_of_year(expr),
            dialect.day_of_week(expr)
        ),
        LogicalType::Integer,
    )
}

fn first_day_of_week(dialect: SqlDialect, expr: &str) -> String {
    dialect.add_interval(
        &dialect.date_trunc(DateUnit::Day, expr),
        &format!("-({})", dialect.day_of_week(expr)),
        DateUnit::Day,
    )
}

/// SQL expression for one date part
pub fn date_info_expr(dialect: SqlDialect, info: DateInfo, expr: &str) -> String {
    let shifted = |quantity: &str, unit: DateUnit| dialect.add_interval(expr, quantity, unit);
    let integer = |e: String| dialect.cast(&e, LogicalType::Integer);
    match info {
        DateInfo::Year => extract(dialect, "YEAR", expr),
        DateInfo::Month => extract(dialect, "MONTH", expr),
        DateInfo::Day => extract(dialect, "DAY", expr),
        DateInfo::Quarter => extract(dialect, "QUARTER", expr),
        DateInfo::Hour => extract(dialect, "HOUR", expr),
        DateInfo::Minutes => extract(dialect, "MINUTE", expr),
        DateInfo::Seconds => integer(format!("FLOOR(EXTRACT(SECOND FROM {}))", expr)),
        DateInfo::Milliseconds => integer(dialect.milliseconds(expr)),
        DateInfo::Week => sunday_week(dialect, expr),
        DateInfo::DayOfWeek => integer(format!("{} + 1", dialect.day_of_week(expr))),
        DateInfo::DayOfYear => integer(dialect.day_of_year(expr)),
        DateInfo::IsoYear => integer(dialect.iso_year(expr)),
        DateInfo::IsoWeek => integer(dialect.iso_week(expr)),
        DateInfo::IsoDayOfWeek => integer(format!("MOD({} + 6, 7) + 1", dialect.day_of_week(expr))),
        DateInfo::FirstDayOfYear => dialect.date_trunc(DateUnit::Year, expr),
        DateInfo::FirstDayOfMonth => dialect.date_trunc(DateUnit::Month, expr),
        DateInfo::FirstDayOfQuarter => dialect.date_trunc(DateUnit::Quarter, expr),
        DateInfo::FirstDayOfIsoWeek => dialect.date_trunc(DateUnit::Week, expr),
        DateInfo::FirstDayOfWeek => first_day_of_week(dialect, expr),
        DateInfo::PreviousDay => dialect.add_interval(&dialect.date_trunc(DateUnit::Day, expr), "-1", DateUnit::Day),
        DateInfo::FirstDayOfPreviousYear => {
            dialect.add_interval(&dialect.date_trunc(DateUnit::Year, expr), "-1", DateUnit::Year)
        }
        DateInfo::FirstDayOfPreviousMonth => {
            dialect.add_interval(&dialect.date_trunc(DateUnit::Month, expr), "-1", DateUnit::Month)
        }
        DateInfo::FirstDayOfPreviousQuarter => {
            dialect.add_interval(&dialect.date_trunc(DateUnit::Quarter, expr), "-1", DateUnit::Quarter)
        }
        DateInfo::FirstDayOfPreviousWeek => {
            dialect.add_interval(&first_day_of_week(dialect, expr), "-1", DateUnit::Week)
        }
        DateInfo::FirstDayOfPreviousIsoWeek => {
            dialect.add_interval(&dialect.date_trunc(DateUnit::Week, expr), "-1", DateUnit::Week)
        }
        DateInfo::PreviousYear => integer(format!("EXTRACT(YEAR FROM {}) - 1", expr)),
        DateInfo::PreviousMonth => extract(dialect, "MONTH", &shifted("-1", DateUnit::Month)),
        DateInfo::PreviousQuarter => extract(dialect, "QUARTER", &shifted("-1", DateUnit::Quarter)),
        DateInfo::PreviousWeek => sunday_week(dialect, &shifted("-1", DateUnit::Week)),
        DateInfo::PreviousIsoWeek => integer(dialect.iso_week(&shifted("-1", DateUnit::Week))),
    }
}

pub fn dateextract(ctx: &SqlContext<'_>, query: Query, step: &DateExtractStep) -> Result<Query, StepError> {
    query.schema.require(&step.column)?;
    if step.date_info.len() != step.new_columns.len() {
        return Err(StepError::InvalidStep(format!(
            "dateextract has {} date parts but {} new column names",
            step.date_info.len(),
            step.new_columns.len()
        )));
    }
    let column = ctx.ident(&step.column);
    let assignments = step
        .date_info
        .iter()
        .zip(&step.new_columns)
        .map(|(info, name)| Assignment::new(name, date_info_expr(ctx.dialect(), *info, &column), info.output_type()))
        .collect();
    Ok(with_columns(ctx, query, StepKind::DateExtract, assignments))
}

pub fn duration(ctx: &SqlContext<'_>, query: Query, step: &DurationStep) -> Result<Query, StepError> {
    query
        .schema
        .require_all([step.start_date_column.as_str(), step.end_date_column.as_str()])?;
    let dialect = ctx.dialect();
    let seconds = dialect.seconds_between(
        &ctx.ident(&step.start_date_column),
        &ctx.ident(&step.end_date_column),
    );
    let expr = format!(
        "({} / {})",
        dialect.cast(&format!("({})", seconds), LogicalType::Float),
        step.duration_in.seconds()
    );
    let assignment = Assignment::new(&step.new_column_name, expr, LogicalType::Float);
    Ok(with_columns(ctx, query, StepKind::Duration, vec![assignment]))
}

/// Period-over-period delta through a self join on the shifted date
pub fn evolution(ctx: &SqlContext<'_>, query: Query, step: &EvolutionStep) -> Result<Query, StepError> {
    query
        .schema
        .require_all([step.date_col.as_str(), step.value_col.as_str()])?;
    query
        .schema
        .require_all(step.index_columns.iter().map(String::as_str))?;
    let output = step.output_column();
    if query.schema.contains(&output) {
        return Err(StepError::DuplicateColumn(output));
    }

    let dialect = ctx.dialect();
    let prev = &query.current_alias;
    let value_type = query.schema.type_of(&step.value_col);
    let current_value = format!("cur.{}", ctx.ident(&step.value_col));
    let previous_value = format!("prv.{}", ctx.ident(&step.value_col));
    let (expr, logical_type) = match step.evolution_format {
        EvolutionFormat::Abs => (format!("{} - {}", current_value, previous_value), value_type),
        EvolutionFormat::Pct => (
            format!(
                "{} / NULLIF({}, 0)",
                dialect.cast(&format!("{} - {}", current_value, previous_value), LogicalType::Float),
                previous_value
            ),
            LogicalType::Float,
        ),
    };

    let mut keys = vec![format!(
        "prv.{} = {}",
        ctx.ident(&step.date_col),
        dialect.add_interval(
            &format!("cur.{}", ctx.ident(&step.date_col)),
            "-1",
            step.evolution_type.unit()
        )
    )];
    keys.extend(step.index_columns.iter().map(|c| {
        null_safe_eq(
            &format!("prv.{}", ctx.ident(c)),
            &format!("cur.{}", ctx.ident(c)),
        )
    }));

    let mut select: Vec<String> = query
        .schema
        .live_columns()
        .map(|c| format!("cur.{}", ctx.ident(&c.name)))
        .collect();
    select.push(format!("{} AS {}", expr, ctx.ident(&output)));
    let sql = format!(
        "SELECT {} FROM {} AS cur LEFT JOIN {} AS prv ON {}",
        select.join(", "),
        prev,
        prev,
        keys.join(" AND ")
    );

    let mut schema = query.schema.clone();
    schema.add_column(&output, logical_type);
    Ok(query.push(dialect, StepKind::Evolution, sql, schema))
}

/// Fill date gaps between each group's first and last date using a generated series
pub fn addmissingdates(ctx: &SqlContext<'_>, query: Query, step: &AddMissingDatesStep) -> Result<Query, StepError> {
    query.schema.require(&step.dates_column)?;
    query.schema.require_all(step.groups.iter().map(String::as_str))?;
    let dialect = ctx.dialect();
    let unit = step.dates_granularity.unit();
    let prev = &query.current_alias;
    let date = ctx.ident(&step.dates_column);
    let truncated = |qualifier: &str| dialect.date_trunc(unit, &format!("{}{}", qualifier, date));

    let mut bounds: Vec<String> = step.groups.iter().map(|g| ctx.ident(g)).collect();
    bounds.push(format!(
        "{} AS __pql_min",
        dialect.cast(&format!("MIN({})", truncated("")), LogicalType::Date)
    ));
    bounds.push(format!(
        "{} AS __pql_max",
        dialect.cast(&format!("MAX({})", truncated("")), LogicalType::Date)
    ));
    let bounds_sql = format!(
        "SELECT {} FROM {}{}",
        bounds.join(", "),
        prev,
        group_by(ctx, &step.groups)
    );

    let mut series: Vec<String> = step.groups.iter().map(|g| ctx.ident(g)).collect();
    series.push(format!(
        "{} AS __pql_date",
        dialect.date_series("__pql_min", "__pql_max", unit)
    ));

    let mut join_keys = vec![format!("{} = bounds.__pql_date", truncated("src."))];
    join_keys.extend(step.groups.iter().map(|g| {
        null_safe_eq(
            &format!("src.{}", ctx.ident(g)),
            &format!("bounds.{}", ctx.ident(g)),
        )
    }));

    let select: Vec<String> = query
        .schema
        .live_columns()
        .map(|c| {
            let column = ctx.ident(&c.name);
            if c.name == step.dates_column {
                format!("bounds.__pql_date AS {}", column)
            } else if step.groups.contains(&c.name) {
                format!("bounds.{}", column)
            } else {
                format!("src.{}", column)
            }
        })
        .collect();

    let sql = format!(
        "SELECT {} FROM (SELECT {} FROM ({}) AS limits) AS bounds LEFT JOIN {} AS src ON {}",
        select.join(", "),
        series.join(", "),
        bounds_sql,
        prev,
        join_keys.join(" AND ")
    );
    let mut schema = query.schema.clone();
    schema.set_type(&step.dates_column, LogicalType::Date)?;
    Ok(query.push(dialect, StepKind::AddMissingDates, sql, schema))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_parts_on_postgres() {
        let pg = SqlDialect::Postgres;
        assert_eq!(
            date_info_expr(pg, DateInfo::Year, "d"),
            "CAST(EXTRACT(YEAR FROM d) AS BIGINT)"
        );
        assert_eq!(
            date_info_expr(pg, DateInfo::IsoDayOfWeek, "d"),
            "CAST(MOD(EXTRACT(DOW FROM d) + 6, 7) + 1 AS BIGINT)"
        );
        assert_eq!(
            date_info_expr(pg, DateInfo::FirstDayOfPreviousMonth, "d"),
            "DATE_TRUNC('month', d) + (-1) * INTERVAL '1 month'"
        );
        assert_eq!(
            date_info_expr(pg, DateInfo::Week, "d"),
            "CAST(FLOOR((EXTRACT(DOY FROM d) + 6 - EXTRACT(DOW FROM d)) / 7) AS BIGINT)"
        );
    }

    #[test]
    fn test_date_parts_on_bigquery() {
        assert_eq!(
            date_info_expr(SqlDialect::BigQuery, DateInfo::FirstDayOfIsoWeek, "d"),
            "TIMESTAMP_TRUNC(d, ISOWEEK)"
        );
        assert_eq!(
            date_info_expr(SqlDialect::BigQuery, DateInfo::DayOfWeek, "d"),
            "CAST(EXTRACT(DAYOFWEEK FROM d) - 1 + 1 AS INT64)"
        );
    }
}
