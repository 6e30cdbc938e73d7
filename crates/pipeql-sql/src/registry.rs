//! SQL step registries
//!
//! A base registry holds the translators shared by every dialect; each dialect
//! gets a child snapshot with capability-driven removals and overrides.

use pipeql_ir::{Step, StepError, StepKind};

use crate::steps::{aggregate, columns, combine, compute, dates, reshape, source, strings, window};
use crate::{Query, SqlContext, SqlDialect, SqlRegistry, SqlStepFn, Translation};

/// Steps built on window functions
pub const WINDOW_STEPS: [StepKind; 7] = [
    StepKind::Rank,
    StepKind::Top,
    StepKind::Argmax,
    StepKind::Argmin,
    StepKind::Cumsum,
    StepKind::MovingAverage,
    StepKind::Percentage,
];

/// Steps with no SQL translation at all
pub const EXCLUDED_STEPS: [StepKind; 1] = [StepKind::Custom];

/// Unwrap the step payload and hand it to a typed handler
macro_rules! step_fn {
    ($name:ident, $variant:ident, $handler:path) => {
        fn $name(ctx: &SqlContext<'_>, query: Query, step: &Step) -> Result<Translation, StepError> {
            match step {
                Step::$variant(inner) => $handler(ctx, query, inner).map(Translation::from),
                other => Err(StepError::InvalidStep(format!(
                    "expected a {} step, got {}",
                    StepKind::$variant,
                    other.kind()
                ))),
            }
        }
    };
}

step_fn!(sql_domain, Domain, source::domain);
step_fn!(sql_custom_sql, CustomSql, source::custom_sql);
step_fn!(sql_select, Select, columns::select);
step_fn!(sql_delete, Delete, columns::delete);
step_fn!(sql_rename, Rename, columns::rename);
step_fn!(sql_duplicate, Duplicate, columns::duplicate);
step_fn!(sql_text, Text, columns::text);
step_fn!(sql_convert, Convert, columns::convert);
step_fn!(sql_todate, ToDate, columns::todate);
step_fn!(sql_fromdate, FromDate, columns::fromdate);
step_fn!(sql_sort, Sort, columns::sort);
step_fn!(sql_filter, Filter, compute::filter);
step_fn!(sql_formula, Formula, compute::formula);
step_fn!(sql_absolutevalue, AbsoluteValue, compute::absolutevalue);
step_fn!(sql_ifthenelse, IfThenElse, compute::ifthenelse);
step_fn!(sql_fillna, FillNa, compute::fillna);
step_fn!(sql_replace, Replace, compute::replace);
step_fn!(sql_lowercase, Lowercase, strings::lowercase);
step_fn!(sql_uppercase, Uppercase, strings::uppercase);
step_fn!(sql_trim, Trim, strings::trim);
step_fn!(sql_concatenate, Concatenate, strings::concatenate);
step_fn!(sql_comparetext, CompareText, strings::comparetext);
step_fn!(sql_replacetext, ReplaceText, strings::replacetext);
step_fn!(sql_substring, Substring, strings::substring);
step_fn!(sql_split, Split, strings::split);
step_fn!(sql_split_array, Split, strings::split_array);
step_fn!(sql_aggregate, Aggregate, aggregate::aggregate);
step_fn!(sql_uniquegroups, UniqueGroups, aggregate::uniquegroups);
step_fn!(sql_statistics, Statistics, aggregate::statistics);
step_fn!(sql_rollup, Rollup, aggregate::rollup);
step_fn!(sql_totals, Totals, aggregate::totals);
step_fn!(sql_pivot, Pivot, reshape::pivot);
step_fn!(sql_unpivot, Unpivot, reshape::unpivot);
step_fn!(sql_rank, Rank, window::rank);
step_fn!(sql_top, Top, window::top);
step_fn!(sql_argmax, Argmax, window::argmax);
step_fn!(sql_argmin, Argmin, window::argmin);
step_fn!(sql_cumsum, Cumsum, window::cumsum);
step_fn!(sql_movingaverage, MovingAverage, window::movingaverage);
step_fn!(sql_percentage, Percentage, window::percentage);
step_fn!(sql_dateextract, DateExtract, dates::dateextract);
step_fn!(sql_duration, Duration, dates::duration);
step_fn!(sql_evolution, Evolution, dates::evolution);
step_fn!(sql_addmissingdates, AddMissingDates, dates::addmissingdates);
step_fn!(sql_join, Join, combine::join);
step_fn!(sql_append, Append, combine::append);

/// Translators shared by every dialect
pub fn base_registry() -> SqlRegistry {
    let entries: [(StepKind, SqlStepFn); 44] = [
        (StepKind::Domain, sql_domain),
        (StepKind::CustomSql, sql_custom_sql),
        (StepKind::Select, sql_select),
        (StepKind::Delete, sql_delete),
        (StepKind::Rename, sql_rename),
        (StepKind::Duplicate, sql_duplicate),
        (StepKind::Text, sql_text),
        (StepKind::Convert, sql_convert),
        (StepKind::ToDate, sql_todate),
        (StepKind::FromDate, sql_fromdate),
        (StepKind::Sort, sql_sort),
        (StepKind::Filter, sql_filter),
        (StepKind::Formula, sql_formula),
        (StepKind::AbsoluteValue, sql_absolutevalue),
        (StepKind::IfThenElse, sql_ifthenelse),
        (StepKind::FillNa, sql_fillna),
        (StepKind::Replace, sql_replace),
        (StepKind::Lowercase, sql_lowercase),
        (StepKind::Uppercase, sql_uppercase),
        (StepKind::Trim, sql_trim),
        (StepKind::Concatenate, sql_concatenate),
        (StepKind::CompareText, sql_comparetext),
        (StepKind::ReplaceText, sql_replacetext),
        (StepKind::Substring, sql_substring),
        (StepKind::Split, sql_split),
        (StepKind::Aggregate, sql_aggregate),
        (StepKind::UniqueGroups, sql_uniquegroups),
        (StepKind::Statistics, sql_statistics),
        (StepKind::Rollup, sql_rollup),
        (StepKind::Totals, sql_totals),
        (StepKind::Pivot, sql_pivot),
        (StepKind::Unpivot, sql_unpivot),
        (StepKind::Rank, sql_rank),
        (StepKind::Top, sql_top),
        (StepKind::Argmax, sql_argmax),
        (StepKind::Argmin, sql_argmin),
        (StepKind::Cumsum, sql_cumsum),
        (StepKind::MovingAverage, sql_movingaverage),
        (StepKind::Percentage, sql_percentage),
        (StepKind::DateExtract, sql_dateextract),
        (StepKind::Duration, sql_duration),
        (StepKind::Evolution, sql_evolution),
        (StepKind::Join, sql_join),
        (StepKind::Append, sql_append),
    ];

    SqlRegistry::from_entries("sql", entries.map(|(kind, translator)| (kind, translator, None)))
}

/// Child registry for one dialect
pub fn registry_for(dialect: SqlDialect) -> SqlRegistry {
    let mut registry = base_registry().child(dialect.name());
    let capabilities = dialect.capabilities();

    if !capabilities.window_functions {
        for kind in WINDOW_STEPS {
            registry.unregister(kind);
        }
    }
    if !capabilities.split_part {
        registry.unregister(StepKind::Split);
    }

    match dialect {
        SqlDialect::BigQuery => {
            registry.override_step(StepKind::Split, sql_split_array);
        }
        SqlDialect::Postgres | SqlDialect::DuckDB => {
            registry.override_step(StepKind::AddMissingDates, sql_addmissingdates);
        }
        _ => {}
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_registry_covers_all_but_dialect_specific_steps() {
        let registry = base_registry();
        for kind in StepKind::ALL {
            let expected = !EXCLUDED_STEPS.contains(&kind) && kind != StepKind::AddMissingDates;
            assert_eq!(registry.is_supported(kind), expected, "{}", kind);
        }
    }

    #[test]
    fn test_child_namespaces() {
        assert_eq!(registry_for(SqlDialect::Snowflake).namespace(), "sql.snowflake");
        assert_eq!(registry_for(SqlDialect::MySql).namespace(), "sql.mysql");
    }

    #[test]
    fn test_capability_driven_removals() {
        let mysql = registry_for(SqlDialect::MySql);
        for kind in WINDOW_STEPS {
            assert!(!mysql.is_supported(kind), "{}", kind);
        }
        assert!(!mysql.is_supported(StepKind::Split));
        assert!(mysql.is_supported(StepKind::Aggregate));

        let bigquery = registry_for(SqlDialect::BigQuery);
        assert!(bigquery.is_supported(StepKind::Split));
        assert!(bigquery.is_supported(StepKind::Rank));
    }

    #[test]
    fn test_addmissingdates_only_where_series_exist() {
        for dialect in SqlDialect::ALL {
            let expected = matches!(dialect, SqlDialect::Postgres | SqlDialect::DuckDB);
            assert_eq!(
                registry_for(dialect).is_supported(StepKind::AddMissingDates),
                expected,
                "{}",
                dialect
            );
        }
    }
}
