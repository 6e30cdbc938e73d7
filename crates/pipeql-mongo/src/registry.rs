//! MongoDB step registry

use pipeql_ir::{Step, StepError, StepKind, Version};

use crate::steps::{aggregate, columns, combine, compute, dates, reshape, source, strings, window};
use crate::{MongoContext, MongoQuery, MongoRegistry, MongoStepFn};

/// Release introducing `$dateAdd`, `$dateDiff` and `$dateTrunc`
pub const DATE_OPERATORS_VERSION: Version = Version::new(5, 0);

/// Steps with no MongoDB translation at all
pub const EXCLUDED_STEPS: [StepKind; 1] = [StepKind::CustomSql];

macro_rules! step_fn {
    ($name:ident, $variant:ident, $handler:path) => {
        fn $name(ctx: &MongoContext<'_>, query: MongoQuery, step: &Step) -> Result<MongoQuery, StepError> {
            match step {
                Step::$variant(inner) => $handler(ctx, query, inner),
                other => Err(StepError::InvalidStep(format!(
                    "expected a {} step, got {}",
                    StepKind::$variant,
                    other.kind()
                ))),
            }
        }
    };
}

step_fn!(mongo_domain, Domain, source::domain);
step_fn!(mongo_custom, Custom, source::custom);
step_fn!(mongo_select, Select, columns::select);
step_fn!(mongo_delete, Delete, columns::delete);
step_fn!(mongo_rename, Rename, columns::rename);
step_fn!(mongo_duplicate, Duplicate, columns::duplicate);
step_fn!(mongo_text, Text, columns::text);
step_fn!(mongo_convert, Convert, columns::convert);
step_fn!(mongo_todate, ToDate, columns::todate);
step_fn!(mongo_fromdate, FromDate, columns::fromdate);
step_fn!(mongo_sort, Sort, columns::sort);
step_fn!(mongo_filter, Filter, compute::filter);
step_fn!(mongo_formula, Formula, compute::formula);
step_fn!(mongo_absolutevalue, AbsoluteValue, compute::absolutevalue);
step_fn!(mongo_ifthenelse, IfThenElse, compute::ifthenelse);
step_fn!(mongo_fillna, FillNa, compute::fillna);
step_fn!(mongo_replace, Replace, compute::replace);
step_fn!(mongo_lowercase, Lowercase, strings::lowercase);
step_fn!(mongo_uppercase, Uppercase, strings::uppercase);
step_fn!(mongo_trim, Trim, strings::trim);
step_fn!(mongo_concatenate, Concatenate, strings::concatenate);
step_fn!(mongo_comparetext, CompareText, strings::comparetext);
step_fn!(mongo_replacetext, ReplaceText, strings::replacetext);
step_fn!(mongo_substring, Substring, strings::substring);
step_fn!(mongo_split, Split, strings::split);
step_fn!(mongo_aggregate, Aggregate, aggregate::aggregate);
step_fn!(mongo_uniquegroups, UniqueGroups, aggregate::uniquegroups);
step_fn!(mongo_statistics, Statistics, aggregate::statistics);
step_fn!(mongo_rollup, Rollup, aggregate::rollup);
step_fn!(mongo_totals, Totals, aggregate::totals);
step_fn!(mongo_pivot, Pivot, reshape::pivot);
step_fn!(mongo_unpivot, Unpivot, reshape::unpivot);
step_fn!(mongo_rank, Rank, window::rank);
step_fn!(mongo_top, Top, window::top);
step_fn!(mongo_argmax, Argmax, window::argmax);
step_fn!(mongo_argmin, Argmin, window::argmin);
step_fn!(mongo_cumsum, Cumsum, window::cumsum);
step_fn!(mongo_movingaverage, MovingAverage, window::movingaverage);
step_fn!(mongo_percentage, Percentage, window::percentage);
step_fn!(mongo_dateextract, DateExtract, dates::dateextract);
step_fn!(mongo_duration, Duration, dates::duration);
step_fn!(mongo_evolution, Evolution, dates::evolution);
step_fn!(mongo_addmissingdates, AddMissingDates, dates::addmissingdates);
step_fn!(mongo_join, Join, combine::join);
step_fn!(mongo_append, Append, combine::append);

pub fn mongo_registry() -> MongoRegistry {
    let date_operators = Some(DATE_OPERATORS_VERSION);
    let entries: [(StepKind, MongoStepFn, Option<Version>); 45] = [
        (StepKind::Domain, mongo_domain, None),
        (StepKind::Custom, mongo_custom, None),
        (StepKind::Select, mongo_select, None),
        (StepKind::Delete, mongo_delete, None),
        (StepKind::Rename, mongo_rename, None),
        (StepKind::Duplicate, mongo_duplicate, None),
        (StepKind::Text, mongo_text, None),
        (StepKind::Convert, mongo_convert, None),
        (StepKind::ToDate, mongo_todate, None),
        (StepKind::FromDate, mongo_fromdate, None),
        (StepKind::Sort, mongo_sort, None),
        (StepKind::Filter, mongo_filter, None),
        (StepKind::Formula, mongo_formula, None),
        (StepKind::AbsoluteValue, mongo_absolutevalue, None),
        (StepKind::IfThenElse, mongo_ifthenelse, None),
        (StepKind::FillNa, mongo_fillna, None),
        (StepKind::Replace, mongo_replace, None),
        (StepKind::Lowercase, mongo_lowercase, None),
        (StepKind::Uppercase, mongo_uppercase, None),
        (StepKind::Trim, mongo_trim, None),
        (StepKind::Concatenate, mongo_concatenate, None),
        (StepKind::CompareText, mongo_comparetext, None),
        (StepKind::ReplaceText, mongo_replacetext, None),
        (StepKind::Substring, mongo_substring, None),
        (StepKind::Split, mongo_split, None),
        (StepKind::Aggregate, mongo_aggregate, None),
        (StepKind::UniqueGroups, mongo_uniquegroups, None),
        (StepKind::Statistics, mongo_statistics, None),
        (StepKind::Rollup, mongo_rollup, None),
        (StepKind::Totals, mongo_totals, None),
        (StepKind::Pivot, mongo_pivot, None),
        (StepKind::Unpivot, mongo_unpivot, None),
        (StepKind::Rank, mongo_rank, None),
        (StepKind::Top, mongo_top, None),
        (StepKind::Argmax, mongo_argmax, None),
        (StepKind::Argmin, mongo_argmin, None),
        (StepKind::Cumsum, mongo_cumsum, None),
        (StepKind::MovingAverage, mongo_movingaverage, None),
        (StepKind::Percentage, mongo_percentage, None),
        (StepKind::DateExtract, mongo_dateextract, date_operators),
        (StepKind::Duration, mongo_duration, None),
        (StepKind::Evolution, mongo_evolution, date_operators),
        (StepKind::AddMissingDates, mongo_addmissingdates, date_operators),
        (StepKind::Join, mongo_join, None),
        (StepKind::Append, mongo_append, None),
    ];

    MongoRegistry::from_entries("mongo", entries)
}
