use pipeql_ir::{
    AddMissingDatesStep, DateExtractStep, DateInfo, DateUnit, DurationStep, EvolutionFormat, EvolutionStep, StepError,
};
use serde_json::{json, Map, Value as Document};

use super::{add_fields, group_key_fields, push_rows, set_field, unwind_rows, ROWS};
use crate::expr::{field, var_field};
use crate::{MongoContext, MongoQuery};

fn trunc(date: Document, unit: &str) -> Document {
    json!({ "$dateTrunc": { "date": date, "unit": unit } })
}

fn week_start(date: Document, first_day: &str) -> Document {
    json!({ "$dateTrunc": { "date": date, "unit": "week", "startOfWeek": first_day } })
}

fn shift(date: Document, unit: DateUnit, amount: i64) -> Document {
    json!({ "$dateAdd": { "startDate": date, "unit": unit.as_str(), "amount": amount } })
}

fn quarter(date: Document) -> Document {
    json!({ "$ceil": { "$divide": [{ "$month": date }, 3] } })
}

/// Weeks start on Sunday for `week` and on Monday for the ISO variants
pub fn date_info_expr(info: DateInfo, date: Document) -> Document {
    let previous = |unit: DateUnit| shift(date.clone(), unit, -1);
    match info {
        DateInfo::Year => json!({ "$year": date }),
        DateInfo::Month => json!({ "$month": date }),
        DateInfo::Day => json!({ "$dayOfMonth": date }),
        DateInfo::Week => json!({ "$week": date }),
        DateInfo::Quarter => quarter(date),
        DateInfo::DayOfWeek => json!({ "$dayOfWeek": date }),
        DateInfo::DayOfYear => json!({ "$dayOfYear": date }),
        DateInfo::IsoYear => json!({ "$isoWeekYear": date }),
        DateInfo::IsoWeek => json!({ "$isoWeek": date }),
        DateInfo::IsoDayOfWeek => json!({ "$isoDayOfWeek": date }),
        DateInfo::Hour => json!({ "$hour": date }),
        DateInfo::Minutes => json!({ "$minute": date }),
        DateInfo::Seconds => json!({ "$second": date }),
        DateInfo::Milliseconds => json!({ "$millisecond": date }),
        DateInfo::FirstDayOfYear => trunc(date, "year"),
        DateInfo::FirstDayOfMonth => trunc(date, "month"),
        DateInfo::FirstDayOfQuarter => trunc(date, "quarter"),
        DateInfo::FirstDayOfWeek => week_start(date, "sunday"),
        DateInfo::FirstDayOfIsoWeek => week_start(date, "monday"),
        DateInfo::PreviousDay => trunc(previous(DateUnit::Day), "day"),
        DateInfo::FirstDayOfPreviousYear => trunc(previous(DateUnit::Year), "year"),
        DateInfo::FirstDayOfPreviousMonth => trunc(previous(DateUnit::Month), "month"),
        DateInfo::FirstDayOfPreviousQuarter => trunc(previous(DateUnit::Quarter), "quarter"),
        DateInfo::FirstDayOfPreviousWeek => week_start(previous(DateUnit::Week), "sunday"),
        DateInfo::FirstDayOfPreviousIsoWeek => week_start(previous(DateUnit::Week), "monday"),
        DateInfo::PreviousYear => json!({ "$subtract": [{ "$year": date }, 1] }),
        DateInfo::PreviousMonth => json!({ "$month": previous(DateUnit::Month) }),
        DateInfo::PreviousQuarter => quarter(previous(DateUnit::Quarter)),
        DateInfo::PreviousWeek => json!({ "$week": previous(DateUnit::Week) }),
        DateInfo::PreviousIsoWeek => json!({ "$isoWeek": previous(DateUnit::Week) }),
    }
}

pub fn dateextract(_ctx: &MongoContext<'_>, query: MongoQuery, step: &DateExtractStep) -> Result<MongoQuery, StepError> {
    if step.date_info.len() != step.new_columns.len() {
        return Err(StepError::InvalidStep(format!(
            "dateextract has {} date parts but {} new column names",
            step.date_info.len(),
            step.new_columns.len()
        )));
    }
    let fields: Map<String, Document> = step
        .date_info
        .iter()
        .zip(&step.new_columns)
        .map(|(info, name)| (name.clone(), date_info_expr(*info, field(&step.column))))
        .collect();
    Ok(query.stage(add_fields(fields)))
}

/// Date subtraction yields milliseconds
pub fn duration(_ctx: &MongoContext<'_>, query: MongoQuery, step: &DurationStep) -> Result<MongoQuery, StepError> {
    let millis = u64::from(step.duration_in.seconds()) * 1000;
    let expr = json!({
        "$divide": [
            { "$subtract": [field(&step.end_date_column), field(&step.start_date_column)] },
            millis
        ]
    });
    Ok(query.stage(set_field(&step.new_column_name, expr)))
}

/// Each row looks up the row of its group dated one period earlier
pub fn evolution(_ctx: &MongoContext<'_>, query: MongoQuery, step: &EvolutionStep) -> Result<MongoQuery, StepError> {
    let date_col = &step.date_col;
    let value_col = &step.value_col;
    let output = step.output_column();
    // the lookup reads these columns from every row of the group
    if output == *date_col || output == *value_col || step.index_columns.contains(&output) {
        return Err(StepError::DuplicateColumn(output));
    }
    let earlier = shift(var_field("row", date_col), step.evolution_type.unit(), -1);
    let matches = json!({
        "$filter": {
            "input": format!("${}", ROWS),
            "as": "candidate",
            "cond": { "$eq": [var_field("candidate", date_col), earlier] }
        }
    });
    let current = var_field("row", value_col);
    let previous = var_field("previous", value_col);
    let delta = json!({ "$subtract": [current, previous] });
    let evolution = match step.evolution_format {
        EvolutionFormat::Abs => delta,
        EvolutionFormat::Pct => json!({
            "$cond": [
                { "$in": [{ "$ifNull": [previous, null] }, [0, null]] },
                null,
                { "$divide": [delta, previous] }
            ]
        }),
    };
    let mut assigned = Map::new();
    assigned.insert(
        output,
        json!({
            "$let": {
                "vars": { "previous": { "$arrayElemAt": [matches, 0] } },
                "in": evolution
            }
        }),
    );
    let rows = json!({
        "$map": {
            "input": format!("${}", ROWS),
            "as": "row",
            "in": { "$mergeObjects": ["$$row", assigned] }
        }
    });

    let mut projection = Map::new();
    projection.insert(ROWS.to_string(), rows);
    Ok(query
        .stage(push_rows(&step.index_columns, Map::new()))
        .stage(json!({ "$project": projection }))
        .extend(unwind_rows()))
}

/// Every period between the group's first and last date gets at least one
/// row; missing periods get a row holding only the group columns and the date
pub fn addmissingdates(
    _ctx: &MongoContext<'_>,
    query: MongoQuery,
    step: &AddMissingDatesStep,
) -> Result<MongoQuery, StepError> {
    const MIN: &str = "__pql_min";
    const MAX: &str = "__pql_max";
    let unit = step.dates_granularity.unit().as_str();
    let dates = &step.dates_column;

    let mut accumulators = Map::new();
    accumulators.insert(MIN.to_string(), json!({ "$min": field(dates) }));
    accumulators.insert(MAX.to_string(), json!({ "$max": field(dates) }));

    let mut filler = group_key_fields(&step.groups);
    filler.insert(dates.clone(), json!("$$period"));
    let matched = json!({
        "$filter": {
            "input": format!("${}", ROWS),
            "as": "row",
            "cond": { "$eq": [trunc(var_field("row", dates), unit), "$$period"] }
        }
    });
    let per_period = json!({
        "$let": {
            "vars": {
                "period": { "$dateAdd": { "startDate": "$$start", "unit": unit, "amount": "$$i" } }
            },
            "in": {
                "$let": {
                    "vars": { "matched": matched },
                    "in": { "$cond": [{ "$gt": [{ "$size": "$$matched" }, 0] }, "$$matched", [filler]] }
                }
            }
        }
    });
    let periods = json!({
        "$range": [
            0,
            { "$add": [{ "$dateDiff": { "startDate": "$$start", "endDate": "$$end", "unit": unit } }, 1] }
        ]
    });
    let rows = json!({
        "$let": {
            "vars": {
                "start": trunc(field(MIN), unit),
                "end": trunc(field(MAX), unit)
            },
            "in": {
                "$reduce": {
                    "input": { "$map": { "input": periods, "as": "i", "in": per_period } },
                    "initialValue": [],
                    "in": { "$concatArrays": ["$$value", "$$this"] }
                }
            }
        }
    });

    let mut projection = Map::new();
    projection.insert(ROWS.to_string(), rows);
    Ok(query
        .stage(push_rows(&step.groups, accumulators))
        .stage(json!({ "$project": projection }))
        .extend(unwind_rows()))
}
