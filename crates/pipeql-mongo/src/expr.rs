//! Formula and condition compilers for MongoDB
//!
//! Conditions compile either to a query document (for `$match`) or to an
//! aggregation expression (for `$cond`). Dates are emitted as extended JSON
//! (`{"$date": ...}`), which drivers turn into BSON dates.

use chrono::{Duration, NaiveDate};
use pipeql_ir::{
    Condition, DateAnchor, DateBoundOperator, DateBoundValue, Formula, FormulaOp, InclusionOperator, LogicalType,
    MatchOperator, NullOperator, RelativeDate, StepError, Value, Version,
};
use serde_json::{json, Value as Document};

use crate::registry::DATE_OPERATORS_VERSION;

/// Field path expression (`"$name"`)
pub fn field(name: &str) -> Document {
    Document::String(format!("${}", name))
}

/// Field of a `$$variable` bound by `$map`, `$filter` or `$let`
pub fn var_field(variable: &str, name: &str) -> Document {
    Document::String(format!("$${}.{}", variable, name))
}

/// Expression evaluating to `value`; strings are wrapped so a leading `$` is
/// never read as a field path
pub fn literal(value: &Value) -> Document {
    match value {
        Value::String(s) => json!({ "$literal": s }),
        other => other.to_json(),
    }
}

pub fn date_literal(date: NaiveDate) -> Document {
    json!({ "$date": format!("{}T00:00:00Z", date.format("%Y-%m-%d")) })
}

/// `{$cond}` yielding null when the divisor is zero or null
fn guarded(operator: &str, left: Document, right: Document) -> Document {
    json!({
        "$cond": [
            { "$in": [{ "$ifNull": [right.clone(), null] }, [0, null]] },
            null,
            { operator: [left, right] }
        ]
    })
}

/// `+` between operands whose type is only known per document: strings are
/// concatenated, anything else is added
fn add_or_concat(left: Document, right: Document) -> Document {
    let is_string = |operand: &Document| json!({ "$eq": [{ "$type": operand }, "string"] });
    json!({
        "$cond": [
            { "$or": [is_string(&left), is_string(&right)] },
            { "$concat": [left.clone(), right.clone()] },
            { "$add": [left, right] }
        ]
    })
}

/// Result type of a formula as far as it is known without a schema. Every
/// operator other than `+` yields a number.
fn static_type(formula: &Formula) -> LogicalType {
    match formula {
        Formula::Constant { value } => value.logical_type(),
        Formula::Column { .. } => LogicalType::Undefined,
        Formula::Operation { op: FormulaOp::Add, left, right } => {
            match (static_type(left), static_type(right)) {
                (LogicalType::Text, _) | (_, LogicalType::Text) => LogicalType::Text,
                (LogicalType::Integer | LogicalType::Float, _) | (_, LogicalType::Integer | LogicalType::Float) => {
                    LogicalType::Float
                }
                _ => LogicalType::Undefined,
            }
        }
        Formula::Operation { .. } => LogicalType::Float,
    }
}

pub fn compile_formula(formula: &Formula) -> Document {
    match formula {
        Formula::Constant { value } => literal(value),
        Formula::Column { name } => field(name),
        Formula::Operation { op, left, right } => {
            let l = compile_formula(left);
            let r = compile_formula(right);
            match op {
                FormulaOp::Add => match static_type(formula) {
                    LogicalType::Text => json!({ "$concat": [l, r] }),
                    LogicalType::Undefined => add_or_concat(l, r),
                    _ => json!({ "$add": [l, r] }),
                },
                FormulaOp::Sub => json!({ "$subtract": [l, r] }),
                FormulaOp::Mul => json!({ "$multiply": [l, r] }),
                FormulaOp::Div => guarded("$divide", l, r),
                FormulaOp::Mod => guarded("$mod", l, r),
            }
        }
    }
}

/// First instant of `today + quantity units`, truncated to the day
fn today_relative(relative: &RelativeDate) -> Document {
    json!({
        "$dateTrunc": {
            "date": {
                "$dateAdd": {
                    "startDate": "$$NOW",
                    "unit": relative.duration.as_str(),
                    "amount": relative.quantity
                }
            },
            "unit": "day"
        }
    })
}

enum Bound<'a> {
    Fixed(NaiveDate),
    /// Evaluated by the server against `$$NOW`
    FromToday(&'a RelativeDate),
}

/// `target` is the server version translated for; bounds anchored on today
/// need `$dateTrunc` and `$dateAdd`
fn resolve_bound(value: &DateBoundValue, target: Option<Version>) -> Result<Bound<'_>, StepError> {
    match value {
        DateBoundValue::Date(date) => Ok(Bound::Fixed(*date)),
        DateBoundValue::Relative(relative) => match relative.date {
            DateAnchor::Today => match target {
                Some(version) if version < DATE_OPERATORS_VERSION => Err(StepError::UnsupportedOperator(format!(
                    "dates relative to today require MongoDB {} or later, target is {}",
                    DATE_OPERATORS_VERSION, version
                ))),
                _ => Ok(Bound::FromToday(relative)),
            },
            DateAnchor::Date(_) => relative
                .resolve()
                .map(Bound::Fixed)
                .ok_or_else(|| StepError::InvalidStep("relative date out of range".to_string())),
        },
    }
}

/// Day-granular bound check as an aggregation expression over `subject`.
/// `until` is compared against the start of the following day.
fn date_bound_expr(
    subject: Document,
    operator: DateBoundOperator,
    value: &DateBoundValue,
    target: Option<Version>,
) -> Result<Document, StepError> {
    let bound = match (resolve_bound(value, target)?, operator) {
        (Bound::Fixed(date), DateBoundOperator::From) => date_literal(date),
        (Bound::Fixed(date), DateBoundOperator::Until) => date_literal(date + Duration::days(1)),
        (Bound::FromToday(relative), DateBoundOperator::From) => today_relative(relative),
        (Bound::FromToday(relative), DateBoundOperator::Until) => json!({
            "$dateAdd": { "startDate": today_relative(relative), "unit": "day", "amount": 1 }
        }),
    };
    Ok(match operator {
        DateBoundOperator::From => json!({ "$gte": [subject, bound] }),
        DateBoundOperator::Until => json!({ "$lt": [subject, bound] }),
    })
}

/// Compile a condition into a `$match` query document
pub fn compile_condition_query(condition: &Condition, target: Option<Version>) -> Result<Document, StepError> {
    Ok(match condition {
        Condition::Comparison { column, operator, value } => {
            json!({ column.as_str(): { operator.mongo_operator(): value.to_json() } })
        }
        Condition::Inclusion { column, operator, values } => {
            let keyword = match operator {
                InclusionOperator::In => "$in",
                InclusionOperator::NotIn => "$nin",
            };
            let values: Vec<Document> = values.iter().map(Value::to_json).collect();
            json!({ column.as_str(): { keyword: values } })
        }
        Condition::Null { column, operator } => match operator {
            NullOperator::IsNull => json!({ column.as_str(): { "$eq": null } }),
            NullOperator::NotNull => json!({ column.as_str(): { "$ne": null } }),
        },
        Condition::Match { column, operator, pattern } => match operator {
            MatchOperator::Matches => json!({ column.as_str(): { "$regex": pattern } }),
            MatchOperator::NotMatches => json!({ column.as_str(): { "$not": { "$regex": pattern } } }),
        },
        Condition::DateBound { column, operator, value } => match (resolve_bound(value, target)?, operator) {
            (Bound::Fixed(date), DateBoundOperator::From) => {
                json!({ column.as_str(): { "$gte": date_literal(date) } })
            }
            (Bound::Fixed(date), DateBoundOperator::Until) => {
                json!({ column.as_str(): { "$lt": date_literal(date + Duration::days(1)) } })
            }
            (Bound::FromToday(_), _) => {
                json!({ "$expr": date_bound_expr(field(column), *operator, value, target)? })
            }
        },
        Condition::And(items) if items.is_empty() => json!({}),
        Condition::Or(items) if items.is_empty() => json!({ "$expr": false }),
        Condition::And(items) => json!({ "$and": compile_all(items, target, compile_condition_query)? }),
        Condition::Or(items) => json!({ "$or": compile_all(items, target, compile_condition_query)? }),
    })
}

/// Compile a condition into a boolean aggregation expression
pub fn compile_condition_expr(condition: &Condition, target: Option<Version>) -> Result<Document, StepError> {
    Ok(match condition {
        Condition::Comparison { column, operator, value } => {
            json!({ operator.mongo_operator(): [field(column), literal(value)] })
        }
        Condition::Inclusion { column, operator, values } => {
            let values: Vec<Document> = values.iter().map(literal).collect();
            let inclusion = json!({ "$in": [field(column), values] });
            match operator {
                InclusionOperator::In => inclusion,
                InclusionOperator::NotIn => json!({ "$not": [inclusion] }),
            }
        }
        Condition::Null { column, operator } => {
            let value = json!({ "$ifNull": [field(column), null] });
            match operator {
                NullOperator::IsNull => json!({ "$eq": [value, null] }),
                NullOperator::NotNull => json!({ "$ne": [value, null] }),
            }
        }
        Condition::Match { column, operator, pattern } => {
            let matches = json!({ "$regexMatch": { "input": field(column), "regex": pattern } });
            match operator {
                MatchOperator::Matches => matches,
                MatchOperator::NotMatches => json!({ "$not": [matches] }),
            }
        }
        Condition::DateBound { column, operator, value } => {
            date_bound_expr(field(column), *operator, value, target)?
        }
        Condition::And(items) => json!({ "$and": compile_all(items, target, compile_condition_expr)? }),
        Condition::Or(items) => json!({ "$or": compile_all(items, target, compile_condition_expr)? }),
    })
}

fn compile_all(
    items: &[Condition],
    target: Option<Version>,
    compile: fn(&Condition, Option<Version>) -> Result<Document, StepError>,
) -> Result<Vec<Document>, StepError> {
    items.iter().map(|item| compile(item, target)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeql_ast::parse_formula;

    fn formula(text: &str) -> Document {
        compile_formula(&parse_formula(text).unwrap())
    }

    fn condition(json: &str) -> Condition {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_division_is_guarded() {
        assert_eq!(
            formula("a / b"),
            json!({
                "$cond": [
                    {"$in": [{"$ifNull": ["$b", null]}, [0, null]]},
                    null,
                    {"$divide": ["$a", "$b"]}
                ]
            })
        );
        assert_eq!(
            formula("[my col] % 2"),
            json!({
                "$cond": [
                    {"$in": [{"$ifNull": [2, null]}, [0, null]]},
                    null,
                    {"$mod": ["$my col", 2]}
                ]
            })
        );
    }

    #[test]
    fn test_formula_operators() {
        assert_eq!(formula("a + b * 2"), json!({"$add": ["$a", {"$multiply": ["$b", 2]}]}));
        assert_eq!(formula("a - 1"), json!({"$subtract": ["$a", 1]}));
        assert_eq!(formula("'$x' + a"), json!({"$concat": [{"$literal": "$x"}, "$a"]}));
        assert_eq!(formula("(a - 1) + b"), json!({"$add": [{"$subtract": ["$a", 1]}, "$b"]}));
    }

    #[test]
    fn test_column_sum_dispatches_on_runtime_type() {
        assert_eq!(
            formula("first + last"),
            json!({
                "$cond": [
                    {"$or": [
                        {"$eq": [{"$type": "$first"}, "string"]},
                        {"$eq": [{"$type": "$last"}, "string"]}
                    ]},
                    {"$concat": ["$first", "$last"]},
                    {"$add": ["$first", "$last"]}
                ]
            })
        );
        assert_eq!(
            formula("a + b + ' km'"),
            json!({"$concat": [
                {"$cond": [
                    {"$or": [
                        {"$eq": [{"$type": "$a"}, "string"]},
                        {"$eq": [{"$type": "$b"}, "string"]}
                    ]},
                    {"$concat": ["$a", "$b"]},
                    {"$add": ["$a", "$b"]}
                ]},
                {"$literal": " km"}
            ]})
        );
    }

    #[test]
    fn test_today_bounds_need_date_operators() {
        let relative = condition(
            r#"{"column": "d", "operator": "until", "value": {"date": "today", "quantity": -1, "duration": "month"}}"#,
        );
        let err = compile_condition_expr(&relative, Some(Version::new(4, 4))).unwrap_err();
        assert!(matches!(err, StepError::UnsupportedOperator(_)), "{:?}", err);
        assert!(compile_condition_query(&relative, Some(Version::new(4, 4))).is_err());
        assert!(compile_condition_query(&relative, Some(Version::new(5, 0))).is_ok());

        let fixed = condition(r#"{"column": "d", "operator": "until", "value": "2021-01-31"}"#);
        assert_eq!(
            compile_condition_query(&fixed, Some(Version::new(4, 4))).unwrap(),
            json!({"d": {"$lt": {"$date": "2021-02-01T00:00:00Z"}}})
        );
    }

    #[test]
    fn test_query_conditions() {
        assert_eq!(
            compile_condition_query(&condition(r#"{"column": "B", "operator": "eq", "value": 5}"#), None).unwrap(),
            json!({"B": {"$eq": 5}})
        );
        assert_eq!(
            compile_condition_query(&condition(r#"{"column": "c", "operator": "isnull"}"#), None).unwrap(),
            json!({"c": {"$eq": null}})
        );
        assert_eq!(
            compile_condition_query(&condition(
                r#"{"or": [{"column": "a", "operator": "nin", "value": [1, 2]}, {"column": "b", "operator": "notmatches", "value": "^x"}]}"#
            ), None)
            .unwrap(),
            json!({"$or": [{"a": {"$nin": [1, 2]}}, {"b": {"$not": {"$regex": "^x"}}}]})
        );
    }

    #[test]
    fn test_expression_conditions() {
        assert_eq!(
            compile_condition_expr(&condition(r#"{"column": "a", "operator": "ge", "value": "x"}"#), None).unwrap(),
            json!({"$gte": ["$a", {"$literal": "x"}]})
        );
        assert_eq!(
            compile_condition_expr(&condition(r#"{"column": "a", "operator": "notnull"}"#), None).unwrap(),
            json!({"$ne": [{"$ifNull": ["$a", null]}, null]})
        );
        assert_eq!(
            compile_condition_expr(&condition(r#"{"column": "a", "operator": "matches", "value": "^b"}"#), None).unwrap(),
            json!({"$regexMatch": {"input": "$a", "regex": "^b"}})
        );
    }

    #[test]
    fn test_date_bounds() {
        assert_eq!(
            compile_condition_query(&condition(
                r#"{"column": "d", "operator": "until", "value": "2021-01-31T10:00:00Z"}"#
            ), None)
            .unwrap(),
            json!({"d": {"$lt": {"$date": "2021-02-01T00:00:00Z"}}})
        );
        assert_eq!(
            compile_condition_query(&condition(
                r#"{"column": "d", "operator": "from", "value": {"date": "today", "quantity": -2, "duration": "week"}}"#
            ), None)
            .unwrap(),
            json!({
                "$expr": {
                    "$gte": [
                        "$d",
                        {"$dateTrunc": {
                            "date": {"$dateAdd": {"startDate": "$$NOW", "unit": "week", "amount": -2}},
                            "unit": "day"
                        }}
                    ]
                }
            })
        );
    }
}
