//! Filter condition trees

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonOperator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl ComparisonOperator {
    pub fn sql_symbol(self) -> &'static str {
        match self {
            ComparisonOperator::Eq => "=",
            ComparisonOperator::Ne => "!=",
            ComparisonOperator::Gt => ">",
            ComparisonOperator::Ge => ">=",
            ComparisonOperator::Lt => "<",
            ComparisonOperator::Le => "<=",
        }
    }

    pub fn mongo_operator(self) -> &'static str {
        match self {
            ComparisonOperator::Eq => "$eq",
            ComparisonOperator::Ne => "$ne",
            ComparisonOperator::Gt => "$gt",
            ComparisonOperator::Ge => "$gte",
            ComparisonOperator::Lt => "$lt",
            ComparisonOperator::Le => "$lte",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InclusionOperator {
    In,
    NotIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullOperator {
    IsNull,
    NotNull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOperator {
    Matches,
    NotMatches,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateBoundOperator {
    From,
    Until,
}

/// Calendar unit of a relative date offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateUnit {
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl DateUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            DateUnit::Day => "day",
            DateUnit::Week => "week",
            DateUnit::Month => "month",
            DateUnit::Quarter => "quarter",
            DateUnit::Year => "year",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DateAnchor {
    Today,
    Date(NaiveDate),
}

impl TryFrom<String> for DateAnchor {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.eq_ignore_ascii_case("today") {
            return Ok(DateAnchor::Today);
        }
        parse_date_literal(&value)
            .map(|dt| DateAnchor::Date(dt.date()))
            .ok_or_else(|| format!("invalid date anchor '{}'", value))
    }
}

impl From<DateAnchor> for String {
    fn from(anchor: DateAnchor) -> Self {
        match anchor {
            DateAnchor::Today => "today".to_string(),
            DateAnchor::Date(date) => date.format("%Y-%m-%d").to_string(),
        }
    }
}

/// A date expressed as a signed offset from an anchor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelativeDate {
    pub date: DateAnchor,
    pub quantity: i64,
    pub duration: DateUnit,
}

impl RelativeDate {
    /// Resolve against a fixed anchor. `None` when the anchor is `today`,
    /// which the target evaluates itself.
    pub fn resolve(&self) -> Option<NaiveDate> {
        match self.date {
            DateAnchor::Today => None,
            DateAnchor::Date(anchor) => shift_date(anchor, self.quantity, self.duration),
        }
    }
}

/// Shift a date by `quantity` calendar units, clamping to the end of the month
pub fn shift_date(date: NaiveDate, quantity: i64, unit: DateUnit) -> Option<NaiveDate> {
    match unit {
        DateUnit::Day => date.checked_add_signed(Duration::days(quantity)),
        DateUnit::Week => date.checked_add_signed(Duration::weeks(quantity)),
        DateUnit::Month => shift_months(date, quantity),
        DateUnit::Quarter => shift_months(date, quantity.checked_mul(3)?),
        DateUnit::Year => shift_months(date, quantity.checked_mul(12)?),
    }
}

fn shift_months(date: NaiveDate, months: i64) -> Option<NaiveDate> {
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        date.checked_add_months(magnitude)
    } else {
        date.checked_sub_months(magnitude)
    }
}

/// Accepts RFC 3339 timestamps, `YYYY-MM-DD[ T]HH:MM:SS` and plain dates
pub fn parse_date_literal(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

#[derive(Debug, Clone, PartialEq)]
pub enum DateBoundValue {
    Date(NaiveDate),
    Relative(RelativeDate),
}

impl DateBoundValue {
    fn from_json(value: &serde_json::Value) -> Result<Self, String> {
        match value {
            serde_json::Value::String(s) => parse_date_literal(s)
                .map(|dt| DateBoundValue::Date(dt.date()))
                .ok_or_else(|| format!("invalid date '{}'", s)),
            serde_json::Value::Object(_) => serde_json::from_value::<RelativeDate>(value.clone())
                .map(DateBoundValue::Relative)
                .map_err(|e| format!("invalid relative date: {}", e)),
            other => Err(format!("invalid date bound {}", other)),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            DateBoundValue::Date(date) => serde_json::Value::String(date.format("%Y-%m-%d").to_string()),
            DateBoundValue::Relative(relative) => {
                serde_json::to_value(relative).unwrap_or(serde_json::Value::Null)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCondition", into = "RawCondition")]
pub enum Condition {
    Comparison {
        column: String,
        operator: ComparisonOperator,
        value: Value,
    },
    Inclusion {
        column: String,
        operator: InclusionOperator,
        values: Vec<Value>,
    },
    Null {
        column: String,
        operator: NullOperator,
    },
    Match {
        column: String,
        operator: MatchOperator,
        pattern: String,
    },
    DateBound {
        column: String,
        operator: DateBoundOperator,
        value: DateBoundValue,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
}

impl Condition {
    /// Every column referenced anywhere in the tree
    pub fn columns(&self) -> Vec<&str> {
        match self {
            Condition::Comparison { column, .. }
            | Condition::Inclusion { column, .. }
            | Condition::Null { column, .. }
            | Condition::Match { column, .. }
            | Condition::DateBound { column, .. } => vec![column.as_str()],
            Condition::And(items) | Condition::Or(items) => {
                items.iter().flat_map(Condition::columns).collect()
            }
        }
    }
}

/// Wire shape: `{column, operator, value}`, `{and: [...]}` or `{or: [...]}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    operator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    and: Option<Vec<Condition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    or: Option<Vec<Condition>>,
}

fn literal(value: serde_json::Value) -> Result<Value, String> {
    serde_json::from_value(value).map_err(|e| format!("invalid literal: {}", e))
}

impl TryFrom<RawCondition> for Condition {
    type Error = String;

    fn try_from(raw: RawCondition) -> Result<Self, Self::Error> {
        if let Some(items) = raw.and {
            return Ok(Condition::And(items));
        }
        if let Some(items) = raw.or {
            return Ok(Condition::Or(items));
        }

        let column = raw.column.ok_or("condition is missing 'column'")?;
        let operator = raw.operator.ok_or("condition is missing 'operator'")?;
        let value = raw.value.unwrap_or(serde_json::Value::Null);

        let condition = match operator.as_str() {
            "eq" | "ne" | "gt" | "ge" | "lt" | "le" => Condition::Comparison {
                column,
                operator: serde_json::from_value(serde_json::Value::String(operator.clone()))
                    .map_err(|e| e.to_string())?,
                value: literal(value)?,
            },
            "in" | "nin" => {
                let serde_json::Value::Array(items) = value else {
                    return Err(format!("operator '{}' expects a list of values", operator));
                };
                Condition::Inclusion {
                    column,
                    operator: if operator == "in" {
                        InclusionOperator::In
                    } else {
                        InclusionOperator::NotIn
                    },
                    values: items.into_iter().map(literal).collect::<Result<_, _>>()?,
                }
            }
            "isnull" => Condition::Null {
                column,
                operator: NullOperator::IsNull,
            },
            "notnull" => Condition::Null {
                column,
                operator: NullOperator::NotNull,
            },
            "matches" | "notmatches" => {
                let serde_json::Value::String(pattern) = value else {
                    return Err(format!("operator '{}' expects a string pattern", operator));
                };
                Condition::Match {
                    column,
                    operator: if operator == "matches" {
                        MatchOperator::Matches
                    } else {
                        MatchOperator::NotMatches
                    },
                    pattern,
                }
            }
            "from" | "until" => Condition::DateBound {
                column,
                operator: if operator == "from" {
                    DateBoundOperator::From
                } else {
                    DateBoundOperator::Until
                },
                value: DateBoundValue::from_json(&value)?,
            },
            other => return Err(format!("unknown condition operator '{}'", other)),
        };
        Ok(condition)
    }
}

impl From<Condition> for RawCondition {
    fn from(condition: Condition) -> Self {
        let leaf = |column: String, operator: &str, value: Option<serde_json::Value>| RawCondition {
            column: Some(column),
            operator: Some(operator.to_string()),
            value,
            ..RawCondition::default()
        };
        match condition {
            Condition::And(items) => RawCondition {
                and: Some(items),
                ..RawCondition::default()
            },
            Condition::Or(items) => RawCondition {
                or: Some(items),
                ..RawCondition::default()
            },
            Condition::Comparison { column, operator, value } => {
                let name = serde_json::to_value(operator)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default();
                leaf(column, &name, Some(value.to_json()))
            }
            Condition::Inclusion { column, operator, values } => {
                let name = match operator {
                    InclusionOperator::In => "in",
                    InclusionOperator::NotIn => "nin",
                };
                let values = values.iter().map(Value::to_json).collect();
                leaf(column, name, Some(serde_json::Value::Array(values)))
            }
            Condition::Null { column, operator } => {
                let name = match operator {
                    NullOperator::IsNull => "isnull",
                    NullOperator::NotNull => "notnull",
                };
                leaf(column, name, None)
            }
            Condition::Match { column, operator, pattern } => {
                let name = match operator {
                    MatchOperator::Matches => "matches",
                    MatchOperator::NotMatches => "notmatches",
                };
                leaf(column, name, Some(serde_json::Value::String(pattern)))
            }
            Condition::DateBound { column, operator, value } => {
                let name = match operator {
                    DateBoundOperator::From => "from",
                    DateBoundOperator::Until => "until",
                };
                leaf(column, name, Some(value.to_json()))
            }
        }
    }
}

/// Day of the week of a date, Monday = 1
pub fn iso_weekday(date: NaiveDate) -> u32 {
    date.weekday().number_from_monday()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Condition {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_leaf_conditions() {
        assert_eq!(
            parse(r#"{"column": "B", "operator": "eq", "value": 5}"#),
            Condition::Comparison {
                column: "B".into(),
                operator: ComparisonOperator::Eq,
                value: Value::Int(5),
            }
        );
        assert!(matches!(
            parse(r#"{"column": "B", "operator": "nin", "value": ["a", "b"]}"#),
            Condition::Inclusion { operator: InclusionOperator::NotIn, ref values, .. } if values.len() == 2
        ));
        assert!(matches!(
            parse(r#"{"column": "B", "operator": "isnull"}"#),
            Condition::Null { operator: NullOperator::IsNull, .. }
        ));
        assert!(matches!(
            parse(r#"{"column": "B", "operator": "notmatches", "value": "^a"}"#),
            Condition::Match { operator: MatchOperator::NotMatches, .. }
        ));
    }

    #[test]
    fn test_combo_conditions() {
        let condition = parse(
            r#"{"and": [
                {"column": "a", "operator": "gt", "value": 1},
                {"or": [
                    {"column": "b", "operator": "eq", "value": "x"},
                    {"column": "c", "operator": "notnull"}
                ]}
            ]}"#,
        );
        assert_eq!(condition.columns(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_invalid_conditions() {
        assert!(serde_json::from_str::<Condition>(r#"{"column": "a", "operator": "like"}"#).is_err());
        assert!(serde_json::from_str::<Condition>(r#"{"operator": "eq", "value": 1}"#).is_err());
        assert!(
            serde_json::from_str::<Condition>(r#"{"column": "a", "operator": "in", "value": 1}"#)
                .is_err()
        );
    }

    #[test]
    fn test_date_bounds() {
        let condition = parse(r#"{"column": "d", "operator": "from", "value": "2021-03-04T10:20:00Z"}"#);
        let Condition::DateBound { value, .. } = condition else {
            panic!("expected date bound");
        };
        assert_eq!(value, DateBoundValue::Date(NaiveDate::from_ymd_opt(2021, 3, 4).unwrap()));

        let condition = parse(
            r#"{"column": "d", "operator": "until", "value": {"date": "2021-03-31", "quantity": -1, "duration": "month"}}"#,
        );
        let Condition::DateBound { value: DateBoundValue::Relative(relative), .. } = condition else {
            panic!("expected relative date");
        };
        assert_eq!(relative.resolve(), NaiveDate::from_ymd_opt(2021, 2, 28));

        let today = RelativeDate {
            date: DateAnchor::Today,
            quantity: 2,
            duration: DateUnit::Week,
        };
        assert_eq!(today.resolve(), None);
    }

    #[test]
    fn test_shift_date() {
        let date = NaiveDate::from_ymd_opt(2020, 2, 29).unwrap();
        assert_eq!(shift_date(date, 1, DateUnit::Year), NaiveDate::from_ymd_opt(2021, 2, 28));
        assert_eq!(shift_date(date, -1, DateUnit::Quarter), NaiveDate::from_ymd_opt(2019, 11, 29));
        assert_eq!(shift_date(date, 1, DateUnit::Day), NaiveDate::from_ymd_opt(2020, 3, 1));
        assert_eq!(iso_weekday(date), 6);
    }

    #[test]
    fn test_condition_round_trip() {
        let json = r#"{"or":[{"column":"a","operator":"in","value":[1,2]},{"column":"b","operator":"isnull"}]}"#;
        let condition = parse(json);
        let back = serde_json::to_string(&condition).unwrap();
        assert_eq!(back, json);
    }
}
