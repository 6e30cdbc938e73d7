//! SQL dialects and their capability descriptors

use pipeql_ir::{DateUnit, LogicalType, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    Athena,
    BigQuery,
    DuckDB,
    MySql,
    Postgres,
    Redshift,
    Snowflake,
}

/// Clause order for `LIMIT`/`OFFSET`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// `LIMIT n OFFSET m`
    LimitOffset,
    /// `OFFSET m LIMIT n`
    OffsetLimit,
    /// `LIMIT m, n`
    MySql,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegexStyle {
    /// `col ~ 'p'`
    Tilde,
    /// `regexp_matches(col, 'p')`
    RegexpMatches,
    /// `REGEXP_INSTR(col, 'p') > 0`
    RegexpInstr,
    /// `REGEXP_CONTAINS(col, 'p')`
    RegexpContains,
    /// `col REGEXP 'p'`
    Operator,
    /// `regexp_like(col, 'p')`
    RegexpLike,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantileStyle {
    /// `PERCENTILE_DISC(f) WITHIN GROUP (ORDER BY col)`
    WithinGroup,
    /// `APPROX_QUANTILES(col, order)[OFFSET(nth)]`
    ApproxQuantiles,
    /// `approx_percentile(col, f)`
    ApproxPercentile,
    Unsupported,
}

/// Native type names for each logical type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeMap {
    pub boolean: &'static str,
    pub date: &'static str,
    pub float: &'static str,
    pub integer: &'static str,
    pub text: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialectCapabilities {
    pub window_functions: bool,
    pub split_part: bool,
    pub quote: char,
    pub pagination: Pagination,
    pub regex: RegexStyle,
    pub quantile: QuantileStyle,
    pub types: TypeMap,
    /// strftime token to native date-format token; empty means strftime is native
    pub date_tokens: &'static [(&'static str, &'static str)],
}

const TO_CHAR_TOKENS: &[(&str, &str)] = &[
    ("%Y", "YYYY"),
    ("%y", "YY"),
    ("%m", "MM"),
    ("%d", "DD"),
    ("%H", "HH24"),
    ("%I", "HH12"),
    ("%M", "MI"),
    ("%S", "SS"),
    ("%f", "US"),
    ("%p", "AM"),
    ("%b", "Mon"),
    ("%B", "Month"),
    ("%a", "Dy"),
    ("%A", "Day"),
    ("%j", "DDD"),
    ("%%", "%"),
];

const SNOWFLAKE_TOKENS: &[(&str, &str)] = &[
    ("%Y", "YYYY"),
    ("%y", "YY"),
    ("%m", "MM"),
    ("%d", "DD"),
    ("%H", "HH24"),
    ("%I", "HH12"),
    ("%M", "MI"),
    ("%S", "SS"),
    ("%f", "FF6"),
    ("%p", "AM"),
    ("%b", "MON"),
    ("%B", "MMMM"),
    ("%a", "DY"),
    ("%%", "%"),
];

const MYSQL_TOKENS: &[(&str, &str)] = &[
    ("%M", "%i"),
    ("%S", "%s"),
    ("%B", "%M"),
    ("%A", "%W"),
    ("%-d", "%e"),
    ("%-m", "%c"),
];

const POSTGRES_CAPABILITIES: DialectCapabilities = DialectCapabilities {
    window_functions: true,
    split_part: true,
    quote: '"',
    pagination: Pagination::LimitOffset,
    regex: RegexStyle::Tilde,
    quantile: QuantileStyle::WithinGroup,
    types: TypeMap {
        boolean: "BOOLEAN",
        date: "TIMESTAMP",
        float: "DOUBLE PRECISION",
        integer: "BIGINT",
        text: "TEXT",
    },
    date_tokens: TO_CHAR_TOKENS,
};

impl SqlDialect {
    pub const ALL: [SqlDialect; 7] = [
        SqlDialect::Athena,
        SqlDialect::BigQuery,
        SqlDialect::DuckDB,
        SqlDialect::MySql,
        SqlDialect::Postgres,
        SqlDialect::Redshift,
        SqlDialect::Snowflake,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SqlDialect::Athena => "athena",
            SqlDialect::BigQuery => "bigquery",
            SqlDialect::DuckDB => "duckdb",
            SqlDialect::MySql => "mysql",
            SqlDialect::Postgres => "postgres",
            SqlDialect::Redshift => "redshift",
            SqlDialect::Snowflake => "snowflake",
        }
    }

    pub fn capabilities(self) -> DialectCapabilities {
        match self {
            SqlDialect::Postgres => POSTGRES_CAPABILITIES,
            SqlDialect::Redshift => DialectCapabilities {
                types: TypeMap {
                    text: "VARCHAR(65535)",
                    ..POSTGRES_CAPABILITIES.types
                },
                ..POSTGRES_CAPABILITIES
            },
            SqlDialect::DuckDB => DialectCapabilities {
                regex: RegexStyle::RegexpMatches,
                types: TypeMap {
                    boolean: "BOOLEAN",
                    date: "TIMESTAMP",
                    float: "DOUBLE",
                    integer: "BIGINT",
                    text: "VARCHAR",
                },
                date_tokens: &[],
                ..POSTGRES_CAPABILITIES
            },
            SqlDialect::Snowflake => DialectCapabilities {
                regex: RegexStyle::RegexpInstr,
                types: TypeMap {
                    boolean: "BOOLEAN",
                    date: "TIMESTAMP_NTZ",
                    float: "DOUBLE",
                    integer: "INTEGER",
                    text: "VARCHAR",
                },
                date_tokens: SNOWFLAKE_TOKENS,
                ..POSTGRES_CAPABILITIES
            },
            SqlDialect::BigQuery => DialectCapabilities {
                window_functions: true,
                split_part: false,
                quote: '`',
                pagination: Pagination::LimitOffset,
                regex: RegexStyle::RegexpContains,
                quantile: QuantileStyle::ApproxQuantiles,
                types: TypeMap {
                    boolean: "BOOL",
                    date: "TIMESTAMP",
                    float: "FLOAT64",
                    integer: "INT64",
                    text: "STRING",
                },
                date_tokens: &[],
            },
            SqlDialect::MySql => DialectCapabilities {
                window_functions: false,
                split_part: false,
                quote: '`',
                pagination: Pagination::MySql,
                regex: RegexStyle::Operator,
                quantile: QuantileStyle::Unsupported,
                types: TypeMap {
                    boolean: "SIGNED",
                    date: "DATETIME",
                    float: "DOUBLE",
                    integer: "SIGNED",
                    text: "CHAR",
                },
                date_tokens: MYSQL_TOKENS,
            },
            SqlDialect::Athena => DialectCapabilities {
                window_functions: true,
                split_part: true,
                quote: '"',
                pagination: Pagination::OffsetLimit,
                regex: RegexStyle::RegexpLike,
                quantile: QuantileStyle::ApproxPercentile,
                types: TypeMap {
                    boolean: "BOOLEAN",
                    date: "TIMESTAMP",
                    float: "DOUBLE",
                    integer: "BIGINT",
                    text: "VARCHAR",
                },
                date_tokens: MYSQL_TOKENS,
            },
        }
    }

    /// Identifiers are emitted bare when they are plain words
    pub fn quote_identifier(self, name: &str) -> String {
        let plain = name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if plain {
            return name.to_string();
        }
        let quote = self.capabilities().quote;
        let escaped = name.replace(quote, &format!("{0}{0}", quote));
        format!("{0}{1}{0}", quote, escaped)
    }

    pub fn string_literal(self, text: &str) -> String {
        match self {
            SqlDialect::BigQuery => format!("'{}'", text.replace('\\', "\\\\").replace('\'', "\\'")),
            _ => format!("'{}'", text.replace('\'', "''")),
        }
    }

    pub fn literal(self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(true) => "TRUE".to_string(),
            Value::Bool(false) => "FALSE".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format!("{:?}", f),
            Value::String(s) => self.string_literal(s),
        }
    }

    pub fn type_name(self, logical_type: LogicalType) -> &'static str {
        let types = self.capabilities().types;
        match logical_type {
            LogicalType::Boolean => types.boolean,
            LogicalType::Date => types.date,
            LogicalType::Float => types.float,
            LogicalType::Integer => types.integer,
            LogicalType::Text | LogicalType::Undefined => types.text,
        }
    }

    pub fn cast(self, expr: &str, logical_type: LogicalType) -> String {
        format!("CAST({} AS {})", expr, self.type_name(logical_type))
    }

    /// `null` typed for use in `UNION ALL` branches
    pub fn typed_null(self, logical_type: LogicalType) -> String {
        self.cast("NULL", logical_type)
    }

    pub fn concat(self, parts: &[String]) -> String {
        match self {
            SqlDialect::MySql => format!("CONCAT({})", parts.join(", ")),
            _ => parts.join(" || "),
        }
    }

    pub fn length(self, expr: &str) -> String {
        match self {
            SqlDialect::MySql => format!("CHAR_LENGTH({})", expr),
            _ => format!("LENGTH({})", expr),
        }
    }

    pub fn substring(self, expr: &str, start: &str, length: &str) -> String {
        match self {
            SqlDialect::BigQuery | SqlDialect::Athena => format!("SUBSTR({}, {}, {})", expr, start, length),
            _ => format!("SUBSTRING({}, {}, {})", expr, start, length),
        }
    }

    /// 1-based field of a delimited string
    pub fn split_part(self, expr: &str, delimiter: &str, index: u32) -> String {
        format!("SPLIT_PART({}, {}, {})", expr, self.string_literal(delimiter), index)
    }

    pub fn regex_predicate(self, expr: &str, pattern: &str, negate: bool) -> String {
        let pattern = self.string_literal(pattern);
        let positive = match self.capabilities().regex {
            RegexStyle::Tilde => {
                return format!("{} {} {}", expr, if negate { "!~" } else { "~" }, pattern);
            }
            RegexStyle::RegexpMatches => format!("regexp_matches({}, {})", expr, pattern),
            RegexStyle::RegexpInstr => format!("REGEXP_INSTR({}, {}) > 0", expr, pattern),
            RegexStyle::RegexpContains => format!("REGEXP_CONTAINS({}, {})", expr, pattern),
            RegexStyle::Operator => format!("{} REGEXP {}", expr, pattern),
            RegexStyle::RegexpLike => format!("regexp_like({}, {})", expr, pattern),
        };
        if negate {
            format!("NOT ({})", positive)
        } else {
            positive
        }
    }

    pub fn quantile(self, expr: &str, nth: u32, order: u32) -> Option<String> {
        let fraction = f64::from(nth) / f64::from(order);
        match self.capabilities().quantile {
            QuantileStyle::WithinGroup => Some(format!(
                "PERCENTILE_DISC({:?}) WITHIN GROUP (ORDER BY {})",
                fraction, expr
            )),
            QuantileStyle::ApproxQuantiles => Some(format!(
                "APPROX_QUANTILES({}, {})[OFFSET({})]",
                expr, order, nth
            )),
            QuantileStyle::ApproxPercentile => {
                Some(format!("approx_percentile({}, {:?})", expr, fraction))
            }
            QuantileStyle::Unsupported => None,
        }
    }

    /// Rewrite a strftime format into the dialect's native format syntax
    pub fn date_format(self, format: &str) -> String {
        let tokens = self.capabilities().date_tokens;
        if tokens.is_empty() {
            return format.to_string();
        }
        let mut output = String::with_capacity(format.len());
        let mut rest = format;
        'outer: while !rest.is_empty() {
            for (from, to) in tokens {
                if let Some(tail) = rest.strip_prefix(from) {
                    output.push_str(to);
                    rest = tail;
                    continue 'outer;
                }
            }
            let mut chars = rest.chars();
            if let Some(c) = chars.next() {
                output.push(c);
            }
            rest = chars.as_str();
        }
        output
    }

    /// Text to date, with an optional strftime format
    pub fn parse_date(self, expr: &str, format: Option<&str>) -> String {
        let Some(format) = format else {
            return self.cast(expr, LogicalType::Date);
        };
        let native = self.string_literal(&self.date_format(format));
        match self {
            SqlDialect::Postgres | SqlDialect::Redshift | SqlDialect::Snowflake => {
                format!("TO_TIMESTAMP({}, {})", expr, native)
            }
            SqlDialect::DuckDB => format!("strptime({}, {})", expr, native),
            SqlDialect::BigQuery => format!("PARSE_TIMESTAMP({}, {})", native, expr),
            SqlDialect::MySql => format!("STR_TO_DATE({}, {})", expr, native),
            SqlDialect::Athena => format!("date_parse({}, {})", expr, native),
        }
    }

    /// Date to text using a strftime format
    pub fn format_date(self, expr: &str, format: &str) -> String {
        let native = self.string_literal(&self.date_format(format));
        match self {
            SqlDialect::Postgres | SqlDialect::Redshift | SqlDialect::Snowflake => {
                format!("TO_CHAR({}, {})", expr, native)
            }
            SqlDialect::DuckDB => format!("strftime({}, {})", expr, native),
            SqlDialect::BigQuery => format!("FORMAT_TIMESTAMP({}, {})", native, expr),
            SqlDialect::MySql => format!("DATE_FORMAT({}, {})", expr, native),
            SqlDialect::Athena => format!("date_format({}, {})", expr, native),
        }
    }

    /// Truncate to the start of a calendar unit; weeks start on Monday
    pub fn date_trunc(self, unit: DateUnit, expr: &str) -> String {
        match self {
            SqlDialect::BigQuery => {
                let part = match unit {
                    DateUnit::Day => "DAY",
                    DateUnit::Week => "ISOWEEK",
                    DateUnit::Month => "MONTH",
                    DateUnit::Quarter => "QUARTER",
                    DateUnit::Year => "YEAR",
                };
                format!("TIMESTAMP_TRUNC({}, {})", expr, part)
            }
            SqlDialect::MySql => match unit {
                DateUnit::Day => format!("DATE({})", expr),
                DateUnit::Week => format!("DATE_SUB(DATE({0}), INTERVAL WEEKDAY({0}) DAY)", expr),
                DateUnit::Month => format!("DATE_SUB(DATE({0}), INTERVAL DAYOFMONTH({0}) - 1 DAY)", expr),
                DateUnit::Quarter => format!(
                    "DATE_ADD(MAKEDATE(YEAR({0}), 1), INTERVAL QUARTER({0}) - 1 QUARTER)",
                    expr
                ),
                DateUnit::Year => format!("MAKEDATE(YEAR({}), 1)", expr),
            },
            _ => format!("DATE_TRUNC('{}', {})", unit.as_str(), expr),
        }
    }

    /// Add `quantity` (an SQL expression) calendar units to a date
    pub fn add_interval(self, expr: &str, quantity: &str, unit: DateUnit) -> String {
        let (quantity, unit) = match unit {
            DateUnit::Day => (quantity.to_string(), "day"),
            DateUnit::Week => (format!("({}) * 7", quantity), "day"),
            DateUnit::Month => (quantity.to_string(), "month"),
            DateUnit::Quarter => (format!("({}) * 3", quantity), "month"),
            DateUnit::Year => (format!("({}) * 12", quantity), "month"),
        };
        match self {
            SqlDialect::Postgres | SqlDialect::Redshift => {
                format!("{} + ({}) * INTERVAL '1 {}'", expr, quantity, unit)
            }
            SqlDialect::DuckDB => {
                let function = if unit == "day" { "to_days" } else { "to_months" };
                format!("{} + {}(CAST({} AS INTEGER))", expr, function, quantity)
            }
            SqlDialect::Snowflake => format!("DATEADD({}, {}, {})", unit, quantity, expr),
            SqlDialect::BigQuery => format!(
                "TIMESTAMP(DATETIME_ADD(DATETIME({}), INTERVAL {} {}))",
                expr,
                quantity,
                unit.to_uppercase()
            ),
            SqlDialect::MySql => format!("DATE_ADD({}, INTERVAL {} {})", expr, quantity, unit.to_uppercase()),
            SqlDialect::Athena => format!("date_add('{}', {}, {})", unit, quantity, expr),
        }
    }

    /// DuckDB binds `CURRENT_DATE` through its ICU extension, so the date is
    /// taken from the local clock at translation time instead
    pub fn current_date(self) -> String {
        match self {
            SqlDialect::BigQuery => "TIMESTAMP(CURRENT_DATE())".to_string(),
            SqlDialect::DuckDB => self.date_literal(chrono::Local::now().date_naive()),
            _ => "CURRENT_DATE".to_string(),
        }
    }

    /// One row per `unit` step from `start` to `end` inclusive, as a select-list item
    pub fn date_series(self, start: &str, end: &str, unit: DateUnit) -> String {
        let series = format!("generate_series({}, {}, INTERVAL '1 {}')", start, end, unit.as_str());
        match self {
            SqlDialect::DuckDB => format!("UNNEST({})", series),
            _ => series,
        }
    }

    /// Remainder yielding null for a zero or null divisor
    pub fn modulo(self, left: &str, right: &str) -> String {
        match self {
            // MOD has no floating point overload on these
            SqlDialect::Postgres | SqlDialect::Redshift | SqlDialect::BigQuery => format!(
                "MOD(CAST({} AS NUMERIC), NULLIF(CAST({} AS NUMERIC), 0))",
                left, right
            ),
            _ => format!("MOD({}, NULLIF({}, 0))", left, right),
        }
    }

    pub fn date_literal(self, date: chrono::NaiveDate) -> String {
        self.cast(
            &self.string_literal(&date.format("%Y-%m-%d").to_string()),
            LogicalType::Date,
        )
    }

    pub fn seconds_between(self, start: &str, end: &str) -> String {
        match self {
            SqlDialect::Postgres | SqlDialect::DuckDB => {
                format!("EXTRACT(EPOCH FROM {}) - EXTRACT(EPOCH FROM {})", end, start)
            }
            SqlDialect::Redshift | SqlDialect::Snowflake => {
                format!("DATEDIFF(second, {}, {})", start, end)
            }
            SqlDialect::BigQuery => format!("TIMESTAMP_DIFF({}, {}, SECOND)", end, start),
            SqlDialect::MySql => format!("TIMESTAMPDIFF(SECOND, {}, {})", start, end),
            SqlDialect::Athena => format!("date_diff('second', {}, {})", start, end),
        }
    }

    /// Day of week with Sunday = 0
    pub fn day_of_week(self, expr: &str) -> String {
        match self {
            SqlDialect::Postgres | SqlDialect::Redshift | SqlDialect::DuckDB => {
                format!("EXTRACT(DOW FROM {})", expr)
            }
            SqlDialect::Snowflake => format!("EXTRACT(DAYOFWEEK FROM {})", expr),
            SqlDialect::BigQuery => format!("EXTRACT(DAYOFWEEK FROM {}) - 1", expr),
            SqlDialect::MySql => format!("DAYOFWEEK({}) - 1", expr),
            SqlDialect::Athena => format!("MOD(day_of_week({}), 7)", expr),
        }
    }

    pub fn day_of_year(self, expr: &str) -> String {
        match self {
            SqlDialect::Postgres | SqlDialect::Redshift | SqlDialect::DuckDB => {
                format!("EXTRACT(DOY FROM {})", expr)
            }
            SqlDialect::Snowflake | SqlDialect::BigQuery => format!("EXTRACT(DAYOFYEAR FROM {})", expr),
            SqlDialect::MySql => format!("DAYOFYEAR({})", expr),
            SqlDialect::Athena => format!("day_of_year({})", expr),
        }
    }

    pub fn iso_week(self, expr: &str) -> String {
        match self {
            SqlDialect::Postgres | SqlDialect::Redshift | SqlDialect::DuckDB => {
                format!("EXTRACT(WEEK FROM {})", expr)
            }
            SqlDialect::Snowflake => format!("WEEKISO({})", expr),
            SqlDialect::BigQuery => format!("EXTRACT(ISOWEEK FROM {})", expr),
            SqlDialect::MySql => format!("WEEK({}, 3)", expr),
            SqlDialect::Athena => format!("week_of_year({})", expr),
        }
    }

    pub fn iso_year(self, expr: &str) -> String {
        match self {
            SqlDialect::Postgres | SqlDialect::DuckDB | SqlDialect::BigQuery => {
                format!("EXTRACT(ISOYEAR FROM {})", expr)
            }
            SqlDialect::Redshift => format!("CAST(TO_CHAR({}, 'IYYY') AS INTEGER)", expr),
            SqlDialect::Snowflake => format!("YEAROFWEEKISO({})", expr),
            SqlDialect::MySql => format!("FLOOR(YEARWEEK({}, 3) / 100)", expr),
            SqlDialect::Athena => format!("year_of_week({})", expr),
        }
    }

    pub fn milliseconds(self, expr: &str) -> String {
        match self {
            SqlDialect::Postgres | SqlDialect::Redshift | SqlDialect::DuckDB => {
                format!("MOD(CAST(EXTRACT(MILLISECONDS FROM {}) AS BIGINT), 1000)", expr)
            }
            SqlDialect::Snowflake => format!("FLOOR(EXTRACT(NANOSECOND FROM {}) / 1000000)", expr),
            SqlDialect::BigQuery => format!("EXTRACT(MILLISECOND FROM {})", expr),
            SqlDialect::MySql => format!("FLOOR(MICROSECOND({}) / 1000)", expr),
            SqlDialect::Athena => format!("millisecond({})", expr),
        }
    }

    /// Render pagination clauses, prefixed with a space when present
    pub fn pagination(self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (self.capabilities().pagination, limit, offset) {
            (_, None, None) => String::new(),
            (Pagination::MySql, Some(limit), Some(offset)) => format!(" LIMIT {}, {}", offset, limit),
            (Pagination::MySql, None, Some(offset)) => format!(" LIMIT {}, {}", offset, u64::MAX),
            (Pagination::OffsetLimit, Some(limit), Some(offset)) => {
                format!(" OFFSET {} LIMIT {}", offset, limit)
            }
            (_, Some(limit), Some(offset)) => format!(" LIMIT {} OFFSET {}", limit, offset),
            (_, Some(limit), None) => format!(" LIMIT {}", limit),
            (_, None, Some(offset)) => format!(" OFFSET {}", offset),
        }
    }
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SqlDialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_ascii_lowercase();
        SqlDialect::ALL
            .iter()
            .copied()
            .find(|d| d.name() == lowered)
            .ok_or_else(|| format!("unknown SQL dialect '{}'", s))
    }
}
