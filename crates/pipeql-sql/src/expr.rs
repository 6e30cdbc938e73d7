//! Formula and condition compilers for SQL

use pipeql_ast::infer_type;
use pipeql_ir::{
    parse_date_literal, ComparisonOperator, Condition, DateAnchor, DateBoundOperator, DateBoundValue,
    DateUnit, Formula, FormulaOp, InclusionOperator, LogicalType, MatchOperator, NullOperator,
    StepError, TableMetadata, Value,
};

use crate::SqlDialect;

/// Compile a formula AST into a SQL expression. Division and modulo never
/// raise: a zero or null divisor yields null.
pub fn compile_formula(dialect: SqlDialect, formula: &Formula, schema: &TableMetadata) -> Result<String, StepError> {
    match formula {
        Formula::Constant { value } => Ok(dialect.literal(value)),
        Formula::Column { name } => {
            schema.require(name)?;
            Ok(dialect.quote_identifier(name))
        }
        Formula::Operation { op, left, right } => {
            let l = compile_formula(dialect, left, schema)?;
            let r = compile_formula(dialect, right, schema)?;
            Ok(match op {
                FormulaOp::Div => format!(
                    "({} / NULLIF({}, 0))",
                    dialect.cast(&l, LogicalType::Float),
                    r
                ),
                FormulaOp::Mod => dialect.modulo(&l, &r),
                FormulaOp::Add if is_text(left, schema) || is_text(right, schema) => {
                    format!("({})", dialect.concat(&[l, r]))
                }
                other => format!("({} {} {})", l, other.symbol(), r),
            })
        }
    }
}

fn is_text(formula: &Formula, schema: &TableMetadata) -> bool {
    infer_type(formula, &|name| schema.type_of(name)) == LogicalType::Text
}

/// Right-hand side of a comparison, typed after the column it is compared with
fn comparison_literal(dialect: SqlDialect, column_type: LogicalType, value: &Value) -> String {
    if let (LogicalType::Date, Value::String(text)) = (column_type, value) {
        if let Some(date) = parse_date_literal(text) {
            return dialect.cast(
                &dialect.string_literal(&date.format("%Y-%m-%d %H:%M:%S").to_string()),
                LogicalType::Date,
            );
        }
    }
    dialect.literal(value)
}

fn date_bound_expr(dialect: SqlDialect, value: &DateBoundValue) -> Result<String, StepError> {
    match value {
        DateBoundValue::Date(date) => Ok(dialect.date_literal(*date)),
        DateBoundValue::Relative(relative) => match relative.date {
            DateAnchor::Today => Ok(dialect.add_interval(
                &dialect.current_date(),
                &relative.quantity.to_string(),
                relative.duration,
            )),
            DateAnchor::Date(_) => relative
                .resolve()
                .map(|date| dialect.date_literal(date))
                .ok_or_else(|| StepError::InvalidStep("relative date out of range".to_string())),
        },
    }
}

/// Compile a condition tree into a boolean SQL expression
pub fn compile_condition(dialect: SqlDialect, condition: &Condition, schema: &TableMetadata) -> Result<String, StepError> {
    match condition {
        Condition::Comparison { column, operator, value } => {
            let meta = schema.require(column)?;
            let col = dialect.quote_identifier(column);
            if *value == Value::Null {
                match operator {
                    ComparisonOperator::Eq => return Ok(format!("{} IS NULL", col)),
                    ComparisonOperator::Ne => return Ok(format!("{} IS NOT NULL", col)),
                    _ => {}
                }
            }
            Ok(format!(
                "{} {} {}",
                col,
                operator.sql_symbol(),
                comparison_literal(dialect, meta.logical_type, value)
            ))
        }
        Condition::Inclusion { column, operator, values } => {
            let meta = schema.require(column)?;
            let col = dialect.quote_identifier(column);
            if values.is_empty() {
                return Ok(match operator {
                    InclusionOperator::In => "1 = 0".to_string(),
                    InclusionOperator::NotIn => "1 = 1".to_string(),
                });
            }
            let list: Vec<String> = values
                .iter()
                .map(|v| comparison_literal(dialect, meta.logical_type, v))
                .collect();
            let keyword = match operator {
                InclusionOperator::In => "IN",
                InclusionOperator::NotIn => "NOT IN",
            };
            Ok(format!("{} {} ({})", col, keyword, list.join(", ")))
        }
        Condition::Null { column, operator } => {
            schema.require(column)?;
            let col = dialect.quote_identifier(column);
            Ok(match operator {
                NullOperator::IsNull => format!("{} IS NULL", col),
                NullOperator::NotNull => format!("{} IS NOT NULL", col),
            })
        }
        Condition::Match { column, operator, pattern } => {
            schema.require(column)?;
            Ok(dialect.regex_predicate(
                &dialect.quote_identifier(column),
                pattern,
                *operator == MatchOperator::NotMatches,
            ))
        }
        Condition::DateBound { column, operator, value } => {
            schema.require(column)?;
            let col = dialect.date_trunc(DateUnit::Day, &dialect.quote_identifier(column));
            let bound = dialect.date_trunc(DateUnit::Day, &date_bound_expr(dialect, value)?);
            let symbol = match operator {
                DateBoundOperator::From => ">=",
                DateBoundOperator::Until => "<=",
            };
            Ok(format!("{} {} {}", col, symbol, bound))
        }
        Condition::And(items) => combine(dialect, items, "AND", schema),
        Condition::Or(items) => combine(dialect, items, "OR", schema),
    }
}

fn combine(dialect: SqlDialect, items: &[Condition], keyword: &str, schema: &TableMetadata) -> Result<String, StepError> {
    if items.is_empty() {
        return Ok(if keyword == "AND" { "1 = 1" } else { "1 = 0" }.to_string());
    }
    let parts = items
        .iter()
        .map(|c| compile_condition(dialect, c, schema))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!("({})", parts.join(&format!(" {} ", keyword))))
}
