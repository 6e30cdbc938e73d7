//! pipeql formula parser and type inference

mod parser;

pub use parser::{parse, parse_formula, FormulaParser, ParseError, Rule};

use pipeql_ir::{Formula, FormulaOp, LogicalType};

/// Result type of a formula, resolving columns through `column_type`
pub fn infer_type(formula: &Formula, column_type: &dyn Fn(&str) -> LogicalType) -> LogicalType {
    match formula {
        Formula::Constant { value } => value.logical_type(),
        Formula::Column { name } => column_type(name),
        Formula::Operation { op, left, right } => {
            let left = infer_type(left, column_type);
            let right = infer_type(right, column_type);
            if left == LogicalType::Text || right == LogicalType::Text {
                LogicalType::Text
            } else if *op == FormulaOp::Div {
                LogicalType::Float
            } else if left == LogicalType::Float || right == LogicalType::Float {
                LogicalType::Float
            } else if left == LogicalType::Integer && right == LogicalType::Integer {
                LogicalType::Integer
            } else {
                LogicalType::Undefined
            }
        }
    }
}
