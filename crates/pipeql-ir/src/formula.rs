//! Arithmetic formula AST

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormulaOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl FormulaOp {
    pub fn symbol(self) -> &'static str {
        match self {
            FormulaOp::Add => "+",
            FormulaOp::Sub => "-",
            FormulaOp::Mul => "*",
            FormulaOp::Div => "/",
            FormulaOp::Mod => "%",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Formula {
    Constant { value: Value },
    Column { name: String },
    Operation {
        op: FormulaOp,
        left: Box<Formula>,
        right: Box<Formula>,
    },
}

impl Formula {
    pub fn constant(value: impl Into<Value>) -> Self {
        Formula::Constant { value: value.into() }
    }

    pub fn column(name: impl Into<String>) -> Self {
        Formula::Column { name: name.into() }
    }

    pub fn operation(op: FormulaOp, left: Formula, right: Formula) -> Self {
        Formula::Operation {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Referenced column names in left-to-right order, duplicates kept
    pub fn columns(&self) -> Vec<&str> {
        match self {
            Formula::Constant { .. } => Vec::new(),
            Formula::Column { name } => vec![name.as_str()],
            Formula::Operation { left, right, .. } => {
                let mut columns = left.columns();
                columns.extend(right.columns());
                columns
            }
        }
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::Constant { value: Value::String(s) } => write!(f, "'{}'", s),
            Formula::Constant { value } => write!(f, "{}", value.label()),
            Formula::Column { name } => write!(f, "[{}]", name),
            Formula::Operation { op, left, right } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_and_display() {
        let formula = Formula::operation(
            FormulaOp::Div,
            Formula::column("a b"),
            Formula::operation(FormulaOp::Add, Formula::column("c"), Formula::constant(1i64)),
        );
        assert_eq!(formula.columns(), vec!["a b", "c"]);
        assert_eq!(formula.to_string(), "([a b] / ([c] + 1))");
    }
}
