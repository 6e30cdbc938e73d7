//! Pest-based parser for arithmetic formulas

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use thiserror::Error;

use pipeql_ir::{Formula, FormulaOp, StepError, Value};

#[derive(Parser)]
#[grammar = "formula.pest"]
pub struct FormulaParser;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Syntax error: {0}")]
    Syntax(String),

    #[error("Pest error: {0}")]
    Pest(#[from] Box<pest::error::Error<Rule>>),
}

impl ParseError {
    /// Attach the formula text and turn into a step failure
    pub fn into_step_error(self, formula: &str) -> StepError {
        let reason = match self {
            ParseError::Syntax(reason) => reason,
            ParseError::Pest(err) => err.variant.message().to_string(),
        };
        StepError::InvalidFormula {
            formula: formula.to_string(),
            reason,
        }
    }
}

/// Parse formula text into its AST
pub fn parse(source: &str) -> Result<Formula, ParseError> {
    let mut pairs = FormulaParser::parse(Rule::formula, source).map_err(Box::new)?;
    let formula = pairs
        .next()
        .ok_or_else(|| ParseError::Syntax("Empty input".to_string()))?;
    let expr = formula
        .into_inner()
        .find(|p| p.as_rule() == Rule::expr)
        .ok_or_else(|| ParseError::Syntax("Empty formula".to_string()))?;
    parse_expr(expr)
}

/// Parse and report failures as `StepError::InvalidFormula`
pub fn parse_formula(source: &str) -> Result<Formula, StepError> {
    parse(source).map_err(|e| e.into_step_error(source))
}

fn parse_expr(pair: Pair<Rule>) -> Result<Formula, ParseError> {
    match pair.as_rule() {
        Rule::expr | Rule::term => {
            // Flat sequence: operand (operator operand)*
            let mut inner = pair.into_inner();
            let first = inner
                .next()
                .ok_or_else(|| ParseError::Syntax("Empty expression".to_string()))?;
            let mut left = parse_expr(first)?;

            while let Some(op_pair) = inner.next() {
                let op = match op_pair.as_str() {
                    "+" => FormulaOp::Add,
                    "-" => FormulaOp::Sub,
                    "*" => FormulaOp::Mul,
                    "/" => FormulaOp::Div,
                    "%" => FormulaOp::Mod,
                    other => return Err(ParseError::Syntax(format!("Unknown operator: {}", other))),
                };
                let right_pair = inner
                    .next()
                    .ok_or_else(|| ParseError::Syntax("Missing right operand".to_string()))?;
                let right = parse_expr(right_pair)?;
                left = Formula::operation(op, left, right);
            }

            Ok(left)
        }
        Rule::unary => {
            let mut negations = 0usize;
            let mut operand = None;
            for inner in pair.into_inner() {
                match inner.as_rule() {
                    Rule::neg => negations += 1,
                    _ => operand = Some(parse_expr(inner)?),
                }
            }
            let operand = operand.ok_or_else(|| ParseError::Syntax("Missing operand".to_string()))?;
            Ok(if negations % 2 == 0 {
                operand
            } else {
                negate(operand)
            })
        }
        Rule::number => parse_number(pair.as_str()),
        Rule::string => {
            let text = pair
                .into_inner()
                .next()
                .map(|p| p.as_str().to_string())
                .unwrap_or_default();
            Ok(Formula::constant(Value::String(text)))
        }
        Rule::bracket_column => {
            let name = pair
                .into_inner()
                .next()
                .ok_or_else(|| ParseError::Syntax("Empty column reference".to_string()))?;
            Ok(Formula::column(name.as_str()))
        }
        Rule::column => Ok(Formula::column(pair.as_str())),
        other => Err(ParseError::Syntax(format!("Cannot parse expr: {:?}", other))),
    }
}

fn parse_number(text: &str) -> Result<Formula, ParseError> {
    let is_float = text.contains(['.', 'e', 'E']);
    if !is_float {
        if let Ok(i) = text.parse::<i64>() {
            return Ok(Formula::constant(Value::Int(i)));
        }
    }
    text.parse::<f64>()
        .map(|f| Formula::constant(Value::Float(f)))
        .map_err(|e| ParseError::Syntax(format!("Invalid number '{}': {}", text, e)))
}

/// Unary minus folds into numeric literals, otherwise becomes `0 - expr`
fn negate(operand: Formula) -> Formula {
    match operand {
        Formula::Constant { value: Value::Int(i) } => Formula::constant(Value::Int(-i)),
        Formula::Constant { value: Value::Float(f) } => Formula::constant(Value::Float(-f)),
        other => Formula::operation(FormulaOp::Sub, Formula::constant(Value::Int(0)), other),
    }
}
