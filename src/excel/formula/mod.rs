//! f64 formula evaluation used by the recalculation pass
//!
//! Formula bodies arrive with their cell references already replaced by
//! placeholder names; `evaluate_formula` tokenizes, parses and evaluates
//! the body against the placeholder bindings.

pub mod evaluator;
pub mod parser;
pub mod tokenizer;

use thiserror::Error;

pub use evaluator::{EvalContext, EvalError, Value};
pub use parser::{Expr, ParseError};
pub use tokenizer::{Token, TokenizeError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    #[error(transparent)]
    Tokenize(#[from] TokenizeError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Eval(#[from] EvalError),
}

pub fn evaluate_formula(formula: &str, ctx: &EvalContext) -> Result<Value, FormulaError> {
    let tokens = tokenizer::tokenize(formula)?;
    let ast = parser::parse(tokens)?;
    Ok(evaluator::evaluate(&ast, ctx)?)
}
