//! Formula evaluator
//!
//! Evaluates a parsed formula in f64. Names resolve through an
//! `EvalContext` that binds every cell reference of the formula to the
//! current value of that cell (or the values of a range).

use std::collections::HashMap;

use super::parser::Expr;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
    Boolean(bool),
    /// Values of a range, blanks included
    Array(Vec<Value>),
    /// Blank cell
    Null,
}

impl Value {
    /// Numeric view; blanks read as 0 the way spreadsheets treat them in arithmetic
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(s) => s.trim().parse().ok(),
            Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Null => Some(0.0),
            Value::Array(_) => None,
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            Value::Text(s) => s.clone(),
            Value::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            Value::Null | Value::Array(_) => String::new(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            Value::Number(n) => Some(*n != 0.0),
            Value::Null => Some(false),
            Value::Text(s) => match s.to_uppercase().as_str() {
                "TRUE" => Some(true),
                "FALSE" => Some(false),
                _ => None,
            },
            Value::Array(_) => None,
        }
    }
}

/// Placeholder bindings for one formula
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    bindings: HashMap<String, Value>,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvalError {
    pub message: String,
}

impl EvalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Eval error: {}", self.message)
    }
}

impl std::error::Error for EvalError {}

pub fn evaluate(expr: &Expr, ctx: &EvalContext) -> Result<Value, EvalError> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Text(s) => Ok(Value::Text(s.clone())),
        Expr::Name(name) => evaluate_name(name, ctx),
        Expr::FunctionCall { name, args } => evaluate_function(name, args, ctx),
        Expr::BinaryOp { op, left, right } => {
            let left_val = evaluate(left, ctx)?;
            let right_val = evaluate(right, ctx)?;
            evaluate_binary_op(op, &left_val, &right_val)
        }
        Expr::UnaryOp { op, operand } => {
            let n = number(&evaluate(operand, ctx)?, "Operand")?;
            match op.as_str() {
                "-" => Ok(Value::Number(-n)),
                "+" => Ok(Value::Number(n)),
                _ => Err(EvalError::new(format!("Unknown unary operator: {}", op))),
            }
        }
    }
}

fn evaluate_name(name: &str, ctx: &EvalContext) -> Result<Value, EvalError> {
    if let Some(value) = ctx.get(name) {
        return Ok(value.clone());
    }
    match name.to_uppercase().as_str() {
        "TRUE" => Ok(Value::Boolean(true)),
        "FALSE" => Ok(Value::Boolean(false)),
        _ => Err(EvalError::new(format!("Unknown name: {}", name))),
    }
}

fn number(value: &Value, what: &str) -> Result<f64, EvalError> {
    value
        .as_number()
        .ok_or_else(|| EvalError::new(format!("{} must be a number", what)))
}

fn evaluate_binary_op(op: &str, left: &Value, right: &Value) -> Result<Value, EvalError> {
    match op {
        "&" => return Ok(Value::Text(format!("{}{}", left.as_text(), right.as_text()))),
        "=" => return Ok(Value::Boolean(values_equal(left, right))),
        "<>" => return Ok(Value::Boolean(!values_equal(left, right))),
        _ => {}
    }

    let l = number(left, "Left operand")?;
    let r = number(right, "Right operand")?;
    let result = match op {
        "+" => Value::Number(l + r),
        "-" => Value::Number(l - r),
        "*" => Value::Number(l * r),
        "/" => {
            if r == 0.0 {
                return Err(EvalError::new("Division by zero"));
            }
            Value::Number(l / r)
        }
        "^" => Value::Number(l.powf(r)),
        "<" => Value::Boolean(l < r),
        ">" => Value::Boolean(l > r),
        "<=" => Value::Boolean(l <= r),
        ">=" => Value::Boolean(l >= r),
        _ => return Err(EvalError::new(format!("Unknown operator: {}", op))),
    };
    Ok(result)
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Text(l), Value::Text(r)) => l.to_lowercase() == r.to_lowercase(),
        (Value::Null, Value::Text(s)) | (Value::Text(s), Value::Null) => s.is_empty(),
        (Value::Boolean(l), Value::Boolean(r)) => l == r,
        (Value::Text(_), _) | (_, Value::Text(_)) => false,
        _ => match (left.as_number(), right.as_number()) {
            (Some(l), Some(r)) => (l - r).abs() < 1e-10,
            _ => false,
        },
    }
}

fn evaluate_function(name: &str, args: &[Expr], ctx: &EvalContext) -> Result<Value, EvalError> {
    let upper_name = name.to_uppercase();

    match upper_name.as_str() {
        // Math
        "ABS" => unary_math(&upper_name, args, ctx, f64::abs),
        "INT" => unary_math(&upper_name, args, ctx, f64::floor),
        "SQRT" => {
            let val = single_number(&upper_name, args, ctx)?;
            if val < 0.0 {
                Err(EvalError::new("SQRT of negative number"))
            } else {
                Ok(Value::Number(val.sqrt()))
            }
        }
        "ROUND" | "ROUNDUP" | "ROUNDDOWN" => {
            require_args_range(&upper_name, args, 1, 2)?;
            let val = number(&evaluate(&args[0], ctx)?, &upper_name)?;
            let decimals = optional_number(args, 1, ctx, 0.0)? as i32;
            let multiplier = 10_f64.powi(decimals);
            let scaled = val.abs() * multiplier;
            let rounded = match upper_name.as_str() {
                "ROUND" => scaled.round(),
                "ROUNDUP" => scaled.ceil(),
                _ => scaled.floor(),
            };
            Ok(Value::Number(val.signum() * rounded / multiplier))
        }
        "CEILING" | "FLOOR" => {
            require_args_range(&upper_name, args, 1, 2)?;
            let val = number(&evaluate(&args[0], ctx)?, &upper_name)?;
            let significance = optional_number(args, 1, ctx, 1.0)?;
            if significance == 0.0 {
                return Ok(Value::Number(0.0));
            }
            let steps = val / significance;
            let steps = if upper_name == "CEILING" {
                steps.ceil()
            } else {
                steps.floor()
            };
            Ok(Value::Number(steps * significance))
        }
        "MOD" => {
            require_args(&upper_name, args, 2)?;
            let num = number(&evaluate(&args[0], ctx)?, "MOD")?;
            let divisor = number(&evaluate(&args[1], ctx)?, "MOD")?;
            if divisor == 0.0 {
                return Err(EvalError::new("MOD division by zero"));
            }
            // Result takes the sign of the divisor
            Ok(Value::Number(num - divisor * (num / divisor).floor()))
        }
        "POWER" => {
            require_args(&upper_name, args, 2)?;
            let base = number(&evaluate(&args[0], ctx)?, "POWER")?;
            let exp = number(&evaluate(&args[1], ctx)?, "POWER")?;
            Ok(Value::Number(base.powf(exp)))
        }

        // Aggregation
        "SUM" => Ok(Value::Number(collect_numeric_values(args, ctx)?.iter().sum())),
        "AVERAGE" => {
            let values = collect_numeric_values(args, ctx)?;
            if values.is_empty() {
                return Err(EvalError::new("AVERAGE of empty set"));
            }
            Ok(Value::Number(
                values.iter().sum::<f64>() / values.len() as f64,
            ))
        }
        "MIN" => {
            let values = collect_numeric_values(args, ctx)?;
            Ok(Value::Number(
                values.into_iter().reduce(f64::min).unwrap_or(0.0),
            ))
        }
        "MAX" => {
            let values = collect_numeric_values(args, ctx)?;
            Ok(Value::Number(
                values.into_iter().reduce(f64::max).unwrap_or(0.0),
            ))
        }
        "COUNT" => Ok(Value::Number(collect_numeric_values(args, ctx)?.len() as f64)),
        "COUNTA" => {
            let mut count = 0;
            for arg in args {
                match evaluate(arg, ctx)? {
                    Value::Array(arr) => {
                        count += arr.iter().filter(|v| !matches!(v, Value::Null)).count();
                    }
                    Value::Null => {}
                    _ => count += 1,
                }
            }
            Ok(Value::Number(count as f64))
        }

        // Logical
        "IF" => {
            require_args_range(&upper_name, args, 2, 3)?;
            let condition = evaluate(&args[0], ctx)?
                .as_bool()
                .ok_or_else(|| EvalError::new("IF condition must be logical"))?;
            if condition {
                evaluate(&args[1], ctx)
            } else if args.len() > 2 {
                evaluate(&args[2], ctx)
            } else {
                Ok(Value::Boolean(false))
            }
        }
        "AND" | "OR" => {
            let mut flags = Vec::with_capacity(args.len());
            for arg in args {
                flags.push(evaluate(arg, ctx)?.as_bool().unwrap_or(false));
            }
            let result = if upper_name == "AND" {
                flags.iter().all(|f| *f)
            } else {
                flags.iter().any(|f| *f)
            };
            Ok(Value::Boolean(result))
        }
        "NOT" => {
            require_args(&upper_name, args, 1)?;
            let val = evaluate(&args[0], ctx)?.as_bool().unwrap_or(false);
            Ok(Value::Boolean(!val))
        }
        "IFERROR" => {
            require_args(&upper_name, args, 2)?;
            match evaluate(&args[0], ctx) {
                Ok(val) => Ok(val),
                Err(_) => evaluate(&args[1], ctx),
            }
        }
        "TRUE" => Ok(Value::Boolean(true)),
        "FALSE" => Ok(Value::Boolean(false)),

        // Text
        "CONCAT" | "CONCATENATE" => {
            let mut result = String::new();
            for arg in args {
                match evaluate(arg, ctx)? {
                    Value::Array(arr) => arr.iter().for_each(|v| result.push_str(&v.as_text())),
                    val => result.push_str(&val.as_text()),
                }
            }
            Ok(Value::Text(result))
        }
        "UPPER" => {
            require_args(&upper_name, args, 1)?;
            Ok(Value::Text(evaluate(&args[0], ctx)?.as_text().to_uppercase()))
        }
        "LOWER" => {
            require_args(&upper_name, args, 1)?;
            Ok(Value::Text(evaluate(&args[0], ctx)?.as_text().to_lowercase()))
        }
        "TRIM" => {
            require_args(&upper_name, args, 1)?;
            let text = evaluate(&args[0], ctx)?.as_text();
            Ok(Value::Text(
                text.split_whitespace().collect::<Vec<_>>().join(" "),
            ))
        }

        _ => Err(EvalError::new(format!("Unknown function: {}", name))),
    }
}

fn require_args(func: &str, args: &[Expr], count: usize) -> Result<(), EvalError> {
    if args.len() != count {
        Err(EvalError::new(format!(
            "{} requires {} argument(s), got {}",
            func,
            count,
            args.len()
        )))
    } else {
        Ok(())
    }
}

fn require_args_range(func: &str, args: &[Expr], min: usize, max: usize) -> Result<(), EvalError> {
    if args.len() < min || args.len() > max {
        Err(EvalError::new(format!(
            "{} requires {}-{} arguments, got {}",
            func,
            min,
            max,
            args.len()
        )))
    } else {
        Ok(())
    }
}

fn single_number(func: &str, args: &[Expr], ctx: &EvalContext) -> Result<f64, EvalError> {
    require_args(func, args, 1)?;
    number(&evaluate(&args[0], ctx)?, func)
}

fn unary_math(
    func: &str,
    args: &[Expr],
    ctx: &EvalContext,
    op: fn(f64) -> f64,
) -> Result<Value, EvalError> {
    Ok(Value::Number(op(single_number(func, args, ctx)?)))
}

/// Argument `idx` as a number, or `default` when it was not given
fn optional_number(
    args: &[Expr],
    idx: usize,
    ctx: &EvalContext,
    default: f64,
) -> Result<f64, EvalError> {
    match args.get(idx) {
        Some(arg) => number(&evaluate(arg, ctx)?, "Argument"),
        None => Ok(default),
    }
}

/// Numbers of all arguments; ranges contribute only their numeric cells
fn collect_numeric_values(args: &[Expr], ctx: &EvalContext) -> Result<Vec<f64>, EvalError> {
    let mut values = Vec::new();

    for arg in args {
        match evaluate(arg, ctx)? {
            Value::Array(arr) => {
                values.extend(arr.iter().filter_map(|v| match v {
                    Value::Number(n) => Some(*n),
                    _ => None,
                }));
            }
            Value::Null => {}
            val => values.push(number(&val, "Argument")?),
        }
    }

    Ok(values)
}
