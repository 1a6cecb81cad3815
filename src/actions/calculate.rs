//! Local arithmetic for the `calculate` action.
//!
//! Works on plain numbers and on unit-suffixed quantities such as `512Mi` or
//! `250m`, which is what resource limits look like once a template has pulled
//! them out of an earlier step's output.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

use super::{ActionError, ActionResult};
use crate::runbook::Params;

static QUANTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(-?\d+(?:\.\d+)?)\s*([A-Za-z%]*)\s*$").expect("quantity pattern is valid")
});

/// Supported operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Multiply,
    Divide,
    Add,
    Subtract,
    PercentIncrease,
}

impl Operation {
    fn parse(name: &str) -> ActionResult<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "multiply" | "mul" | "*" => Ok(Self::Multiply),
            "divide" | "div" | "/" => Ok(Self::Divide),
            "add" | "+" => Ok(Self::Add),
            "subtract" | "sub" | "-" => Ok(Self::Subtract),
            "percent_increase" | "increase_percent" => Ok(Self::PercentIncrease),
            other => Err(ActionError::InvalidParams(format!("unknown operation '{other}'"))),
        }
    }

    fn identity(self) -> f64 {
        match self {
            Self::Multiply | Self::Divide => 1.0,
            Self::Add | Self::Subtract | Self::PercentIncrease => 0.0,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Multiply => "multiply",
            Self::Divide => "divide",
            Self::Add => "add",
            Self::Subtract => "subtract",
            Self::PercentIncrease => "percent_increase",
        }
    }

    fn apply(self, value: f64, operand: f64) -> ActionResult<f64> {
        match self {
            Self::Multiply => Ok(value * operand),
            Self::Divide if operand == 0.0 => {
                Err(ActionError::InvalidParams("division by zero".to_string()))
            }
            Self::Divide => Ok(value / operand),
            Self::Add => Ok(value + operand),
            Self::Subtract => Ok(value - operand),
            Self::PercentIncrease => Ok(value * (1.0 + operand / 100.0)),
        }
    }
}

/// Split a number or quantity string into its numeric part and unit suffix.
fn parse_quantity(value: &Value) -> Option<(f64, String)> {
    match value {
        Value::Number(n) => n.as_f64().map(|v| (v, String::new())),
        Value::String(s) => {
            let caps = QUANTITY.captures(s)?;
            let number = caps[1].parse().ok()?;
            Some((number, caps[2].to_string()))
        }
        _ => None,
    }
}

fn round(value: f64, mode: Option<&str>) -> ActionResult<f64> {
    match mode {
        None => Ok(value),
        Some("ceil" | "up") => Ok(value.ceil()),
        Some("floor" | "down") => Ok(value.floor()),
        Some("nearest" | "round") => Ok(value.round()),
        Some(other) => Err(ActionError::InvalidParams(format!("unknown rounding mode '{other}'"))),
    }
}

/// Whole results stay integral in the output.
fn to_number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        json!(value as i64)
    } else {
        json!(value)
    }
}

/// Run the `calculate` action.
///
/// Params: `value` (number or quantity), `operation` (default `multiply`),
/// `operand` or `factor`, and optional `round` (`ceil`, `floor`, `nearest`).
pub fn calculate(params: &Params) -> ActionResult<Value> {
    let raw = params
        .get("value")
        .ok_or_else(|| ActionError::InvalidParams("value is required".to_string()))?;
    let (value, unit) = parse_quantity(raw)
        .ok_or_else(|| ActionError::InvalidParams(format!("value {raw} is not a number")))?;

    let operation = match params.get("operation").and_then(Value::as_str) {
        Some(name) => Operation::parse(name)?,
        None => Operation::Multiply,
    };

    let operand = match params.get("operand").or_else(|| params.get("factor")) {
        Some(raw) => {
            parse_quantity(raw)
                .ok_or_else(|| ActionError::InvalidParams(format!("operand {raw} is not a number")))?
                .0
        }
        None => operation.identity(),
    };

    let rounding = params.get("round").and_then(Value::as_str);
    let result = round(operation.apply(value, operand)?, rounding)?;
    let number = to_number(result);

    Ok(json!({
        "result": format!("{number}{unit}"),
        "value": number,
        "unit": unit,
        "operation": operation.name(),
    }))
}
