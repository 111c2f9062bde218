//! Runtime values and the coercions between them.
//!
//! Block programs are dynamically typed: a variable can hold a number, a
//! string, a boolean or a stored coordinate vector, and each block asks for
//! the type it needs. Every coercion here is total: a value that cannot be
//! converted yields `None` ("undefined") instead of an error.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Dynamically typed runtime value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Floating-point number. Integers are stored truncated.
    Number(f64),
    /// Boolean flag.
    Boolean(bool),
    /// UTF-8 text.
    String(String),
    /// Coordinate vector read back from the controller.
    NumberSequence(Vec<f64>),
}

/// Type a block expects its input to be coerced to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpectedType {
    /// Number truncated toward zero.
    Int,
    /// Floating-point number.
    Number,
    /// Text.
    String,
    /// Boolean.
    Boolean,
}

impl Value {
    /// Numeric view: numbers as-is, booleans as 1/0, strings parsed.
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Value::Number(num) => Some(*num),
            Value::Boolean(flag) => Some(if *flag { 1.0 } else { 0.0 }),
            Value::String(text) => parse_float(text),
            Value::NumberSequence(_) => None,
        }
    }

    /// Numeric view truncated toward zero. Non-finite numbers have no
    /// integer form.
    pub fn to_int(&self) -> Option<f64> {
        truncate(self.to_number()?)
    }

    /// Truthiness: non-zero numbers, non-empty strings and sequences.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Number(num) => *num != 0.0,
            Value::Boolean(flag) => *flag,
            Value::String(text) => !text.is_empty(),
            Value::NumberSequence(items) => !items.is_empty(),
        }
    }

    /// Coerce into the expected type; `None` keeps the value unchanged.
    pub fn coerce(self, expected: Option<ExpectedType>) -> Option<Value> {
        match expected {
            None => Some(self),
            Some(ExpectedType::Number) => self.to_number().map(Value::Number),
            Some(ExpectedType::Int) => self.to_int().map(Value::Number),
            Some(ExpectedType::String) => Some(Value::String(self.to_string())),
            Some(ExpectedType::Boolean) => Some(Value::Boolean(self.truthy())),
        }
    }

    /// The contained number, without coercion.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(num) => Some(*num),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(num) => f.write_str(&format_number(*num)),
            Value::Boolean(true) => f.write_str("True"),
            Value::Boolean(false) => f.write_str("False"),
            Value::String(text) => f.write_str(text),
            Value::NumberSequence(items) => {
                f.write_str("[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(&format_number(*item))?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<f64> for Value {
    fn from(num: f64) -> Self {
        Value::Number(num)
    }
}

impl From<bool> for Value {
    fn from(flag: bool) -> Self {
        Value::Boolean(flag)
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::String(text.to_string())
    }
}

impl From<Vec<f64>> for Value {
    fn from(items: Vec<f64>) -> Self {
        Value::NumberSequence(items)
    }
}

/// Render a number the way operators see it in the console: integral values
/// keep one decimal (`3.0`), everything else uses the shortest round-trip
/// form. Magnitudes outside `[1e-4, 1e16)` switch to exponent notation with
/// a signed two-digit exponent (`1e+16`, `2.5e-05`).
pub fn format_number(num: f64) -> String {
    if num.is_nan() {
        "nan".to_string()
    } else if num.is_infinite() {
        if num > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if num != 0.0 && !(1e-4..1e16).contains(&num.abs()) {
        format_exponent(num)
    } else if num.fract() == 0.0 {
        format!("{:.1}", num)
    } else {
        format!("{}", num)
    }
}

fn format_exponent(num: f64) -> String {
    let formatted = format!("{:e}", num);
    let Some((mantissa, exponent)) = formatted.split_once('e') else {
        return formatted;
    };
    let (sign, digits) = match exponent.strip_prefix('-') {
        Some(digits) => ('-', digits),
        None => ('+', exponent),
    };
    format!("{}e{}{:0>2}", mantissa, sign, digits)
}

/// Parse text as a float, ignoring surrounding whitespace and digit-group
/// underscores. Accepts `inf`/`nan` spellings.
pub fn parse_float(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.contains('_') {
        if trimmed.starts_with('_') || trimmed.ends_with('_') || trimmed.contains("__") {
            return None;
        }
        return trimmed.replace('_', "").parse().ok();
    }
    trimmed.parse().ok()
}

/// Truncate toward zero; `None` for non-finite input.
pub fn truncate(num: f64) -> Option<f64> {
    if num.is_finite() {
        Some(num.trunc())
    } else {
        None
    }
}

/// Comparison operator of an `if_variable_compare` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOperator {
    /// Equal.
    Eq,
    /// Not equal.
    Neq,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
}

impl CompareOperator {
    /// Parse the block's operator tag (`EQ`, `NEQ`, `LT`, `LTE`, `GT`, `GTE`).
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim() {
            "EQ" => Some(CompareOperator::Eq),
            "NEQ" => Some(CompareOperator::Neq),
            "LT" => Some(CompareOperator::Lt),
            "LTE" => Some(CompareOperator::Lte),
            "GT" => Some(CompareOperator::Gt),
            "GTE" => Some(CompareOperator::Gte),
            _ => None,
        }
    }

    /// Mathematical symbol used in log lines.
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOperator::Eq => "=",
            CompareOperator::Neq => "≠",
            CompareOperator::Lt => "<",
            CompareOperator::Lte => "≤",
            CompareOperator::Gt => ">",
            CompareOperator::Gte => "≥",
        }
    }

    fn holds(self, ordering: Option<Ordering>) -> bool {
        match self {
            CompareOperator::Eq => ordering == Some(Ordering::Equal),
            CompareOperator::Neq => ordering != Some(Ordering::Equal),
            CompareOperator::Lt => ordering == Some(Ordering::Less),
            CompareOperator::Lte => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
            CompareOperator::Gt => ordering == Some(Ordering::Greater),
            CompareOperator::Gte => {
                matches!(ordering, Some(Ordering::Greater | Ordering::Equal))
            }
        }
    }
}

/// Compare two (possibly undefined) values.
///
/// When both sides have a numeric view the comparison is numeric; otherwise
/// both are rendered as text (undefined as the empty string) and compared
/// lexicographically. NaN compares unequal to everything.
pub fn compare_values(left: Option<&Value>, right: Option<&Value>, op: CompareOperator) -> bool {
    let numeric = (
        left.and_then(Value::to_number),
        right.and_then(Value::to_number),
    );
    let ordering = match numeric {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => {
            let a = left.map(Value::to_string).unwrap_or_default();
            let b = right.map(Value::to_string).unwrap_or_default();
            Some(a.cmp(&b))
        }
    };
    op.holds(ordering)
}
