//! Evaluation of block expressions into runtime values.
//!
//! `resolve` never fails: absent expressions, undefined variables and
//! impossible coercions all resolve to `None`. Problems worth telling the
//! operator about are handed to the `report` callback.

use serde_json::Value as JsonValue;

use super::ast::{Expression, LiteralType};
use super::parser::json_truthy;
use super::state::RuntimeState;
use super::value::{ExpectedType, Value, format_number, parse_float, truncate};

/// Evaluate `expr` against `state`, coercing to `expected` when given.
pub fn resolve(
    expr: Option<&Expression>,
    state: &RuntimeState,
    expected: Option<ExpectedType>,
    report: &mut dyn FnMut(String),
) -> Option<Value> {
    let expr = expr?;

    match expr {
        Expression::Literal { value_type, value } => match value_type {
            Some(LiteralType::Number) => number_literal(value, expected),
            Some(LiteralType::Boolean) => boolean_literal(json_truthy(value), expected),
            Some(LiteralType::String) | None => text_literal(value, expected),
            Some(LiteralType::Other(tag)) => {
                let Some(raw) = json_to_value(value) else {
                    report(format!("Literal of type '{}' has no usable value", tag));
                    return None;
                };
                raw.coerce(expected)
            }
        },
        Expression::Variable { name } => {
            if name.is_empty() {
                report("Variable reference missing name.".to_string());
                return None;
            }
            match state.get(name) {
                Some(value) => value.clone().coerce(expected),
                None => {
                    report(format!("Variable '{}' is undefined.", name));
                    None
                }
            }
        }
        Expression::Unsupported(raw) => {
            report(format!("Unsupported value expression {}", raw));
            None
        }
    }
}

fn number_literal(raw: &JsonValue, expected: Option<ExpectedType>) -> Option<Value> {
    let number = match raw {
        JsonValue::Number(num) => num.as_f64()?,
        JsonValue::String(text) => parse_float(text)?,
        JsonValue::Bool(flag) => f64::from(u8::from(*flag)),
        _ => return None,
    };

    match expected {
        None | Some(ExpectedType::Number) => Some(Value::Number(number)),
        Some(ExpectedType::Int) => truncate(number).map(Value::Number),
        Some(ExpectedType::String) => Some(Value::String(format_number(number))),
        Some(ExpectedType::Boolean) => Some(Value::Boolean(number != 0.0)),
    }
}

fn boolean_literal(flag: bool, expected: Option<ExpectedType>) -> Option<Value> {
    let as_number = if flag { 1.0 } else { 0.0 };
    Some(match expected {
        None | Some(ExpectedType::Boolean) => Value::Boolean(flag),
        Some(ExpectedType::String) => Value::String(if flag { "True" } else { "False" }.into()),
        Some(ExpectedType::Number) | Some(ExpectedType::Int) => Value::Number(as_number),
    })
}

fn text_literal(raw: &JsonValue, expected: Option<ExpectedType>) -> Option<Value> {
    let text = json_text(raw);
    match expected {
        None | Some(ExpectedType::String) => Some(Value::String(text)),
        Some(ExpectedType::Number) => parse_float(&text).map(Value::Number),
        Some(ExpectedType::Int) => parse_float(&text).and_then(truncate).map(Value::Number),
        Some(ExpectedType::Boolean) => {
            let lowered = text.to_lowercase();
            Some(Value::Boolean(matches!(
                lowered.as_str(),
                "true" | "1" | "yes"
            )))
        }
    }
}

/// Text form of a raw JSON scalar; `null` is empty.
fn json_text(raw: &JsonValue) -> String {
    match raw {
        JsonValue::Null => String::new(),
        JsonValue::String(text) => text.clone(),
        JsonValue::Bool(true) => "True".to_string(),
        JsonValue::Bool(false) => "False".to_string(),
        other => other.to_string(),
    }
}

/// Best-effort conversion of raw JSON into a runtime value.
pub fn json_to_value(raw: &JsonValue) -> Option<Value> {
    match raw {
        JsonValue::Null | JsonValue::Object(_) => None,
        JsonValue::Bool(flag) => Some(Value::Boolean(*flag)),
        JsonValue::Number(num) => num.as_f64().map(Value::Number),
        JsonValue::String(text) => Some(Value::String(text.clone())),
        JsonValue::Array(items) => items
            .iter()
            .map(JsonValue::as_f64)
            .collect::<Option<Vec<_>>>()
            .map(Value::NumberSequence),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn literal(value_type: Option<LiteralType>, value: JsonValue) -> Expression {
        Expression::Literal { value_type, value }
    }

    fn eval(expr: &Expression, expected: Option<ExpectedType>) -> (Option<Value>, Vec<String>) {
        let state = RuntimeState::new();
        let mut reports = Vec::new();
        let value = resolve(Some(expr), &state, expected, &mut |msg| reports.push(msg));
        (value, reports)
    }

    #[test]
    fn absent_expression_is_silent() {
        let mut reports = Vec::new();
        let value = resolve(None, &RuntimeState::new(), None, &mut |msg| reports.push(msg));
        assert_eq!(value, None);
        assert!(reports.is_empty());
    }

    #[test]
    fn number_literal_truncates_toward_zero() {
        let expr = literal(Some(LiteralType::Number), json!(-3.7));
        assert_eq!(eval(&expr, Some(ExpectedType::Int)).0, Some(Value::Number(-3.0)));
        let expr = literal(Some(LiteralType::Number), json!(3.7));
        assert_eq!(eval(&expr, Some(ExpectedType::Int)).0, Some(Value::Number(3.0)));
    }

    #[test]
    fn number_literal_coercions() {
        let expr = literal(Some(LiteralType::Number), json!(0));
        assert_eq!(
            eval(&expr, Some(ExpectedType::Boolean)).0,
            Some(Value::Boolean(false))
        );
        assert_eq!(
            eval(&expr, Some(ExpectedType::String)).0,
            Some(Value::String("0.0".into()))
        );
        let expr = literal(Some(LiteralType::Number), json!("2.5"));
        assert_eq!(eval(&expr, None).0, Some(Value::Number(2.5)));
        let expr = literal(Some(LiteralType::Number), json!("abc"));
        assert_eq!(eval(&expr, None).0, None);
    }

    #[test]
    fn boolean_literal_coercions() {
        let expr = literal(Some(LiteralType::Boolean), json!(true));
        assert_eq!(
            eval(&expr, Some(ExpectedType::String)).0,
            Some(Value::String("True".into()))
        );
        assert_eq!(
            eval(&expr, Some(ExpectedType::Number)).0,
            Some(Value::Number(1.0))
        );
        let expr = literal(Some(LiteralType::Boolean), json!(""));
        assert_eq!(eval(&expr, None).0, Some(Value::Boolean(false)));
    }

    #[test]
    fn string_literal_coercions() {
        let expr = literal(Some(LiteralType::String), json!("YES"));
        assert_eq!(
            eval(&expr, Some(ExpectedType::Boolean)).0,
            Some(Value::Boolean(true))
        );
        let expr = literal(None, json!("12.5"));
        assert_eq!(
            eval(&expr, Some(ExpectedType::Number)).0,
            Some(Value::Number(12.5))
        );
        let expr = literal(None, json!("twelve"));
        assert_eq!(eval(&expr, Some(ExpectedType::Number)).0, None);
        let expr = literal(None, JsonValue::Null);
        assert_eq!(eval(&expr, None).0, Some(Value::String(String::new())));
    }

    #[test]
    fn undefined_variable_reports() {
        let expr = Expression::Variable { name: "n".into() };
        let (value, reports) = eval(&expr, Some(ExpectedType::Number));
        assert_eq!(value, None);
        assert_eq!(reports, vec!["Variable 'n' is undefined.".to_string()]);
    }

    #[test]
    fn variable_coercion_failure_is_undefined() {
        let mut state = RuntimeState::new();
        state.set("pose", Value::NumberSequence(vec![1.0, 2.0]));
        state.set("word", Value::from("hello"));
        let mut reports = Vec::new();

        let pose = Expression::Variable { name: "pose".into() };
        let word = Expression::Variable { name: "word".into() };
        let mut report = |msg: String| reports.push(msg);

        assert_eq!(
            resolve(Some(&pose), &state, Some(ExpectedType::Number), &mut report),
            None
        );
        assert_eq!(
            resolve(Some(&word), &state, Some(ExpectedType::Int), &mut report),
            None
        );
        assert_eq!(
            resolve(Some(&word), &state, None, &mut report),
            Some(Value::from("hello"))
        );
        assert!(reports.is_empty());
    }

    #[test]
    fn unsupported_expression_reports() {
        let expr = Expression::Unsupported(json!({"kind": "math"}));
        let (value, reports) = eval(&expr, None);
        assert_eq!(value, None);
        assert_eq!(reports.len(), 1);
    }

    #[test]
    fn other_literal_types_pass_through() {
        let expr = literal(Some(LiteralType::Other("coords".into())), json!([1, 2.5]));
        assert_eq!(
            eval(&expr, None).0,
            Some(Value::NumberSequence(vec![1.0, 2.5]))
        );
    }
}
