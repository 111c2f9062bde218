//! Decoding of the JSON program emitted by the block editor.
//!
//! Decoding is lenient by design of the program format: unknown fields are
//! ignored, unknown step types become [`Step::Unknown`], and missing or
//! mistyped fields become `None`/defaults so that the step itself can report
//! the problem when it runs. Only a document that is not a non-empty JSON
//! array is rejected.

use serde_json::{Map, Value as JsonValue};

use super::ast::{
    CartesianTarget, Condition, ConditionKind, Expression, HomeMode, LiteralType, ServoTarget,
    Step, coordinate_source,
};
use super::{ProgramError, Result};

type Object = Map<String, JsonValue>;

/// Parse program text into its step tree.
pub fn parse_program(source: &str) -> Result<Vec<Step>> {
    let document: JsonValue = serde_json::from_str(source)?;
    parse_program_value(&document)
}

/// Decode an already-parsed JSON document.
pub fn parse_program_value(document: &JsonValue) -> Result<Vec<Step>> {
    let items = document.as_array().ok_or(ProgramError::NotAnArray)?;
    if items.is_empty() {
        return Err(ProgramError::Empty);
    }
    Ok(parse_steps(items))
}

fn parse_steps(items: &[JsonValue]) -> Vec<Step> {
    items.iter().map(parse_step).collect()
}

/// Decode a single step object.
pub fn parse_step(value: &JsonValue) -> Step {
    let Some(obj) = value.as_object() else {
        return Step::Unknown { tag: None };
    };

    let tag = obj.get("type").and_then(JsonValue::as_str);
    match tag {
        Some("connect_robot") => Step::ConnectRobot {
            ip: text_field(obj, "ip"),
            port: text_field(obj, "port"),
            name: text_field(obj, "name"),
        },
        Some("disconnect_robot") => Step::DisconnectRobot,
        Some("set_servo_state") => Step::SetServoState {
            state: match obj.get("state").and_then(JsonValue::as_str) {
                Some("unlock") => ServoTarget::Unlock,
                _ => ServoTarget::Lock,
            },
        },
        Some("set_speed") => Step::SetSpeed {
            value: expr_field(obj, "value"),
        },
        Some("set_variable") => Step::SetVariable {
            name: text_field(obj, "name"),
            value: expr_field(obj, "value"),
        },
        Some("print") => Step::Print {
            message: expr_field(obj, "message"),
        },
        Some("jog_joint") => Step::JogJoint {
            joint: raw_field(obj, "joint"),
            delta: expr_field(obj, "delta"),
        },
        Some("jog_linear") => Step::JogLinear {
            axis: raw_field(obj, "axis"),
            delta: expr_field(obj, "delta"),
        },
        Some("move_joint_absolute") => Step::MoveJointAbsolute {
            joint: raw_field(obj, "joint"),
            angle: expr_field(obj, "angle"),
        },
        Some("move_linear_absolute") => Step::MoveLinearAbsolute {
            mode: string_or(obj, "mode", "tool"),
            target: CartesianTarget {
                x: expr_field(obj, "x"),
                y: expr_field(obj, "y"),
                z: expr_field(obj, "z"),
                rx: expr_field(obj, "rx"),
                ry: expr_field(obj, "ry"),
                rz: expr_field(obj, "rz"),
            },
        },
        Some("go_home") => Step::GoHome {
            mode: match obj.get("mode").and_then(JsonValue::as_str) {
                Some("library") => HomeMode::Library,
                _ => HomeMode::Manual,
            },
        },
        Some("delay") => Step::Delay {
            duration: expr_field(obj, "duration"),
        },
        Some("repeat_loop") => Step::RepeatLoop {
            count: expr_field(obj, "count"),
            body: steps_field(obj, "body"),
        },
        Some("if_condition") => parse_if_condition(obj),
        Some("if_variable_compare") => Step::IfVariableCompare {
            name: text_field(obj, "name"),
            operator: string_or(obj, "operator", "EQ"),
            value: expr_field(obj, "value"),
            true_branch: steps_field(obj, "true_branch"),
            false_branch: steps_field(obj, "false_branch"),
        },
        Some("get_coordinates") => Step::GetCoordinates {
            source: coordinate_source(&string_or(obj, "mode", "joint")),
            store: text_field(obj, "store"),
        },
        other => Step::Unknown {
            tag: other
                .map(str::to_string)
                .or_else(|| obj.get("type").map(JsonValue::to_string)),
        },
    }
}

/// The block editor nests the branches inside the condition object; newer
/// programs put them on the step itself. The step-level keys win.
fn parse_if_condition(obj: &Object) -> Step {
    let empty = Object::new();
    let condition = obj
        .get("condition")
        .and_then(JsonValue::as_object)
        .unwrap_or(&empty);

    let kind = match condition.get("type").and_then(JsonValue::as_str) {
        Some("is_connected") => ConditionKind::IsConnected,
        Some("servo_locked") => ConditionKind::ServoLocked,
        other => ConditionKind::Unsupported(other.map(str::to_string)),
    };
    let expected = condition.get("value").map(json_truthy).unwrap_or(true);

    let branch = |key: &str| {
        if obj.get(key).is_some_and(|v| !v.is_null()) {
            steps_field(obj, key)
        } else {
            steps_field(condition, key)
        }
    };

    Step::IfCondition {
        condition: Condition { kind, expected },
        true_branch: branch("true_branch"),
        false_branch: branch("false_branch"),
    }
}

/// Decode an expression object. `null`/missing means "absent".
pub fn parse_expression(value: &JsonValue) -> Option<Expression> {
    if value.is_null() {
        return None;
    }
    let Some(obj) = value.as_object() else {
        return Some(Expression::Unsupported(value.clone()));
    };

    match obj.get("kind").and_then(JsonValue::as_str) {
        Some("literal") => {
            let value_type = match obj.get("valueType") {
                None | Some(JsonValue::Null) => None,
                Some(JsonValue::String(tag)) => Some(match tag.as_str() {
                    "number" => LiteralType::Number,
                    "boolean" => LiteralType::Boolean,
                    "string" => LiteralType::String,
                    other => LiteralType::Other(other.to_string()),
                }),
                Some(other) => Some(LiteralType::Other(other.to_string())),
            };
            Some(Expression::Literal {
                value_type,
                value: obj.get("value").cloned().unwrap_or(JsonValue::Null),
            })
        }
        Some("variable") => Some(Expression::Variable {
            name: text_field(obj, "name"),
        }),
        _ => Some(Expression::Unsupported(value.clone())),
    }
}

fn expr_field(obj: &Object, key: &str) -> Option<Expression> {
    obj.get(key).and_then(parse_expression)
}

fn raw_field(obj: &Object, key: &str) -> JsonValue {
    obj.get(key).cloned().unwrap_or(JsonValue::Null)
}

fn steps_field(obj: &Object, key: &str) -> Vec<Step> {
    match obj.get(key) {
        Some(JsonValue::Array(items)) => parse_steps(items),
        _ => Vec::new(),
    }
}

/// Trimmed text of a scalar field; empty when missing or `null`.
fn text_field(obj: &Object, key: &str) -> String {
    match obj.get(key) {
        Some(JsonValue::String(text)) => text.trim().to_string(),
        Some(JsonValue::Number(num)) => num.to_string(),
        Some(JsonValue::Bool(flag)) => flag.to_string(),
        _ => String::new(),
    }
}

fn string_or(obj: &Object, key: &str, default: &str) -> String {
    obj.get(key)
        .and_then(JsonValue::as_str)
        .unwrap_or(default)
        .to_string()
}

/// JSON truthiness: `null`, `false`, `0`, `""`, `[]` and `{}` are false.
pub fn json_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(flag) => *flag,
        JsonValue::Number(num) => num.as_f64().is_some_and(|n| n != 0.0),
        JsonValue::String(text) => !text.is_empty(),
        JsonValue::Array(items) => !items.is_empty(),
        JsonValue::Object(map) => !map.is_empty(),
    }
}
