use serde_json::Value as JsonValue;

use crate::robot::gateway::{CoordinateFrame, PositionFrame};

/// Leaf expression evaluated when its step runs.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Literal with an optional declared type.
    Literal {
        /// Declared `valueType`; `None` behaves like a string literal.
        value_type: Option<LiteralType>,
        /// Raw literal as written by the editor.
        value: JsonValue,
    },
    /// Reference to a runtime variable.
    Variable {
        /// Variable name (trimmed).
        name: String,
    },
    /// Expression object with an unknown or missing `kind`.
    Unsupported(JsonValue),
}

/// Declared type of a literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiteralType {
    /// `number`
    Number,
    /// `boolean`
    Boolean,
    /// `string`
    String,
    /// Any other tag; the raw value is passed through.
    Other(String),
}

/// Target of a `set_servo_state` step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServoTarget {
    /// Lock (power off).
    Lock,
    /// Unlock (power on).
    Unlock,
}

/// How `go_home` reaches the home pose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HomeMode {
    /// Command all-zero joint targets.
    Manual,
    /// Use the controller's homing routine.
    Library,
}

/// Predicate of an `if_condition` step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionKind {
    /// Compare the connection flag.
    IsConnected,
    /// Compare the servo-lock flag.
    ServoLocked,
    /// Unrecognised predicate tag.
    Unsupported(Option<String>),
}

/// Condition evaluated by `if_condition`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    /// Which flag to inspect.
    pub kind: ConditionKind,
    /// Value the flag must have for the true branch to run.
    pub expected: bool,
}

/// Optional cartesian target components for `move_linear_absolute`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CartesianTarget {
    /// X
    pub x: Option<Expression>,
    /// Y
    pub y: Option<Expression>,
    /// Z
    pub z: Option<Expression>,
    /// Rotation about X
    pub rx: Option<Expression>,
    /// Rotation about Y
    pub ry: Option<Expression>,
    /// Rotation about Z
    pub rz: Option<Expression>,
}

impl CartesianTarget {
    /// Components paired with their field names, in submit order.
    pub fn fields(&self) -> [(&'static str, Option<&Expression>); 6] {
        [
            ("x", self.x.as_ref()),
            ("y", self.y.as_ref()),
            ("z", self.z.as_ref()),
            ("rx", self.rx.as_ref()),
            ("ry", self.ry.as_ref()),
            ("rz", self.rz.as_ref()),
        ]
    }
}

/// One block of a program.
///
/// Index-like parameters (`joint`, `axis`) are kept as raw JSON: the editor
/// may emit them as numbers or strings and their validation is part of the
/// step's own diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Connect to the controller; blank fields fall back to the configuration.
    ConnectRobot {
        /// Controller address.
        ip: String,
        /// Controller port.
        port: String,
        /// Robot name.
        name: String,
    },
    /// Disconnect from the controller.
    DisconnectRobot,
    /// Lock or unlock the servos.
    SetServoState {
        /// Requested state.
        state: ServoTarget,
    },
    /// Change the speed setting.
    SetSpeed {
        /// New speed; the current one is kept when undefined.
        value: Option<Expression>,
    },
    /// Assign a runtime variable.
    SetVariable {
        /// Variable name (trimmed).
        name: String,
        /// Assigned value.
        value: Option<Expression>,
    },
    /// Write a message to the console.
    Print {
        /// Message to print.
        message: Option<Expression>,
    },
    /// Jog a joint by a relative angle.
    JogJoint {
        /// Joint index (0-5).
        joint: JsonValue,
        /// Signed delta.
        delta: Option<Expression>,
    },
    /// Jog along a cartesian axis.
    JogLinear {
        /// Axis (`0`/`1`/`2` or `x`/`y`/`z`).
        axis: JsonValue,
        /// Signed delta.
        delta: Option<Expression>,
    },
    /// Move one joint to an absolute angle.
    MoveJointAbsolute {
        /// Joint index (0-5).
        joint: JsonValue,
        /// Target angle.
        angle: Option<Expression>,
    },
    /// Move to an absolute cartesian pose; unset components keep their value.
    MoveLinearAbsolute {
        /// Frame name (`tool`, `origin`, `base`).
        mode: String,
        /// Target components.
        target: CartesianTarget,
    },
    /// Return to the home pose.
    GoHome {
        /// Homing strategy.
        mode: HomeMode,
    },
    /// Pause execution.
    Delay {
        /// Seconds to wait.
        duration: Option<Expression>,
    },
    /// Run `body` a fixed number of times.
    RepeatLoop {
        /// Iteration count.
        count: Option<Expression>,
        /// Loop body.
        body: Vec<Step>,
    },
    /// Branch on the connection or servo state.
    IfCondition {
        /// Predicate.
        condition: Condition,
        /// Steps run when the predicate holds.
        true_branch: Vec<Step>,
        /// Steps run otherwise.
        false_branch: Vec<Step>,
    },
    /// Branch on a variable comparison.
    IfVariableCompare {
        /// Variable name (trimmed).
        name: String,
        /// Operator tag (`EQ`, `NEQ`, ...).
        operator: String,
        /// Comparison value.
        value: Option<Expression>,
        /// Steps run when the comparison holds.
        true_branch: Vec<Step>,
        /// Steps run otherwise.
        false_branch: Vec<Step>,
    },
    /// Read the current position, optionally storing it in a variable.
    GetCoordinates {
        /// Frame to read.
        source: PositionFrame,
        /// Variable to store into; empty only reports.
        store: String,
    },
    /// Step with an unrecognised `type`.
    Unknown {
        /// The tag as written, if any.
        tag: Option<String>,
    },
}

impl Step {
    /// The step's `type` tag.
    pub fn tag(&self) -> &str {
        match self {
            Step::ConnectRobot { .. } => "connect_robot",
            Step::DisconnectRobot => "disconnect_robot",
            Step::SetServoState { .. } => "set_servo_state",
            Step::SetSpeed { .. } => "set_speed",
            Step::SetVariable { .. } => "set_variable",
            Step::Print { .. } => "print",
            Step::JogJoint { .. } => "jog_joint",
            Step::JogLinear { .. } => "jog_linear",
            Step::MoveJointAbsolute { .. } => "move_joint_absolute",
            Step::MoveLinearAbsolute { .. } => "move_linear_absolute",
            Step::GoHome { .. } => "go_home",
            Step::Delay { .. } => "delay",
            Step::RepeatLoop { .. } => "repeat_loop",
            Step::IfCondition { .. } => "if_condition",
            Step::IfVariableCompare { .. } => "if_variable_compare",
            Step::GetCoordinates { .. } => "get_coordinates",
            Step::Unknown { tag } => tag.as_deref().unwrap_or("<missing>"),
        }
    }

    /// Nested step sequences owned by this step.
    pub fn children(&self) -> Vec<&[Step]> {
        match self {
            Step::RepeatLoop { body, .. } => vec![body.as_slice()],
            Step::IfCondition {
                true_branch,
                false_branch,
                ..
            }
            | Step::IfVariableCompare {
                true_branch,
                false_branch,
                ..
            } => vec![true_branch.as_slice(), false_branch.as_slice()],
            _ => Vec::new(),
        }
    }

    /// Whether the step commands robot motion.
    pub fn is_motion(&self) -> bool {
        matches!(
            self,
            Step::JogJoint { .. }
                | Step::JogLinear { .. }
                | Step::MoveJointAbsolute { .. }
                | Step::MoveLinearAbsolute { .. }
                | Step::GoHome { .. }
        )
    }
}

/// Total number of steps in a tree, nested bodies included.
pub fn count_steps(steps: &[Step]) -> usize {
    steps
        .iter()
        .map(|step| {
            1 + step
                .children()
                .into_iter()
                .map(count_steps)
                .sum::<usize>()
        })
        .sum()
}

/// Frame selected by a `get_coordinates` mode string; unknown modes read the
/// tool frame.
pub fn coordinate_source(mode: &str) -> PositionFrame {
    let mode = mode.trim().to_ascii_lowercase();
    if mode == "joint" {
        PositionFrame::Joint
    } else {
        PositionFrame::Cartesian(CoordinateFrame::parse(&mode).unwrap_or(CoordinateFrame::Tool))
    }
}
