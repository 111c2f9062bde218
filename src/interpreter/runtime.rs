//! Step interpreter.
//!
//! A program is a tree of [`Step`]s executed depth-first in program order.
//! Every nested body receives the same [`RuntimeState`], so there is exactly
//! one variable scope per run. Failures never escape a step: they are turned
//! into diagnostics and execution resumes with the next sibling.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

use super::ProgramError;
use super::ast::{Condition, ConditionKind, Expression, HomeMode, ServoTarget, Step, count_steps};
use super::control::{CancelToken, DelayDriver};
use super::diagnostic::{DiagnosticSink, Diagnostics, Severity, StepContext};
use super::dispatch::{ActionDispatcher, DispatchResult, raw_text};
use super::parser::parse_program;
use super::resolver;
use super::state::RuntimeState;
use super::value::{CompareOperator, ExpectedType, Value, compare_values, format_number};
use crate::robot::gateway::MotionGateway;
use crate::robot::session::RobotSession;

/// Default label of top-level diagnostics.
pub const DEFAULT_CONTEXT_LABEL: &str = "[Blockly]";

/// Whether execution should keep going after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Proceed with the next step.
    Continue,
    /// The cancel token fired; unwind without running anything else.
    Cancelled,
}

/// Outcome of one top-level run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Identifier attached to the run's tracing span.
    pub run_id: Uuid,
    /// Steps started, nested ones included.
    pub steps_executed: usize,
    /// Whether the run stopped because of cancellation.
    pub cancelled: bool,
    /// Variables as they were when the run ended.
    pub variables: RuntimeState,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// End time.
    pub finished_at: DateTime<Utc>,
}

/// Executes block programs against a robot session.
pub struct Interpreter<'a, G> {
    dispatcher: ActionDispatcher<'a, G>,
    diagnostics: Diagnostics<'a>,
    delay: &'a mut dyn DelayDriver,
    cancel: CancelToken,
    label: String,
    steps_executed: usize,
}

impl<'a, G: MotionGateway> Interpreter<'a, G> {
    /// Create an interpreter reporting to `sink` and waiting through `delay`.
    pub fn new(
        session: &'a mut RobotSession<G>,
        sink: &'a mut dyn DiagnosticSink,
        delay: &'a mut dyn DelayDriver,
    ) -> Self {
        Self {
            dispatcher: ActionDispatcher::new(session),
            diagnostics: Diagnostics::new(sink),
            delay,
            cancel: CancelToken::new(),
            label: DEFAULT_CONTEXT_LABEL.to_string(),
            steps_executed: 0,
        }
    }

    /// Use `token` for cooperative cancellation.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Label top-level diagnostics with `label`.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// The session the interpreter drives.
    pub fn session(&self) -> &RobotSession<G> {
        self.dispatcher.session()
    }

    /// Parse and run program text. Parse failures are reported once and
    /// nothing runs.
    pub fn run_json(&mut self, source: &str) -> Result<RunSummary, ProgramError> {
        match parse_program(source) {
            Ok(steps) => Ok(self.run_program(&steps)),
            Err(err) => {
                let label = self.label.clone();
                let message = match &err {
                    ProgramError::Empty => "Program is empty.".to_string(),
                    other => format!("Failed to parse program: {}", other),
                };
                self.diagnostics.emit_run(Severity::Error, &label, message);
                Err(err)
            }
        }
    }

    /// Run a program with a fresh variable state.
    pub fn run_program(&mut self, steps: &[Step]) -> RunSummary {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("program_run", %run_id, steps = count_steps(steps));
        let _guard = span.enter();

        let label = self.label.clone();
        let started_at = Utc::now();
        let mut variables = RuntimeState::new();
        self.steps_executed = 0;

        self.diagnostics.emit_run(
            Severity::Info,
            &label,
            format!("Running program with {} step(s)", steps.len()),
        );
        let cancelled = self.run_steps(steps, &mut variables, &label) == Flow::Cancelled;
        tracing::info!(
            steps_executed = self.steps_executed,
            variables = variables.len(),
            cancelled,
            "program run finished"
        );
        if cancelled {
            self.diagnostics
                .emit_run(Severity::Warning, &label, "Program cancelled.");
        } else {
            self.diagnostics
                .emit_run(Severity::Info, &label, "Program finished.");
        }

        RunSummary {
            run_id,
            steps_executed: self.steps_executed,
            cancelled,
            variables,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Run `steps` in order against `state`, numbering them from 1 under
    /// `label`. Cancellation is checked before every step.
    pub fn run_steps(&mut self, steps: &[Step], state: &mut RuntimeState, label: &str) -> Flow {
        for (offset, step) in steps.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Flow::Cancelled;
            }
            let cx = StepContext {
                label: label.to_string(),
                index: offset + 1,
            };
            self.steps_executed += 1;
            tracing::debug!(context = %cx.label, step = cx.index, kind = step.tag(), "executing step");

            if self.execute_step(step, state, &cx) == Flow::Cancelled {
                return Flow::Cancelled;
            }
        }
        Flow::Continue
    }

    fn execute_step(&mut self, step: &Step, state: &mut RuntimeState, cx: &StepContext) -> Flow {
        match step {
            Step::ConnectRobot { ip, port, name } => {
                let current = self.dispatcher.session().robot_config();
                self.diagnostics.info(
                    cx,
                    format!(
                        "connect {} at {}:{}",
                        or_current(name, &current.name),
                        or_current(ip, &current.ip),
                        or_current(port, &current.port)
                    ),
                );
                let result = self
                    .dispatcher
                    .connect(ip, port, name, &mut self.diagnostics, cx);
                self.report(cx, result);
            }
            Step::DisconnectRobot => {
                self.diagnostics.info(cx, "disconnect robot");
                let result = self.dispatcher.disconnect(&mut self.diagnostics, cx);
                self.report(cx, result);
            }
            Step::SetServoState { state: target } => {
                let word = match target {
                    ServoTarget::Lock => "lock",
                    ServoTarget::Unlock => "unlock",
                };
                self.diagnostics.info(cx, format!("set servo {}", word));
                let result = self
                    .dispatcher
                    .set_servo(*target, &mut self.diagnostics, cx);
                self.report(cx, result);
            }
            Step::SetSpeed { value } => {
                let speed = self
                    .number(value.as_ref(), state, cx)
                    .unwrap_or_else(|| f64::from(self.dispatcher.session().current_speed()));
                self.diagnostics
                    .info(cx, format!("set speed to {}", format_number(speed)));
                let result = self
                    .dispatcher
                    .set_speed(speed, &mut self.diagnostics, cx);
                self.report(cx, result);
            }
            Step::SetVariable { name, value } => self.set_variable(name, value.as_ref(), state, cx),
            Step::Print { message } => {
                let message = self.evaluate(message.as_ref(), state, None, cx);
                let text = message.map(|value| value.to_string()).unwrap_or_default();
                self.diagnostics.output(cx, text);
            }
            Step::JogJoint { joint, delta } => {
                let Some(delta) = self.required(delta.as_ref(), state, cx, "Joint delta") else {
                    return Flow::Continue;
                };
                self.diagnostics.info(
                    cx,
                    format!("jog joint {} by {}", raw_text(joint), format_number(delta)),
                );
                let result = self
                    .dispatcher
                    .jog_joint(joint, delta, &mut self.diagnostics, cx);
                self.report(cx, result);
            }
            Step::JogLinear { axis, delta } => {
                let Some(delta) = self.required(delta.as_ref(), state, cx, "Linear delta") else {
                    return Flow::Continue;
                };
                self.diagnostics
                    .info(cx, format!("jog axis {} by {}", raw_text(axis), format_number(delta)));
                let result = self
                    .dispatcher
                    .jog_linear(axis, delta, &mut self.diagnostics, cx);
                self.report(cx, result);
            }
            Step::MoveJointAbsolute { joint, angle } => {
                let Some(angle) = self.required(angle.as_ref(), state, cx, "Target angle") else {
                    return Flow::Continue;
                };
                self.diagnostics.info(
                    cx,
                    format!("move joint {} to {}", raw_text(joint), format_number(angle)),
                );
                let result =
                    self.dispatcher
                        .move_joint_absolute(joint, angle, &mut self.diagnostics, cx);
                self.report(cx, result);
            }
            Step::MoveLinearAbsolute { mode, target } => {
                let coords: Vec<(&str, Option<f64>)> = target
                    .fields()
                    .into_iter()
                    .map(|(field, expr)| (field, self.number(expr, state, cx)))
                    .collect();
                self.diagnostics.info(
                    cx,
                    format!("move linearly in {} frame to {}", mode, describe_coords(&coords)),
                );
                let result = self.dispatcher.move_linear_absolute(
                    mode,
                    &coords,
                    &mut self.diagnostics,
                    cx,
                );
                self.report(cx, result);
            }
            Step::GoHome { mode } => {
                let word = match mode {
                    HomeMode::Manual => "manual",
                    HomeMode::Library => "library",
                };
                self.diagnostics.info(cx, format!("move home ({})", word));
                let result = self.dispatcher.go_home(*mode, &mut self.diagnostics, cx);
                self.report(cx, result);
            }
            Step::Delay { duration } => return self.wait_for(duration.as_ref(), state, cx),
            Step::RepeatLoop { count, body } => {
                return self.repeat_loop(count.as_ref(), body, state, cx);
            }
            Step::IfCondition {
                condition,
                true_branch,
                false_branch,
            } => return self.if_condition(condition, true_branch, false_branch, state, cx),
            Step::IfVariableCompare {
                name,
                operator,
                value,
                true_branch,
                false_branch,
            } => {
                self.diagnostics.info(
                    cx,
                    format!(
                        "if variable {} {} ...",
                        if name.is_empty() { "<unnamed>" } else { name },
                        operator
                    ),
                );
                if name.is_empty() {
                    self.diagnostics
                        .warn(cx, "Variable name is empty in compare block.");
                    return Flow::Continue;
                }
                let Some(result) = self.compare_variable(name, operator, value.as_ref(), state, cx)
                else {
                    return Flow::Continue;
                };
                let branch = if result { true_branch } else { false_branch };
                return self.run_branch(branch, result, state, cx);
            }
            Step::GetCoordinates { source, store } => match self.dispatcher.read_coordinates(*source)
            {
                Ok(coords) => {
                    let coords = Value::NumberSequence(coords);
                    if store.is_empty() {
                        self.diagnostics
                            .info(cx, format!("{} coordinates => {}", source, coords));
                    } else {
                        self.diagnostics.info(
                            cx,
                            format!("stored {} coordinates in '{}' => {}", source, store, coords),
                        );
                        state.set(store.clone(), coords);
                    }
                }
                Err(err) => self
                    .diagnostics
                    .error(cx, format!("Failed to read coordinates: {}", err)),
            },
            Step::Unknown { tag } => {
                self.diagnostics.warn(
                    cx,
                    format!("unsupported action '{}'", tag.as_deref().unwrap_or("None")),
                );
            }
        }
        Flow::Continue
    }

    fn set_variable(
        &mut self,
        name: &str,
        value: Option<&Expression>,
        state: &mut RuntimeState,
        cx: &StepContext,
    ) {
        if name.is_empty() {
            self.diagnostics
                .warn(cx, "Variable name is empty; skipping assignment.");
            return;
        }
        match self.evaluate(value, state, None, cx) {
            Some(value) => {
                self.diagnostics.info(cx, format!("{} = {}", name, value));
                state.set(name, value);
            }
            None => {
                state.unset(name);
                self.diagnostics
                    .warn(cx, format!("{} = None; variable is now undefined", name));
            }
        }
    }

    fn wait_for(
        &mut self,
        duration: Option<&Expression>,
        state: &RuntimeState,
        cx: &StepContext,
    ) -> Flow {
        let Some(seconds) = self.required(duration, state, cx, "Delay duration") else {
            return Flow::Continue;
        };
        let seconds = seconds.max(0.0);
        let Ok(wait) = Duration::try_from_secs_f64(seconds) else {
            self.diagnostics.warn(
                cx,
                format!("Invalid delay duration '{}'", format_number(seconds)),
            );
            return Flow::Continue;
        };

        self.diagnostics.info(
            cx,
            format!("Waiting for {} seconds...", format_number(seconds)),
        );
        if self.delay.wait(wait, &self.cancel) {
            Flow::Continue
        } else {
            Flow::Cancelled
        }
    }

    fn repeat_loop(
        &mut self,
        count: Option<&Expression>,
        body: &[Step],
        state: &mut RuntimeState,
        cx: &StepContext,
    ) -> Flow {
        let Some(count) = self
            .evaluate(count, state, Some(ExpectedType::Int), cx)
            .and_then(|value| value.as_number())
        else {
            self.diagnostics
                .warn(cx, "Loop count is undefined; skipping.");
            return Flow::Continue;
        };

        let iterations = count.max(0.0) as usize;
        if iterations == 0 {
            self.diagnostics
                .info(cx, format!("Loop count is {}; nothing to execute.", iterations));
            return Flow::Continue;
        }
        if body.is_empty() {
            self.diagnostics.info(cx, "Loop body is empty.");
            return Flow::Continue;
        }

        let prefix = cx.prefix();
        for iteration in 1..=iterations {
            let label = format!("{} iteration {}/{}", prefix, iteration, iterations);
            tracing::debug!(%label, "loop iteration");
            if self.run_steps(body, state, &label) == Flow::Cancelled {
                return Flow::Cancelled;
            }
        }
        Flow::Continue
    }

    fn if_condition(
        &mut self,
        condition: &Condition,
        true_branch: &[Step],
        false_branch: &[Step],
        state: &mut RuntimeState,
        cx: &StepContext,
    ) -> Flow {
        let session = self.dispatcher.session();
        let (subject, actual) = match &condition.kind {
            ConditionKind::IsConnected => ("is_connected", session.is_connected()),
            ConditionKind::ServoLocked => ("servo_locked", session.is_servo_locked()),
            ConditionKind::Unsupported(tag) => {
                self.diagnostics.warn(
                    cx,
                    format!(
                        "Unsupported condition type '{}'.",
                        tag.as_deref().unwrap_or("None")
                    ),
                );
                return Flow::Continue;
            }
        };

        let result = actual == condition.expected;
        self.diagnostics.info(
            cx,
            format!(
                "if condition {} = {} -> {}",
                subject,
                python_bool(condition.expected),
                python_bool(result)
            ),
        );
        let branch = if result { true_branch } else { false_branch };
        self.run_branch(branch, result, state, cx)
    }

    /// Evaluate an `if_variable_compare`; `None` means neither branch runs.
    fn compare_variable(
        &mut self,
        name: &str,
        operator: &str,
        value: Option<&Expression>,
        state: &RuntimeState,
        cx: &StepContext,
    ) -> Option<bool> {
        if !state.contains(name) {
            self.diagnostics
                .warn(cx, format!("Variable '{}' is undefined.", name));
        }

        let current = state.get(name).cloned();
        let expected = self.evaluate(value, state, None, cx);
        let op = CompareOperator::parse(operator);
        if expected.is_none() && op != Some(CompareOperator::Neq) {
            self.diagnostics.warn(cx, "Comparison value is undefined.");
            return None;
        }

        let (result, symbol) = match op {
            Some(op) => (
                compare_values(current.as_ref(), expected.as_ref(), op),
                op.symbol(),
            ),
            None => {
                self.diagnostics
                    .warn(cx, format!("Unsupported operator '{}'", operator));
                (false, operator)
            }
        };

        self.diagnostics.info(
            cx,
            format!(
                "compare {} {} {} -> {}",
                display_or_none(current.as_ref()),
                symbol,
                display_or_none(expected.as_ref()),
                python_bool(result)
            ),
        );
        Some(result)
    }

    fn run_branch(
        &mut self,
        branch: &[Step],
        taken: bool,
        state: &mut RuntimeState,
        cx: &StepContext,
    ) -> Flow {
        let label = format!("{} {}", cx.prefix(), if taken { "TRUE" } else { "FALSE" });
        if branch.is_empty() {
            self.diagnostics
                .emit_run(Severity::Info, &label, "Branch is empty.");
            return Flow::Continue;
        }
        self.diagnostics.emit_run(
            Severity::Info,
            &label,
            format!("executing {} step(s)", branch.len()),
        );
        self.run_steps(branch, state, &label)
    }

    fn evaluate(
        &mut self,
        expr: Option<&Expression>,
        state: &RuntimeState,
        expected: Option<ExpectedType>,
        cx: &StepContext,
    ) -> Option<Value> {
        let diagnostics = &mut self.diagnostics;
        resolver::resolve(expr, state, expected, &mut |message| {
            diagnostics.warn(cx, message)
        })
    }

    fn number(
        &mut self,
        expr: Option<&Expression>,
        state: &RuntimeState,
        cx: &StepContext,
    ) -> Option<f64> {
        self.evaluate(expr, state, Some(ExpectedType::Number), cx)
            .and_then(|value| value.as_number())
    }

    /// Numeric parameter the step cannot run without.
    fn required(
        &mut self,
        expr: Option<&Expression>,
        state: &RuntimeState,
        cx: &StepContext,
        what: &str,
    ) -> Option<f64> {
        let value = self.number(expr, state, cx);
        if value.is_none() {
            self.diagnostics.warn(cx, format!("{} is undefined.", what));
        }
        value
    }

    fn report(&mut self, cx: &StepContext, result: DispatchResult<impl Sized>) {
        if let Err(err) = result {
            self.diagnostics.error(cx, err.to_string());
        }
    }
}

fn or_current<'s>(value: &'s str, current: &'s str) -> &'s str {
    if value.trim().is_empty() { current } else { value }
}

fn python_bool(flag: bool) -> &'static str {
    if flag { "True" } else { "False" }
}

fn display_or_none(value: Option<&Value>) -> String {
    value.map_or_else(|| "None".to_string(), Value::to_string)
}

fn describe_coords(coords: &[(&str, Option<f64>)]) -> String {
    let parts: Vec<String> = coords
        .iter()
        .map(|(field, value)| match value {
            Some(value) => format!("{}={}", field, format_number(*value)),
            None => format!("{}=None", field),
        })
        .collect();
    format!("{{{}}}", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::interpreter::control::RecordingDelay;
    use crate::interpreter::diagnostic::Diagnostic;
    use crate::robot::simulated::SimulatedRobot;

    fn run(source: &str) -> (RunSummary, Vec<Diagnostic>, RecordingDelay) {
        let mut session = RobotSession::new(SimulatedRobot::new(), &AppConfig::default());
        let mut sink = Vec::new();
        let mut delay = RecordingDelay::default();
        let summary = Interpreter::new(&mut session, &mut sink, &mut delay)
            .run_json(source)
            .unwrap();
        (summary, sink, delay)
    }

    #[test]
    fn empty_program_never_starts() {
        let mut session = RobotSession::new(SimulatedRobot::new(), &AppConfig::default());
        let mut sink: Vec<Diagnostic> = Vec::new();
        let mut delay = RecordingDelay::default();
        let err = Interpreter::new(&mut session, &mut sink, &mut delay)
            .run_json("[]")
            .unwrap_err();

        assert!(matches!(err, ProgramError::Empty));
        assert_eq!(sink.len(), 1);
        assert_eq!(sink[0].severity, Severity::Error);
    }

    #[test]
    fn unknown_step_is_skipped() {
        let (summary, sink, _) = run(r#"[{"type": "teleport"}, {"type": "print", "message": {"kind": "literal", "value": "after"}}]"#);

        assert_eq!(summary.steps_executed, 2);
        assert!(sink.iter().any(|d| d.severity == Severity::Warning
            && d.message == "unsupported action 'teleport'"));
        assert!(sink.iter().any(|d| d.severity == Severity::Output && d.message == "after"));
    }

    #[test]
    fn nested_labels_follow_structure() {
        let (_, sink, _) = run(
            r#"[{"type": "repeat_loop", "count": {"kind": "literal", "valueType": "number", "value": 2},
                 "body": [{"type": "print", "message": {"kind": "literal", "value": "x"}}]}]"#,
        );
        let outputs: Vec<String> = sink
            .iter()
            .filter(|d| d.severity == Severity::Output)
            .map(|d| d.to_string())
            .collect();
        assert_eq!(
            outputs,
            vec![
                "[Blockly] Step 1 iteration 1/2 Step 1: x",
                "[Blockly] Step 1 iteration 2/2 Step 1: x",
            ]
        );
    }

    #[test]
    fn delay_clamps_negative_durations() {
        let (_, _, delay) = run(
            r#"[{"type": "delay", "duration": {"kind": "literal", "valueType": "number", "value": -2}},
                {"type": "delay", "duration": {"kind": "literal", "valueType": "number", "value": 0.25}}]"#,
        );
        assert_eq!(
            delay.requested,
            vec![Duration::ZERO, Duration::from_millis(250)]
        );
    }

    #[test]
    fn undefined_required_value_skips_step() {
        let (_, sink, delay) = run(r#"[{"type": "delay"}]"#);
        assert!(delay.requested.is_empty());
        assert!(sink
            .iter()
            .any(|d| d.message == "Delay duration is undefined."));
    }

    #[test]
    fn index_parameters_log_as_plain_text() {
        let (_, sink, _) = run(
            r#"[{"type": "jog_linear", "axis": "x", "delta": {"kind": "literal", "valueType": "number", "value": 5}},
                {"type": "jog_joint", "joint": "2", "delta": {"kind": "literal", "valueType": "number", "value": -1.5}},
                {"type": "move_joint_absolute", "joint": 4, "angle": {"kind": "literal", "valueType": "number", "value": 90}}]"#,
        );
        let infos: Vec<&str> = sink
            .iter()
            .filter(|d| d.severity == Severity::Info)
            .map(|d| d.message.as_str())
            .collect();
        assert!(infos.contains(&"jog axis x by 5.0"), "{:?}", infos);
        assert!(infos.contains(&"jog joint 2 by -1.5"), "{:?}", infos);
        assert!(infos.contains(&"move joint 4 to 90.0"), "{:?}", infos);
    }

    #[test]
    fn describe_coords_lists_every_axis() {
        let coords = [("x", Some(1.0)), ("y", None)];
        assert_eq!(describe_coords(&coords), "{x=1.0, y=None}");
    }
}
