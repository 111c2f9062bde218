use robo_blockly::config::AppConfig;
use robo_blockly::interpreter::{
    CancelToken, DelayDriver, Diagnostic, Interpreter, RecordingDelay, RunSummary, Severity,
    ThreadDelay, Value,
};
use robo_blockly::robot::{
    CoordinateFrame, GatewayCall, PositionFrame, RobotSession, SimulatedRobot,
};
use serde_json::{Value as JsonValue, json};
use std::time::Duration;

struct Harness {
    robot: SimulatedRobot,
    session: RobotSession<SimulatedRobot>,
    diagnostics: Vec<Diagnostic>,
    delay: RecordingDelay,
}

impl Harness {
    fn new() -> Self {
        let robot = SimulatedRobot::new();
        let session = RobotSession::new(robot.clone(), &AppConfig::default());
        Self {
            robot,
            session,
            diagnostics: Vec::new(),
            delay: RecordingDelay::default(),
        }
    }

    /// Connected, servos locked, call log cleared.
    fn connected() -> Self {
        let mut harness = Self::new();
        harness.session.connect().expect("simulated connect");
        harness.robot.clear_calls();
        harness
    }

    fn run(&mut self, program: JsonValue) -> RunSummary {
        Interpreter::new(&mut self.session, &mut self.diagnostics, &mut self.delay)
            .run_json(&program.to_string())
            .expect("program parses")
    }

    fn messages(&self, severity: Severity) -> Vec<&str> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .map(|d| d.message.as_str())
            .collect()
    }

    fn outputs(&self) -> Vec<&str> {
        self.messages(Severity::Output)
    }

    fn errors(&self) -> Vec<&str> {
        self.messages(Severity::Error)
    }
}

fn number(value: f64) -> JsonValue {
    json!({"kind": "literal", "valueType": "number", "value": value})
}

fn text(value: &str) -> JsonValue {
    json!({"kind": "literal", "valueType": "string", "value": value})
}

fn variable(name: &str) -> JsonValue {
    json!({"kind": "variable", "name": name})
}

fn print(message: JsonValue) -> JsonValue {
    json!({"type": "print", "message": message})
}

#[test]
fn loop_count_from_variable_prints_three_times() {
    let mut harness = Harness::new();
    let summary = harness.run(json!([
        {"type": "set_variable", "name": "n", "value": {"kind": "literal", "valueType": "number", "value": 3}},
        {"type": "repeat_loop", "count": {"kind": "variable", "name": "n"},
         "body": [{"type": "print", "message": {"kind": "literal", "value": "tick"}}]}
    ]));

    assert_eq!(harness.outputs(), vec!["tick", "tick", "tick"]);
    assert_eq!(summary.steps_executed, 5);
    assert!(!summary.cancelled);
    assert!(harness.errors().is_empty());
}

#[test]
fn zero_count_loop_runs_nothing() {
    let mut harness = Harness::new();
    harness.run(json!([
        {"type": "repeat_loop", "count": number(0.0), "body": [print(text("never"))]},
        {"type": "repeat_loop", "count": number(-4.0), "body": [print(text("never"))]}
    ]));

    assert!(harness.outputs().is_empty());
    assert!(harness.errors().is_empty());
    assert_eq!(
        harness
            .messages(Severity::Info)
            .iter()
            .filter(|m| **m == "Loop count is 0; nothing to execute.")
            .count(),
        2
    );
}

#[test]
fn loop_variables_persist_across_iterations_and_after_the_loop() {
    let mut harness = Harness::new();
    let summary = harness.run(json!([
        {"type": "repeat_loop", "count": number(2.0), "body": [
            {"type": "if_variable_compare", "name": "seen", "operator": "EQ", "value": text("yes"),
             "true_branch": [print(text("again"))], "false_branch": []},
            {"type": "set_variable", "name": "seen", "value": text("yes")}
        ]},
        print(variable("seen"))
    ]));

    assert_eq!(harness.outputs(), vec!["again", "yes"]);
    assert_eq!(summary.variables.get("seen"), Some(&Value::from("yes")));
}

#[test]
fn linear_absolute_keeps_unset_axes() {
    let mut harness = Harness::connected();
    harness.robot.set_cartesian(
        CoordinateFrame::Tool,
        vec![10.0, 20.0, 30.0, 40.0, 50.0, 60.0],
    );

    harness.run(json!([
        {"type": "move_linear_absolute", "mode": "tool", "x": number(100.0), "z": number(300.0)}
    ]));

    assert!(harness.errors().is_empty(), "{:?}", harness.errors());
    let submitted = harness
        .robot
        .calls()
        .into_iter()
        .find(|call| matches!(call, GatewayCall::MoveLinearAbsolute { .. }))
        .expect("linear move submitted");
    assert_eq!(
        submitted,
        GatewayCall::MoveLinearAbsolute {
            target: vec![300.0, 20.0, 100.0, 40.0, 50.0, 60.0, 0.0],
            vel: 100,
            frame: CoordinateFrame::Tool,
        }
    );
    assert_eq!(
        harness.robot.cartesian(CoordinateFrame::Tool),
        vec![300.0, 20.0, 100.0, 40.0, 50.0, 60.0]
    );
}

#[test]
fn out_of_range_joint_makes_no_gateway_call() {
    let mut harness = Harness::connected();
    harness.run(json!([
        {"type": "jog_joint", "joint": 6, "delta": number(5.0)},
        print(text("next"))
    ]));

    assert!(harness.robot.calls().is_empty());
    assert_eq!(harness.errors(), vec!["joint index 6 out of range (0-5)"]);
    assert_eq!(harness.outputs(), vec!["next"]);
}

#[test]
fn neq_tolerates_undefined_operands() {
    let mut harness = Harness::new();
    harness.run(json!([
        {"type": "if_variable_compare", "name": "missing", "operator": "NEQ",
         "true_branch": [print(text("T"))], "false_branch": [print(text("F"))]}
    ]));

    assert_eq!(harness.outputs(), vec!["F"]);
    assert!(
        harness
            .messages(Severity::Warning)
            .contains(&"Variable 'missing' is undefined.")
    );
}

#[test]
fn other_operators_need_a_comparison_value() {
    for operator in ["EQ", "LT", "LTE", "GT", "GTE"] {
        let mut harness = Harness::new();
        harness.run(json!([
            {"type": "if_variable_compare", "name": "missing", "operator": operator,
             "true_branch": [print(text("T"))], "false_branch": [print(text("F"))]},
            print(text("after"))
        ]));

        assert_eq!(harness.outputs(), vec!["after"], "operator {}", operator);
        assert!(
            harness
                .messages(Severity::Warning)
                .contains(&"Comparison value is undefined.")
        );
    }
}

#[test]
fn numeric_comparison_beats_text() {
    let mut harness = Harness::new();
    harness.run(json!([
        {"type": "set_variable", "name": "count", "value": number(5.0)},
        {"type": "if_variable_compare", "name": "count", "operator": "EQ", "value": text("5"),
         "true_branch": [print(text("equal"))], "false_branch": [print(text("different"))]},
        {"type": "if_variable_compare", "name": "count", "operator": "GT", "value": text("10"),
         "true_branch": [print(text("bigger"))], "false_branch": [print(text("smaller"))]}
    ]));

    assert_eq!(harness.outputs(), vec!["equal", "smaller"]);
}

#[test]
fn unknown_operator_takes_false_branch() {
    let mut harness = Harness::new();
    harness.run(json!([
        {"type": "set_variable", "name": "a", "value": number(1.0)},
        {"type": "if_variable_compare", "name": "a", "operator": "ABOUT", "value": number(1.0),
         "true_branch": [print(text("T"))], "false_branch": [print(text("F"))]}
    ]));

    assert_eq!(harness.outputs(), vec!["F"]);
    assert!(
        harness
            .messages(Severity::Warning)
            .contains(&"Unsupported operator 'ABOUT'")
    );
}

#[test]
fn motion_requires_connection() {
    let mut harness = Harness::new();
    harness.run(json!([
        {"type": "move_joint_absolute", "joint": 1, "angle": number(45.0)},
        {"type": "jog_linear", "axis": "x", "delta": number(1.0)},
        print(text("still running"))
    ]));

    assert!(harness.robot.calls().is_empty());
    assert_eq!(
        harness.errors(),
        vec![
            "cannot joint move: robot not connected",
            "cannot jog axis: robot not connected",
        ]
    );
    assert_eq!(harness.outputs(), vec!["still running"]);
}

#[test]
fn absolute_joint_move_unlocks_automatically() {
    let mut harness = Harness::connected();
    harness
        .robot
        .set_joints(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

    harness.run(json!([
        {"type": "move_joint_absolute", "joint": "1", "angle": number(45.0)}
    ]));

    assert!(harness.errors().is_empty(), "{:?}", harness.errors());
    assert!(!harness.session.is_servo_locked());
    assert_eq!(
        harness.robot.calls(),
        vec![
            GatewayCall::SetServoLocked { locked: false },
            GatewayCall::GetPosition {
                frame: PositionFrame::Joint
            },
            GatewayCall::MoveJointAbsolute {
                target: vec![1.0, 45.0, 3.0, 4.0, 5.0, 6.0],
                vel: 20,
            },
        ]
    );
    assert_eq!(harness.messages(Severity::Warning).len(), 1);
}

#[test]
fn failed_unlock_refuses_the_move() {
    let mut harness = Harness::connected();
    harness.robot.reject_servo_changes(true);

    harness.run(json!([
        {"type": "move_joint_absolute", "joint": 0, "angle": number(10.0)}
    ]));

    assert_eq!(
        harness
            .robot
            .count_calls(|call| matches!(call, GatewayCall::MoveJointAbsolute { .. })),
        0
    );
    assert_eq!(harness.errors().len(), 1);
    assert!(harness.errors()[0].contains("failed to unlock servo"));
}

#[test]
fn gateway_failure_is_not_fatal() {
    let mut harness = Harness::connected();
    harness.robot.fail_status("robot_movej", 3);

    harness.run(json!([
        {"type": "set_servo_state", "state": "unlock"},
        {"type": "move_joint_absolute", "joint": 2, "angle": number(90.0)},
        print(text("continued"))
    ]));

    assert_eq!(
        harness.errors(),
        vec!["absolute joint move failed: robot_movej returned code 3"]
    );
    assert_eq!(harness.outputs(), vec!["continued"]);
}

#[test]
fn go_home_refuses_locked_servos() {
    let mut harness = Harness::connected();
    harness.run(json!([{"type": "go_home", "mode": "manual"}]));

    assert_eq!(harness.robot.count_calls(GatewayCall::is_motion), 0);
    assert_eq!(
        harness.errors(),
        vec!["cannot go home: servo locked, unlock the robot first"]
    );

    harness.run(json!([
        {"type": "set_servo_state", "state": "unlock"},
        {"type": "go_home", "mode": "library"}
    ]));
    assert_eq!(
        harness
            .robot
            .count_calls(|call| *call == GatewayCall::GoHomeLibrary),
        1
    );
}

#[test]
fn speed_is_clamped_and_scales_linear_jogs() {
    let mut harness = Harness::connected();
    harness.run(json!([
        {"type": "set_speed", "value": number(150.0)},
        {"type": "jog_linear", "axis": "Z", "delta": number(5.0)},
        {"type": "jog_joint", "joint": 0, "delta": number(-2.5)}
    ]));

    assert_eq!(harness.session.current_speed(), 100);
    assert_eq!(
        harness.robot.calls(),
        vec![
            GatewayCall::MoveLinearRelative {
                axis: 2,
                delta: 5.0,
                vel: 500,
            },
            GatewayCall::MoveJointRelative {
                joint: 0,
                delta: -2.5,
                vel: 100,
            },
        ]
    );
}

#[test]
fn zero_delta_jog_is_skipped() {
    let mut harness = Harness::connected();
    harness.run(json!([
        {"type": "jog_joint", "joint": 3, "delta": number(0.0)},
        {"type": "jog_linear", "axis": "y", "delta": number(0.0)}
    ]));

    assert!(harness.robot.calls().is_empty());
    assert!(harness.errors().is_empty());
    assert_eq!(harness.messages(Severity::Warning).len(), 2);
}

#[test]
fn connect_step_fills_blank_fields_from_config() {
    let mut harness = Harness::new();
    harness.run(json!([
        {"type": "connect_robot", "ip": "10.0.0.2", "port": "", "name": "  "},
        {"type": "connect_robot"}
    ]));

    assert!(harness.session.is_connected());
    assert!(harness.session.is_servo_locked());
    assert_eq!(
        harness
            .robot
            .count_calls(|call| matches!(call, GatewayCall::Connect { .. })),
        1
    );
    assert_eq!(
        harness.robot.calls()[0],
        GatewayCall::Connect {
            ip: "10.0.0.2".into(),
            port: "6001".into(),
            name: "robot".into(),
        }
    );
}

#[test]
fn get_coordinates_stores_a_sequence() {
    let mut harness = Harness::connected();
    harness
        .robot
        .set_joints(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    harness
        .robot
        .set_cartesian(CoordinateFrame::Base, vec![7.0; 6]);

    let summary = harness.run(json!([
        {"type": "get_coordinates", "mode": "joint", "store": "pose"},
        {"type": "get_coordinates", "mode": "base", "store": "base_pose"},
        {"type": "get_coordinates", "mode": "joint"}
    ]));

    assert_eq!(
        summary.variables.get("pose"),
        Some(&Value::NumberSequence(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]))
    );
    assert_eq!(
        summary.variables.get("base_pose"),
        Some(&Value::NumberSequence(vec![7.0; 6]))
    );
    assert_eq!(summary.variables.len(), 2);
    assert!(harness.robot.calls().contains(&GatewayCall::SetCoordinateFrame {
        frame: CoordinateFrame::Base
    }));
}

#[test]
fn condition_branches_nested_in_condition_object() {
    let mut harness = Harness::new();
    harness.run(json!([
        {"type": "if_condition",
         "condition": {"type": "is_connected", "value": false,
                       "true_branch": [print(text("offline"))],
                       "false_branch": [print(text("online"))]}},
        {"type": "if_condition",
         "condition": {"type": "servo_locked"},
         "true_branch": [print(text("locked"))]}
    ]));

    assert_eq!(harness.outputs(), vec!["offline", "locked"]);
}

#[test]
fn delays_are_requested_in_order() {
    let mut harness = Harness::new();
    harness.run(json!([
        {"type": "set_variable", "name": "pause", "value": text("1.5")},
        {"type": "delay", "duration": variable("pause")},
        {"type": "delay", "duration": number(0.5)}
    ]));

    assert_eq!(
        harness.delay.requested,
        vec![Duration::from_millis(1500), Duration::from_millis(500)]
    );
}

struct CancelOnWait(CancelToken);

impl DelayDriver for CancelOnWait {
    fn wait(&mut self, _duration: Duration, cancel: &CancelToken) -> bool {
        self.0.cancel();
        !cancel.is_cancelled()
    }
}

#[test]
fn cancellation_during_delay_stops_the_run() {
    let robot = SimulatedRobot::new();
    let mut session = RobotSession::new(robot, &AppConfig::default());
    let mut diagnostics: Vec<Diagnostic> = Vec::new();
    let token = CancelToken::new();
    let mut delay = CancelOnWait(token.clone());

    let summary = Interpreter::new(&mut session, &mut diagnostics, &mut delay)
        .with_cancel_token(token)
        .run_json(
            &json!([
                print(text("before")),
                {"type": "repeat_loop", "count": number(3.0), "body": [
                    {"type": "delay", "duration": number(1.0)},
                    print(text("inside"))
                ]},
                print(text("after"))
            ])
            .to_string(),
        )
        .expect("program parses");

    assert!(summary.cancelled);
    let outputs: Vec<&str> = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Output)
        .map(|d| d.message.as_str())
        .collect();
    assert_eq!(outputs, vec!["before"]);
}

#[test]
fn huge_delay_waits_until_cancelled() {
    let robot = SimulatedRobot::new();
    let mut session = RobotSession::new(robot, &AppConfig::default());
    let mut diagnostics: Vec<Diagnostic> = Vec::new();
    let mut delay = ThreadDelay::new(Duration::from_millis(5));
    let token = CancelToken::new();
    let canceller = token.clone();
    let handle = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(200));
        canceller.cancel();
    });

    let summary = Interpreter::new(&mut session, &mut diagnostics, &mut delay)
        .with_cancel_token(token)
        .run_json(
            &json!([
                {"type": "delay", "duration": number(1e19)},
                print(text("after"))
            ])
            .to_string(),
        )
        .expect("program parses");
    handle.join().expect("canceller thread");

    assert!(summary.cancelled);
    assert!(
        diagnostics
            .iter()
            .all(|d| d.severity != Severity::Output)
    );
}

#[test]
fn cancelled_token_runs_nothing() {
    let mut harness = Harness::new();
    let token = CancelToken::new();
    token.cancel();

    let summary = Interpreter::new(
        &mut harness.session,
        &mut harness.diagnostics,
        &mut harness.delay,
    )
    .with_cancel_token(token)
    .with_label("[Test]")
    .run_json(&json!([print(text("never"))]).to_string())
    .expect("program parses");

    assert!(summary.cancelled);
    assert_eq!(summary.steps_executed, 0);
    assert!(harness.outputs().is_empty());
    let last = harness.diagnostics.last().expect("run-level diagnostic");
    assert_eq!(last.to_string(), "[Test]: Program cancelled.");
}

#[test]
fn malformed_program_is_reported_once() {
    let mut harness = Harness::new();
    let result = Interpreter::new(
        &mut harness.session,
        &mut harness.diagnostics,
        &mut harness.delay,
    )
    .run_json("{\"type\": \"print\"}");

    assert!(result.is_err());
    assert_eq!(harness.diagnostics.len(), 1);
    assert_eq!(harness.diagnostics[0].severity, Severity::Error);
}
