//! Translation of motion blocks into gateway calls.
//!
//! Every action checks its preconditions before touching the gateway: the
//! robot must be connected, and absolute moves additionally need unlocked
//! servos (unlocking automatically when allowed). Failures are returned as
//! [`DispatchError`]; the step interpreter logs them and moves on.

use serde_json::Value as JsonValue;
use thiserror::Error;

use super::ast::{HomeMode, ServoTarget};
use super::diagnostic::{Diagnostics, StepContext};
use super::value::format_number;
use crate::robot::gateway::{
    CoordinateFrame, GatewayError, JOINT_COUNT, MotionGateway, PositionFrame, SUBMIT_VECTOR_LEN,
    check_status,
};
use crate::robot::session::{
    ConnectOutcome, DisconnectOutcome, Readiness, RobotSession, SessionError,
};

/// Errors that abort the current step.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    /// Precondition or session-level failure.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The joint parameter is not an integer.
    #[error("invalid joint index '{0}'")]
    InvalidJoint(String),

    /// The joint index is outside `0..=5`.
    #[error("joint index {0} out of range (0-5)")]
    JointOutOfRange(i64),

    /// The axis parameter is not one of `0`/`1`/`2`/`x`/`y`/`z`.
    #[error("invalid axis '{0}'")]
    InvalidAxis(String),

    /// The frame name is not `tool`, `origin` or `base`.
    #[error("unsupported coordinate mode '{0}'")]
    UnsupportedFrame(String),

    /// A numeric parameter cannot be used (NaN or infinite).
    #[error("invalid {field} value '{value}'")]
    InvalidNumber {
        /// Parameter name.
        field: &'static str,
        /// Offending value.
        value: String,
    },

    /// The gateway reported a failure.
    #[error("{context} failed: {source}")]
    Gateway {
        /// What was being attempted.
        context: &'static str,
        /// Underlying gateway error.
        #[source]
        source: GatewayError,
    },
}

/// Convenience result alias for dispatch operations.
pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

fn gateway(context: &'static str) -> impl FnOnce(GatewayError) -> DispatchError {
    move |source| DispatchError::Gateway { context, source }
}

/// Absolute cartesian target: component name, submit index, value.
///
/// The controller orders cartesian vectors as `[z, y, x, rx, ry, rz]`.
pub const CARTESIAN_INDEX: [(&str, usize); 6] =
    [("x", 2), ("y", 1), ("z", 0), ("rx", 3), ("ry", 4), ("rz", 5)];

/// Safety-gated robot operations used by the step interpreter.
pub struct ActionDispatcher<'s, G> {
    session: &'s mut RobotSession<G>,
}

impl<'s, G: MotionGateway> ActionDispatcher<'s, G> {
    /// Dispatch against the given session.
    pub fn new(session: &'s mut RobotSession<G>) -> Self {
        Self { session }
    }

    /// Read-only view of the session.
    pub fn session(&self) -> &RobotSession<G> {
        self.session
    }

    /// Update the connection parameters and connect unless already connected.
    pub fn connect(
        &mut self,
        ip: &str,
        port: &str,
        name: &str,
        log: &mut Diagnostics<'_>,
        cx: &StepContext,
    ) -> DispatchResult<()> {
        self.session.update_robot_config(ip, port, name);
        match self.session.connect()? {
            ConnectOutcome::Connected => log.info(cx, "Robot connected"),
            ConnectOutcome::AlreadyConnected => log.info(
                cx,
                "Robot is already connected; skipping new connect request.",
            ),
        }
        Ok(())
    }

    /// Disconnect unless already disconnected.
    pub fn disconnect(&mut self, log: &mut Diagnostics<'_>, cx: &StepContext) -> DispatchResult<()> {
        match self.session.disconnect()? {
            DisconnectOutcome::Disconnected => log.info(cx, "Robot disconnected"),
            DisconnectOutcome::AlreadyDisconnected => log.info(cx, "Robot already disconnected."),
        }
        Ok(())
    }

    /// Lock or unlock the servos.
    pub fn set_servo(
        &mut self,
        target: ServoTarget,
        log: &mut Diagnostics<'_>,
        cx: &StepContext,
    ) -> DispatchResult<()> {
        self.require_connected("change servo state")?;
        let locked = target == ServoTarget::Lock;
        self.session.apply_servo_state(locked)?;
        log.info(cx, if locked { "Servo LOCKED" } else { "Servo UNLOCKED" });
        Ok(())
    }

    /// Apply a speed value, truncated and clamped to `0..=100`.
    pub fn set_speed(
        &mut self,
        speed: f64,
        log: &mut Diagnostics<'_>,
        cx: &StepContext,
    ) -> DispatchResult<u32> {
        if !speed.is_finite() {
            return Err(DispatchError::InvalidNumber {
                field: "speed",
                value: format_number(speed),
            });
        }
        let applied = self.session.set_speed(speed.trunc() as i64);
        log.info(cx, format!("Speed set to {}", applied));
        Ok(applied)
    }

    /// Jog one joint by `delta` degrees.
    pub fn jog_joint(
        &mut self,
        joint: &JsonValue,
        delta: f64,
        log: &mut Diagnostics<'_>,
        cx: &StepContext,
    ) -> DispatchResult<()> {
        self.require_connected("jog joint")?;
        let index = joint_index(joint)?;
        if delta == 0.0 {
            log.warn(cx, "Jog delta is zero; skipping joint move.");
            return Ok(());
        }
        finite("delta", delta)?;

        let name = self.session.robot_config().name.clone();
        let ramp = self.session.ramp();
        let vel = self.session.current_speed();
        self.session
            .gateway_mut()
            .move_joint_relative(index, delta, vel, ramp, &name)
            .map_err(gateway("joint jog"))?;

        log.info(
            cx,
            format!("Joint {} moved by {}", index + 1, format_number(delta)),
        );
        Ok(())
    }

    /// Jog along a cartesian axis by `delta`.
    pub fn jog_linear(
        &mut self,
        axis: &JsonValue,
        delta: f64,
        log: &mut Diagnostics<'_>,
        cx: &StepContext,
    ) -> DispatchResult<()> {
        self.require_connected("jog axis")?;
        let index = axis_index(axis)?;
        if delta == 0.0 {
            log.warn(cx, "Jog delta is zero; skipping linear move.");
            return Ok(());
        }
        finite("delta", delta)?;

        let name = self.session.robot_config().name.clone();
        let ramp = self.session.ramp();
        let vel = self.session.current_speed() * self.session.profile().linear_velocity_scale;
        self.session
            .gateway_mut()
            .move_linear_relative(index, delta, vel, ramp, &name)
            .map_err(gateway("linear jog"))?;

        let axis_name = ["X", "Y", "Z"][index];
        log.info(
            cx,
            format!("Axis {} moved by {}", axis_name, format_number(delta)),
        );
        Ok(())
    }

    /// Move one joint to an absolute angle, keeping the others in place.
    pub fn move_joint_absolute(
        &mut self,
        joint: &JsonValue,
        angle: f64,
        log: &mut Diagnostics<'_>,
        cx: &StepContext,
    ) -> DispatchResult<()> {
        self.ready_for_motion("joint move", log, cx)?;
        let index = joint_index(joint)?;
        finite("angle", angle)?;

        let name = self.session.robot_config().name.clone();
        let mut joints = self
            .session
            .gateway_mut()
            .get_position(&name, PositionFrame::Joint)
            .map_err(gateway("read joint position"))?;
        let actual = joints.len();
        let slot = joints.get_mut(index).ok_or(DispatchError::Gateway {
            context: "read joint position",
            source: GatewayError::ShortVector {
                operation: "get_current_position",
                expected: index + 1,
                actual,
            },
        })?;
        *slot = angle;

        let ramp = self.session.ramp();
        let vel = self.session.current_speed();
        let code = self
            .session
            .gateway_mut()
            .move_joint_absolute(&joints, vel, ramp, &name)
            .map_err(gateway("absolute joint move"))?;
        check_status("robot_movej", code).map_err(gateway("absolute joint move"))?;

        log.info(
            cx,
            format!("Joint {} moved to {}", index + 1, format_number(angle)),
        );
        Ok(())
    }

    /// Move to an absolute cartesian pose in `mode`'s frame. `None` components
    /// keep the current value.
    pub fn move_linear_absolute(
        &mut self,
        mode: &str,
        target: &[(&str, Option<f64>)],
        log: &mut Diagnostics<'_>,
        cx: &StepContext,
    ) -> DispatchResult<()> {
        self.ready_for_motion("linear move", log, cx)?;
        let frame = CoordinateFrame::parse(if mode.trim().is_empty() { "tool" } else { mode })
            .ok_or_else(|| DispatchError::UnsupportedFrame(mode.to_string()))?;

        let name = self.session.robot_config().name.clone();
        if let Err(err) = self
            .session
            .gateway_mut()
            .set_coordinate_frame(frame, &name)
        {
            log.warn(
                cx,
                format!("Failed to set coordinate mode '{}': {}", frame, err),
            );
        }

        let mut current = self
            .session
            .gateway_mut()
            .get_position(&name, PositionFrame::Cartesian(frame))
            .map_err(gateway("read current position"))?;
        if current.len() < SUBMIT_VECTOR_LEN {
            current.resize(SUBMIT_VECTOR_LEN, 0.0);
        }

        for (field, value) in target {
            let Some(value) = value else { continue };
            let Some(&(_, index)) = CARTESIAN_INDEX.iter().find(|(key, _)| key == field) else {
                continue;
            };
            if !value.is_finite() {
                return Err(DispatchError::InvalidNumber {
                    field: "coordinate",
                    value: format!("{}={}", field.to_uppercase(), format_number(*value)),
                });
            }
            current[index] = *value;
        }

        let ramp = self.session.ramp();
        let vel =
            self.session.current_speed().max(1) * self.session.profile().linear_velocity_scale;
        let code = self
            .session
            .gateway_mut()
            .move_linear_absolute(&current, vel, frame, ramp, &name)
            .map_err(gateway("linear absolute move"))?;
        check_status("robot_movel", code).map_err(gateway("linear absolute move"))?;

        log.info(cx, "Linear absolute move executed");
        Ok(())
    }

    /// Go to the home pose.
    pub fn go_home(
        &mut self,
        mode: HomeMode,
        log: &mut Diagnostics<'_>,
        cx: &StepContext,
    ) -> DispatchResult<()> {
        self.require_connected("move home")?;
        match mode {
            HomeMode::Library => {
                self.session.go_home(true)?;
                log.info(cx, "Robot moved to home using library function");
            }
            HomeMode::Manual => {
                self.session.go_home(false)?;
                log.info(cx, "Robot moved to home (all-zero joints)");
            }
        }
        Ok(())
    }

    /// Read the current position in the requested frame.
    pub fn read_coordinates(&mut self, source: PositionFrame) -> DispatchResult<Vec<f64>> {
        self.require_connected("read coordinates")?;
        let name = self.session.robot_config().name.clone();
        let gateway_handle = self.session.gateway_mut();
        if let PositionFrame::Cartesian(frame) = source {
            gateway_handle
                .set_coordinate_frame(frame, &name)
                .map_err(gateway("read coordinates"))?;
        }
        gateway_handle
            .get_position(&name, source)
            .map_err(gateway("read coordinates"))
    }

    fn require_connected(&self, action: &str) -> DispatchResult<()> {
        if self.session.is_connected() {
            Ok(())
        } else {
            Err(SessionError::NotConnected {
                action: action.to_string(),
            }
            .into())
        }
    }

    fn ready_for_motion(
        &mut self,
        source: &str,
        log: &mut Diagnostics<'_>,
        cx: &StepContext,
    ) -> DispatchResult<()> {
        if self.session.ensure_robot_ready(true, source)? == Readiness::AutoUnlocked {
            log.warn(
                cx,
                format!("{} required unlocked servo; unlocked automatically.", source),
            );
        }
        Ok(())
    }
}

fn finite(field: &'static str, value: f64) -> DispatchResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(DispatchError::InvalidNumber {
            field,
            value: format_number(value),
        })
    }
}

/// Text of a raw index parameter as it would be shown to the operator.
pub(crate) fn raw_text(raw: &JsonValue) -> String {
    match raw {
        JsonValue::Null => "None".to_string(),
        JsonValue::String(text) => text.clone(),
        JsonValue::Bool(true) => "True".to_string(),
        JsonValue::Bool(false) => "False".to_string(),
        other => other.to_string(),
    }
}

/// Validate a joint parameter: an integer (or integral text) in `0..=5`.
/// Fractional numbers are truncated.
pub fn joint_index(raw: &JsonValue) -> DispatchResult<usize> {
    let index = match raw {
        JsonValue::Number(num) => num
            .as_i64()
            .or_else(|| num.as_f64().filter(|n| n.is_finite()).map(|n| n.trunc() as i64)),
        JsonValue::String(text) => text.trim().parse::<i64>().ok(),
        JsonValue::Bool(flag) => Some(i64::from(*flag)),
        _ => None,
    }
    .ok_or_else(|| DispatchError::InvalidJoint(raw_text(raw)))?;

    if (0..JOINT_COUNT as i64).contains(&index) {
        Ok(index as usize)
    } else {
        Err(DispatchError::JointOutOfRange(index))
    }
}

/// Validate an axis parameter: `0`/`1`/`2` or `x`/`y`/`z` (case-insensitive).
pub fn axis_index(raw: &JsonValue) -> DispatchResult<usize> {
    match raw_text(raw).trim().to_lowercase().as_str() {
        "0" | "x" => Ok(0),
        "1" | "y" => Ok(1),
        "2" | "z" => Ok(2),
        _ => Err(DispatchError::InvalidAxis(raw_text(raw))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn joint_index_accepts_integral_forms() {
        assert_eq!(joint_index(&json!(0)), Ok(0));
        assert_eq!(joint_index(&json!("5")), Ok(5));
        assert_eq!(joint_index(&json!(2.9)), Ok(2));
        assert_eq!(joint_index(&json!(6)), Err(DispatchError::JointOutOfRange(6)));
        assert_eq!(joint_index(&json!(-1)), Err(DispatchError::JointOutOfRange(-1)));
        assert_eq!(
            joint_index(&json!(null)),
            Err(DispatchError::InvalidJoint("None".into()))
        );
        assert_eq!(
            joint_index(&json!("two")),
            Err(DispatchError::InvalidJoint("two".into()))
        );
    }

    #[test]
    fn axis_index_accepts_numbers_and_letters() {
        assert_eq!(axis_index(&json!(1)), Ok(1));
        assert_eq!(axis_index(&json!("Z")), Ok(2));
        assert_eq!(axis_index(&json!("x")), Ok(0));
        assert_eq!(
            axis_index(&json!("w")),
            Err(DispatchError::InvalidAxis("w".into()))
        );
        assert!(axis_index(&json!(0.5)).is_err());
    }

    #[test]
    fn cartesian_index_map() {
        let lookup = |name: &str| {
            CARTESIAN_INDEX
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, idx)| *idx)
        };
        assert_eq!(lookup("z"), Some(0));
        assert_eq!(lookup("y"), Some(1));
        assert_eq!(lookup("x"), Some(2));
        assert_eq!(lookup("rz"), Some(5));
    }
}
