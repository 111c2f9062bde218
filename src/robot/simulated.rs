//! In-memory stand-in for the motion SDK.
//!
//! `SimulatedRobot` tracks joint and cartesian vectors, connection and servo
//! flags, and a log of every call it receives. Clones share the same state so
//! a test can keep a handle after moving the gateway into a session.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::gateway::{
    CoordinateFrame, GatewayError, GatewayResult, JOINT_COUNT, MotionGateway, PositionFrame, Ramp,
    StatusCode,
};

/// A call received by the simulator.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    /// `connect`
    Connect {
        /// Controller address.
        ip: String,
        /// Controller port.
        port: String,
        /// Robot name.
        name: String,
    },
    /// `disconnect`
    Disconnect,
    /// `set_servo_locked`
    SetServoLocked {
        /// Requested state.
        locked: bool,
    },
    /// `get_position`
    GetPosition {
        /// Queried frame.
        frame: PositionFrame,
    },
    /// `move_joint_absolute`
    MoveJointAbsolute {
        /// Submitted joint vector.
        target: Vec<f64>,
        /// Velocity.
        vel: u32,
    },
    /// `move_linear_absolute`
    MoveLinearAbsolute {
        /// Submitted cartesian vector.
        target: Vec<f64>,
        /// Velocity.
        vel: u32,
        /// Frame of the target.
        frame: CoordinateFrame,
    },
    /// `move_joint_relative`
    MoveJointRelative {
        /// Joint index.
        joint: usize,
        /// Signed delta.
        delta: f64,
        /// Velocity.
        vel: u32,
    },
    /// `move_linear_relative`
    MoveLinearRelative {
        /// Axis index.
        axis: usize,
        /// Signed delta.
        delta: f64,
        /// Velocity.
        vel: u32,
    },
    /// `go_home_library`
    GoHomeLibrary,
    /// `set_coordinate_frame`
    SetCoordinateFrame {
        /// Selected frame.
        frame: CoordinateFrame,
    },
    /// `clear_error`
    ClearError,
}

impl GatewayCall {
    /// Whether the call commands motion.
    pub fn is_motion(&self) -> bool {
        matches!(
            self,
            GatewayCall::MoveJointAbsolute { .. }
                | GatewayCall::MoveLinearAbsolute { .. }
                | GatewayCall::MoveJointRelative { .. }
                | GatewayCall::MoveLinearRelative { .. }
                | GatewayCall::GoHomeLibrary
        )
    }
}

/// Injected failure for one SDK operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    /// Return the given non-zero status code.
    Status(StatusCode),
    /// Raise a native fault with the given message.
    Fault(String),
}

#[derive(Debug)]
struct SimState {
    connected: bool,
    servo_locked: bool,
    reject_servo: bool,
    joints: Vec<f64>,
    cartesian: HashMap<CoordinateFrame, Vec<f64>>,
    active_frame: CoordinateFrame,
    failures: HashMap<&'static str, Failure>,
    calls: Vec<GatewayCall>,
}

impl Default for SimState {
    fn default() -> Self {
        let mut cartesian = HashMap::new();
        cartesian.insert(CoordinateFrame::Tool, vec![0.0; 6]);
        cartesian.insert(CoordinateFrame::Origin, vec![0.0; 6]);
        cartesian.insert(CoordinateFrame::Base, vec![0.0; 6]);
        Self {
            connected: false,
            servo_locked: true,
            reject_servo: false,
            joints: vec![0.0; JOINT_COUNT],
            cartesian,
            active_frame: CoordinateFrame::Tool,
            failures: HashMap::new(),
            calls: Vec::new(),
        }
    }
}

impl SimState {
    /// Status code for a status-returning operation.
    fn status(&self, operation: &'static str) -> GatewayResult<StatusCode> {
        match self.failures.get(operation) {
            None => Ok(0),
            Some(Failure::Status(code)) => Ok(*code),
            Some(Failure::Fault(message)) => Err(GatewayError::fault(operation, message.clone())),
        }
    }

    /// Outcome for an operation without a status code.
    fn outcome(&self, operation: &'static str) -> GatewayResult<()> {
        match self.failures.get(operation) {
            None => Ok(()),
            Some(Failure::Status(code)) => Err(GatewayError::Status {
                operation,
                code: *code,
            }),
            Some(Failure::Fault(message)) => Err(GatewayError::fault(operation, message.clone())),
        }
    }
}

/// Simulated motion controller.
#[derive(Debug, Clone, Default)]
pub struct SimulatedRobot {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedRobot {
    /// Create a disconnected simulator with all axes at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `operation` fail with the given status code.
    pub fn fail_status(&self, operation: &'static str, code: StatusCode) {
        self.state
            .lock()
            .failures
            .insert(operation, Failure::Status(code));
    }

    /// Make `operation` raise a native fault.
    pub fn fail_fault(&self, operation: &'static str, message: &str) {
        self.state
            .lock()
            .failures
            .insert(operation, Failure::Fault(message.to_string()));
    }

    /// Remove all injected failures.
    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Make the controller refuse servo lock/unlock requests.
    pub fn reject_servo_changes(&self, reject: bool) {
        self.state.lock().reject_servo = reject;
    }

    /// Force the controller-side servo flag.
    pub fn set_servo_locked_flag(&self, locked: bool) {
        self.state.lock().servo_locked = locked;
    }

    /// Replace the joint vector.
    pub fn set_joints(&self, joints: Vec<f64>) {
        self.state.lock().joints = joints;
    }

    /// Current joint vector.
    pub fn joints(&self) -> Vec<f64> {
        self.state.lock().joints.clone()
    }

    /// Replace the cartesian vector of a frame.
    pub fn set_cartesian(&self, frame: CoordinateFrame, values: Vec<f64>) {
        self.state.lock().cartesian.insert(frame, values);
    }

    /// Current cartesian vector of a frame.
    pub fn cartesian(&self, frame: CoordinateFrame) -> Vec<f64> {
        self.state
            .lock()
            .cartesian
            .get(&frame)
            .cloned()
            .unwrap_or_default()
    }

    /// Frame most recently selected on the controller.
    pub fn active_frame(&self) -> CoordinateFrame {
        self.state.lock().active_frame
    }

    /// Every call received so far.
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().calls.clone()
    }

    /// Number of received calls matching `predicate`.
    pub fn count_calls(&self, predicate: impl Fn(&GatewayCall) -> bool) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| predicate(call))
            .count()
    }

    /// Forget the call log.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }
}

impl MotionGateway for SimulatedRobot {
    fn connect(&mut self, ip: &str, port: &str, name: &str) -> GatewayResult<StatusCode> {
        let mut state = self.state.lock();
        state.calls.push(GatewayCall::Connect {
            ip: ip.to_string(),
            port: port.to_string(),
            name: name.to_string(),
        });
        let code = state.status("connect")?;
        if code == 0 {
            state.connected = true;
        }
        Ok(code)
    }

    fn disconnect(&mut self, _name: &str) -> GatewayResult<()> {
        let mut state = self.state.lock();
        state.calls.push(GatewayCall::Disconnect);
        state.outcome("disconnect")?;
        state.connected = false;
        Ok(())
    }

    fn set_servo_locked(&mut self, locked: bool, _name: &str) -> GatewayResult<bool> {
        let mut state = self.state.lock();
        state.calls.push(GatewayCall::SetServoLocked { locked });
        state.outcome("set_servo_state")?;
        if state.reject_servo {
            return Ok(false);
        }
        state.servo_locked = locked;
        Ok(true)
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn is_servo_locked(&self) -> bool {
        self.state.lock().servo_locked
    }

    fn get_position(&mut self, _name: &str, frame: PositionFrame) -> GatewayResult<Vec<f64>> {
        let mut state = self.state.lock();
        state.calls.push(GatewayCall::GetPosition { frame });
        state.outcome("get_current_position")?;
        Ok(match frame {
            PositionFrame::Joint => state.joints.clone(),
            PositionFrame::Cartesian(frame) => {
                state.cartesian.get(&frame).cloned().unwrap_or_default()
            }
        })
    }

    fn move_joint_absolute(
        &mut self,
        target: &[f64],
        vel: u32,
        _ramp: Ramp,
        _name: &str,
    ) -> GatewayResult<StatusCode> {
        let mut state = self.state.lock();
        state.calls.push(GatewayCall::MoveJointAbsolute {
            target: target.to_vec(),
            vel,
        });
        let code = state.status("robot_movej")?;
        if code == 0 {
            state.joints = target.iter().copied().take(JOINT_COUNT).collect();
        }
        Ok(code)
    }

    fn move_linear_absolute(
        &mut self,
        target: &[f64],
        vel: u32,
        frame: CoordinateFrame,
        _ramp: Ramp,
        _name: &str,
    ) -> GatewayResult<StatusCode> {
        let mut state = self.state.lock();
        state.calls.push(GatewayCall::MoveLinearAbsolute {
            target: target.to_vec(),
            vel,
            frame,
        });
        let code = state.status("robot_movel")?;
        if code == 0 {
            state
                .cartesian
                .insert(frame, target.iter().copied().take(6).collect());
        }
        Ok(code)
    }

    fn move_joint_relative(
        &mut self,
        joint: usize,
        delta: f64,
        vel: u32,
        _ramp: Ramp,
        _name: &str,
    ) -> GatewayResult<()> {
        let mut state = self.state.lock();
        state
            .calls
            .push(GatewayCall::MoveJointRelative { joint, delta, vel });
        state.outcome("move_joint_relative")?;
        if let Some(value) = state.joints.get_mut(joint) {
            *value += delta;
        }
        Ok(())
    }

    fn move_linear_relative(
        &mut self,
        axis: usize,
        delta: f64,
        vel: u32,
        _ramp: Ramp,
        _name: &str,
    ) -> GatewayResult<()> {
        let mut state = self.state.lock();
        state
            .calls
            .push(GatewayCall::MoveLinearRelative { axis, delta, vel });
        state.outcome("linear_jog")?;
        let frame = state.active_frame;
        if let Some(value) = state
            .cartesian
            .get_mut(&frame)
            .and_then(|values| values.get_mut(axis))
        {
            *value += delta;
        }
        Ok(())
    }

    fn go_home_library(&mut self, _name: &str) -> GatewayResult<()> {
        let mut state = self.state.lock();
        state.calls.push(GatewayCall::GoHomeLibrary);
        state.outcome("robot_go_home")?;
        state.joints = vec![0.0; JOINT_COUNT];
        Ok(())
    }

    fn set_coordinate_frame(&mut self, frame: CoordinateFrame, _name: &str) -> GatewayResult<()> {
        let mut state = self.state.lock();
        state.calls.push(GatewayCall::SetCoordinateFrame { frame });
        state.outcome("set_current_coord")?;
        state.active_frame = frame;
        Ok(())
    }

    fn clear_error(&mut self, _name: &str) -> GatewayResult<StatusCode> {
        let mut state = self.state.lock();
        state.calls.push(GatewayCall::ClearError);
        state.status("clear_error")
    }
}
