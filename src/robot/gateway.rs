//! Boundary to the vendor motion-control SDK.
//!
//! The SDK itself is an external collaborator; the interpreter only ever talks
//! to it through [`MotionGateway`]. Calls return the SDK's integer status code
//! (`0` = success) wrapped in a [`GatewayResult`], where `Err` stands for a
//! native fault raised by the library.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Number of joints on the arm.
pub const JOINT_COUNT: usize = 6;

/// Length of the position vectors the SDK expects on submit.
pub const SUBMIT_VECTOR_LEN: usize = 7;

/// Raw status code returned by the SDK.
pub type StatusCode = i32;

/// Convenience result alias for gateway operations.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Failures surfaced by the motion SDK boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    /// The SDK returned a non-zero status code.
    #[error("{operation} returned code {code}")]
    Status {
        /// SDK operation that failed.
        operation: &'static str,
        /// Returned status code.
        code: StatusCode,
    },

    /// The SDK raised a native fault.
    #[error("{operation} failed: {message}")]
    Fault {
        /// SDK operation that failed.
        operation: &'static str,
        /// Fault description reported by the library.
        message: String,
    },

    /// A position vector was too short to address the requested element.
    #[error("{operation} returned {actual} values, expected at least {expected}")]
    ShortVector {
        /// SDK operation whose result was inspected.
        operation: &'static str,
        /// Minimum number of elements required.
        expected: usize,
        /// Number of elements actually returned.
        actual: usize,
    },
}

impl GatewayError {
    /// Build a fault error for the given operation.
    pub fn fault(operation: &'static str, message: impl Into<String>) -> Self {
        GatewayError::Fault {
            operation,
            message: message.into(),
        }
    }
}

/// Map a raw status code onto a [`GatewayResult`].
pub fn check_status(operation: &'static str, code: StatusCode) -> GatewayResult<()> {
    if code == 0 {
        Ok(())
    } else {
        Err(GatewayError::Status { operation, code })
    }
}

/// Cartesian coordinate frame used for linear motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateFrame {
    /// Tool frame.
    Tool,
    /// User origin frame.
    Origin,
    /// Robot base frame.
    Base,
}

impl CoordinateFrame {
    /// Parse a frame name (case-insensitive).
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "tool" => Some(CoordinateFrame::Tool),
            "origin" => Some(CoordinateFrame::Origin),
            "base" => Some(CoordinateFrame::Base),
            _ => None,
        }
    }

    /// Lowercase frame name.
    pub fn as_str(self) -> &'static str {
        match self {
            CoordinateFrame::Tool => "tool",
            CoordinateFrame::Origin => "origin",
            CoordinateFrame::Base => "base",
        }
    }
}

impl fmt::Display for CoordinateFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Frame in which a position query is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionFrame {
    /// Joint space (one angle per joint).
    Joint,
    /// Cartesian space in the given frame.
    Cartesian(CoordinateFrame),
}

impl fmt::Display for PositionFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionFrame::Joint => f.write_str("joint"),
            PositionFrame::Cartesian(frame) => write!(f, "{}", frame),
        }
    }
}

/// Acceleration and deceleration applied to a motion command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ramp {
    /// Acceleration percentage.
    pub acc: u32,
    /// Deceleration percentage.
    pub dec: u32,
}

/// Operations the interpreter needs from the motion SDK.
///
/// `name` is always the configured robot name; the SDK multiplexes several
/// robots over one library instance.
pub trait MotionGateway {
    /// Open a connection to the controller.
    fn connect(&mut self, ip: &str, port: &str, name: &str) -> GatewayResult<StatusCode>;

    /// Close the connection to the controller.
    fn disconnect(&mut self, name: &str) -> GatewayResult<()>;

    /// Lock (power off) or unlock (power on) the servos. Returns whether the
    /// controller accepted the change.
    fn set_servo_locked(&mut self, locked: bool, name: &str) -> GatewayResult<bool>;

    /// Whether the controller reports an open connection.
    fn is_connected(&self) -> bool;

    /// Whether the controller reports the servos as locked.
    fn is_servo_locked(&self) -> bool;

    /// Read the current position in the requested frame.
    fn get_position(&mut self, name: &str, frame: PositionFrame) -> GatewayResult<Vec<f64>>;

    /// Submit an absolute joint-space move.
    fn move_joint_absolute(
        &mut self,
        target: &[f64],
        vel: u32,
        ramp: Ramp,
        name: &str,
    ) -> GatewayResult<StatusCode>;

    /// Submit an absolute cartesian move in the given frame.
    fn move_linear_absolute(
        &mut self,
        target: &[f64],
        vel: u32,
        frame: CoordinateFrame,
        ramp: Ramp,
        name: &str,
    ) -> GatewayResult<StatusCode>;

    /// Jog one joint by a signed delta.
    fn move_joint_relative(
        &mut self,
        joint: usize,
        delta: f64,
        vel: u32,
        ramp: Ramp,
        name: &str,
    ) -> GatewayResult<()>;

    /// Jog along one cartesian axis (0 = X, 1 = Y, 2 = Z) by a signed delta.
    fn move_linear_relative(
        &mut self,
        axis: usize,
        delta: f64,
        vel: u32,
        ramp: Ramp,
        name: &str,
    ) -> GatewayResult<()>;

    /// Run the controller's built-in homing routine.
    fn go_home_library(&mut self, name: &str) -> GatewayResult<()>;

    /// Select the active cartesian frame on the controller.
    fn set_coordinate_frame(&mut self, frame: CoordinateFrame, name: &str) -> GatewayResult<()>;

    /// Acknowledge and clear latched controller errors.
    fn clear_error(&mut self, name: &str) -> GatewayResult<StatusCode>;
}
