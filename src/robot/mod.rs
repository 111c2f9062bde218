//! Host side of the interpreter: the motion SDK boundary and the session that
//! tracks connection, servo and speed state on top of it.

/// Motion SDK boundary.
pub mod gateway;
/// Operator session state.
pub mod session;
/// In-memory gateway implementation.
pub mod simulated;

pub use gateway::{
    CoordinateFrame, GatewayError, GatewayResult, MotionGateway, PositionFrame, Ramp, StatusCode,
};
pub use session::{
    ConnectOutcome, DisconnectOutcome, EmergencyStop, Readiness, RobotSession, SessionError,
    SessionResult,
};
pub use simulated::{GatewayCall, SimulatedRobot};
