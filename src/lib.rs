//! Robo Blockly – interpreter for block-authored robot arm programs
//!
//! This crate executes programs built in a visual block editor against a
//! six-axis arm:
//! - A lenient JSON decoder for the editor's step tree
//! - A tree-walking interpreter with one shared variable scope per run
//! - Safety gating (connection and servo-lock checks) before every motion
//! - A motion gateway boundary with an in-memory simulated controller
//! - JSON-backed configuration and program storage
//! - Teach-and-playback waypoint tables recorded from the live arm

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Application configuration.
pub mod config;
/// Program interpreter.
pub mod interpreter;
/// Motion gateway and robot session.
pub mod robot;
/// Program and configuration persistence.
pub mod storage;
/// Recorded waypoint programs.
pub mod waypoint;

// Re-export key types for convenience
pub use config::AppConfig;
pub use interpreter::{Interpreter, ProgramError, RunSummary, Step, parse_program};
pub use robot::{MotionGateway, RobotSession, SimulatedRobot};
pub use waypoint::{Waypoint, WaypointError, WaypointProgram};

/// Current version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
