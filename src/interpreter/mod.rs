//! Interpreter for programs authored in the block editor.
//!
//! A program arrives as a JSON array of step objects. [`parse_program`] turns
//! it into a step tree, and [`Interpreter`] walks the tree against a
//! [`RobotSession`](crate::robot::RobotSession), resolving expressions through
//! the shared [`RuntimeState`] and routing every robot action through the
//! safety-gated [`ActionDispatcher`].

/// Step tree and expression definitions.
pub mod ast;
/// Cancellation and delay handling.
pub mod control;
/// Structured diagnostics.
pub mod diagnostic;
/// Safety-gated robot actions.
pub mod dispatch;
/// JSON program decoding.
pub mod parser;
/// Expression evaluation.
pub mod resolver;
/// Step interpreter.
pub mod runtime;
/// Variable storage for one run.
pub mod state;
/// Runtime values and comparisons.
pub mod value;

pub use ast::{
    CartesianTarget, Condition, ConditionKind, Expression, HomeMode, LiteralType, ServoTarget,
    Step, count_steps,
};
pub use control::{CancelToken, DelayDriver, RecordingDelay, ThreadDelay};
pub use diagnostic::{Diagnostic, DiagnosticSink, Diagnostics, Severity, StepContext, TracingOnly};
pub use dispatch::{ActionDispatcher, DispatchError, DispatchResult};
pub use parser::{parse_program, parse_program_value};
pub use resolver::resolve;
pub use runtime::{DEFAULT_CONTEXT_LABEL, Flow, Interpreter, RunSummary};
pub use state::RuntimeState;
pub use value::{CompareOperator, ExpectedType, Value, compare_values};

use thiserror::Error;

/// Convenience result alias for program loading.
pub type Result<T> = std::result::Result<T, ProgramError>;

/// Reasons a program is rejected before it runs.
#[derive(Debug, Error)]
pub enum ProgramError {
    /// The text is not valid JSON.
    #[error("invalid program JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The document is valid JSON but not an array of steps.
    #[error("program must be a JSON array of steps")]
    NotAnArray,

    /// The program has no steps.
    #[error("program is empty")]
    Empty,
}
