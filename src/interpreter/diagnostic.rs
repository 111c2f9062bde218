//! Structured diagnostics emitted while a program runs.
//!
//! Every diagnostic goes to a [`DiagnosticSink`] supplied by the host (the
//! console pane, a test harness) and is mirrored to `tracing`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Program output from a `print` block.
    Output,
    /// Progress information.
    Info,
    /// A step was skipped or partially applied.
    Warning,
    /// A step failed.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Output => "output",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

/// One diagnostic line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity.
    pub severity: Severity,
    /// Label of the enclosing sequence, e.g. `[Blockly] Step 2 iteration 1/3`.
    pub context: String,
    /// 1-based step number within the sequence; `None` for run-level messages.
    pub step: Option<usize>,
    /// Human-readable message.
    pub message: String,
    /// When the diagnostic was emitted.
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.step {
            Some(step) => write!(f, "{} Step {}: {}", self.context, step, self.message),
            None => write!(f, "{}: {}", self.context, self.message),
        }
    }
}

/// Receiver of diagnostics.
pub trait DiagnosticSink {
    /// Accept one diagnostic.
    fn emit(&mut self, diagnostic: Diagnostic);
}

impl DiagnosticSink for Vec<Diagnostic> {
    fn emit(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }
}

/// Sink that drops everything; `tracing` still sees each diagnostic.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingOnly;

impl DiagnosticSink for TracingOnly {
    fn emit(&mut self, _diagnostic: Diagnostic) {}
}

/// Position of the step being executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepContext {
    /// Label of the enclosing sequence.
    pub label: String,
    /// 1-based index within the sequence.
    pub index: usize,
}

impl StepContext {
    /// `"<label> Step <index>"`, the label handed to nested sequences.
    pub fn prefix(&self) -> String {
        format!("{} Step {}", self.label, self.index)
    }
}

/// Front-end used by the interpreter to emit diagnostics.
pub struct Diagnostics<'a> {
    sink: &'a mut dyn DiagnosticSink,
}

impl<'a> Diagnostics<'a> {
    /// Wrap a sink.
    pub fn new(sink: &'a mut dyn DiagnosticSink) -> Self {
        Self { sink }
    }

    /// Emit a diagnostic attached to a step.
    pub fn emit(&mut self, severity: Severity, cx: &StepContext, message: impl Into<String>) {
        self.push(severity, cx.label.clone(), Some(cx.index), message.into());
    }

    /// Emit a run-level diagnostic.
    pub fn emit_run(&mut self, severity: Severity, label: &str, message: impl Into<String>) {
        self.push(severity, label.to_string(), None, message.into());
    }

    /// Program output.
    pub fn output(&mut self, cx: &StepContext, message: impl Into<String>) {
        self.emit(Severity::Output, cx, message);
    }

    /// Progress information.
    pub fn info(&mut self, cx: &StepContext, message: impl Into<String>) {
        self.emit(Severity::Info, cx, message);
    }

    /// Skipped or partially applied step.
    pub fn warn(&mut self, cx: &StepContext, message: impl Into<String>) {
        self.emit(Severity::Warning, cx, message);
    }

    /// Failed step.
    pub fn error(&mut self, cx: &StepContext, message: impl Into<String>) {
        self.emit(Severity::Error, cx, message);
    }

    fn push(&mut self, severity: Severity, context: String, step: Option<usize>, message: String) {
        match severity {
            Severity::Output => {
                tracing::info!(target: "robo_blockly::print", context = %context, step, "{}", message)
            }
            Severity::Info => tracing::info!(context = %context, step, "{}", message),
            Severity::Warning => tracing::warn!(context = %context, step, "{}", message),
            Severity::Error => tracing::error!(context = %context, step, "{}", message),
        }

        self.sink.emit(Diagnostic {
            severity,
            context,
            step,
            message,
            timestamp: Utc::now(),
        });
    }
}
