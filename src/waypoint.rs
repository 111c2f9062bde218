//! Teach-and-playback waypoint programs
//!
//! A waypoint program is a table of joint positions recorded from the live
//! robot. Cells hold the text the operator sees, so a hand-edited table may
//! contain bad entries; those are rejected before playback moves anything.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::interpreter::CancelToken;
use crate::interpreter::value::parse_float;
use crate::robot::gateway::{JOINT_COUNT, MotionGateway, SUBMIT_VECTOR_LEN};
use crate::robot::session::{RobotSession, SessionError};
use crate::storage;

/// Errors raised while editing or playing back a waypoint program.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WaypointError {
    /// Precondition or gateway failure.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A joint cell is blank.
    #[error("Step {step}, column {column}: missing or empty value.")]
    MissingValue {
        /// 1-based step number.
        step: usize,
        /// 1-based joint column.
        column: usize,
    },

    /// A joint cell is not a finite number.
    #[error("Step {step}, column {column}: invalid number '{text}'.")]
    InvalidNumber {
        /// 1-based step number.
        step: usize,
        /// 1-based joint column.
        column: usize,
        /// Cell text as entered.
        text: String,
    },

    /// The referenced row does not exist.
    #[error("Step {0} does not exist.")]
    NoSuchStep(usize),

    /// The referenced column is not a joint column.
    #[error("Column {0} is not a joint column.")]
    NoSuchColumn(usize),

    /// Playback of an empty program.
    #[error("No steps available.")]
    Empty,

    /// Loop playback of an empty program.
    #[error("No steps to loop.")]
    NothingToLoop,

    /// Loop playback with a count below one.
    #[error("Loop count must be at least 1.")]
    InvalidLoopCount(i64),
}

/// Convenience result alias for waypoint operations.
pub type WaypointResult<T> = std::result::Result<T, WaypointError>;

/// One recorded position; joint cells in column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Waypoint {
    /// Joint values as text, starting at column 1.
    pub joints: Vec<String>,
}

impl Waypoint {
    /// Build a row from raw cell text.
    pub fn from_cells<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            joints: cells.into_iter().map(Into::into).collect(),
        }
    }

    fn from_position(mut position: Vec<f64>) -> Self {
        if position.len() < SUBMIT_VECTOR_LEN {
            position.resize(SUBMIT_VECTOR_LEN, 0.0);
        }
        Self {
            joints: position.iter().map(|value| format!("{:.2}", value)).collect(),
        }
    }

    /// Validate the six joint cells of step `step` and pad the result to the
    /// submit length.
    pub fn target(&self, step: usize) -> WaypointResult<Vec<f64>> {
        let mut target = Vec::with_capacity(SUBMIT_VECTOR_LEN);
        for column in 1..=JOINT_COUNT {
            let cell = self.joints.get(column - 1).map(String::as_str).unwrap_or("");
            if cell.trim().is_empty() {
                return Err(WaypointError::MissingValue { step, column });
            }
            match parse_float(cell).filter(|value| value.is_finite()) {
                Some(value) => target.push(value),
                None => {
                    return Err(WaypointError::InvalidNumber {
                        step,
                        column,
                        text: cell.to_string(),
                    });
                }
            }
        }
        target.resize(SUBMIT_VECTOR_LEN, 0.0);
        Ok(target)
    }
}

/// Outcome of a playback run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackSummary {
    /// Moves submitted.
    pub steps_executed: usize,
    /// Passes over the whole table that finished.
    pub loops_completed: usize,
    /// Whether the cancel token stopped playback early.
    pub cancelled: bool,
}

/// On-disk row: the step number is informational and renumbered on load.
#[derive(Serialize, Deserialize)]
struct StoredStep {
    #[serde(default)]
    step: usize,
    #[serde(default)]
    joints: Vec<String>,
}

/// Ordered table of recorded waypoints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaypointProgram {
    steps: Vec<Waypoint>,
}

impl WaypointProgram {
    /// Create an empty program.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a program from existing rows.
    pub fn from_steps(steps: Vec<Waypoint>) -> Self {
        Self { steps }
    }

    /// Rows in playback order. Step numbers are positions plus one.
    pub fn steps(&self) -> &[Waypoint] {
        &self.steps
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Remove every row.
    pub fn clear(&mut self) {
        self.steps.clear();
        tracing::info!("waypoint table cleared");
    }

    /// Append the robot's current joint position. Returns the new step number.
    pub fn record<G: MotionGateway>(
        &mut self,
        session: &mut RobotSession<G>,
    ) -> WaypointResult<usize> {
        let waypoint = Waypoint::from_position(session.read_joints("save step")?);
        self.steps.push(waypoint);
        let step = self.steps.len();
        tracing::info!(step, "waypoint saved");
        Ok(step)
    }

    /// Overwrite row `index` with the current joint position.
    pub fn replace<G: MotionGateway>(
        &mut self,
        session: &mut RobotSession<G>,
        index: usize,
    ) -> WaypointResult<()> {
        let position = session.read_joints("edit step")?;
        let slot = self
            .steps
            .get_mut(index)
            .ok_or(WaypointError::NoSuchStep(index + 1))?;
        *slot = Waypoint::from_position(position);
        tracing::info!(step = index + 1, "waypoint updated");
        Ok(())
    }

    /// Insert the current joint position below row `after`, or at the end
    /// when no row is selected. Returns the new step number.
    pub fn insert_after<G: MotionGateway>(
        &mut self,
        session: &mut RobotSession<G>,
        after: Option<usize>,
    ) -> WaypointResult<usize> {
        let position = session.read_joints("insert step")?;
        let at = match after {
            Some(index) if index < self.steps.len() => index + 1,
            Some(index) => return Err(WaypointError::NoSuchStep(index + 1)),
            None => self.steps.len(),
        };
        self.steps.insert(at, Waypoint::from_position(position));
        tracing::info!(step = at + 1, "waypoint inserted");
        Ok(at + 1)
    }

    /// Delete row `index`; later rows move up one step.
    pub fn remove<G: MotionGateway>(
        &mut self,
        session: &RobotSession<G>,
        index: usize,
    ) -> WaypointResult<Waypoint> {
        if !session.is_connected() {
            return Err(SessionError::NotConnected {
                action: "delete step".to_string(),
            }
            .into());
        }
        if index >= self.steps.len() {
            return Err(WaypointError::NoSuchStep(index + 1));
        }
        let removed = self.steps.remove(index);
        tracing::info!(step = index + 1, remaining = self.steps.len(), "waypoint deleted");
        Ok(removed)
    }

    /// Replace the text of one joint cell (1-based column), as a table edit.
    pub fn set_cell(&mut self, index: usize, column: usize, text: &str) -> WaypointResult<()> {
        if column == 0 || column > SUBMIT_VECTOR_LEN {
            return Err(WaypointError::NoSuchColumn(column));
        }
        let row = self
            .steps
            .get_mut(index)
            .ok_or(WaypointError::NoSuchStep(index + 1))?;
        if row.joints.len() < column {
            row.joints.resize(column, String::new());
        }
        row.joints[column - 1] = text.to_string();
        Ok(())
    }

    /// Submit row `index` as an absolute joint move at the session speed.
    pub fn execute_step<G: MotionGateway>(
        &self,
        session: &mut RobotSession<G>,
        index: usize,
    ) -> WaypointResult<()> {
        session.ensure_robot_ready(false, "execute step")?;
        let target = self
            .steps
            .get(index)
            .ok_or(WaypointError::NoSuchStep(index + 1))?
            .target(index + 1)?;
        self.submit(session, index, &target)
    }

    /// Play every row once.
    pub fn run<G: MotionGateway>(
        &self,
        session: &mut RobotSession<G>,
        cancel: &CancelToken,
    ) -> WaypointResult<PlaybackSummary> {
        session.ensure_robot_ready(true, "run program")?;
        if self.steps.is_empty() {
            return Err(WaypointError::Empty);
        }
        self.play(session, 1, cancel)
    }

    /// Play the whole table `loops` times.
    pub fn run_loop<G: MotionGateway>(
        &self,
        session: &mut RobotSession<G>,
        loops: i64,
        cancel: &CancelToken,
    ) -> WaypointResult<PlaybackSummary> {
        session.ensure_robot_ready(true, "start loop")?;
        if loops < 1 {
            return Err(WaypointError::InvalidLoopCount(loops));
        }
        if self.steps.is_empty() {
            return Err(WaypointError::NothingToLoop);
        }
        self.play(session, loops as usize, cancel)
    }

    fn play<G: MotionGateway>(
        &self,
        session: &mut RobotSession<G>,
        loops: usize,
        cancel: &CancelToken,
    ) -> WaypointResult<PlaybackSummary> {
        let targets = self
            .steps
            .iter()
            .enumerate()
            .map(|(index, waypoint)| waypoint.target(index + 1))
            .collect::<WaypointResult<Vec<_>>>()?;

        let mut summary = PlaybackSummary {
            steps_executed: 0,
            loops_completed: 0,
            cancelled: false,
        };
        for pass in 1..=loops {
            tracing::info!("Loop {} of {}", pass, loops);
            for (index, target) in targets.iter().enumerate() {
                if cancel.is_cancelled() {
                    tracing::warn!(step = index + 1, "playback cancelled");
                    summary.cancelled = true;
                    return Ok(summary);
                }
                session.ensure_robot_ready(false, "execute step")?;
                self.submit(session, index, target)?;
                summary.steps_executed += 1;
            }
            summary.loops_completed += 1;
        }
        tracing::info!(steps = summary.steps_executed, "all steps executed");
        Ok(summary)
    }

    fn submit<G: MotionGateway>(
        &self,
        session: &mut RobotSession<G>,
        index: usize,
        target: &[f64],
    ) -> WaypointResult<()> {
        let vel = session.current_speed();
        let ramp = session.ramp();
        tracing::debug!(step = index + 1, vel, ?target, "submitting waypoint");
        session.move_joints(target, vel, ramp)?;
        Ok(())
    }

    /// Write the table atomically as JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let rows: Vec<StoredStep> = self
            .steps
            .iter()
            .enumerate()
            .map(|(index, waypoint)| StoredStep {
                step: index + 1,
                joints: waypoint.joints.clone(),
            })
            .collect();
        let json = serde_json::to_vec_pretty(&rows).context("Failed to serialize waypoints")?;
        storage::write_atomic(path, &json)?;
        tracing::info!(path = ?path, steps = rows.len(), "waypoint program saved");
        Ok(())
    }

    /// Load a table written by [`WaypointProgram::save`]. Stored step numbers
    /// are ignored; rows are renumbered by position.
    pub fn load(path: &Path) -> Result<Self> {
        let data = storage::read_file(path)?;
        let rows: Vec<StoredStep> = serde_json::from_slice(&data)
            .with_context(|| format!("Failed to deserialize waypoints: {:?}", path))?;
        let program = Self {
            steps: rows
                .into_iter()
                .map(|row| Waypoint { joints: row.joints })
                .collect(),
        };
        tracing::info!(path = ?path, steps = program.len(), "waypoint program loaded");
        Ok(program)
    }
}
