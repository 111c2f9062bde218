//! Host-side robot session.
//!
//! [`RobotSession`] owns everything the operator UI used to keep in globals:
//! the connection parameters, the connection and servo-lock flags, and the
//! speed setting. All state changes go through gateway calls; the flags only
//! flip once the controller has accepted the change.

use thiserror::Error;

use super::gateway::{
    GatewayError, MotionGateway, PositionFrame, Ramp, SUBMIT_VECTOR_LEN, check_status,
};
use crate::config::{AppConfig, MotionProfile, RobotConfig};

/// Upper bound of the speed setting.
pub const MAX_SPEED: u32 = 100;

/// Errors surfaced by session operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    /// The robot is not connected.
    #[error("cannot {action}: robot not connected")]
    NotConnected {
        /// Operation that was refused.
        action: String,
    },

    /// The servos are locked and auto-unlock was not permitted.
    #[error("cannot {action}: servo locked, unlock the robot first")]
    ServoLocked {
        /// Operation that was refused.
        action: String,
    },

    /// Automatic unlock was attempted and failed.
    #[error("cannot {action}: failed to unlock servo ({reason})")]
    UnlockFailed {
        /// Operation that needed the unlock.
        action: String,
        /// Why the unlock failed.
        reason: String,
    },

    /// The controller refused a servo lock/unlock request.
    #[error("controller rejected servo request (locked = {locked})")]
    ServoRejected {
        /// Requested lock state.
        locked: bool,
    },

    /// The connect call returned a non-zero status.
    #[error("connect failed with code {code}")]
    ConnectFailed {
        /// Returned status code.
        code: i32,
    },

    /// Any other gateway failure.
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Convenience result alias for session operations.
pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// How [`RobotSession::ensure_robot_ready`] satisfied its checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Connected and already unlocked.
    Ready,
    /// Connected; the servos were unlocked on the caller's behalf.
    AutoUnlocked,
}

/// Result of a connect request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A new connection was established.
    Connected,
    /// The session was already connected; nothing was sent.
    AlreadyConnected,
}

/// Result of a disconnect request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectOutcome {
    /// The connection was closed.
    Disconnected,
    /// The session was not connected; nothing was sent.
    AlreadyDisconnected,
}

/// Result of an emergency-stop toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmergencyStop {
    /// The stop was engaged and the servos locked.
    Engaged,
    /// The stop was released and the servos unlocked.
    Released,
}

/// Live session with one robot controller.
pub struct RobotSession<G> {
    gateway: G,
    config: RobotConfig,
    profile: MotionProfile,
    connected: bool,
    servo_locked: bool,
    stop_engaged: bool,
    speed: u32,
}

impl<G: MotionGateway> RobotSession<G> {
    /// Create a disconnected session with locked servos.
    pub fn new(gateway: G, config: &AppConfig) -> Self {
        Self {
            gateway,
            config: config.robot.clone(),
            profile: config.motion.clone(),
            connected: false,
            servo_locked: true,
            stop_engaged: false,
            speed: config.motion.initial_speed.min(MAX_SPEED),
        }
    }

    /// Current connection parameters.
    pub fn robot_config(&self) -> &RobotConfig {
        &self.config
    }

    /// Replace connection parameters (blank values keep the current ones).
    pub fn update_robot_config(&mut self, ip: &str, port: &str, name: &str) {
        self.config.update(ip, port, name);
    }

    /// Motion constants in effect.
    pub fn profile(&self) -> &MotionProfile {
        &self.profile
    }

    /// Acceleration/deceleration for motion commands.
    pub fn ramp(&self) -> Ramp {
        Ramp {
            acc: self.profile.acceleration,
            dec: self.profile.deceleration,
        }
    }

    /// Current speed setting.
    pub fn current_speed(&self) -> u32 {
        self.speed
    }

    /// Set the speed, clamped to `0..=100`. Returns the applied value.
    pub fn set_speed(&mut self, speed: i64) -> u32 {
        self.speed = speed.clamp(0, MAX_SPEED as i64) as u32;
        tracing::debug!(speed = self.speed, "speed updated");
        self.speed
    }

    /// Whether the session is connected.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Whether the servos are locked.
    pub fn is_servo_locked(&self) -> bool {
        self.servo_locked
    }

    /// Whether the emergency stop is engaged.
    pub fn is_stop_engaged(&self) -> bool {
        self.stop_engaged
    }

    /// Borrow the underlying gateway.
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Mutably borrow the underlying gateway.
    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    /// Connect using the current parameters. A fresh connection starts with
    /// the servos locked.
    pub fn connect(&mut self) -> SessionResult<ConnectOutcome> {
        if self.connected {
            return Ok(ConnectOutcome::AlreadyConnected);
        }

        let RobotConfig { ip, port, name } = self.config.clone();
        tracing::info!(%ip, %port, %name, "connecting");
        let code = self.gateway.connect(&ip, &port, &name)?;
        if code != 0 {
            self.connected = false;
            return Err(SessionError::ConnectFailed { code });
        }

        self.connected = true;
        if let Err(err) = self.apply_servo_state(true) {
            tracing::warn!(error = %err, "servo lock after connect failed");
        }
        Ok(ConnectOutcome::Connected)
    }

    /// Lock the servos, then close the connection.
    pub fn disconnect(&mut self) -> SessionResult<DisconnectOutcome> {
        if !self.connected {
            return Ok(DisconnectOutcome::AlreadyDisconnected);
        }

        if let Err(err) = self.apply_servo_state(true) {
            tracing::warn!(error = %err, "power-off during disconnect failed");
        }

        let result = self.gateway.disconnect(&self.config.name);
        self.connected = false;
        result?;
        Ok(DisconnectOutcome::Disconnected)
    }

    /// Lock or unlock the servos. The flag changes only on success.
    pub fn apply_servo_state(&mut self, locked: bool) -> SessionResult<()> {
        if self.gateway.set_servo_locked(locked, &self.config.name)? {
            self.servo_locked = locked;
            Ok(())
        } else {
            Err(SessionError::ServoRejected { locked })
        }
    }

    /// Toggle the emergency stop: engaging locks the servos, releasing
    /// unlocks them. The stop flag flips even when the servo request fails.
    pub fn toggle_emergency_stop(&mut self) -> SessionResult<EmergencyStop> {
        self.require_connected("use emergency stop")?;

        let engage = !self.stop_engaged;
        let result = self.apply_servo_state(engage);
        self.stop_engaged = engage;
        if let Err(err) = &result {
            tracing::warn!(engage, error = %err, "emergency stop servo request failed");
        }
        result?;

        if engage {
            tracing::warn!("emergency stop engaged; servos locked");
            Ok(EmergencyStop::Engaged)
        } else {
            tracing::info!("emergency stop released; servos unlocked");
            Ok(EmergencyStop::Released)
        }
    }

    /// Clear latched controller errors.
    pub fn clear_error(&mut self) -> SessionResult<()> {
        self.require_connected("clear errors")?;
        let code = self.gateway.clear_error(&self.config.name)?;
        check_status("clear_error", code)?;
        tracing::info!("controller errors cleared");
        Ok(())
    }

    /// Read the current joint vector.
    pub fn read_joints(&mut self, action: &str) -> SessionResult<Vec<f64>> {
        self.require_connected(action)?;
        Ok(self
            .gateway
            .get_position(&self.config.name, PositionFrame::Joint)?)
    }

    /// Submit an absolute joint move with an explicit velocity and ramp.
    pub fn move_joints(&mut self, target: &[f64], vel: u32, ramp: Ramp) -> SessionResult<()> {
        let code = self
            .gateway
            .move_joint_absolute(target, vel, ramp, &self.config.name)?;
        check_status("robot_movej", code)?;
        Ok(())
    }

    fn require_connected(&self, action: &str) -> SessionResult<()> {
        if self.connected {
            Ok(())
        } else {
            Err(SessionError::NotConnected {
                action: action.to_string(),
            })
        }
    }

    /// Check that motion is possible: connected, and servos unlocked. With
    /// `auto_unlock` a locked robot is unlocked first.
    pub fn ensure_robot_ready(
        &mut self,
        auto_unlock: bool,
        source: &str,
    ) -> SessionResult<Readiness> {
        self.require_connected(source)?;

        if !self.servo_locked {
            return Ok(Readiness::Ready);
        }

        if !auto_unlock {
            return Err(SessionError::ServoLocked {
                action: source.to_string(),
            });
        }

        tracing::info!(source, "unlocking servo automatically");
        self.apply_servo_state(false)
            .map_err(|err| SessionError::UnlockFailed {
                action: source.to_string(),
                reason: err.to_string(),
            })?;
        Ok(Readiness::AutoUnlocked)
    }

    /// Move to the home position, either through the controller's routine or
    /// by commanding all-zero joint targets.
    pub fn go_home(&mut self, use_library: bool) -> SessionResult<()> {
        self.ensure_robot_ready(false, "go home")?;

        if use_library {
            self.gateway.go_home_library(&self.config.name)?;
        } else {
            let target = [0.0; SUBMIT_VECTOR_LEN];
            let ramp = self.ramp();
            let code = self.gateway.move_joint_absolute(
                &target,
                self.profile.home_velocity,
                ramp,
                &self.config.name,
            )?;
            check_status("robot_movej", code)?;
        }
        Ok(())
    }
}
