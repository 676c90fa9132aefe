use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::SimulationState;

pub const MIN_SPEED: f64 = 0.1;
pub const MAX_SPEED: f64 = 10.0;
pub const DEFAULT_SPEED: f64 = 1.0;
pub const SPEED_STEP: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SpeedError {
    #[error("speed multiplier must be a finite number, got {0}")]
    NotFinite(f64),
    #[error("speed multiplier {value} is outside [0.1, 10.0]")]
    OutOfRange { value: f64 },
}

/// Speed multiplier accepted by the set-speed command, always within
/// [`MIN_SPEED`, `MAX_SPEED`].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct SpeedMultiplier(f64);

impl SpeedMultiplier {
    pub fn new(value: f64) -> Result<Self, SpeedError> {
        if !value.is_finite() {
            return Err(SpeedError::NotFinite(value));
        }
        if !(MIN_SPEED..=MAX_SPEED).contains(&value) {
            return Err(SpeedError::OutOfRange { value });
        }
        Ok(Self(value))
    }

    /// Pull an arbitrary input into range. Non-finite input becomes the default.
    pub fn clamped(value: f64) -> Self {
        if !value.is_finite() {
            return Self::default();
        }
        Self(value.clamp(MIN_SPEED, MAX_SPEED))
    }

    /// Move by `steps` increments of [`SPEED_STEP`], snapping to one decimal
    /// so repeated presses do not drift.
    pub fn step_by(self, steps: i32) -> Self {
        let raw = self.0 + f64::from(steps) * SPEED_STEP;
        Self::clamped((raw * 10.0).round() / 10.0)
    }

    pub fn get(self) -> f64 {
        self.0
    }
}

impl Default for SpeedMultiplier {
    fn default() -> Self {
        Self(DEFAULT_SPEED)
    }
}

impl TryFrom<f64> for SpeedMultiplier {
    type Error = SpeedError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SpeedMultiplier> for f64 {
    fn from(value: SpeedMultiplier) -> Self {
        value.0
    }
}

impl fmt::Display for SpeedMultiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}x", self.0)
    }
}

/// Imperative request sent to the simulation service.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Start,
    Pause,
    Reset,
    Step,
    SetSpeed(SpeedMultiplier),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CommandRejected {
    #[error("{command} is unavailable while the simulation is running")]
    WhileRunning { command: &'static str },
    #[error("{command} is unavailable while the simulation is paused")]
    WhileStopped { command: &'static str },
}

impl Command {
    /// Control panel buttons in display order. Speed has its own slider.
    pub const BUTTONS: [Command; 4] = [Command::Start, Command::Pause, Command::Reset, Command::Step];

    pub fn label(&self) -> &'static str {
        match self {
            Command::Start => "Start",
            Command::Pause => "Pause",
            Command::Reset => "Reset",
            Command::Step => "Step",
            Command::SetSpeed(_) => "Speed",
        }
    }

    /// Button enablement against the cached status. An unknown status counts
    /// as "not running".
    pub fn is_enabled(&self, status: Option<&SimulationState>) -> bool {
        self.check(status).is_ok()
    }

    pub fn check(&self, status: Option<&SimulationState>) -> Result<(), CommandRejected> {
        let running = status.map(|state| state.is_running).unwrap_or(false);
        match self {
            Command::Start | Command::Step if running => Err(CommandRejected::WhileRunning {
                command: self.label(),
            }),
            Command::Pause if !running => Err(CommandRejected::WhileStopped {
                command: self.label(),
            }),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SetSpeed(speed) => write!(f, "Speed {speed}"),
            other => f.write_str(other.label()),
        }
    }
}
