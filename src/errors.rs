use std::fmt;
use std::error::Error;

/// Represents errors that can occur while setting up a simulation.
///
/// Invariant violations inside the engine (a cell read before its drift, a
/// hold counter underflow, a particle landing in the wrong octant) are not
/// represented here: those are programming errors and abort the process with
/// a diagnostic, exactly like a failed assertion.
#[derive(Debug, Clone)]
pub enum SimError {
    /// Indicates an invalid domain extent (e.g., zero or negative width).
    InvalidDomain,
    /// Indicates an invalid particle mass (e.g., negative or zero mass).
    InvalidMass,
    /// Indicates an invalid time step or time-line position.
    InvalidTime,
    /// Indicates an invalid smoothing length bound.
    InvalidSmoothingLength,
    /// Indicates an invalid opening-angle parameter.
    InvalidOpeningAngle,
    /// Indicates a configuration that names zero worker threads.
    NoWorkers,
    /// A general error for setups that produce an invalid state.
    SetupError(String),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SimError::InvalidDomain => write!(f, "Invalid domain extent"),
            SimError::InvalidMass => write!(f, "Invalid mass value"),
            SimError::InvalidTime => write!(f, "Invalid time value"),
            SimError::InvalidSmoothingLength => write!(f, "Invalid smoothing length bound"),
            SimError::InvalidOpeningAngle => write!(f, "Invalid opening-angle parameter"),
            SimError::NoWorkers => write!(f, "At least one worker thread is required"),
            SimError::SetupError(msg) => write!(f, "Setup error: {}", msg),
        }
    }
}

impl Error for SimError {}
