// src/gravity/properties.rs

use crate::errors::SimError;

/// Tunables of the self-gravity solver.
#[derive(Debug, Clone, Copy)]
pub struct GravityConfig {
    /// Time integration accuracy parameter.
    pub eta: f32,
    /// Plummer softening length.
    pub epsilon: f64,
    /// Opening angle of the multipole acceptance criterion.
    pub theta_crit: f64,
    /// Squared opening angle, precomputed for the hot path.
    pub theta_crit2: f64,
}

impl Default for GravityConfig {
    fn default() -> Self {
        Self { eta: 0.025, epsilon: 1.0e-3, theta_crit: 0.7, theta_crit2: 0.49 }
    }
}

impl GravityConfig {
    pub fn new(eta: Option<f32>, epsilon: Option<f64>, theta_crit: Option<f64>) -> Result<Self, SimError> {
        let default = GravityConfig::default();
        let theta_crit = theta_crit.unwrap_or(default.theta_crit);
        if theta_crit <= 0.0 {
            return Err(SimError::InvalidOpeningAngle);
        }
        Ok(Self {
            eta: eta.unwrap_or(default.eta),
            epsilon: epsilon.unwrap_or(default.epsilon),
            theta_crit,
            theta_crit2: theta_crit * theta_crit,
        })
    }
}
