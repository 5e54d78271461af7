// src/space/config.rs

use crate::errors::SimError;

/// Geometry and decomposition parameters of the simulation volume.
#[derive(Debug, Clone, Copy)]
pub struct SpaceConfig {
    /// Side lengths of the periodic cube.
    pub dim: [f64; 3],
    pub periodic: bool,
    /// Number of top-level cells per axis.
    pub top_grid: [usize; 3],
    /// Cells with more particles than this keep subdividing.
    pub split_size: usize,
    /// Hard cap on the tree depth.
    pub max_depth: u8,
}

impl Default for SpaceConfig {
    fn default() -> Self {
        Self {
            dim: [1.0, 1.0, 1.0],
            periodic: true,
            top_grid: [1, 1, 1],
            split_size: 400,
            max_depth: 32,
        }
    }
}

impl SpaceConfig {
    pub fn new(
        dim: Option<[f64; 3]>,
        periodic: Option<bool>,
        top_grid: Option<[usize; 3]>,
        split_size: Option<usize>,
    ) -> Result<Self, SimError> {
        let default = SpaceConfig::default();
        let dim = dim.unwrap_or(default.dim);
        if dim.iter().any(|&d| d <= 0.0) {
            return Err(SimError::InvalidDomain);
        }
        let top_grid = top_grid.unwrap_or(default.top_grid);
        if top_grid.iter().any(|&n| n == 0) {
            return Err(SimError::InvalidDomain);
        }
        Ok(Self {
            dim,
            periodic: periodic.unwrap_or(default.periodic),
            top_grid,
            split_size: split_size.unwrap_or(default.split_size).max(1),
            max_depth: default.max_depth,
        })
    }
}
