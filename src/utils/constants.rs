// src/utils/constants.rs

/// Kernel multiplier turning a smoothing length into a compact-support
/// radius. Value for the cubic spline in 3D.
pub const KERNEL_GAMMA: f32 = 1.825742;

/// Maximum particle displacement, as a fraction of the cell half-width
/// lower bound `dmin`, before a cell's directional sorts are discarded.
pub const SPACE_MAXRELDX: f32 = 0.1;

/// Cells below this particle count are eligible for smoothing-length
/// sanitisation before the first density pass.
pub const SANITIZE_MAX_COUNT: usize = 1000;

/// Largest per-step communication tag handed out before wrapping.
pub const CELL_MAX_TAG: u32 = 32_768;
