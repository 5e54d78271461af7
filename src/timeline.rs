// src/timeline.rs

//! The integer time-line.
//!
//! Physical time is mapped onto an integer line of `2^MAX_NR_TIMESTEPS`
//! ticks. A particle in time-bin `b` integrates with a step of `2^(b+1)`
//! ticks, so deeper bins wake more often and every bin's wake points nest
//! inside the shallower ones. All drift and activation machinery works on
//! this line; conversion back to physical time is a single multiplication
//! by the engine's `time_base`.

/// A position (or span) on the integer time-line.
pub type IntegerTime = i64;

/// A log2 index selecting a particle's step length.
pub type TimeBin = i8;

/// Number of usable time-bins.
pub const NUM_TIME_BINS: TimeBin = 56;

/// Total number of ticks on the time-line.
pub const MAX_NR_TIMESTEPS: IntegerTime = 1 << NUM_TIME_BINS;

/// Smallest bin the engine will assign.
pub const TIME_BIN_NOT_CREATED: TimeBin = -1;

/// The integer step length of a given time-bin.
#[inline]
pub fn get_integer_timestep(bin: TimeBin) -> IntegerTime {
    if bin <= 0 {
        return 0;
    }
    1_i64 << (bin as u32 + 1)
}

/// The time-bin whose step length matches the given integer step.
///
/// Returns the largest bin whose step fits inside `ti_step`.
#[inline]
pub fn get_time_bin(ti_step: IntegerTime) -> TimeBin {
    (62 - ti_step.leading_zeros() as i32) as TimeBin
}

/// The earliest tick at which a step of the given bin, containing
/// `ti_current`, can have started.
#[inline]
pub fn get_integer_time_begin(ti_current: IntegerTime, bin: TimeBin) -> IntegerTime {
    let dti = get_integer_timestep(bin);
    if dti == 0 {
        return 0;
    }
    dti * ((ti_current - 1) / dti)
}

/// The tick at which a step of the given bin, containing `ti_current`,
/// ends.
#[inline]
pub fn get_integer_time_end(ti_current: IntegerTime, bin: TimeBin) -> IntegerTime {
    let dti = get_integer_timestep(bin);
    if dti == 0 {
        return 0;
    }
    let residual = ti_current % dti;
    if residual == 0 {
        ti_current
    } else {
        ti_current - residual + dti
    }
}

/// Whether a particle in the given bin is waking at `ti_current`.
#[inline]
pub fn bin_is_active(bin: TimeBin, ti_current: IntegerTime) -> bool {
    get_integer_time_end(ti_current, bin) == ti_current
}
