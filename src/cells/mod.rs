mod cell;
mod lock;
mod sort;
mod tree;
mod pack;
mod drift;
mod multipoles;
mod unskip;

pub use cell::{has_tasks, Cell, CellArena, CellId, CellTasks, MultipoleSlot, MultipoleState};
pub use lock::{locktree, unlocktree, CellLock, LockKind, LockStatus};
pub use sort::{get_sid, run_sort, SortEntry, NR_SORT_DIRECTIONS, SORT_SHIFT};
pub use tree::{
    check_timesteps, convert_hydro, link_gparts, link_parts, link_sparts, sanitize, split_cell,
    subtree_size,
};
pub use pack::{
    pack, pack_multipoles, pack_step_info, unpack, unpack_multipoles, unpack_step_info,
    PackedCell, PackedStepInfo,
};
pub use drift::{
    activate_drift_gpart, activate_drift_part, check_gpart_drift_point,
    check_multipole_drift_point, check_part_drift_point, drift_all_multipoles, drift_gpart,
    drift_multipole, drift_multipole_locked, drift_part,
};
pub use multipoles::{check_multipole, make_multipoles};
pub use unskip::{
    need_rebuild_for_pair, set_super, set_super_gravity, set_super_hydro, ActivationContext,
};

#[cfg(test)]
mod cell_tests;
#[cfg(test)]
mod lock_tests;
#[cfg(test)]
mod sort_tests;
#[cfg(test)]
mod multipole_build_tests;
