use crate::timeline::*;

#[test]
fn test_integer_timestep_doubles_per_bin() {
    assert_eq!(get_integer_timestep(0), 0);
    assert_eq!(get_integer_timestep(1), 4);
    assert_eq!(get_integer_timestep(2), 8);
    assert_eq!(get_integer_timestep(10), 1 << 11);
}

#[test]
fn test_time_bin_inverts_timestep() {
    for bin in 1..20 {
        let dti = get_integer_timestep(bin);
        assert_eq!(get_time_bin(dti), bin);
    }
}

#[test]
fn test_time_end_is_aligned() {
    // Bin 3 has a step of 16 ticks; the step containing tick 21 ends at 32.
    assert_eq!(get_integer_time_end(21, 3), 32);
    // A tick on the boundary is its own end.
    assert_eq!(get_integer_time_end(32, 3), 32);
}

#[test]
fn test_time_begin_is_aligned() {
    assert_eq!(get_integer_time_begin(21, 3), 16);
    assert_eq!(get_integer_time_begin(16, 3), 0);
    assert_eq!(get_integer_time_begin(17, 3), 16);
}

#[test]
fn test_bin_activity_nests() {
    // Wake points of bin b+1 are a subset of the wake points of bin b.
    for ti in 1..1024_i64 {
        if bin_is_active(4, ti) {
            assert!(bin_is_active(3, ti), "bin 3 asleep at tick {} while bin 4 wakes", ti);
        }
    }
}

#[test]
fn test_max_timesteps_is_a_power_of_two() {
    assert_eq!(MAX_NR_TIMESTEPS.count_ones(), 1);
}
