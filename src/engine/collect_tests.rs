use crate::engine::*;

fn summary(updates: u64, hydro_min: i64, gravity_min: i64, rebuild: bool) -> StepSummary {
    StepSummary {
        updates,
        g_updates: updates * 2,
        s_updates: 0,
        ti_hydro_end_min: hydro_min,
        ti_hydro_end_max: hydro_min + 8,
        ti_hydro_beg_max: hydro_min - 4,
        ti_gravity_end_min: gravity_min,
        ti_gravity_end_max: gravity_min + 8,
        ti_gravity_beg_max: gravity_min - 4,
        rebuild,
    }
}

#[test]
fn test_combine_sums_counts_and_takes_minima() {
    let mut a = summary(10, 32, 64, false);
    let b = summary(5, 16, 128, false);

    a.combine(&b);

    assert_eq!(a.updates, 15);
    assert_eq!(a.g_updates, 30);
    assert_eq!(a.ti_hydro_end_min, 16);
    assert_eq!(a.ti_gravity_end_min, 64);
    assert!(!a.rebuild);
}

#[test]
fn test_any_rank_can_force_a_rebuild() {
    let ranks = [
        summary(1, 32, 32, false),
        summary(1, 32, 32, true),
        summary(1, 32, 32, false),
    ];
    let global = reduce_summaries(&ranks);
    assert!(global.rebuild);
    assert_eq!(global.updates, 3);
}

#[test]
fn test_reduce_is_order_independent() {
    let a = summary(3, 48, 96, false);
    let b = summary(7, 24, 80, true);
    let c = summary(2, 64, 72, false);

    let abc = reduce_summaries(&[a, b, c]);
    let cba = reduce_summaries(&[c, b, a]);

    assert_eq!(abc.updates, cba.updates);
    assert_eq!(abc.ti_hydro_end_min, cba.ti_hydro_end_min);
    assert_eq!(abc.ti_gravity_end_min, cba.ti_gravity_end_min);
    assert_eq!(abc.rebuild, cba.rebuild);
}

#[test]
fn test_apply_writes_engine_envelopes() {
    let mut e = Engine::local(POLICY_HYDRO, 1.0e-6).unwrap();
    let global = reduce_summaries(&[summary(4, 32, 16, false), summary(6, 48, 24, true)]);

    global.apply(&mut e);

    assert_eq!(e.updates, 10);
    assert_eq!(e.ti_hydro_end_min, 32);
    assert_eq!(e.ti_gravity_end_min, 16);
    // The engine's own horizon is the tighter of the two kinds.
    assert_eq!(e.ti_end_min, 16);
    assert!(e.force_rebuild);
}

#[test]
fn test_local_transport_is_identity() {
    let local = summary(9, 8, 8, false);
    let reduced = LocalReduce.reduce(local);
    assert_eq!(reduced, local);
}
