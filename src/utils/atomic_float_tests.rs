use crate::utils::AtomicF32;

#[test]
fn test_round_trip() {
    let a = AtomicF32::new(1.5);
    assert_eq!(a.load(), 1.5);

    a.store(-0.25);
    assert_eq!(a.load(), -0.25);
}

#[test]
fn test_default_is_zero() {
    let a = AtomicF32::default();
    assert_eq!(a.load(), 0.0);
}

#[test]
fn test_shared_between_threads() {
    let a = AtomicF32::new(0.0);

    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| a.store(3.0));
        }
    });

    assert_eq!(a.load(), 3.0);
}
