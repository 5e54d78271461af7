use criterion::{criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rs_sph::engine::{drift_all, Engine, POLICY_HYDRO, POLICY_SELF_GRAVITY};
use rs_sph::particles::{GPart, GPartLink, Part};
use rs_sph::space::{Space, SpaceConfig};

fn populated_space(n: usize) -> Space {
    let mut rng = StdRng::seed_from_u64(1234);
    let mut parts = Vec::with_capacity(n);
    let mut gparts = Vec::with_capacity(n);
    for i in 0..n {
        let x = [rng.gen::<f64>(), rng.gen::<f64>(), rng.gen::<f64>()];
        let v = [
            0.01 * (rng.gen::<f32>() - 0.5),
            0.01 * (rng.gen::<f32>() - 0.5),
            0.01 * (rng.gen::<f32>() - 0.5),
        ];
        let mut p = Part::new(x, v, 0.02, 1.0);
        p.gpart = i as i64;
        p.time_bin = 2;
        let mut gp = GPart::new_dark_matter(x, v, 1.0, i as u64);
        gp.link = GPartLink::Gas(i);
        gp.time_bin = 2;
        parts.push(p);
        gparts.push(gp);
    }
    let config = SpaceConfig::new(None, Some(true), Some([2, 2, 2]), Some(64)).unwrap();
    Space::new(config, parts, gparts, Vec::new()).unwrap()
}

pub fn bench_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree");
    group.sample_size(20);

    let e = Engine::local(POLICY_HYDRO | POLICY_SELF_GRAVITY, 0.25).unwrap();

    group.bench_function("rebuild_10k", |b| {
        let mut space = populated_space(10_000);
        b.iter(|| space.rebuild(&e));
    });

    group.bench_function("drift_all_10k", |b| {
        let mut space = populated_space(10_000);
        let mut e = Engine::local(POLICY_HYDRO | POLICY_SELF_GRAVITY, 0.25).unwrap();
        space.rebuild(&e);
        b.iter(|| {
            e.ti_current += 8;
            drift_all(&mut space, &e);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_rebuild);
criterion_main!(benches);
