// src/gravity/multipole.rs

//! Gravitational multipole expansions.
//!
//! Each cell owns one expansion taken about its centre of mass, truncated
//! at quadrupole order (the dipole vanishes identically in the CoM frame).
//! The field-derivative tower consuming these lives with the gravity
//! interaction loops; this module only maintains the expansions and the
//! acceptance test that decides when a cell pair may interact through them.

use crate::particles::GPart;

/// Expansion coefficients about the centre of mass.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MultipoleMoments {
    /// Monopole: total mass.
    pub m_000: f32,
    /// Second-order moments.
    pub m_200: f32,
    pub m_020: f32,
    pub m_002: f32,
    pub m_110: f32,
    pub m_101: f32,
    pub m_011: f32,
}

impl MultipoleMoments {
    /// Zero every coefficient.
    pub fn init(&mut self) {
        *self = MultipoleMoments::default();
    }

    /// Accumulate another set of coefficients taken about the same centre.
    pub fn add(&mut self, other: &MultipoleMoments) {
        self.m_000 += other.m_000;
        self.m_200 += other.m_200;
        self.m_020 += other.m_020;
        self.m_002 += other.m_002;
        self.m_110 += other.m_110;
        self.m_101 += other.m_101;
        self.m_011 += other.m_011;
    }
}

/// A cell's full gravity state: coefficients, expansion centre, bulk
/// velocity of the expansion centre, and a conservative radius bounding
/// every contributing particle.
#[derive(Clone, Copy, Debug, Default)]
pub struct Multipole {
    /// Centre of mass the expansion is taken about.
    pub com: [f64; 3],
    /// Mass-weighted mean velocity; used to drift the expansion.
    pub vel: [f32; 3],
    /// Upper bound on the CoM-to-particle distance.
    pub r_max: f64,
    /// The expansion coefficients.
    pub moments: MultipoleMoments,
}

impl Multipole {
    /// Reset to an empty expansion.
    pub fn reset(&mut self) {
        *self = Multipole::default();
    }

    /// Construct the expansion directly from a window of gravity particles.
    ///
    /// Sets the CoM to the particle-weighted centroid, the coefficients to
    /// the second moments about it, and `r_max` to the exact maximum
    /// CoM-to-particle distance.
    pub fn p2m(&mut self, gparts: &[GPart]) {
        let mut mass = 0.0_f64;
        let mut com = [0.0_f64; 3];
        let mut vel = [0.0_f64; 3];

        for gp in gparts {
            let m = gp.mass as f64;
            mass += m;
            for k in 0..3 {
                com[k] += gp.x[k] * m;
                vel[k] += gp.v_full[k] as f64 * m;
            }
        }
        let inv_mass = 1.0 / mass;
        for k in 0..3 {
            com[k] *= inv_mass;
            vel[k] *= inv_mass;
        }

        let mut m_200 = 0.0_f64;
        let mut m_020 = 0.0_f64;
        let mut m_002 = 0.0_f64;
        let mut m_110 = 0.0_f64;
        let mut m_101 = 0.0_f64;
        let mut m_011 = 0.0_f64;
        let mut r2_max = 0.0_f64;

        for gp in gparts {
            let m = gp.mass as f64;
            let dx = gp.x[0] - com[0];
            let dy = gp.x[1] - com[1];
            let dz = gp.x[2] - com[2];
            m_200 += m * dx * dx;
            m_020 += m * dy * dy;
            m_002 += m * dz * dz;
            m_110 += m * dx * dy;
            m_101 += m * dx * dz;
            m_011 += m * dy * dz;
            r2_max = r2_max.max(dx * dx + dy * dy + dz * dz);
        }

        self.com = com;
        self.vel = [vel[0] as f32, vel[1] as f32, vel[2] as f32];
        self.r_max = r2_max.sqrt();
        self.moments = MultipoleMoments {
            m_000: mass as f32,
            m_200: m_200 as f32,
            m_020: m_020 as f32,
            m_002: m_002 as f32,
            m_110: m_110 as f32,
            m_101: m_101 as f32,
            m_011: m_011 as f32,
        };
    }

    /// Advance the expansion by `dt` and inflate the radius bound by the
    /// maximum particle displacement accumulated since the last rebuild.
    pub fn drift(&mut self, dt: f64, dx_max: f32) {
        for k in 0..3 {
            self.com[k] += self.vel[k] as f64 * dt;
        }
        self.r_max += dx_max as f64;
    }
}

/// Shift a set of coefficients from `old_com` to `new_com` (the M2M
/// operator): the parallel-axis contribution of the monopole is folded
/// into the second moments.
pub fn m2m(m: &MultipoleMoments, new_com: [f64; 3], old_com: [f64; 3]) -> MultipoleMoments {
    let d = [
        old_com[0] - new_com[0],
        old_com[1] - new_com[1],
        old_com[2] - new_com[2],
    ];
    let mass = m.m_000 as f64;
    MultipoleMoments {
        m_000: m.m_000,
        m_200: m.m_200 + (mass * d[0] * d[0]) as f32,
        m_020: m.m_020 + (mass * d[1] * d[1]) as f32,
        m_002: m.m_002 + (mass * d[2] * d[2]) as f32,
        m_110: m.m_110 + (mass * d[0] * d[1]) as f32,
        m_101: m.m_101 + (mass * d[0] * d[2]) as f32,
        m_011: m.m_011 + (mass * d[1] * d[2]) as f32,
    }
}

/// The multipole acceptance criterion: a cell pair may interact through
/// its expansions iff the combined radius bound fits inside the opening
/// angle at the CoM separation.
#[inline]
pub fn m2l_accept(r_max_i: f64, r_max_j: f64, theta_crit2: f64, r2: f64) -> bool {
    let size = r_max_i + r_max_j;
    size * size <= theta_crit2 * r2
}

/// Relative comparison of two expansions, used by the debug verification
/// of the recursive construction against a direct one.
pub fn multipole_equal(a: &Multipole, b: &Multipole, tolerance: f32) -> bool {
    let ma = &a.moments;
    let mb = &b.moments;

    if (ma.m_000 - mb.m_000).abs() > tolerance * ma.m_000.abs() {
        return false;
    }

    // Second moments are compared against the monopole scale of the
    // expansion, since individual components legitimately cross zero.
    let scale = ma.m_000 * a.r_max as f32 * a.r_max as f32 + f32::EPSILON;
    let pairs = [
        (ma.m_200, mb.m_200),
        (ma.m_020, mb.m_020),
        (ma.m_002, mb.m_002),
        (ma.m_110, mb.m_110),
        (ma.m_101, mb.m_101),
        (ma.m_011, mb.m_011),
    ];
    pairs.iter().all(|(x, y)| (x - y).abs() <= tolerance * scale)
}

/// Zero the gravity accumulators of a particle ahead of the force loops.
#[inline]
pub fn init_gpart(gp: &mut GPart) {
    gp.a_grav = [0.0; 3];
}
