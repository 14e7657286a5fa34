//! Seeded synthetic series shared by the unit tests.

use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// `k` independent Gaussian random walks starting at 100.
pub fn random_walks(n: usize, k: usize, seed: u64) -> DMatrix<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = DMatrix::zeros(n, k);
    for j in 0..k {
        let mut v = 100.0;
        for i in 0..n {
            let step: f64 = rng.sample(StandardNormal);
            v += step;
            data[(i, j)] = v;
        }
    }
    data
}

/// Column 0 is a random walk x_t, column 1 is beta·x_t plus white noise.
pub fn cointegrated_pair(n: usize, beta: f64, noise: f64, seed: u64) -> DMatrix<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = DMatrix::zeros(n, 2);
    let mut x = 100.0;
    for i in 0..n {
        let step: f64 = rng.sample(StandardNormal);
        let eps: f64 = rng.sample(StandardNormal);
        x += step;
        data[(i, 0)] = x;
        data[(i, 1)] = beta * x + noise * eps;
    }
    data
}

/// Stationary AR(1) path with coefficient `phi`.
pub fn ar1(n: usize, phi: f64, scale: f64, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = vec![0.0; n];
    for i in 1..n {
        let eps: f64 = rng.sample(StandardNormal);
        out[i] = phi * out[i - 1] + scale * eps;
    }
    out
}
