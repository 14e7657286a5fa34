//! Johansen trace test
//! ===================
//!
//! Default implementation of the statistical collaborator behind rank selection.
//! The eigen-decomposition itself is delegated to `nalgebra`; this module only
//! builds the concentrated VECM moment matrices around it.
//!
//! Procedure for `k` lagged differences:
//!   1. Detrend the levels according to the deterministic-trend option
//!   2. Residualise Δy_t and y_{t-1} on Δy_{t-1} … Δy_{t-k}
//!   3. Solve S_k0 S00⁻¹ S_0k v = λ S_kk v (Cholesky + symmetric eigen)
//!   4. Trace statistics and Osterwald-Lenum critical values per hypothesised rank

use nalgebra::{Cholesky, DMatrix, SymmetricEigen};
use tracing::debug;

use crate::error::{CointError, Result};

// ═══════════════════════════════════════════════════════════════════
// TYPES
// ═══════════════════════════════════════════════════════════════════

/// Output of a Johansen trace test on an L-series sample.
#[derive(Clone, Debug, PartialEq)]
pub struct JohansenResult {
    /// One statistic per null hypothesis "rank ≤ i", i = 0..L-1
    pub trace_statistics: Vec<f64>,
    /// Per row: [90%, 95%, 99%]
    pub critical_values: Vec<[f64; 3]>,
    /// L×L, column j belongs to the j-th largest eigenvalue
    pub eigenvectors: DMatrix<f64>,
    /// Descending
    pub eigenvalues: Vec<f64>,
    pub effective_observations: usize,
}

impl JohansenResult {
    pub fn n_series(&self) -> usize {
        self.trace_statistics.len()
    }
}

/// Deterministic terms assumed by the test (statsmodels `det_order` -1, 0, 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeterministicTrend {
    NoDeterministic,
    #[default]
    Constant,
    LinearTrend,
}

impl DeterministicTrend {
    pub fn order(self) -> i32 {
        match self {
            DeterministicTrend::NoDeterministic => -1,
            DeterministicTrend::Constant => 0,
            DeterministicTrend::LinearTrend => 1,
        }
    }

    pub fn from_order(order: i32) -> Result<Self> {
        match order {
            -1 => Ok(DeterministicTrend::NoDeterministic),
            0 => Ok(DeterministicTrend::Constant),
            1 => Ok(DeterministicTrend::LinearTrend),
            other => Err(CointError::invalid(format!(
                "deterministic trend order must be -1, 0 or 1, got {other}"
            ))),
        }
    }

    fn demeans_regressors(self) -> bool {
        self != DeterministicTrend::NoDeterministic
    }
}

/// The statistical routine the rank selector calls into.
pub trait JohansenRoutine: Send + Sync {
    fn test(
        &self,
        series: &DMatrix<f64>,
        trend: DeterministicTrend,
        lag_order: usize,
    ) -> Result<JohansenResult>;
}

/// Johansen trace test built on nalgebra's Cholesky and symmetric eigen solvers.
#[derive(Debug, Clone, Copy, Default)]
pub struct EigenJohansen;

// ═══════════════════════════════════════════════════════════════════
// CRITICAL VALUES: TRACE STATISTIC
// Osterwald-Lenum (1992), as tabulated by statsmodels `c_sjt`.
// Row = (L - r) - 1. Each entry: [90%, 95%, 99%]
// ═══════════════════════════════════════════════════════════════════

pub const MAX_SERIES: usize = 12;

const TRACE_CRIT_NO_DET: [[f64; 3]; MAX_SERIES] = [
    [2.9762, 4.1296, 6.9406],
    [10.4741, 12.3212, 16.3640],
    [21.7781, 24.2761, 29.5147],
    [37.0339, 40.1749, 46.5716],
    [56.2839, 60.0627, 67.6367],
    [79.5329, 83.9383, 92.7136],
    [106.7351, 111.7797, 121.7375],
    [137.9954, 143.6691, 154.7977],
    [173.2292, 179.5199, 191.8122],
    [212.4721, 219.4051, 232.8291],
    [255.6732, 263.2603, 277.9962],
    [302.9054, 311.1288, 326.9716],
];

const TRACE_CRIT_CONSTANT: [[f64; 3]; MAX_SERIES] = [
    [2.7055, 3.8415, 6.6349],
    [13.4294, 15.4943, 19.9349],
    [27.0669, 29.7961, 35.4628],
    [44.4929, 47.8545, 54.6815],
    [65.8202, 69.8189, 77.8202],
    [91.1090, 95.7542, 104.9637],
    [120.3673, 125.6185, 136.0600],
    [153.6341, 159.5290, 171.0905],
    [190.8714, 197.3772, 210.0366],
    [232.1030, 239.2468, 253.2526],
    [277.3740, 285.1402, 300.2821],
    [326.5354, 334.9795, 351.2150],
];

const TRACE_CRIT_TREND: [[f64; 3]; MAX_SERIES] = [
    [2.7055, 3.8415, 6.6349],
    [16.1619, 18.3985, 23.1485],
    [32.0645, 35.0116, 41.0815],
    [51.6492, 55.2459, 62.5202],
    [75.1027, 79.3422, 87.7748],
    [102.4674, 107.3429, 116.9829],
    [133.7852, 139.2780, 150.0778],
    [169.0618, 175.1584, 187.1891],
    [208.3582, 215.1268, 228.2226],
    [251.6293, 259.0267, 273.3838],
    [298.8836, 306.8988, 322.4264],
    [350.1125, 358.7190, 375.3203],
];

/// Critical values for `n_minus_r` common stochastic trends; `None` outside 1..=12.
pub fn trace_critical_values(n_minus_r: usize, trend: DeterministicTrend) -> Option<[f64; 3]> {
    if n_minus_r == 0 || n_minus_r > MAX_SERIES {
        return None;
    }
    let table = match trend {
        DeterministicTrend::NoDeterministic => &TRACE_CRIT_NO_DET,
        DeterministicTrend::Constant => &TRACE_CRIT_CONSTANT,
        DeterministicTrend::LinearTrend => &TRACE_CRIT_TREND,
    };
    Some(table[n_minus_r - 1])
}

/// Residual degrees of freedom required beyond the regressors of the
/// concentrated fit.
const MIN_RESIDUAL_DOF: usize = 5;

/// Fewest rows for which the lagged differences, the lagged levels and a mean
/// leave `MIN_RESIDUAL_DOF` residual degrees of freedom. At an exact fit the
/// canonical correlations are 1 and every rank gets rejected.
///
/// `None` when the count does not fit in a `usize`.
pub fn min_observations(n_series: usize, lag_order: usize) -> Option<usize> {
    let regressors = lag_order
        .checked_add(1)?
        .checked_mul(n_series)?
        .checked_add(1)?;
    regressors
        .checked_add(MIN_RESIDUAL_DOF)?
        .checked_add(lag_order)?
        .checked_add(1)
}

// ═══════════════════════════════════════════════════════════════════
// LINEAR ALGEBRA HELPERS
// ═══════════════════════════════════════════════════════════════════

const MAX_EIGENVALUE: f64 = 1.0 - 1e-15;
const SIGN_EPS: f64 = 1e-12;

pub(crate) fn diff_matrix(data: &DMatrix<f64>) -> DMatrix<f64> {
    let (t, n) = data.shape();
    DMatrix::from_fn(t - 1, n, |i, j| data[(i + 1, j)] - data[(i, j)])
}

pub(crate) fn demean(data: &DMatrix<f64>) -> DMatrix<f64> {
    let (t, n) = data.shape();
    let mut r = data.clone();
    if t == 0 {
        return r;
    }
    for j in 0..n {
        let mu: f64 = data.column(j).iter().sum::<f64>() / t as f64;
        for i in 0..t {
            r[(i, j)] -= mu;
        }
    }
    r
}

/// Residuals of Y ~ X.
pub(crate) fn ols_residuals(y: &DMatrix<f64>, x: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let xtx = x.transpose() * x;
    let beta = xtx.lu().solve(&(x.transpose() * y))?;
    Some(y - x * beta)
}

fn detrend(data: &DMatrix<f64>, trend: DeterministicTrend) -> Result<DMatrix<f64>> {
    match trend {
        DeterministicTrend::NoDeterministic => Ok(data.clone()),
        DeterministicTrend::Constant => Ok(demean(data)),
        DeterministicTrend::LinearTrend => {
            let t = data.nrows();
            let step = 2.0 / (t - 1) as f64;
            let regressors = DMatrix::from_fn(t, 2, |i, j| {
                if j == 0 {
                    1.0
                } else {
                    -1.0 + step * i as f64
                }
            });
            ols_residuals(data, &regressors)
                .ok_or_else(|| CointError::numerical("linear detrending failed"))
        }
    }
}

/// Row i holds [Δy_{k+i-1}, …, Δy_{i}] for `k` lags.
fn lagged_differences(dy: &DMatrix<f64>, k: usize, eff_t: usize) -> DMatrix<f64> {
    let n = dy.ncols();
    let mut f = DMatrix::zeros(eff_t, n * k);
    for lag in 0..k {
        let start = k - 1 - lag;
        for row in 0..eff_t {
            for col in 0..n {
                f[(row, lag * n + col)] = dy[(start + row, col)];
            }
        }
    }
    f
}

// ═══════════════════════════════════════════════════════════════════
// JOHANSEN TEST (TRACE)
// ═══════════════════════════════════════════════════════════════════

impl JohansenRoutine for EigenJohansen {
    fn test(
        &self,
        series: &DMatrix<f64>,
        trend: DeterministicTrend,
        lag_order: usize,
    ) -> Result<JohansenResult> {
        let (nobs, neqs) = series.shape();
        if neqs < 2 {
            return Err(CointError::invalid(format!(
                "at least 2 series are required, got {neqs}"
            )));
        }
        if neqs > MAX_SERIES {
            return Err(CointError::invalid(format!(
                "critical values are tabulated for at most {MAX_SERIES} series, got {neqs}"
            )));
        }
        let required = min_observations(neqs, lag_order).ok_or_else(|| {
            CointError::invalid(format!("lag order {lag_order} is too large"))
        })?;
        if nobs < required {
            return Err(CointError::invalid(format!(
                "{nobs} observations, lag order {lag_order} needs at least {required}"
            )));
        }
        if series.iter().any(|v| !v.is_finite()) {
            return Err(CointError::invalid(
                "series contain missing or non-finite values",
            ));
        }

        let x = detrend(series, trend)?;
        let dy = diff_matrix(&x);
        let k = lag_order;
        let eff_t = nobs - 1 - k;

        let mut dy_dep = dy.rows(k, eff_t).clone_owned();
        let mut levels = x.rows(k, eff_t).clone_owned();
        let mut lags = lagged_differences(&dy, k, eff_t);
        if trend.demeans_regressors() {
            dy_dep = demean(&dy_dep);
            levels = demean(&levels);
            lags = demean(&lags);
        }

        // Concentrate out the short-run dynamics
        let (r0, rk) = if k > 0 {
            let r0 = ols_residuals(&dy_dep, &lags)
                .ok_or_else(|| CointError::numerical("lagged differences are collinear"))?;
            let rk = ols_residuals(&levels, &lags)
                .ok_or_else(|| CointError::numerical("lagged differences are collinear"))?;
            (r0, rk)
        } else {
            (dy_dep, levels)
        };

        let tf = eff_t as f64;
        let s00 = (r0.transpose() * &r0) / tf;
        let s0k = (r0.transpose() * &rk) / tf;
        let skk = (rk.transpose() * &rk) / tf;

        let s00_inv = s00
            .try_inverse()
            .ok_or_else(|| CointError::numerical("S00 moment matrix is singular"))?;
        let sig = s0k.transpose() * &s00_inv * &s0k;

        let chol = Cholesky::new(skk)
            .ok_or_else(|| CointError::numerical("Skk moment matrix is not positive definite"))?;
        let l_inv = chol
            .l()
            .try_inverse()
            .ok_or_else(|| CointError::numerical("Cholesky factor is singular"))?;
        let lt_inv = l_inv.transpose();

        let m_sym = &l_inv * &sig * &lt_inv;
        let m_sym = (&m_sym + m_sym.transpose()) * 0.5;

        let eigen = SymmetricEigen::new(m_sym);
        if eigen.eigenvalues.iter().any(|v| !v.is_finite()) {
            return Err(CointError::numerical("eigen-decomposition produced non-finite values"));
        }
        let vectors = &lt_inv * &eigen.eigenvectors;

        // Sort eigenvalues descending
        let mut idx: Vec<usize> = (0..neqs).collect();
        idx.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

        let eigenvalues: Vec<f64> = idx
            .iter()
            .map(|&i| eigen.eigenvalues[i].clamp(0.0, MAX_EIGENVALUE))
            .collect();

        let mut eigenvectors = DMatrix::zeros(neqs, neqs);
        for (new_col, &old_col) in idx.iter().enumerate() {
            let mut column = vectors.column(old_col).clone_owned();
            let lead = column.iter().copied().find(|v| v.abs() > SIGN_EPS);
            if matches!(lead, Some(v) if v < 0.0) {
                column *= -1.0;
            }
            eigenvectors.set_column(new_col, &column);
        }

        let log_terms: Vec<f64> = eigenvalues.iter().map(|l| (1.0 - l).ln()).collect();
        let trace_statistics: Vec<f64> = (0..neqs)
            .map(|r| -tf * log_terms[r..].iter().sum::<f64>())
            .collect();

        let critical_values = (0..neqs)
            .map(|r| {
                trace_critical_values(neqs - r, trend).ok_or_else(|| {
                    CointError::invalid(format!("no critical values for {} series", neqs - r))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            nobs,
            neqs,
            lag_order,
            ?trend,
            lambda_max = eigenvalues[0],
            trace0 = trace_statistics[0],
            "johansen test"
        );

        Ok(JohansenResult {
            trace_statistics,
            critical_values,
            eigenvectors,
            eigenvalues,
            effective_observations: eff_t,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{cointegrated_pair, random_walks};

    #[test]
    fn test_critical_values_constant_rows() {
        assert_eq!(
            trace_critical_values(1, DeterministicTrend::Constant),
            Some([2.7055, 3.8415, 6.6349])
        );
        assert_eq!(
            trace_critical_values(2, DeterministicTrend::Constant),
            Some([13.4294, 15.4943, 19.9349])
        );
        assert_eq!(trace_critical_values(0, DeterministicTrend::Constant), None);
        assert_eq!(trace_critical_values(13, DeterministicTrend::LinearTrend), None);
    }

    #[test]
    fn test_critical_values_increase_with_trends() {
        for trend in [
            DeterministicTrend::NoDeterministic,
            DeterministicTrend::Constant,
            DeterministicTrend::LinearTrend,
        ] {
            for n in 1..MAX_SERIES {
                let a = trace_critical_values(n, trend).unwrap();
                let b = trace_critical_values(n + 1, trend).unwrap();
                assert!(a[0] < a[1] && a[1] < a[2]);
                assert!(b[1] > a[1]);
            }
        }
    }

    #[test]
    fn test_trend_order_roundtrip() {
        assert_eq!(DeterministicTrend::from_order(0).unwrap(), DeterministicTrend::Constant);
        assert_eq!(DeterministicTrend::LinearTrend.order(), 1);
        assert!(matches!(
            DeterministicTrend::from_order(2),
            Err(CointError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_single_column_rejected() {
        let data = random_walks(200, 1, 7);
        let r = EigenJohansen.test(&data, DeterministicTrend::Constant, 1);
        assert!(matches!(r, Err(CointError::InvalidInput(_))));
    }

    #[test]
    fn test_too_few_rows_rejected() {
        let rows = min_observations(2, 3).unwrap() - 1;
        let data = random_walks(rows, 2, 7);
        let r = EigenJohansen.test(&data, DeterministicTrend::Constant, 3);
        assert!(matches!(r, Err(CointError::InvalidInput(_))));
    }

    #[test]
    fn test_minimum_rows_leave_residual_freedom() {
        assert_eq!(min_observations(2, 1), Some(12));
        assert_eq!(min_observations(3, 2), Some(18));

        // one row past an exact fit is not enough
        let exact_fit = 2 + 1 + 2 * 2 + 1;
        let data = random_walks(exact_fit + 1, 2, 7);
        let r = EigenJohansen.test(&data, DeterministicTrend::Constant, 1);
        assert!(matches!(r, Err(CointError::InvalidInput(_))));

        let data = random_walks(12, 2, 7);
        let r = EigenJohansen.test(&data, DeterministicTrend::Constant, 1).unwrap();
        assert_eq!(r.effective_observations, 10);
        assert!(r.eigenvalues.iter().all(|&v| v < 1.0 - 1e-9));
    }

    #[test]
    fn test_huge_lag_order_rejected() {
        assert_eq!(min_observations(2, usize::MAX), None);
        assert_eq!(min_observations(usize::MAX, 1), None);
        let data = random_walks(50, 2, 3);
        for lag in [usize::MAX, usize::MAX / 2, usize::MAX / 3] {
            let r = EigenJohansen.test(&data, DeterministicTrend::Constant, lag);
            assert!(matches!(r, Err(CointError::InvalidInput(_))));
        }
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut data = random_walks(200, 2, 11);
        data[(50, 1)] = f64::NAN;
        let r = EigenJohansen.test(&data, DeterministicTrend::Constant, 1);
        assert!(matches!(r, Err(CointError::InvalidInput(_))));
    }

    #[test]
    fn test_duplicated_series_is_numerical_error() {
        let walk = random_walks(300, 1, 5);
        let data = DMatrix::from_fn(300, 2, |i, _| walk[(i, 0)]);
        let r = EigenJohansen.test(&data, DeterministicTrend::Constant, 1);
        assert!(matches!(r, Err(CointError::NumericalError(_))), "{r:?}");
    }

    #[test]
    fn test_result_shapes_and_ordering() {
        let data = random_walks(400, 3, 21);
        let r = EigenJohansen.test(&data, DeterministicTrend::Constant, 2).unwrap();
        assert_eq!(r.n_series(), 3);
        assert_eq!(r.critical_values.len(), 3);
        assert_eq!(r.eigenvectors.shape(), (3, 3));
        assert_eq!(r.effective_observations, 400 - 1 - 2);
        assert!(r.eigenvalues.windows(2).all(|w| w[0] >= w[1]));
        assert!(r.eigenvalues.iter().all(|l| (0.0..1.0).contains(l)));
        assert!(r.trace_statistics.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(r.critical_values[0], trace_critical_values(3, DeterministicTrend::Constant).unwrap());
    }

    #[test]
    fn test_cointegrated_pair_rejects_no_cointegration() {
        let data = cointegrated_pair(500, 1.0, 1.0, 42);
        let r = EigenJohansen.test(&data, DeterministicTrend::Constant, 1).unwrap();
        assert!(
            r.trace_statistics[0] > r.critical_values[0][2],
            "trace0 = {}",
            r.trace_statistics[0]
        );
    }

    #[test]
    fn test_lag_zero_and_trend_variants_run() {
        let data = cointegrated_pair(300, 1.5, 0.5, 3);
        for trend in [
            DeterministicTrend::NoDeterministic,
            DeterministicTrend::Constant,
            DeterministicTrend::LinearTrend,
        ] {
            for lag in [0, 1, 3] {
                let r = EigenJohansen.test(&data, trend, lag).unwrap();
                assert_eq!(r.trace_statistics.len(), 2);
                assert!(r.trace_statistics.iter().all(|s| s.is_finite()));
            }
        }
    }

    #[test]
    fn test_input_not_mutated_and_repeatable() {
        let data = random_walks(300, 2, 77);
        let copy = data.clone();
        let a = EigenJohansen.test(&data, DeterministicTrend::Constant, 1).unwrap();
        let b = EigenJohansen.test(&data, DeterministicTrend::Constant, 1).unwrap();
        assert_eq!(data, copy);
        assert_eq!(a, b);
    }
}
