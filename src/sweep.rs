//! Cointegration sweep over column combinations
//! =============================================
//!
//! Every combination is an independent rank selection, so the batch runs on
//! rayon's pool with no coordination between combinations.

use nalgebra::DMatrix;
use rayon::prelude::*;
use std::ops::RangeInclusive;
use tracing::{info, warn};

use crate::config::SelectorConfig;
use crate::error::{CointError, Result};
use crate::johansen::JohansenRoutine;
use crate::rank::{CointegrationRankSelector, RankSelection};
use crate::spread::normalize_weights;

#[derive(Debug)]
pub struct SweepReport {
    pub columns: Vec<usize>,
    pub names: Vec<String>,
    pub outcome: Result<RankSelection>,
}

impl SweepReport {
    pub fn rank(&self) -> Option<usize> {
        self.outcome.as_ref().ok().map(|s| s.rank)
    }

    /// Leading cointegrating vector scaled so the first weight is 1.
    pub fn hedge_weights(&self) -> Option<Vec<f64>> {
        let selection = self.outcome.as_ref().ok()?;
        selection.leading_vector().map(|v| normalize_weights(&v))
    }

    /// The combination could not be tested: degenerate data, too few rows.
    pub fn is_untestable(&self) -> bool {
        matches!(&self.outcome, Err(e) if e.is_statistical())
    }
}

// ═══════════════════════════════════════════════════════════════════
// COMBINATIONS
// ═══════════════════════════════════════════════════════════════════

/// All k-subsets of 0..n in lexicographic order.
pub fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    if k > n || k == 0 {
        return vec![];
    }
    let mut result = Vec::new();
    let mut c: Vec<usize> = (0..k).collect();
    loop {
        result.push(c.clone());
        let mut i = k;
        loop {
            if i == 0 {
                return result;
            }
            i -= 1;
            if c[i] != i + n - k {
                break;
            }
            if i == 0 {
                return result;
            }
        }
        c[i] += 1;
        for j in (i + 1)..k {
            c[j] = c[j - 1] + 1;
        }
    }
}

pub fn select_columns(data: &DMatrix<f64>, cols: &[usize]) -> DMatrix<f64> {
    let t = data.nrows();
    DMatrix::from_fn(t, cols.len(), |i, j| data[(i, cols[j])])
}

// ═══════════════════════════════════════════════════════════════════
// SWEEP
// ═══════════════════════════════════════════════════════════════════

pub struct CointegrationSweep<'a, R: JohansenRoutine> {
    selector: &'a CointegrationRankSelector<R>,
    lag_order: usize,
}

impl<'a, R: JohansenRoutine> CointegrationSweep<'a, R> {
    pub fn new(selector: &'a CointegrationRankSelector<R>, lag_order: usize) -> Self {
        Self { selector, lag_order }
    }

    pub fn from_config(selector: &'a CointegrationRankSelector<R>, config: &SelectorConfig) -> Self {
        Self::new(selector, config.lag_order)
    }

    /// One report per combination with size in `sizes`, ascending by size then
    /// lexicographically.
    pub fn run(
        &self,
        data: &DMatrix<f64>,
        names: &[String],
        sizes: RangeInclusive<usize>,
    ) -> Result<Vec<SweepReport>> {
        let n = data.ncols();
        if names.len() != n {
            return Err(CointError::invalid(format!(
                "{} names for {} series",
                names.len(),
                n
            )));
        }
        if *sizes.start() < 2 {
            return Err(CointError::invalid("combinations need at least 2 series"));
        }

        let mut all_combos = Vec::new();
        for k in sizes.clone() {
            all_combos.extend(combinations(n, k));
        }
        info!(
            series = n,
            combinations = all_combos.len(),
            sizes = ?sizes,
            "testing combinations"
        );

        let reports: Vec<SweepReport> = all_combos
            .into_par_iter()
            .map(|columns| {
                let sub = select_columns(data, &columns);
                let outcome = self.selector.select_rank(&sub, self.lag_order);
                let names = columns.iter().map(|&i| names[i].clone()).collect();
                SweepReport {
                    columns,
                    names,
                    outcome,
                }
            })
            .collect();

        let found = reports.iter().filter(|r| r.rank().unwrap_or(0) > 0).count();
        let untestable = reports.iter().filter(|r| r.is_untestable()).count();
        for report in reports.iter().filter(|r| !r.is_untestable()) {
            if let Err(e) = &report.outcome {
                warn!(series = ?report.names, error = %e, "rank selection failed");
            }
        }
        info!(found, untestable, "sweep finished");
        Ok(reports)
    }
}

/// Reports with rank ≥ 1.
pub fn cointegrated(reports: &[SweepReport]) -> impl Iterator<Item = &SweepReport> {
    reports.iter().filter(|r| r.rank().unwrap_or(0) > 0)
}
