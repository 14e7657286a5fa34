//! Cointegration rank selection.
//!
//! Runs the Johansen trace test with a constant term, compares each trace
//! statistic with the critical value at the configured significance and keeps
//! the leading eigenvectors as the cointegration basis.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SelectorConfig;
use crate::error::{CointError, Result};
use crate::johansen::{DeterministicTrend, EigenJohansen, JohansenResult, JohansenRoutine};

/// Column of the critical value table used for the comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Significance {
    Ninety,
    #[default]
    NinetyFive,
    NinetyNine,
}

impl Significance {
    pub fn column(self) -> usize {
        match self {
            Significance::Ninety => 0,
            Significance::NinetyFive => 1,
            Significance::NinetyNine => 2,
        }
    }

    /// Test size as a probability: 0.10, 0.05 or 0.01.
    pub fn from_alpha(alpha: f64) -> Result<Self> {
        const TOL: f64 = 1e-9;
        if (alpha - 0.10).abs() < TOL {
            Ok(Significance::Ninety)
        } else if (alpha - 0.05).abs() < TOL {
            Ok(Significance::NinetyFive)
        } else if (alpha - 0.01).abs() < TOL {
            Ok(Significance::NinetyNine)
        } else {
            Err(CointError::invalid(format!(
                "no critical values for alpha = {alpha} (use 0.10, 0.05 or 0.01)"
            )))
        }
    }
}

/// How the ascending scan over hypothesised ranks turns comparisons into a rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankPolicy {
    /// Every rejection at index i overwrites the rank with i+1; no early stop.
    #[default]
    LastMatch,
    /// Number of leading indices rejecting "rank ≤ i" before the first non-rejection.
    LeadingRejections,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankSelection {
    pub rank: usize,
    /// L×rank, eigenvalue-descending
    pub basis: DMatrix<f64>,
}

impl RankSelection {
    pub fn is_cointegrated(&self) -> bool {
        self.rank > 0
    }

    /// First cointegrating vector, if any.
    pub fn leading_vector(&self) -> Option<Vec<f64>> {
        (self.rank > 0).then(|| self.basis.column(0).iter().copied().collect())
    }
}

/// Rank from the trace statistics and the critical value table.
pub fn rank_from_statistics(
    trace_statistics: &[f64],
    critical_values: &[[f64; 3]],
    significance: Significance,
    policy: RankPolicy,
) -> usize {
    let col = significance.column();
    let rejects = trace_statistics
        .iter()
        .zip(critical_values)
        .map(|(stat, cv)| *stat > cv[col]);

    match policy {
        RankPolicy::LastMatch => {
            let mut rank = 0;
            for (i, rejected) in rejects.enumerate() {
                if rejected {
                    rank = i + 1;
                }
            }
            rank
        }
        RankPolicy::LeadingRejections => rejects.take_while(|r| *r).count(),
    }
}

pub struct CointegrationRankSelector<R = EigenJohansen> {
    routine: R,
    significance: Significance,
    policy: RankPolicy,
}

impl Default for CointegrationRankSelector<EigenJohansen> {
    fn default() -> Self {
        Self::new(EigenJohansen)
    }
}

impl CointegrationRankSelector<EigenJohansen> {
    pub fn from_config(config: &SelectorConfig) -> Self {
        Self::new(EigenJohansen)
            .with_significance(config.significance)
            .with_policy(config.policy)
    }
}

impl<R: JohansenRoutine> CointegrationRankSelector<R> {
    pub fn new(routine: R) -> Self {
        Self {
            routine,
            significance: Significance::default(),
            policy: RankPolicy::default(),
        }
    }

    pub fn with_significance(mut self, significance: Significance) -> Self {
        self.significance = significance;
        self
    }

    pub fn with_policy(mut self, policy: RankPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn significance(&self) -> Significance {
        self.significance
    }

    pub fn policy(&self) -> RankPolicy {
        self.policy
    }

    /// Johansen trace test with a constant and no trend.
    pub fn test(&self, series: &DMatrix<f64>, lag_order: usize) -> Result<JohansenResult> {
        if series.ncols() < 2 {
            return Err(CointError::invalid(format!(
                "at least 2 series are required, got {}",
                series.ncols()
            )));
        }
        self.routine.test(series, DeterministicTrend::Constant, lag_order)
    }

    pub fn select_rank(&self, series: &DMatrix<f64>, lag_order: usize) -> Result<RankSelection> {
        let result = self.test(series, lag_order)?;
        self.select_from(&result)
    }

    /// Rank and basis from an existing test result.
    pub fn select_from(&self, result: &JohansenResult) -> Result<RankSelection> {
        let l = result.trace_statistics.len();
        if result.critical_values.len() != l || result.eigenvectors.shape() != (l, l) {
            return Err(CointError::invalid(format!(
                "malformed Johansen result: {} statistics, {} critical value rows, {:?} eigenvectors",
                l,
                result.critical_values.len(),
                result.eigenvectors.shape()
            )));
        }

        let rank = rank_from_statistics(
            &result.trace_statistics,
            &result.critical_values,
            self.significance,
            self.policy,
        );
        let basis = result.eigenvectors.columns(0, rank).clone_owned();

        debug!(rank, n_series = l, policy = ?self.policy, "rank selected");
        Ok(RankSelection { rank, basis })
    }
}
