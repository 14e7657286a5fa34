//! Johansen cointegration rank selection, with the pair-trading backtest
//! plumbing built around it.

pub mod analyzer;
pub mod backtest;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod johansen;
pub mod logger;
pub mod rank;
pub mod sizing;
pub mod spread;
pub mod strategy;
pub mod sweep;

#[cfg(feature = "python")]
mod python;

#[cfg(test)]
mod test_support;

pub use error::{CointError, Result};
pub use johansen::{DeterministicTrend, EigenJohansen, JohansenResult, JohansenRoutine};
pub use rank::{CointegrationRankSelector, RankPolicy, RankSelection, Significance};

#[cfg(feature = "python")]
use pyo3::prelude::*;

#[cfg(feature = "python")]
#[pymodule]
fn cointrank(m: &Bound<'_, PyModule>) -> PyResult<()> {
    python::register(m)
}
