// ═══════════════════════════════════════════════════════════════════
// PyO3 BINDINGS
// ═══════════════════════════════════════════════════════════════════

use nalgebra::DMatrix;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use crate::data::{clean_series, load_series_csv};
use crate::error::CointError;
use crate::johansen::{DeterministicTrend, EigenJohansen, JohansenRoutine};
use crate::rank::{CointegrationRankSelector, RankPolicy, Significance};
use crate::spread::{half_life, project};
use crate::sweep::{select_columns, CointegrationSweep};

impl From<CointError> for PyErr {
    fn from(err: CointError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

fn matrix_from_flat(data_flat: &[f64], n_rows: usize, n_cols: usize) -> PyResult<DMatrix<f64>> {
    if data_flat.len() != n_rows * n_cols {
        return Err(PyValueError::new_err(format!(
            "data_flat has {} elements, expected {} ({n_rows}×{n_cols})",
            data_flat.len(),
            n_rows * n_cols
        )));
    }
    Ok(DMatrix::from_row_slice(n_rows, n_cols, data_flat))
}

fn columns(m: &DMatrix<f64>) -> Vec<Vec<f64>> {
    m.column_iter().map(|c| c.iter().copied().collect()).collect()
}

fn selector(alpha: f64, policy: &str) -> PyResult<CointegrationRankSelector> {
    let policy: RankPolicy = serde_json::from_value(serde_json::Value::String(policy.to_string()))
        .map_err(|_| PyValueError::new_err(format!("unknown policy '{policy}'")))?;
    Ok(CointegrationRankSelector::default()
        .with_significance(Significance::from_alpha(alpha)?)
        .with_policy(policy))
}

/// Cointegration rank of a row-major T×L matrix.
///
/// Returns dict: rank, basis (one list per cointegrating vector)
#[pyfunction]
#[pyo3(signature = (data_flat, n_rows, n_cols, lag_order = 1, alpha = 0.05, policy = "last_match"))]
pub fn coint_select_rank(
    py: Python<'_>,
    data_flat: Vec<f64>,
    n_rows: usize,
    n_cols: usize,
    lag_order: usize,
    alpha: f64,
    policy: &str,
) -> PyResult<PyObject> {
    let data = matrix_from_flat(&data_flat, n_rows, n_cols)?;
    let selection = selector(alpha, policy)?.select_rank(&data, lag_order)?;

    let d = PyDict::new_bound(py);
    d.set_item("rank", selection.rank)?;
    d.set_item("basis", columns(&selection.basis))?;
    Ok(d.into_any().unbind())
}

/// Raw Johansen trace test.
#[pyfunction]
#[pyo3(signature = (data_flat, n_rows, n_cols, det_order = 0, k_ar_diff = 1))]
pub fn coint_johansen_test(
    py: Python<'_>,
    data_flat: Vec<f64>,
    n_rows: usize,
    n_cols: usize,
    det_order: i32,
    k_ar_diff: usize,
) -> PyResult<PyObject> {
    let data = matrix_from_flat(&data_flat, n_rows, n_cols)?;
    let trend = DeterministicTrend::from_order(det_order)?;
    let r = EigenJohansen.test(&data, trend, k_ar_diff)?;

    let d = PyDict::new_bound(py);
    d.set_item("trace_statistics", r.trace_statistics.clone())?;
    let cv: Vec<Vec<f64>> = r.critical_values.iter().map(|row| row.to_vec()).collect();
    d.set_item("critical_values", cv)?;
    d.set_item("eigenvalues", r.eigenvalues.clone())?;
    d.set_item("eigenvectors", columns(&r.eigenvectors))?;
    d.set_item("effective_observations", r.effective_observations)?;
    Ok(d.into_any().unbind())
}

/// Rank selection over every column combination of a wide CSV file.
///
/// Returns a list of dicts: series, rank, hedge_weights, half_life, error
#[pyfunction]
#[pyo3(signature = (file_path, min_series = 2, max_series = 3, lag_order = 1, alpha = 0.05, policy = "last_match"))]
pub fn coint_sweep_from_file(
    py: Python<'_>,
    file_path: &str,
    min_series: usize,
    max_series: usize,
    lag_order: usize,
    alpha: f64,
    policy: &str,
) -> PyResult<PyObject> {
    let frame = clean_series(&load_series_csv(file_path)?);
    if frame.names.len() < min_series {
        return Err(PyValueError::new_err(format!(
            "only {} usable columns (minimum: {min_series})",
            frame.names.len()
        )));
    }

    let selector = selector(alpha, policy)?;
    let reports = py.allow_threads(|| {
        CointegrationSweep::new(&selector, lag_order).run(&frame.data, &frame.names, min_series..=max_series)
    })?;

    let out = PyList::empty_bound(py);
    for report in &reports {
        let d = PyDict::new_bound(py);
        d.set_item("series", report.names.clone())?;
        d.set_item("rank", report.rank())?;
        let weights = report.hedge_weights();
        let hl = match &weights {
            Some(w) => half_life(&project(&select_columns(&frame.data, &report.columns), w)?),
            None => None,
        };
        d.set_item("hedge_weights", weights)?;
        d.set_item("half_life", hl)?;
        d.set_item("error", report.outcome.as_ref().err().map(|e| e.to_string()))?;
        out.append(d)?;
    }
    Ok(out.into_any().unbind())
}

pub fn register(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(coint_select_rank, m)?)?;
    m.add_function(wrap_pyfunction!(coint_johansen_test, m)?)?;
    m.add_function(wrap_pyfunction!(coint_sweep_from_file, m)?)?;
    Ok(())
}
