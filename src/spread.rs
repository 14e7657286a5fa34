//! Spread construction from a cointegrating vector.

use nalgebra::DMatrix;

use crate::error::{CointError, Result};

/// Scale the vector so its first weight is 1 (left as is when that weight is ~0).
pub fn normalize_weights(weights: &[f64]) -> Vec<f64> {
    let mut v = weights.to_vec();
    if let Some(&v0) = v.first() {
        if v0.abs() > 1e-15 {
            v.iter_mut().for_each(|x| *x /= v0);
        }
    }
    v
}

/// Row-wise linear combination `series · weights`.
pub fn project(series: &DMatrix<f64>, weights: &[f64]) -> Result<Vec<f64>> {
    let (t, n) = series.shape();
    if weights.len() != n {
        return Err(CointError::invalid(format!(
            "{} weights for {} series",
            weights.len(),
            n
        )));
    }
    Ok((0..t)
        .map(|i| (0..n).map(|j| series[(i, j)] * weights[j]).sum())
        .collect())
}

/// Ornstein-Uhlenbeck half-life from regressing Δs_t on s_{t-1}.
///
/// `None` for fewer than 10 points or when the fit is not mean-reverting.
pub fn half_life(s: &[f64]) -> Option<f64> {
    let n = s.len();
    if n < 10 {
        return None;
    }
    let mean = s.iter().sum::<f64>() / n as f64;
    let centred: Vec<f64> = s.iter().map(|x| x - mean).collect();

    let denom: f64 = centred[..n - 1].iter().map(|x| x * x).sum();
    if denom < 1e-15 {
        return None;
    }
    let numer: f64 = centred[..n - 1]
        .iter()
        .zip(centred[1..].iter())
        .map(|(a, b)| a * (b - a))
        .sum();
    let theta = numer / denom;
    if theta >= 0.0 {
        None
    } else {
        Some(-(2.0_f64.ln()) / theta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ar1;

    #[test]
    fn test_normalize_weights() {
        assert_eq!(normalize_weights(&[2.0, -3.0]), vec![1.0, -1.5]);
        assert_eq!(normalize_weights(&[0.0, 4.0]), vec![0.0, 4.0]);
        assert!(normalize_weights(&[]).is_empty());
    }

    #[test]
    fn test_project() {
        let m = DMatrix::from_row_slice(3, 2, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(project(&m, &[1.0, -1.0]).unwrap(), vec![-1.0, -1.0, -1.0]);
        assert!(matches!(project(&m, &[1.0]), Err(CointError::InvalidInput(_))));
    }

    #[test]
    fn test_half_life_ar1() {
        let spread = ar1(1000, 0.9, 0.1, 42);
        let hl = half_life(&spread).unwrap();
        assert!(hl > 2.0 && hl < 20.0, "hl = {hl}");
    }

    #[test]
    fn test_half_life_short_or_flat() {
        assert!(half_life(&[1.0; 5]).is_none());
        assert!(half_life(&[3.0; 50]).is_none());
    }

    #[test]
    fn test_half_life_trending_series() {
        let trend: Vec<f64> = (0..100).map(|i| (i * i) as f64).collect();
        assert!(half_life(&trend).is_none());
    }
}
