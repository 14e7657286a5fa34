//! Order sizing rules.

use serde::{Deserialize, Serialize};

/// What a sizer sees when an order is about to be created.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizingRequest {
    pub cash: f64,
    pub price: f64,
    /// Signed position in the instrument being ordered.
    pub position: f64,
    pub is_buy: bool,
}

impl SizingRequest {
    pub fn is_flat(&self) -> bool {
        self.position == 0.0
    }
}

pub trait Sizer: Send + Sync {
    fn size(&self, request: &SizingRequest) -> f64;
}

/// Opens with a share of the available cash, closes the whole position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentOfCash {
    pub percent: f64,
}

impl Default for PercentOfCash {
    fn default() -> Self {
        Self { percent: 0.5 }
    }
}

impl Sizer for PercentOfCash {
    fn size(&self, r: &SizingRequest) -> f64 {
        open_or_close(self.percent, r)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixedSize {
    pub stake: f64,
}

impl Default for FixedSize {
    fn default() -> Self {
        Self { stake: 1.0 }
    }
}

impl Sizer for FixedSize {
    fn size(&self, _request: &SizingRequest) -> f64 {
        self.stake
    }
}

/// Doubles the stake while holding so one order flips the position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixedReverser {
    pub stake: f64,
}

impl Default for FixedReverser {
    fn default() -> Self {
        Self { stake: 1.0 }
    }
}

impl Sizer for FixedReverser {
    fn size(&self, r: &SizingRequest) -> f64 {
        if r.is_flat() {
            self.stake
        } else {
            2.0 * self.stake
        }
    }
}

/// Each leg of a pair opens with `weight` of the cash.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairWeighted {
    pub weight: f64,
}

impl Default for PairWeighted {
    fn default() -> Self {
        Self { weight: 0.5 }
    }
}

impl Sizer for PairWeighted {
    fn size(&self, r: &SizingRequest) -> f64 {
        open_or_close(self.weight, r)
    }
}

fn open_or_close(fraction: f64, r: &SizingRequest) -> f64 {
    match (r.is_buy, r.is_flat()) {
        (true, true) if r.price > 0.0 => fraction * r.cash / r.price,
        (false, false) => r.position,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(position: f64, is_buy: bool) -> SizingRequest {
        SizingRequest {
            cash: 10_000.0,
            price: 50.0,
            position,
            is_buy,
        }
    }

    #[test]
    fn test_percent_of_cash() {
        let sizer = PercentOfCash::default();
        assert_eq!(sizer.size(&request(0.0, true)), 100.0);
        assert_eq!(sizer.size(&request(30.0, false)), 30.0);
        assert_eq!(sizer.size(&request(30.0, true)), 0.0);
        assert_eq!(sizer.size(&request(0.0, false)), 0.0);
    }

    #[test]
    fn test_percent_of_cash_zero_price() {
        let r = SizingRequest { price: 0.0, ..request(0.0, true) };
        assert_eq!(PercentOfCash::default().size(&r), 0.0);
    }

    #[test]
    fn test_fixed_size() {
        let sizer = FixedSize { stake: 3.0 };
        assert_eq!(sizer.size(&request(0.0, true)), 3.0);
        assert_eq!(sizer.size(&request(12.0, false)), 3.0);
        assert_eq!(FixedSize::default().stake, 1.0);
    }

    #[test]
    fn test_fixed_reverser() {
        let sizer = FixedReverser::default();
        assert_eq!(sizer.size(&request(0.0, true)), 1.0);
        assert_eq!(sizer.size(&request(1.0, false)), 2.0);
        assert_eq!(sizer.size(&request(-1.0, true)), 2.0);
    }

    #[test]
    fn test_pair_weighted() {
        let sizer = PairWeighted { weight: 0.25 };
        assert_eq!(sizer.size(&request(0.0, true)), 50.0);
        assert_eq!(sizer.size(&request(7.0, false)), 7.0);
        assert_eq!(PairWeighted::default().size(&request(0.0, true)), 100.0);
    }

    #[test]
    fn test_sizers_as_trait_objects() {
        let sizers: Vec<Box<dyn Sizer>> = vec![
            Box::new(PercentOfCash::default()),
            Box::new(FixedSize::default()),
            Box::new(FixedReverser::default()),
            Box::new(PairWeighted::default()),
        ];
        let sizes: Vec<f64> = sizers.iter().map(|s| s.size(&request(0.0, true))).collect();
        assert_eq!(sizes, vec![100.0, 1.0, 1.0, 100.0]);
    }
}
