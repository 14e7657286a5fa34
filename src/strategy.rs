//! Trading strategies
//! ==================
//!
//! Both strategies keep at most one batch of orders in flight and read their
//! indicator values from the [`BarContext`] lines the host computes. The
//! indicator helpers below produce those lines for engines that don't have
//! their own.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::engine::{BarContext, Broker, OrderEvent, OrderRef, OrderStatus, Strategy, TradeEvent};
use crate::error::{CointError, Result};
use crate::sizing::{PairWeighted, PercentOfCash, Sizer, SizingRequest};

pub const SMA_LINE: &str = "sma";
pub const UPPER_LINE: &str = "upper";
pub const MIDDLE_LINE: &str = "middle";
pub const LOWER_LINE: &str = "lower";

// ═══════════════════════════════════════════════════════════════════
// INDICATORS
// ═══════════════════════════════════════════════════════════════════

/// Rolling mean, NaN for the first `period - 1` values.
pub fn simple_moving_average(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 {
        return out;
    }
    for i in (period - 1)..values.len() {
        let window = &values[i + 1 - period..=i];
        out[i] = window.iter().sum::<f64>() / period as f64;
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandParams {
    pub period: usize,
    pub dev_up: f64,
    pub dev_down: f64,
}

impl Default for BandParams {
    fn default() -> Self {
        Self {
            period: 20,
            dev_up: 1.0,
            dev_down: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Bollinger bands over a population standard deviation; `None` during warm-up.
pub fn bollinger_bands(values: &[f64], params: &BandParams) -> Vec<Option<Band>> {
    let p = params.period;
    simple_moving_average(values, p)
        .into_iter()
        .enumerate()
        .map(|(i, mean)| {
            if mean.is_nan() {
                return None;
            }
            let window = &values[i + 1 - p..=i];
            let var = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / p as f64;
            let sd = var.sqrt();
            Some(Band {
                upper: mean + params.dev_up * sd,
                middle: mean,
                lower: mean - params.dev_down * sd,
            })
        })
        .collect()
}

fn require_feed(feeds: &[String], feed: &str) -> Result<()> {
    if feeds.iter().any(|f| f == feed) {
        Ok(())
    } else {
        Err(CointError::Engine(format!("feed '{feed}' was not added to the engine")))
    }
}

// ═══════════════════════════════════════════════════════════════════
// SMA CROSS
// ═══════════════════════════════════════════════════════════════════

/// Long while the close is above its moving average.
pub struct SmaCrossStrategy {
    feed: Option<String>,
    period: usize,
    sizer: Box<dyn Sizer>,
    pending: Option<OrderRef>,
    bar: usize,
    buy_price: Option<f64>,
    buy_commission: Option<f64>,
    bar_executed: Option<usize>,
}

impl Default for SmaCrossStrategy {
    fn default() -> Self {
        Self::new(15)
    }
}

impl SmaCrossStrategy {
    pub fn new(period: usize) -> Self {
        Self {
            feed: None,
            period,
            sizer: Box::new(PercentOfCash::default()),
            pending: None,
            bar: 0,
            buy_price: None,
            buy_commission: None,
            bar_executed: None,
        }
    }

    /// Trade this feed instead of the first one added to the engine.
    pub fn on_feed(mut self, feed: impl Into<String>) -> Self {
        self.feed = Some(feed.into());
        self
    }

    pub fn with_sizer(mut self, sizer: impl Sizer + 'static) -> Self {
        self.sizer = Box::new(sizer);
        self
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn buy_price(&self) -> Option<f64> {
        self.buy_price
    }

    pub fn buy_commission(&self) -> Option<f64> {
        self.buy_commission
    }

    pub fn bar_executed(&self) -> Option<usize> {
        self.bar_executed
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl Strategy for SmaCrossStrategy {
    fn name(&self) -> &str {
        "SmaCross"
    }

    fn initialize(&mut self, feeds: &[String]) -> Result<()> {
        match &self.feed {
            Some(feed) => require_feed(feeds, feed),
            None => {
                let first = feeds
                    .first()
                    .ok_or_else(|| CointError::Engine("no feeds added to the engine".into()))?;
                self.feed = Some(first.clone());
                Ok(())
            }
        }
    }

    fn on_bar(&mut self, ctx: &BarContext, broker: &mut dyn Broker) -> Result<()> {
        self.bar = ctx.index;
        let feed = self
            .feed
            .clone()
            .ok_or_else(|| CointError::Engine("strategy not initialized".into()))?;
        let close = ctx.close(&feed)?;
        debug!(date = %ctx.date, close, "bar");

        if self.pending.is_some() {
            return Ok(());
        }
        let Some(sma) = ctx.line(SMA_LINE) else {
            return Ok(());
        };

        let position = broker.position(&feed);
        let mut request = SizingRequest {
            cash: broker.cash(),
            price: close,
            position,
            is_buy: true,
        };
        if position == 0.0 && close > sma {
            let size = self.sizer.size(&request);
            if size > 0.0 {
                info!(date = %ctx.date, close, size, "buy create");
                self.pending = Some(broker.buy(&feed, size)?);
            }
        } else if position != 0.0 && close < sma {
            request.is_buy = false;
            let size = self.sizer.size(&request);
            if size > 0.0 {
                info!(date = %ctx.date, close, size, "sell create");
                self.pending = Some(broker.sell(&feed, size)?);
            }
        }
        Ok(())
    }

    fn on_order(&mut self, order: &OrderEvent) {
        if order.status.is_alive() {
            return;
        }
        if let Some(exec) = order.executed.filter(|_| order.status == OrderStatus::Completed) {
            if order.is_buy() {
                info!(price = exec.price, cost = exec.value, commission = exec.commission, "buy executed");
                self.buy_price = Some(exec.price);
                self.buy_commission = Some(exec.commission);
            } else {
                info!(price = exec.price, cost = exec.value, commission = exec.commission, "sell executed");
            }
            self.bar_executed = Some(self.bar);
        } else if order.status.is_failed() {
            warn!(reference = order.reference, status = order.status.name(), "order canceled/margin/rejected");
        }
        self.pending = None;
    }

    fn on_trade(&mut self, trade: &TradeEvent) {
        if trade.is_closed {
            info!(gross = trade.pnl, net = trade.pnl_net, "operation profit");
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
// PAIR TRADING
// ═══════════════════════════════════════════════════════════════════

/// Goes long both legs when the spread breaks above its upper band and exits
/// when it falls back under the middle band.
pub struct PairTradingStrategy {
    legs: [String; 2],
    spread_feed: String,
    bands: BandParams,
    sizer: Box<dyn Sizer>,
    pending: Vec<OrderRef>,
}

impl PairTradingStrategy {
    pub fn new(leg_a: impl Into<String>, leg_b: impl Into<String>, spread_feed: impl Into<String>) -> Self {
        Self {
            legs: [leg_a.into(), leg_b.into()],
            spread_feed: spread_feed.into(),
            bands: BandParams::default(),
            sizer: Box::new(PairWeighted::default()),
            pending: Vec::new(),
        }
    }

    pub fn with_bands(mut self, bands: BandParams) -> Self {
        self.bands = bands;
        self
    }

    pub fn with_sizer(mut self, sizer: impl Sizer + 'static) -> Self {
        self.sizer = Box::new(sizer);
        self
    }

    pub fn bands(&self) -> &BandParams {
        &self.bands
    }

    pub fn spread_feed(&self) -> &str {
        &self.spread_feed
    }

    pub fn pending(&self) -> &[OrderRef] {
        &self.pending
    }
}

impl Strategy for PairTradingStrategy {
    fn name(&self) -> &str {
        "PairTrading"
    }

    fn initialize(&mut self, feeds: &[String]) -> Result<()> {
        for leg in &self.legs {
            require_feed(feeds, leg)?;
        }
        require_feed(feeds, &self.spread_feed)
    }

    fn on_bar(&mut self, ctx: &BarContext, broker: &mut dyn Broker) -> Result<()> {
        if !self.pending.is_empty() {
            return Ok(());
        }
        let spread = ctx.close(&self.spread_feed)?;
        let (Some(upper), Some(middle)) = (ctx.line(UPPER_LINE), ctx.line(MIDDLE_LINE)) else {
            return Ok(());
        };

        let positions = [broker.position(&self.legs[0]), broker.position(&self.legs[1])];
        let flat = positions.iter().all(|p| *p == 0.0);

        if flat && spread > upper {
            info!(date = %ctx.date, spread, upper, "pair entry");
            for leg in &self.legs {
                let request = SizingRequest {
                    cash: broker.cash(),
                    price: ctx.close(leg)?,
                    position: 0.0,
                    is_buy: true,
                };
                let size = self.sizer.size(&request);
                if size > 0.0 {
                    self.pending.push(broker.buy(leg, size)?);
                }
            }
        } else if !flat && spread < middle {
            info!(date = %ctx.date, spread, middle, "pair exit");
            for (leg, position) in self.legs.iter().zip(positions) {
                if position == 0.0 {
                    continue;
                }
                let request = SizingRequest {
                    cash: broker.cash(),
                    price: ctx.close(leg)?,
                    position,
                    is_buy: false,
                };
                let size = self.sizer.size(&request);
                if size > 0.0 {
                    self.pending.push(broker.sell(leg, size)?);
                }
            }
        }
        Ok(())
    }

    fn on_order(&mut self, order: &OrderEvent) {
        if order.status.is_alive() {
            return;
        }
        if order.status.is_failed() {
            warn!(feed = %order.feed, reference = order.reference, status = order.status.name(), "pair leg not filled");
        }
        self.pending.retain(|r| *r != order.reference);
    }

    fn on_trade(&mut self, trade: &TradeEvent) {
        if trade.is_closed {
            info!(feed = %trade.feed, gross = trade.pnl, net = trade.pnl_net, "pair leg closed");
        }
    }
}
