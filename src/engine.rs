//! Interfaces to a host backtesting engine.
//!
//! The engine owns the event loop, order matching and the broker. This crate
//! only plugs strategies and run hooks into it, so everything here is a trait
//! or a plain notification record.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::data::Bar;
use crate::error::{CointError, Result};

pub type OrderRef = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OrderStatus {
    Created,
    Submitted,
    Accepted,
    Partial,
    Completed,
    Canceled,
    Expired,
    Margin,
    Rejected,
}

impl OrderStatus {
    pub fn name(self) -> &'static str {
        match self {
            OrderStatus::Created => "Created",
            OrderStatus::Submitted => "Submitted",
            OrderStatus::Accepted => "Accepted",
            OrderStatus::Partial => "Partial",
            OrderStatus::Completed => "Completed",
            OrderStatus::Canceled => "Canceled",
            OrderStatus::Expired => "Expired",
            OrderStatus::Margin => "Margin",
            OrderStatus::Rejected => "Rejected",
        }
    }

    /// Still waiting on the broker.
    pub fn is_alive(self) -> bool {
        matches!(
            self,
            OrderStatus::Created | OrderStatus::Submitted | OrderStatus::Accepted | OrderStatus::Partial
        )
    }

    /// Ended without a fill.
    pub fn is_failed(self) -> bool {
        matches!(
            self,
            OrderStatus::Canceled | OrderStatus::Expired | OrderStatus::Margin | OrderStatus::Rejected
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn name(self) -> &'static str {
        match self {
            OrderSide::Buy => "Buy",
            OrderSide::Sell => "Sell",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExecutionType {
    Market,
    Close,
    Limit,
    Stop,
    StopLimit,
}

impl ExecutionType {
    pub fn name(self) -> &'static str {
        match self {
            ExecutionType::Market => "Market",
            ExecutionType::Close => "Close",
            ExecutionType::Limit => "Limit",
            ExecutionType::Stop => "Stop",
            ExecutionType::StopLimit => "StopLimit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommissionInfo {
    pub percentage: f64,
    pub margin: Option<f64>,
}

/// Fill details, present once an order has (partially) executed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Execution {
    pub price: f64,
    pub value: f64,
    pub commission: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderEvent {
    pub date: NaiveDate,
    pub reference: OrderRef,
    pub feed: String,
    pub side: OrderSide,
    pub status: OrderStatus,
    pub size: f64,
    pub price: Option<f64>,
    pub price_limit: Option<f64>,
    pub execution_type: ExecutionType,
    pub commission: Option<CommissionInfo>,
    pub executed: Option<Execution>,
}

impl OrderEvent {
    pub fn is_buy(&self) -> bool {
        self.side == OrderSide::Buy
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeEvent {
    pub date: NaiveDate,
    pub reference: OrderRef,
    pub feed: String,
    pub price: f64,
    pub commission: f64,
    pub pnl: f64,
    pub pnl_net: f64,
    pub just_opened: bool,
    pub is_open: bool,
    pub is_closed: bool,
    pub date_open: Option<NaiveDate>,
    pub date_close: Option<NaiveDate>,
    pub bar_duration: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FundSnapshot {
    pub date: NaiveDate,
    pub cash: f64,
    pub value: f64,
    pub fund_value: f64,
    pub shares: f64,
}

/// One step of the run as a strategy sees it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BarContext {
    /// Bars processed so far, starting at 1.
    pub index: usize,
    pub date: NaiveDate,
    /// Close of every feed on this step.
    pub closes: BTreeMap<String, f64>,
    /// Indicator values computed by the host, keyed by line name.
    pub lines: BTreeMap<String, f64>,
}

impl BarContext {
    pub fn new(index: usize, date: NaiveDate) -> Self {
        Self {
            index,
            date,
            ..Self::default()
        }
    }

    pub fn with_close(mut self, feed: impl Into<String>, close: f64) -> Self {
        self.closes.insert(feed.into(), close);
        self
    }

    pub fn with_line(mut self, line: impl Into<String>, value: f64) -> Self {
        self.lines.insert(line.into(), value);
        self
    }

    pub fn close(&self, feed: &str) -> Result<f64> {
        self.closes
            .get(feed)
            .copied()
            .ok_or_else(|| CointError::Engine(format!("no close for feed '{feed}'")))
    }

    /// `None` while the indicator is still warming up.
    pub fn line(&self, name: &str) -> Option<f64> {
        self.lines.get(name).copied().filter(|v| v.is_finite())
    }
}

pub trait Broker {
    fn buy(&mut self, feed: &str, size: f64) -> Result<OrderRef>;
    fn sell(&mut self, feed: &str, size: f64) -> Result<OrderRef>;
    fn position(&self, feed: &str) -> f64;
    fn cash(&self) -> f64;
    fn value(&self) -> f64;
}

pub trait Strategy {
    fn name(&self) -> &str;

    /// Called once with the names of the feeds added to the engine.
    fn initialize(&mut self, feeds: &[String]) -> Result<()>;

    fn on_bar(&mut self, ctx: &BarContext, broker: &mut dyn Broker) -> Result<()>;

    fn on_order(&mut self, _order: &OrderEvent) {}

    fn on_trade(&mut self, _trade: &TradeEvent) {}

    fn on_stop(&mut self) {}
}

/// Observers of a run, notified after the strategy.
pub trait RunHooks {
    fn on_fund(&mut self, fund: &FundSnapshot);
    fn on_order(&mut self, order: &OrderEvent);
    fn on_trade(&mut self, trade: &TradeEvent);
    fn on_stop(&mut self) -> Result<()>;
}

pub trait BacktestEngine {
    fn set_cash(&mut self, cash: f64);
    fn set_commission(&mut self, commission: f64, margin: Option<f64>);
    fn add_data(&mut self, name: &str, bars: Vec<Bar>) -> Result<()>;
    /// Portfolio value at the current point of the run.
    fn value(&self) -> f64;
    fn run(&mut self, strategy: &mut dyn Strategy, hooks: &mut [&mut dyn RunHooks]) -> Result<()>;
}
