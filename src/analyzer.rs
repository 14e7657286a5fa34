//! Run log
//! =======
//!
//! Buffers every fund, order and trade notification of a run and writes them
//! as CSV files when the run stops:
//!   - `funds.csv`, `orders.csv`, `trades.csv`: one row per notification
//!     (one row per trade reference for trades, the latest state wins)
//!   - `summary.csv`: portfolio value next to the input bars, with returns

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::data::Bar;
use crate::engine::{FundSnapshot, OrderEvent, OrderRef, RunHooks, TradeEvent};
use crate::error::Result;

const FUND_HEADERS: [&str; 5] = ["date", "cash", "value", "fundValue", "shares"];
const ORDER_HEADERS: [&str; 11] = [
    "date",
    "reference",
    "orderType",
    "status",
    "size",
    "price",
    "priceLimit",
    "executionType",
    "commissionPercentage",
    "commissionMargin",
    "alive",
];
const TRADE_HEADERS: [&str; 12] = [
    "date",
    "reference",
    "price",
    "commission",
    "pnl",
    "pnlNet",
    "justOpened",
    "isOpen",
    "isClosed",
    "dateOpen",
    "dateClose",
    "barDuration",
];
const SUMMARY_HEADERS: [&str; 9] = [
    "open",
    "high",
    "low",
    "close",
    "volume",
    "value",
    "date",
    "close_returns",
    "value_returns",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct FundRecord {
    date: NaiveDate,
    cash: f64,
    value: f64,
    fund_value: f64,
    shares: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderRecord {
    date: NaiveDate,
    reference: OrderRef,
    order_type: &'static str,
    status: &'static str,
    size: f64,
    price: Option<f64>,
    price_limit: Option<f64>,
    execution_type: &'static str,
    commission_percentage: Option<f64>,
    commission_margin: Option<f64>,
    alive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct TradeRecord {
    date: NaiveDate,
    reference: OrderRef,
    price: f64,
    commission: f64,
    pnl: f64,
    pnl_net: f64,
    just_opened: bool,
    is_open: bool,
    is_closed: bool,
    date_open: Option<NaiveDate>,
    date_close: Option<NaiveDate>,
    bar_duration: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct SummaryRow {
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<f64>,
    value: f64,
    date: NaiveDate,
    close_returns: Option<f64>,
    value_returns: Option<f64>,
}

impl From<&FundSnapshot> for FundRecord {
    fn from(f: &FundSnapshot) -> Self {
        Self {
            date: f.date,
            cash: f.cash,
            value: f.value,
            fund_value: f.fund_value,
            shares: f.shares,
        }
    }
}

impl From<&OrderEvent> for OrderRecord {
    fn from(o: &OrderEvent) -> Self {
        Self {
            date: o.date,
            reference: o.reference,
            order_type: o.side.name(),
            status: o.status.name(),
            size: o.size,
            price: o.price,
            price_limit: o.price_limit,
            execution_type: o.execution_type.name(),
            commission_percentage: o.commission.map(|c| c.percentage),
            commission_margin: o.commission.and_then(|c| c.margin),
            alive: o.status.is_alive(),
        }
    }
}

impl From<&TradeEvent> for TradeRecord {
    fn from(t: &TradeEvent) -> Self {
        Self {
            date: t.date,
            reference: t.reference,
            price: t.price,
            commission: t.commission,
            pnl: t.pnl,
            pnl_net: t.pnl_net,
            just_opened: t.just_opened,
            is_open: t.is_open,
            is_closed: t.is_closed,
            date_open: t.date_open,
            date_close: t.date_close,
            bar_duration: t.bar_duration,
        }
    }
}

pub struct RunLog {
    log_path: PathBuf,
    bars: Option<Vec<Bar>>,
    funds: Vec<FundRecord>,
    orders: Vec<OrderRecord>,
    trades: Vec<TradeRecord>,
    trade_slots: HashMap<OrderRef, usize>,
    flushed: bool,
}

impl RunLog {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
            bars: None,
            funds: Vec::new(),
            orders: Vec::new(),
            trades: Vec::new(),
            trade_slots: HashMap::new(),
            flushed: false,
        }
    }

    /// Input bars joined into `summary.csv`.
    pub fn with_bars(mut self, bars: Vec<Bar>) -> Self {
        self.bars = Some(bars);
        self
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn is_empty(&self) -> bool {
        self.funds.is_empty() && self.orders.is_empty() && self.trades.is_empty()
    }

    /// True when nothing was recorded since the last flush.
    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    /// Write all four files and clear the buffers.
    pub fn flush(&mut self) -> Result<()> {
        fs::create_dir_all(&self.log_path)?;

        write_csv(&self.log_path.join("funds.csv"), &FUND_HEADERS, &self.funds)?;
        info!(rows = self.funds.len(), "funds logged");

        write_csv(&self.log_path.join("orders.csv"), &ORDER_HEADERS, &self.orders)?;
        info!(rows = self.orders.len(), "orders logged");

        write_csv(&self.log_path.join("trades.csv"), &TRADE_HEADERS, &self.trades)?;
        info!(rows = self.trades.len(), "trades logged");

        let summary = self.summary();
        write_csv(&self.log_path.join("summary.csv"), &SUMMARY_HEADERS, &summary)?;

        self.funds.clear();
        self.orders.clear();
        self.trades.clear();
        self.trade_slots.clear();
        self.flushed = true;
        Ok(())
    }

    fn summary(&self) -> Vec<SummaryRow> {
        // last fund value of each date
        let values: BTreeMap<NaiveDate, f64> = self.funds.iter().map(|f| (f.date, f.value)).collect();

        let mut rows: Vec<SummaryRow> = match &self.bars {
            Some(bars) => {
                let by_date: BTreeMap<NaiveDate, &Bar> = bars.iter().map(|b| (b.date, b)).collect();
                let mut dates: Vec<NaiveDate> = by_date.keys().chain(values.keys()).copied().collect();
                dates.sort();
                dates.dedup();
                dates
                    .into_iter()
                    .map(|date| {
                        let bar = by_date.get(&date);
                        let field = |f: fn(&Bar) -> f64| Some(bar.map_or(0.0, |b| f(b)));
                        SummaryRow {
                            open: field(|b| b.open),
                            high: field(|b| b.high),
                            low: field(|b| b.low),
                            close: field(|b| b.close),
                            volume: field(|b| b.volume),
                            value: values.get(&date).copied().unwrap_or(0.0),
                            date,
                            close_returns: None,
                            value_returns: None,
                        }
                    })
                    .collect()
            }
            None => {
                warn!("no input bars provided, summary log will have reduced data");
                values
                    .iter()
                    .map(|(&date, &value)| SummaryRow {
                        open: None,
                        high: None,
                        low: None,
                        close: None,
                        volume: None,
                        value,
                        date,
                        close_returns: None,
                        value_returns: None,
                    })
                    .collect()
            }
        };

        for i in 1..rows.len() {
            rows[i].close_returns = pct_change(rows[i - 1].close, rows[i].close);
            rows[i].value_returns = pct_change(Some(rows[i - 1].value), Some(rows[i].value));
        }
        rows
    }
}

fn pct_change(prev: Option<f64>, cur: Option<f64>) -> Option<f64> {
    match (prev, cur) {
        (Some(p), Some(c)) if p != 0.0 => Some(c / p - 1.0),
        _ => None,
    }
}

fn write_csv<T: Serialize>(path: &Path, headers: &[&str], rows: &[T]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
    wtr.write_record(headers)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

impl RunHooks for RunLog {
    fn on_fund(&mut self, fund: &FundSnapshot) {
        self.funds.push(fund.into());
        self.flushed = false;
    }

    fn on_order(&mut self, order: &OrderEvent) {
        self.orders.push(order.into());
        self.flushed = false;
    }

    fn on_trade(&mut self, trade: &TradeEvent) {
        let record = TradeRecord::from(trade);
        match self.trade_slots.get(&trade.reference) {
            Some(&slot) => self.trades[slot] = record,
            None => {
                self.trade_slots.insert(trade.reference, self.trades.len());
                self.trades.push(record);
            }
        }
        self.flushed = false;
    }

    fn on_stop(&mut self) -> Result<()> {
        self.flush()
    }
}
