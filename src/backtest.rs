//! Single-feed backtest assembly around a host engine.

use chrono::{Local, NaiveDateTime};
use std::fs;
use std::path::PathBuf;
use tracing::info;

use crate::analyzer::RunLog;
use crate::config::RunConfig;
use crate::data::load_bars;
use crate::engine::{BacktestEngine, RunHooks, Strategy};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestReport {
    pub log_path: PathBuf,
    pub starting_value: f64,
    pub final_value: f64,
}

/// Load the configured bar file, run `strategy` over it and write the run log.
pub fn run_backtest(
    engine: &mut dyn BacktestEngine,
    strategy: &mut dyn Strategy,
    config: &RunConfig,
) -> Result<BacktestReport> {
    run_backtest_at(engine, strategy, config, Local::now().naive_local())
}

/// [`run_backtest`] with the timestamp used in the log directory name.
pub fn run_backtest_at(
    engine: &mut dyn BacktestEngine,
    strategy: &mut dyn Strategy,
    config: &RunConfig,
    now: NaiveDateTime,
) -> Result<BacktestReport> {
    let bars = load_bars(&config.data_path)?;
    engine.add_data(&config.feed_name(), bars.clone())?;
    engine.set_cash(config.init_cash);
    engine.set_commission(config.commission, config.margin);

    let log_path = config.log_path(strategy.name(), now);
    fs::create_dir_all(&log_path)?;
    let mut log = RunLog::new(&log_path).with_bars(bars);

    let starting_value = engine.value();
    info!(strategy = strategy.name(), value = %format!("{starting_value:.2}"), "starting portfolio value");

    {
        let mut hooks: [&mut dyn RunHooks; 1] = [&mut log];
        engine.run(strategy, &mut hooks)?;
    }
    if !log.is_flushed() {
        log.flush()?;
    }

    let final_value = engine.value();
    info!(value = %format!("{final_value:.2}"), path = %log_path.display(), "final portfolio value");

    Ok(BacktestReport {
        log_path,
        starting_value,
        final_value,
    })
}
