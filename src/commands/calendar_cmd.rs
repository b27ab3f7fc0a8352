use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use clap::Args;

use crate::commands::{parse_date_arg, RuntimeArgs};
use crate::services::backtest_engine::BacktestDriver;
use crate::services::daily_selection::DailySelector;
use crate::services::event_log::EventSink;

#[derive(Debug, Clone, Args)]
pub struct CalendarArgs {
    #[arg(long, value_parser = parse_date_arg)]
    pub start: NaiveDate,
    #[arg(long, value_parser = parse_date_arg)]
    pub end: NaiveDate,
    #[command(flatten)]
    pub runtime: RuntimeArgs,
}

/// 打印区间内的交易日
pub async fn run_calendar(args: CalendarArgs) -> Result<Vec<NaiveDate>> {
    let settings = Arc::new(args.runtime.settings()?);
    let gateway = args.runtime.gateway()?;
    let selector = DailySelector::new(gateway.clone(), settings.clone(), EventSink::detached())?;
    let driver = BacktestDriver::new(gateway, selector, settings);

    let dates = driver.trading_dates(args.start, args.end).await;
    for date in &dates {
        println!("{}", date);
    }
    println!("共 {} 个交易日", dates.len());
    Ok(dates)
}
