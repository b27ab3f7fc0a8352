use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use clap::Args;

use crate::commands::{parse_date_arg, RuntimeArgs};
use crate::models::screening::SelectionResult;
use crate::services::backtest_engine::BacktestDriver;
use crate::services::daily_selection::DailySelector;
use crate::services::event_log::{EventLog, EventTally};
use crate::services::result_writer::ResultWriter;

#[derive(Debug, Clone, Args)]
pub struct BacktestArgs {
    /// 起始日期（YYYY-MM-DD 或 YYYYMMDD）
    #[arg(long, value_parser = parse_date_arg)]
    pub start: NaiveDate,
    /// 结束日期（含）
    #[arg(long, value_parser = parse_date_arg)]
    pub end: NaiveDate,
    #[command(flatten)]
    pub runtime: RuntimeArgs,
}

/// 回溯区间内逐日选股并写出结果文件
pub async fn run_backtest(args: BacktestArgs) -> Result<(SelectionResult, Option<PathBuf>)> {
    let settings = Arc::new(args.runtime.settings()?);
    let gateway = args.runtime.gateway()?;

    let (events, tally) = EventLog::spawn();
    let selector = DailySelector::new(gateway.clone(), settings.clone(), events)?;
    let driver = BacktestDriver::new(gateway, selector, settings.clone());
    let result = driver.run(args.start, args.end).await;
    // 释放发送端，日志任务才会结束
    drop(driver);

    match tally.await {
        Ok(tally) => log_tally(&tally),
        Err(e) => log::warn!("日志任务异常退出: {}", e),
    }

    let written = ResultWriter::new(&settings.output_dir).persist(&result);
    Ok((result, written))
}

fn log_tally(tally: &EventTally) {
    log::info!(
        "共筛选 {} 只次，通过 {}，超时 {}，异常 {}，批量超时 {} 次",
        tally.screened,
        tally.passed,
        tally.timed_out,
        tally.failed,
        tally.batch_timeouts
    );
    for (reason, count) in &tally.rejections {
        log::info!("  淘汰原因 {}: {}", reason, count);
    }
}
