use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use clap::Args;

use crate::commands::{parse_date_arg, RuntimeArgs};
use crate::models::screening::ScreenVerdict;
use crate::models::stock::StockCode;
use crate::services::screener::StockScreener;

#[derive(Debug, Clone, Args)]
pub struct ScreenArgs {
    /// 股票代码，如 002693 / sz002693 / 002693.SZ
    #[arg(long)]
    pub code: StockCode,
    #[arg(long, value_parser = parse_date_arg)]
    pub date: NaiveDate,
    #[command(flatten)]
    pub runtime: RuntimeArgs,
}

/// 单只股票在某日的筛选结论，排查用
pub async fn run_screen(args: ScreenArgs) -> Result<ScreenVerdict> {
    let settings = Arc::new(args.runtime.settings()?);
    let gateway = args.runtime.gateway()?;
    let screener = StockScreener::new(gateway, settings);

    if let Some((found, ratio)) = screener.resolve_holder_ratio(&args.code, args.date).await {
        println!("股东数据日期: {}，第一大股东持股比例: {:.2}%", found, ratio);
    } else {
        println!("未找到股东数据");
    }

    let verdict = screener.evaluate(&args.code, args.date).await;
    match &verdict.rejection {
        None => println!("{} {}: 满足所有条件", verdict.date, verdict.code),
        Some(r) => println!("{} {}: {}", verdict.date, verdict.code, r),
    }
    Ok(verdict)
}
