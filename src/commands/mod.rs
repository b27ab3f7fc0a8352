pub mod backtest_cmd;
pub mod calendar_cmd;
pub mod screen_cmd;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use clap::Args;

use crate::models::settings::{ExecutionMode, ScreenerSettings};
use crate::services::eastmoney::EastmoneyGateway;
use crate::services::gateway::MarketDataGateway;
use crate::services::snapshot_gateway::SnapshotGateway;
use crate::utils::dates::parse_date;

/// 各子命令共用的运行参数
#[derive(Debug, Clone, Default, Args)]
pub struct RuntimeArgs {
    /// 配置文件（JSON），缺省使用内置默认值
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// 本地行情快照（JSON），指定后不访问网络
    #[arg(long)]
    pub snapshot: Option<PathBuf>,
    /// 执行模式: sequential | concurrent
    #[arg(long)]
    pub mode: Option<ExecutionMode>,
    /// 并发工作任务数
    #[arg(long)]
    pub workers: Option<usize>,
    /// 结果文件输出目录
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}

impl RuntimeArgs {
    /// 读取配置文件并叠加命令行参数
    pub fn settings(&self) -> Result<ScreenerSettings> {
        let mut settings = match &self.config {
            Some(path) => ScreenerSettings::load(path)?,
            None => ScreenerSettings::default(),
        };
        if let Some(mode) = self.mode {
            settings.execution.mode = mode;
        }
        if let Some(workers) = self.workers {
            settings.execution.workers = workers;
        }
        if let Some(dir) = &self.output_dir {
            settings.output_dir = dir.clone();
        }
        settings.validate()?;
        Ok(settings)
    }

    pub fn gateway(&self) -> Result<Arc<dyn MarketDataGateway>> {
        let gateway: Arc<dyn MarketDataGateway> = match &self.snapshot {
            Some(path) => {
                log::info!("使用本地行情快照: {}", path.display());
                Arc::new(SnapshotGateway::load(path)?)
            }
            None => Arc::new(EastmoneyGateway::new()?),
        };
        Ok(gateway)
    }
}

/// clap 的日期解析，支持 YYYY-MM-DD 和 YYYYMMDD
pub fn parse_date_arg(s: &str) -> Result<NaiveDate, String> {
    parse_date(s).map_err(|e| e.to_string())
}
