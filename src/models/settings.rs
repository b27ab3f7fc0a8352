use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::utils::retry::RetryPolicy;

/// 选股参数，未在配置文件中出现的字段取默认值
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenerSettings {
    /// 总市值上限（元）
    #[serde(default = "default_max_market_cap")]
    pub max_market_cap: f64,
    /// 第一大股东持股比例下限（%）
    #[serde(default = "default_min_holder_ratio")]
    pub min_holder_ratio: f64,
    /// 股东数据最多往前回溯的自然日数
    #[serde(default = "default_holder_lookback_days")]
    pub holder_lookback_days: u32,
    /// 营业总收入上限（元）
    #[serde(default = "default_max_revenue")]
    pub max_revenue: f64,
    /// 扣非净利润上限（元）
    #[serde(default = "default_max_net_profit")]
    pub max_net_profit: f64,
    #[serde(default)]
    pub fundamentals_rule: FundamentalsRule,
    /// 拉取K线时向前取的自然日数
    #[serde(default = "default_bar_lookback_days")]
    pub bar_lookback_days: u32,
    /// 参与量能判断的最近K线条数
    #[serde(default = "default_bar_window")]
    pub bar_window: usize,
    /// 一字板判断的开收盘价容差，<=0 表示严格相等
    #[serde(default = "default_limit_up_epsilon")]
    pub limit_up_epsilon: f64,
    #[serde(default)]
    pub limit_up_rule: LimitUpRule,
    /// 股票池代码前缀（默认沪深主板）
    #[serde(default = "default_board_prefixes")]
    pub board_prefixes: Vec<String>,
    /// 剔除 ST 和退市整理股
    #[serde(default = "default_true")]
    pub exclude_st: bool,
    #[serde(default)]
    pub execution: ExecutionSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_max_market_cap() -> f64 { 3_000_000_000.0 }
fn default_min_holder_ratio() -> f64 { 30.0 }
fn default_holder_lookback_days() -> u32 { 100 }
fn default_max_revenue() -> f64 { 200_000_000.0 }
fn default_max_net_profit() -> f64 { 3_000_000.0 }
fn default_bar_lookback_days() -> u32 { 10 }
fn default_bar_window() -> usize { 6 }
fn default_limit_up_epsilon() -> f64 { 0.01 }
fn default_true() -> bool { true }
fn default_output_dir() -> PathBuf { PathBuf::from(".") }

fn default_board_prefixes() -> Vec<String> {
    ["600", "601", "603", "000", "001", "002"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for ScreenerSettings {
    fn default() -> Self {
        Self {
            max_market_cap: default_max_market_cap(),
            min_holder_ratio: default_min_holder_ratio(),
            holder_lookback_days: default_holder_lookback_days(),
            max_revenue: default_max_revenue(),
            max_net_profit: default_max_net_profit(),
            fundamentals_rule: FundamentalsRule::default(),
            bar_lookback_days: default_bar_lookback_days(),
            bar_window: default_bar_window(),
            limit_up_epsilon: default_limit_up_epsilon(),
            limit_up_rule: LimitUpRule::default(),
            board_prefixes: default_board_prefixes(),
            exclude_st: true,
            execution: ExecutionSettings::default(),
            retry: RetrySettings::default(),
            output_dir: default_output_dir(),
        }
    }
}

impl ScreenerSettings {
    /// 从 JSON 文件读取配置
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        let settings: ScreenerSettings = serde_json::from_str(&text)
            .with_context(|| format!("配置文件格式错误: {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.execution.workers == 0 {
            return Err(anyhow!("workers 必须大于0"));
        }
        if self.retry.attempts == 0 {
            return Err(anyhow!("retry.attempts 必须大于0"));
        }
        if self.board_prefixes.is_empty() {
            return Err(anyhow!("board_prefixes 不能为空"));
        }
        if self.board_prefixes.iter().any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit())) {
            return Err(anyhow!("board_prefixes 只能包含数字前缀"));
        }
        if self.bar_window < 5 {
            return Err(anyhow!("bar_window 至少为5"));
        }
        if self.holder_lookback_days == 0 {
            return Err(anyhow!("holder_lookback_days 必须大于0"));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry.attempts,
            backoff: Duration::from_millis(self.retry.backoff_ms),
            empty_backoff: Duration::from_millis(self.retry.empty_backoff_ms),
        }
    }
}

/// 营收/利润两个上限之间的关系
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FundamentalsRule {
    /// 任一超限即剔除
    #[default]
    #[serde(rename = "either")]
    Either,
    /// 两项都超限才剔除
    #[serde(rename = "both")]
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LimitUpRule {
    /// 开盘价等于收盘价
    #[default]
    #[serde(rename = "open_close")]
    OpenClose,
    /// 开盘价等于收盘价且收在涨停价上（K线无涨停价时退化为 OpenClose）
    #[serde(rename = "at_high_limit")]
    AtHighLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExecutionMode {
    #[serde(rename = "sequential")]
    Sequential,
    #[default]
    #[serde(rename = "concurrent")]
    Concurrent,
}

impl std::str::FromStr for ExecutionMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sequential" | "seq" => Ok(ExecutionMode::Sequential),
            "concurrent" | "pool" => Ok(ExecutionMode::Concurrent),
            other => Err(anyhow!("未知执行模式: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSettings {
    #[serde(default)]
    pub mode: ExecutionMode,
    /// 并发模式下的工作线程数
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// 顺序模式下每只股票之间的间隔（毫秒）
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
    #[serde(default = "default_batch_timeout_secs")]
    pub batch_timeout_secs: u64,
}

fn default_workers() -> usize { 5 }
fn default_pacing_ms() -> u64 { 500 }
fn default_task_timeout_secs() -> u64 { 60 }
fn default_batch_timeout_secs() -> u64 { 300 }

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            workers: default_workers(),
            pacing_ms: default_pacing_ms(),
            task_timeout_secs: default_task_timeout_secs(),
            batch_timeout_secs: default_batch_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    /// 接口返回空数据时的等待（毫秒）
    #[serde(default = "default_empty_backoff_ms")]
    pub empty_backoff_ms: u64,
}

fn default_attempts() -> u32 { 3 }
fn default_backoff_ms() -> u64 { 1000 }
fn default_empty_backoff_ms() -> u64 { 500 }

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            backoff_ms: default_backoff_ms(),
            empty_backoff_ms: default_empty_backoff_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_uses_defaults() {
        let s: ScreenerSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(s.max_market_cap, 3_000_000_000.0);
        assert_eq!(s.min_holder_ratio, 30.0);
        assert_eq!(s.fundamentals_rule, FundamentalsRule::Either);
        assert_eq!(s.limit_up_epsilon, 0.01);
        assert_eq!(s.execution.workers, 5);
        assert_eq!(s.retry.attempts, 3);
        assert_eq!(s.board_prefixes.len(), 6);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_partial_override() {
        let json = r#"{
            "fundamentals_rule": "both",
            "limit_up_rule": "at_high_limit",
            "execution": { "mode": "sequential", "pacing_ms": 100 }
        }"#;
        let s: ScreenerSettings = serde_json::from_str(json).unwrap();
        assert_eq!(s.fundamentals_rule, FundamentalsRule::Both);
        assert_eq!(s.limit_up_rule, LimitUpRule::AtHighLimit);
        assert_eq!(s.execution.mode, ExecutionMode::Sequential);
        assert_eq!(s.execution.pacing_ms, 100);
        assert_eq!(s.execution.workers, 5);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut s = ScreenerSettings::default();
        s.execution.workers = 0;
        assert!(s.validate().is_err());

        let mut s = ScreenerSettings::default();
        s.board_prefixes = vec!["60a".into()];
        assert!(s.validate().is_err());

        let mut s = ScreenerSettings::default();
        s.bar_window = 4;
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"max_market_cap": 5000000000}"#).unwrap();
        let s = ScreenerSettings::load(&path).unwrap();
        assert_eq!(s.max_market_cap, 5_000_000_000.0);

        assert!(ScreenerSettings::load(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_execution_mode_from_str() {
        assert_eq!("sequential".parse::<ExecutionMode>().unwrap(), ExecutionMode::Sequential);
        assert_eq!("Concurrent".parse::<ExecutionMode>().unwrap(), ExecutionMode::Concurrent);
        assert!("parallel-ish".parse::<ExecutionMode>().is_err());
    }
}
