use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::models::stock::{DailyBar, FinancialSummary, StockCode, UniverseEntry};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("http status {status}: {url}")]
    Status { status: u16, url: String },
    #[error("json error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl GatewayError {
    /// 超时、连接错误、5xx、限流可以重试
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Http(e) => !e.is_decode() && !e.is_builder(),
            GatewayError::Status { status, .. } => *status == 429 || *status >= 500,
            GatewayError::Decode(_) | GatewayError::Malformed(_) => false,
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// 行情/财务数据来源。
///
/// 查不到数据返回 `Ok(None)` 或空列表，只有请求本身出错才返回 `Err`。
#[async_trait]
pub trait MarketDataGateway: Send + Sync {
    /// 全部A股代码及名称
    async fn list_universe(&self) -> GatewayResult<Vec<UniverseEntry>>;

    /// 指定日期的总市值（元）
    async fn market_cap(&self, code: &StockCode, date: NaiveDate) -> GatewayResult<Option<f64>>;

    /// 指定日期（精确匹配）的第一大股东持股比例（%）
    async fn major_holder_ratio(&self, code: &StockCode, date: NaiveDate) -> GatewayResult<Option<f64>>;

    /// 截至指定日期已披露的最近一期财报
    async fn financial_summary(&self, code: &StockCode, date: NaiveDate) -> GatewayResult<Option<FinancialSummary>>;

    /// [start, end] 区间内的日K线，按日期升序
    async fn daily_bars(&self, code: &StockCode, start: NaiveDate, end: NaiveDate) -> GatewayResult<Vec<DailyBar>>;

    /// [start, end] 区间内的交易日，按日期升序
    async fn trading_calendar(&self, start: NaiveDate, end: NaiveDate) -> GatewayResult<Vec<NaiveDate>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let busy = GatewayError::Status { status: 503, url: "u".into() };
        let limited = GatewayError::Status { status: 429, url: "u".into() };
        let missing = GatewayError::Status { status: 404, url: "u".into() };
        assert!(busy.is_transient());
        assert!(limited.is_transient());
        assert!(!missing.is_transient());
        assert!(!GatewayError::Malformed("x".into()).is_transient());
    }
}
