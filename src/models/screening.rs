use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::stock::StockCode;

/// 单只股票被剔除的原因
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    CapTooLarge { market_cap: f64 },
    CapUnavailable,
    OwnershipTooLow { ratio: f64 },
    FundamentalsTooLarge { revenue: f64, net_profit: f64 },
    FundamentalsUnavailable,
    InsufficientHistory { bars: usize },
    VolumeConditionUnmet,
    RecentLimitUp,
    MalformedData { message: String },
}

impl Rejection {
    /// 汇总统计用的短标签
    pub fn kind(&self) -> &'static str {
        match self {
            Rejection::CapTooLarge { .. } => "cap_too_large",
            Rejection::CapUnavailable => "cap_unavailable",
            Rejection::OwnershipTooLow { .. } => "ownership_too_low",
            Rejection::FundamentalsTooLarge { .. } => "fundamentals_too_large",
            Rejection::FundamentalsUnavailable => "fundamentals_unavailable",
            Rejection::InsufficientHistory { .. } => "insufficient_history",
            Rejection::VolumeConditionUnmet => "volume_condition_unmet",
            Rejection::RecentLimitUp => "recent_limit_up",
            Rejection::MalformedData { .. } => "malformed_data",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::CapTooLarge { market_cap } => write!(f, "市值{:.0},过大", market_cap),
            Rejection::CapUnavailable => write!(f, "未获取到市值"),
            Rejection::OwnershipTooLow { ratio } => write!(f, "大股东持股比例{:.2},过小", ratio),
            Rejection::FundamentalsTooLarge { revenue, net_profit } => {
                write!(f, "营收{:.0},净利润{:.0},过大", revenue, net_profit)
            }
            Rejection::FundamentalsUnavailable => write!(f, "未获取到财务数据"),
            Rejection::InsufficientHistory { bars } => write!(f, "交易数据不足({}条)", bars),
            Rejection::VolumeConditionUnmet => write!(f, "成交量条件不满足"),
            Rejection::RecentLimitUp => write!(f, "近两日有一字涨停"),
            Rejection::MalformedData { message } => write!(f, "数据格式错误: {}", message),
        }
    }
}

/// 某只股票在某日的筛选结论，只用于日志
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenVerdict {
    pub code: StockCode,
    pub date: NaiveDate,
    pub rejection: Option<Rejection>,
}

impl ScreenVerdict {
    pub fn pass(code: StockCode, date: NaiveDate) -> Self {
        Self { code, date, rejection: None }
    }

    pub fn reject(code: StockCode, date: NaiveDate, rejection: Rejection) -> Self {
        Self { code, date, rejection: Some(rejection) }
    }

    pub fn passed(&self) -> bool {
        self.rejection.is_none()
    }
}

/// 单个交易日的选股结果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailySelection {
    pub date: Option<NaiveDate>,
    /// 通过筛选的股票，按完成顺序排列
    pub stocks: Vec<StockCode>,
    /// 实际提交筛选的股票数
    pub attempted: usize,
    /// 超时或异常而未得出结论的股票
    pub unfinished: Vec<StockCode>,
}

/// 日期 -> 当日入选股票
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionResult {
    by_date: BTreeMap<NaiveDate, Vec<StockCode>>,
}

impl SelectionResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// 同一日期重复写入时覆盖旧值
    pub fn insert(&mut self, date: NaiveDate, stocks: Vec<StockCode>) -> Option<Vec<StockCode>> {
        self.by_date.insert(date, stocks)
    }

    pub fn get(&self, date: &NaiveDate) -> Option<&[StockCode]> {
        self.by_date.get(date).map(|v| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.by_date.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_date.is_empty()
    }

    /// 所有日期的入选股票总数
    pub fn total_picks(&self) -> usize {
        self.by_date.values().map(|v| v.len()).sum()
    }

    /// 展开为 (日期, 代码) 行，没有入选股票的日期不产生行
    pub fn rows(&self) -> Vec<SelectionRow> {
        self.by_date
            .iter()
            .flat_map(|(date, stocks)| {
                stocks.iter().map(move |code| SelectionRow {
                    date: *date,
                    code: code.clone(),
                })
            })
            .collect()
    }
}

/// 结果文件中的一行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRow {
    #[serde(rename = "日期")]
    pub date: NaiveDate,
    #[serde(rename = "股票代码")]
    pub code: StockCode,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 8, day).unwrap()
    }

    fn code(s: &str) -> StockCode {
        s.parse().unwrap()
    }

    #[test]
    fn test_rows_skip_empty_dates() {
        let mut result = SelectionResult::new();
        result.insert(d(6), vec![]);
        result.insert(d(5), vec![code("002693"), code("600001")]);
        let rows = result.rows();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.date == d(5)));
        assert_eq!(result.len(), 2);
        assert_eq!(result.total_picks(), 2);
    }

    #[test]
    fn test_insert_overwrites() {
        let mut result = SelectionResult::new();
        result.insert(d(5), vec![code("002693")]);
        let old = result.insert(d(5), vec![code("600001")]);
        assert_eq!(old, Some(vec![code("002693")]));
        assert_eq!(result.get(&d(5)), Some(&[code("600001")][..]));
    }

    #[test]
    fn test_rejection_kind_and_display() {
        let r = Rejection::OwnershipTooLow { ratio: 12.5 };
        assert_eq!(r.kind(), "ownership_too_low");
        assert!(r.to_string().contains("12.50"));
        let json = serde_json::to_string(&Rejection::RecentLimitUp).unwrap();
        assert_eq!(json, r#"{"reason":"recent_limit_up"}"#);
    }
}
