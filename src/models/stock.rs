use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::utils::units::parse_scaled_amount;

/// 交易所
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Exchange {
    #[serde(rename = "sh")]
    Shanghai,
    #[serde(rename = "sz")]
    Shenzhen,
    #[serde(rename = "bj")]
    Beijing,
}

impl Exchange {
    pub fn prefix(&self) -> &'static str {
        match self {
            Exchange::Shanghai => "sh",
            Exchange::Shenzhen => "sz",
            Exchange::Beijing => "bj",
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            Exchange::Shanghai => "SH",
            Exchange::Shenzhen => "SZ",
            Exchange::Beijing => "BJ",
        }
    }

    /// 东方财富 secid 市场号：沪市1，深市/北交所0
    pub fn market_id(&self) -> u8 {
        match self {
            Exchange::Shanghai => 1,
            Exchange::Shenzhen | Exchange::Beijing => 0,
        }
    }

    fn from_digits(digits: &str) -> Option<Self> {
        match digits.as_bytes().first()? {
            b'6' | b'9' => Some(Exchange::Shanghai),
            b'0' | b'2' | b'3' => Some(Exchange::Shenzhen),
            b'4' | b'8' => Some(Exchange::Beijing),
            _ => None,
        }
    }
}

/// 六位股票代码，交易所由首位数字推出
///
/// 接受 `600000`、`sh600000`、`SZ000001`、`600000.SH` 几种写法，
/// 序列化时只输出六位数字。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StockCode(String);

impl StockCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn exchange(&self) -> Exchange {
        // 构造时已校验过首位
        Exchange::from_digits(&self.0).unwrap_or(Exchange::Shenzhen)
    }

    /// sh600000 / sz000001 格式（腾讯、新浪接口）
    pub fn qualified(&self) -> String {
        format!("{}{}", self.exchange().prefix(), self.0)
    }

    /// 600000.SH 格式（东方财富数据中心）
    pub fn secucode(&self) -> String {
        format!("{}.{}", self.0, self.exchange().suffix())
    }

    /// 1.600000 格式（东方财富行情）
    pub fn secid(&self) -> String {
        format!("{}.{}", self.exchange().market_id(), self.0)
    }

    /// 创业板、科创板、北交所
    pub fn is_growth_board(&self) -> bool {
        self.0.starts_with('3')
            || self.0.starts_with("68")
            || self.0.starts_with('4')
            || self.0.starts_with('8')
    }
}

impl FromStr for StockCode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let raw = s.trim();
        let lower = raw.to_ascii_lowercase();
        let digits = if let Some((code, suffix)) = lower.split_once('.') {
            if !matches!(suffix, "sh" | "sz" | "bj") {
                return Err(anyhow!("无效的股票代码: {}", raw));
            }
            code.to_string()
        } else if ["sh", "sz", "bj"].iter().any(|p| lower.starts_with(p)) {
            lower[2..].to_string()
        } else {
            lower
        };

        if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(anyhow!("无效的股票代码: {}", raw));
        }
        if Exchange::from_digits(&digits).is_none() {
            return Err(anyhow!("无效的股票代码: {}", raw));
        }
        Ok(StockCode(digits))
    }
}

impl TryFrom<String> for StockCode {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<StockCode> for String {
    fn from(code: StockCode) -> Self {
        code.0
    }
}

impl fmt::Display for StockCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 股票池条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniverseEntry {
    pub code: StockCode,
    #[serde(default)]
    pub name: String,
}

impl UniverseEntry {
    /// ST、*ST 以及退市整理期股票
    pub fn is_special_treatment(&self) -> bool {
        let upper = self.name.to_uppercase();
        upper.contains("ST") || self.name.contains('退')
    }
}

/// 日K线
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: f64,
    pub close: f64,
    #[serde(default)]
    pub high: f64,
    #[serde(default)]
    pub low: f64,
    pub volume: f64,
    #[serde(default)]
    pub high_limit: Option<f64>,
    #[serde(default)]
    pub low_limit: Option<f64>,
}

/// 财报金额，接口可能给数值，也可能给 "1.23亿" 这样的文本
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReportedAmount {
    Value(f64),
    Text(String),
}

impl ReportedAmount {
    /// 换算成元
    pub fn to_yuan(&self) -> Result<f64> {
        match self {
            ReportedAmount::Value(v) => Ok(*v),
            ReportedAmount::Text(s) => parse_scaled_amount(s),
        }
    }
}

impl From<f64> for ReportedAmount {
    fn from(v: f64) -> Self {
        ReportedAmount::Value(v)
    }
}

impl From<&str> for ReportedAmount {
    fn from(s: &str) -> Self {
        ReportedAmount::Text(s.to_string())
    }
}

/// 最近一期财报摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialSummary {
    pub report_date: NaiveDate,
    pub revenue: ReportedAmount,
    pub net_profit: ReportedAmount,
}
