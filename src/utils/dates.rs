use anyhow::{anyhow, Result};
use chrono::NaiveDate;

/// 解析 "2024-08-05" 或 "20240805"
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    let s = value.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y%m%d"))
        .map_err(|_| anyhow!("无法解析日期: {}", value))
}

/// 接口里常见的 "2024-06-30 00:00:00" 也能处理
pub fn parse_date_prefix(value: &str) -> Option<NaiveDate> {
    let s = value.trim();
    let head = s.get(..10).unwrap_or(s);
    parse_date(head).ok()
}
