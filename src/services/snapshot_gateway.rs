//! 离线数据源：从 JSON 快照读取行情与财务数据，便于复盘和测试。

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::stock::{DailyBar, FinancialSummary, StockCode, UniverseEntry};
use crate::services::gateway::{GatewayResult, MarketDataGateway};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// 交易日历
    #[serde(default)]
    pub calendar: Vec<NaiveDate>,
    #[serde(default)]
    pub stocks: Vec<StockSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub code: StockCode,
    #[serde(default)]
    pub name: String,
    /// 总股本，没有 `market_caps` 记录时用它乘以当日收盘价
    #[serde(default)]
    pub total_shares: Option<f64>,
    #[serde(default)]
    pub market_caps: BTreeMap<NaiveDate, f64>,
    /// 第一大股东持股比例，按披露日期
    #[serde(default)]
    pub holder_ratios: BTreeMap<NaiveDate, f64>,
    #[serde(default)]
    pub financials: Vec<FinancialSummary>,
    #[serde(default)]
    pub bars: Vec<DailyBar>,
}

impl StockSnapshot {
    pub fn new(code: StockCode, name: &str) -> Self {
        Self {
            code,
            name: name.to_string(),
            total_shares: None,
            market_caps: BTreeMap::new(),
            holder_ratios: BTreeMap::new(),
            financials: vec![],
            bars: vec![],
        }
    }

    pub fn with_total_shares(mut self, shares: f64) -> Self {
        self.total_shares = Some(shares);
        self
    }

    pub fn with_market_cap(mut self, date: NaiveDate, cap: f64) -> Self {
        self.market_caps.insert(date, cap);
        self
    }

    pub fn with_holder_ratio(mut self, date: NaiveDate, ratio: f64) -> Self {
        self.holder_ratios.insert(date, ratio);
        self
    }

    pub fn with_financials(mut self, summary: FinancialSummary) -> Self {
        self.financials.push(summary);
        self
    }

    pub fn with_bar(mut self, bar: DailyBar) -> Self {
        self.bars.push(bar);
        self
    }
}

pub struct SnapshotGateway {
    snapshot: MarketSnapshot,
    index: HashMap<StockCode, usize>,
}

impl SnapshotGateway {
    pub fn new(mut snapshot: MarketSnapshot) -> Self {
        for stock in &mut snapshot.stocks {
            stock.bars.sort_by_key(|b| b.date);
        }
        snapshot.calendar.sort();
        snapshot.calendar.dedup();

        let index = snapshot
            .stocks
            .iter()
            .enumerate()
            .map(|(i, s)| (s.code.clone(), i))
            .collect();
        Self { snapshot, index }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("读取快照文件失败: {}", path.display()))?;
        let snapshot: MarketSnapshot = serde_json::from_str(&text)
            .with_context(|| format!("快照文件格式错误: {}", path.display()))?;
        Ok(Self::new(snapshot))
    }

    fn stock(&self, code: &StockCode) -> Option<&StockSnapshot> {
        self.index.get(code).map(|&i| &self.snapshot.stocks[i])
    }
}

#[async_trait]
impl MarketDataGateway for SnapshotGateway {
    async fn list_universe(&self) -> GatewayResult<Vec<UniverseEntry>> {
        Ok(self
            .snapshot
            .stocks
            .iter()
            .map(|s| UniverseEntry { code: s.code.clone(), name: s.name.clone() })
            .collect())
    }

    async fn market_cap(&self, code: &StockCode, date: NaiveDate) -> GatewayResult<Option<f64>> {
        let Some(stock) = self.stock(code) else {
            return Ok(None);
        };
        if let Some(cap) = stock.market_caps.get(&date) {
            return Ok(Some(*cap));
        }
        let close = stock.bars.iter().find(|b| b.date == date).map(|b| b.close);
        Ok(stock.total_shares.zip(close).map(|(shares, close)| shares * close))
    }

    async fn major_holder_ratio(&self, code: &StockCode, date: NaiveDate) -> GatewayResult<Option<f64>> {
        Ok(self.stock(code).and_then(|s| s.holder_ratios.get(&date).copied()))
    }

    async fn financial_summary(&self, code: &StockCode, date: NaiveDate) -> GatewayResult<Option<FinancialSummary>> {
        Ok(self.stock(code).and_then(|s| {
            s.financials
                .iter()
                .filter(|f| f.report_date <= date)
                .max_by_key(|f| f.report_date)
                .cloned()
        }))
    }

    async fn daily_bars(&self, code: &StockCode, start: NaiveDate, end: NaiveDate) -> GatewayResult<Vec<DailyBar>> {
        Ok(self
            .stock(code)
            .map(|s| {
                s.bars
                    .iter()
                    .filter(|b| b.date >= start && b.date <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn trading_calendar(&self, start: NaiveDate, end: NaiveDate) -> GatewayResult<Vec<NaiveDate>> {
        Ok(self
            .snapshot
            .calendar
            .iter()
            .filter(|d| **d >= start && **d <= end)
            .copied()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 8, day).unwrap()
    }

    fn bar(day: u32, close: f64) -> DailyBar {
        DailyBar {
            date: d(day),
            open: close,
            close,
            high: close,
            low: close,
            volume: 1.0,
            high_limit: None,
            low_limit: None,
        }
    }

    #[tokio::test]
    async fn test_market_cap_from_total_shares() {
        let code: StockCode = "002693".parse().unwrap();
        let stock = StockSnapshot::new(code.clone(), "双成药业")
            .with_total_shares(100_000_000.0)
            .with_bar(bar(5, 8.5))
            .with_market_cap(d(6), 1.0);
        let gw = SnapshotGateway::new(MarketSnapshot { calendar: vec![], stocks: vec![stock] });

        assert_eq!(gw.market_cap(&code, d(5)).await.unwrap(), Some(850_000_000.0));
        assert_eq!(gw.market_cap(&code, d(6)).await.unwrap(), Some(1.0));
        assert_eq!(gw.market_cap(&code, d(7)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_calendar_and_bars_are_range_filtered() {
        let code: StockCode = "600001".parse().unwrap();
        let stock = StockSnapshot::new(code.clone(), "")
            .with_bar(bar(7, 1.0))
            .with_bar(bar(5, 1.0))
            .with_bar(bar(6, 1.0));
        let gw = SnapshotGateway::new(MarketSnapshot {
            calendar: vec![d(7), d(5), d(6), d(5)],
            stocks: vec![stock],
        });

        assert_eq!(gw.trading_calendar(d(5), d(6)).await.unwrap(), vec![d(5), d(6)]);
        let bars = gw.daily_bars(&code, d(6), d(9)).await.unwrap();
        assert_eq!(bars.iter().map(|b| b.date).collect::<Vec<_>>(), vec![d(6), d(7)]);
    }

    #[test]
    fn test_snapshot_json_roundtrip_shape() {
        let json = r#"{
            "calendar": ["2024-08-05"],
            "stocks": [{
                "code": "sz002693",
                "name": "双成药业",
                "holder_ratios": { "2024-06-30": 41.2 },
                "financials": [{ "report_date": "2024-06-30", "revenue": "1.2亿", "net_profit": 1500000.0 }],
                "bars": [{ "date": "2024-08-05", "open": 5.1, "close": 5.3, "volume": 12000 }]
            }]
        }"#;
        let snapshot: MarketSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.stocks[0].code.as_str(), "002693");
        assert_eq!(snapshot.stocks[0].holder_ratios.len(), 1);
        assert_eq!(snapshot.stocks[0].financials[0].revenue.to_yuan().unwrap(), 120_000_000.0);
    }
}
