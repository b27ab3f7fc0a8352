use std::sync::Arc;

use chrono::{Days, NaiveDate};

use crate::models::screening::{Rejection, ScreenVerdict};
use crate::models::settings::{FundamentalsRule, ScreenerSettings};
use crate::models::stock::{DailyBar, StockCode};
use crate::services::conditions::{has_recent_limit_up_with, volume_spike, MIN_VOLUME_BARS};
use crate::services::gateway::{GatewayError, MarketDataGateway};
use crate::utils::retry::{fetch_with_retry, RetryPolicy};

/// 单只股票的逐级筛选：市值 -> 大股东持股 -> 营收利润 -> 量能形态。
/// 任一环节不通过立即返回，后面的数据不再拉取。
pub struct StockScreener {
    gateway: Arc<dyn MarketDataGateway>,
    settings: Arc<ScreenerSettings>,
    retry: RetryPolicy,
}

impl StockScreener {
    pub fn new(gateway: Arc<dyn MarketDataGateway>, settings: Arc<ScreenerSettings>) -> Self {
        let retry = settings.retry_policy();
        Self { gateway, settings, retry }
    }

    /// 通过全部条件时返回股票代码
    pub async fn screen(&self, code: &StockCode, date: NaiveDate) -> Option<StockCode> {
        let verdict = self.evaluate(code, date).await;
        verdict.passed().then_some(verdict.code)
    }

    pub async fn evaluate(&self, code: &StockCode, date: NaiveDate) -> ScreenVerdict {
        match self.run_stages(code, date).await {
            Ok(()) => ScreenVerdict::pass(code.clone(), date),
            Err(rejection) => ScreenVerdict::reject(code.clone(), date, rejection),
        }
    }

    async fn run_stages(&self, code: &StockCode, date: NaiveDate) -> Result<(), Rejection> {
        self.check_market_cap(code, date).await?;
        self.check_ownership(code, date).await?;
        self.check_fundamentals(code, date).await?;
        self.check_trading_pattern(code, date).await
    }

    async fn check_market_cap(&self, code: &StockCode, date: NaiveDate) -> Result<(), Rejection> {
        let gateway = self.gateway.as_ref();
        let what = format!("获取股票{}市值", code);
        let market_cap = fetch_with_retry(&self.retry, &what, || gateway.market_cap(code, date))
            .await
            .map_err(malformed)?
            .ok_or(Rejection::CapUnavailable)?;

        if market_cap > self.settings.max_market_cap {
            return Err(Rejection::CapTooLarge { market_cap });
        }
        Ok(())
    }

    async fn check_ownership(&self, code: &StockCode, date: NaiveDate) -> Result<(), Rejection> {
        let ratio = self
            .resolve_holder_ratio(code, date)
            .await
            .map(|(_, ratio)| ratio)
            .unwrap_or(0.0);

        if ratio < self.settings.min_holder_ratio {
            return Err(Rejection::OwnershipTooLow { ratio });
        }
        Ok(())
    }

    /// 第一大股东持股比例：当天没有就逐日往前查，最多查 `holder_lookback_days` 天。
    /// 返回实际命中的日期和比例。
    pub async fn resolve_holder_ratio(&self, code: &StockCode, date: NaiveDate) -> Option<(NaiveDate, f64)> {
        for offset in 0..self.settings.holder_lookback_days {
            let day = date.checked_sub_days(Days::new(u64::from(offset)))?;
            match self.gateway.major_holder_ratio(code, day).await {
                Ok(Some(ratio)) => return Some((day, ratio)),
                Ok(None) => {}
                Err(e) => log::debug!("查询股票{} {} 股东数据失败: {}", code.qualified(), day, e),
            }
        }
        log::info!("未能找到股票{}的股东数据", code.qualified());
        None
    }

    async fn check_fundamentals(&self, code: &StockCode, date: NaiveDate) -> Result<(), Rejection> {
        let gateway = self.gateway.as_ref();
        let what = format!("获取股票{}财务数据", code);
        let summary = fetch_with_retry(&self.retry, &what, || gateway.financial_summary(code, date))
            .await
            .map_err(malformed)?
            .filter(|s| s.report_date <= date)
            .ok_or(Rejection::FundamentalsUnavailable)?;

        let revenue = summary.revenue.to_yuan().map_err(|e| Rejection::MalformedData { message: e.to_string() })?;
        let net_profit = summary
            .net_profit
            .to_yuan()
            .map_err(|e| Rejection::MalformedData { message: e.to_string() })?;

        let revenue_over = revenue > self.settings.max_revenue;
        let profit_over = net_profit > self.settings.max_net_profit;
        let too_large = match self.settings.fundamentals_rule {
            FundamentalsRule::Either => revenue_over || profit_over,
            FundamentalsRule::Both => revenue_over && profit_over,
        };

        if too_large {
            return Err(Rejection::FundamentalsTooLarge { revenue, net_profit });
        }
        Ok(())
    }

    async fn check_trading_pattern(&self, code: &StockCode, date: NaiveDate) -> Result<(), Rejection> {
        let bars = self.fetch_recent_bars(code, date).await?;

        if bars.len() < MIN_VOLUME_BARS {
            return Err(Rejection::InsufficientHistory { bars: bars.len() });
        }
        if !volume_spike(&bars) {
            return Err(Rejection::VolumeConditionUnmet);
        }
        if has_recent_limit_up_with(&bars, self.settings.limit_up_epsilon, self.settings.limit_up_rule) {
            return Err(Rejection::RecentLimitUp);
        }
        Ok(())
    }

    /// 截至 `date` 的最近 `bar_window` 根日K线
    async fn fetch_recent_bars(&self, code: &StockCode, date: NaiveDate) -> Result<Vec<DailyBar>, Rejection> {
        let start = date
            .checked_sub_days(Days::new(u64::from(self.settings.bar_lookback_days)))
            .unwrap_or(date);
        let gateway = self.gateway.as_ref();
        let what = format!("获取股票{}交易数据", code);

        let mut bars = fetch_with_retry(&self.retry, &what, || async move {
            let bars = gateway.daily_bars(code, start, date).await?;
            Ok::<_, GatewayError>((!bars.is_empty()).then_some(bars))
        })
        .await
        .map_err(malformed)?
        .unwrap_or_default();

        bars.retain(|b| b.date <= date);
        let skip = bars.len().saturating_sub(self.settings.bar_window);
        Ok(bars.split_off(skip))
    }
}

fn malformed(e: GatewayError) -> Rejection {
    Rejection::MalformedData { message: e.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::stock::FinancialSummary;
    use crate::services::snapshot_gateway::{MarketSnapshot, SnapshotGateway, StockSnapshot};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn settings() -> Arc<ScreenerSettings> {
        Arc::new(ScreenerSettings::default())
    }

    fn screener_for(stock: StockSnapshot, settings: Arc<ScreenerSettings>) -> StockScreener {
        let snapshot = MarketSnapshot { calendar: vec![], stocks: vec![stock] };
        StockScreener::new(Arc::new(SnapshotGateway::new(snapshot)), settings)
    }

    fn passing_stock(date: NaiveDate) -> StockSnapshot {
        let volumes = [100.0, 100.0, 100.0, 100.0, 100.0, 1000.0];
        let mut stock = StockSnapshot::new("002693".parse().unwrap(), "双成药业")
            .with_market_cap(date, 1_000_000_000.0)
            .with_holder_ratio(date, 40.0)
            .with_financials(FinancialSummary {
                report_date: d(2024, 6, 30),
                revenue: 100_000_000.0_f64.into(),
                net_profit: 1_000_000.0_f64.into(),
            });
        for (i, v) in volumes.iter().enumerate() {
            let day = date - Days::new((volumes.len() - 1 - i) as u64);
            stock = stock.with_bar(DailyBar {
                date: day,
                open: 10.0,
                close: 10.5,
                high: 10.6,
                low: 9.9,
                volume: *v,
                high_limit: None,
                low_limit: None,
            });
        }
        stock
    }

    #[tokio::test(start_paused = true)]
    async fn test_passing_stock() {
        let date = d(2024, 8, 9);
        let screener = screener_for(passing_stock(date), settings());
        let code: StockCode = "002693".parse().unwrap();
        assert_eq!(screener.screen(&code, date).await, Some(code.clone()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_holder_ratio_walks_back_one_day_at_a_time() {
        let date = d(2024, 8, 9);
        let stock = StockSnapshot::new("600001".parse().unwrap(), "")
            .with_holder_ratio(d(2024, 8, 6), 42.0)
            .with_holder_ratio(d(2024, 8, 1), 10.0);
        let screener = screener_for(stock, settings());
        let found = screener.resolve_holder_ratio(&"600001".parse().unwrap(), date).await;
        assert_eq!(found, Some((d(2024, 8, 6), 42.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_holder_ratio_lookback_is_bounded() {
        let date = d(2024, 8, 9);
        let stock = StockSnapshot::new("600001".parse().unwrap(), "").with_holder_ratio(d(2024, 3, 31), 55.0);
        let screener = screener_for(stock, settings());
        let code: StockCode = "600001".parse().unwrap();
        assert_eq!(screener.resolve_holder_ratio(&code, date).await, None);

        let mut wide = ScreenerSettings::default();
        wide.holder_lookback_days = 200;
        let stock = StockSnapshot::new("600001".parse().unwrap(), "").with_holder_ratio(d(2024, 3, 31), 55.0);
        let screener = screener_for(stock, Arc::new(wide));
        assert_eq!(screener.resolve_holder_ratio(&code, date).await, Some((d(2024, 3, 31), 55.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_holder_data_counts_as_zero() {
        let date = d(2024, 8, 9);
        let mut stock = passing_stock(date);
        stock.holder_ratios.clear();
        let screener = screener_for(stock, settings());
        let verdict = screener.evaluate(&"002693".parse().unwrap(), date).await;
        assert_eq!(verdict.rejection, Some(Rejection::OwnershipTooLow { ratio: 0.0 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fundamentals_rule_either_vs_both() {
        let date = d(2024, 8, 9);
        let revenue_only = |stock: StockSnapshot| {
            stock.with_financials(FinancialSummary {
                report_date: d(2024, 7, 31),
                revenue: "3亿".into(),
                net_profit: "50万".into(),
            })
        };

        let screener = screener_for(revenue_only(passing_stock(date)), settings());
        let verdict = screener.evaluate(&"002693".parse().unwrap(), date).await;
        assert_eq!(
            verdict.rejection,
            Some(Rejection::FundamentalsTooLarge { revenue: 300_000_000.0, net_profit: 500_000.0 })
        );

        let mut lenient = ScreenerSettings::default();
        lenient.fundamentals_rule = FundamentalsRule::Both;
        let screener = screener_for(revenue_only(passing_stock(date)), Arc::new(lenient));
        assert!(screener.evaluate(&"002693".parse().unwrap(), date).await.passed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_amount_rejected() {
        let date = d(2024, 8, 9);
        let stock = passing_stock(date).with_financials(FinancialSummary {
            report_date: d(2024, 7, 31),
            revenue: "--".into(),
            net_profit: 0.0_f64.into(),
        });
        let screener = screener_for(stock, settings());
        let verdict = screener.evaluate(&"002693".parse().unwrap(), date).await;
        assert!(matches!(verdict.rejection, Some(Rejection::MalformedData { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_history_rejected() {
        let date = d(2024, 8, 9);
        let mut stock = passing_stock(date);
        stock.bars.drain(..2);
        let screener = screener_for(stock, settings());
        let verdict = screener.evaluate(&"002693".parse().unwrap(), date).await;
        assert_eq!(verdict.rejection, Some(Rejection::InsufficientHistory { bars: 4 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_market_cap_rejected() {
        let date = d(2024, 8, 9);
        let mut stock = passing_stock(date);
        stock.market_caps.clear();
        let screener = screener_for(stock, settings());
        let verdict = screener.evaluate(&"002693".parse().unwrap(), date).await;
        assert_eq!(verdict.rejection, Some(Rejection::CapUnavailable));
    }
}
