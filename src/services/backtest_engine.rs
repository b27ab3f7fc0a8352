use std::sync::Arc;

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};

use crate::models::screening::SelectionResult;
use crate::models::settings::ScreenerSettings;
use crate::services::daily_selection::DailySelector;
use crate::services::gateway::{GatewayError, MarketDataGateway};
use crate::utils::retry::fetch_with_retry;

/// 回溯选股：按交易日逐日调用 `DailySelector`，日期之间严格串行
pub struct BacktestDriver {
    gateway: Arc<dyn MarketDataGateway>,
    selector: DailySelector,
    settings: Arc<ScreenerSettings>,
}

impl BacktestDriver {
    pub fn new(gateway: Arc<dyn MarketDataGateway>, selector: DailySelector, settings: Arc<ScreenerSettings>) -> Self {
        Self { gateway, selector, settings }
    }

    /// [start, end] 闭区间内的交易日，拿不到时返回空列表
    pub async fn trading_dates(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        if start > end {
            log::warn!("起始日期 {} 晚于结束日期 {}", start, end);
            return vec![];
        }

        let gateway = self.gateway.as_ref();
        let fetched = fetch_with_retry(&self.settings.retry_policy(), "获取交易日历", || async move {
            let dates = gateway.trading_calendar(start, end).await?;
            Ok::<_, GatewayError>((!dates.is_empty()).then_some(dates))
        })
        .await;

        let mut dates = match fetched {
            Ok(Some(dates)) => dates,
            Ok(None) => vec![],
            Err(e) => {
                log::error!("获取交易日历失败: {}", e);
                vec![]
            }
        };
        dates.retain(|d| *d >= start && *d <= end);
        dates.sort();
        dates.dedup();
        dates
    }

    /// 执行回溯，返回 日期 -> 入选股票。
    /// 单日出错只记录日志并跳过，不影响后续日期。
    pub async fn run(&self, start: NaiveDate, end: NaiveDate) -> SelectionResult {
        let dates = self.trading_dates(start, end).await;
        if dates.is_empty() {
            log::warn!("未获取到交易日期");
            return SelectionResult::new();
        }
        log::info!("开始回溯选股 - 从 {} 到 {}，共 {} 个交易日", start, end, dates.len());

        let selector = &self.selector;
        let result = stream::iter(dates)
            .fold(SelectionResult::new(), |mut acc, date| async move {
                match selector.run(date).await {
                    Ok(selection) => {
                        if selection.stocks.is_empty() {
                            log::info!("{} 没有满足条件的股票", date);
                        } else {
                            let codes: Vec<&str> = selection.stocks.iter().map(|c| c.as_str()).collect();
                            log::info!("{} 满足条件的股票：{:?}", date, codes);
                        }
                        if !selection.unfinished.is_empty() {
                            log::warn!("{} 有 {} 只股票未完成筛选", date, selection.unfinished.len());
                        }
                        acc.insert(date, selection.stocks);
                    }
                    Err(e) => log::error!("处理日期 {} 时发生错误: {:#}", date, e),
                }
                acc
            })
            .await;

        log::info!(
            "回溯完成：{} 个交易日，共入选 {} 只次",
            result.len(),
            result.total_picks()
        );
        result
    }
}
