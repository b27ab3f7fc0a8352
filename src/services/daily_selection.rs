use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use futures::stream::{FuturesUnordered, StreamExt};
use regex::Regex;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tokio::time::{sleep, timeout, timeout_at, Instant};

use crate::models::screening::{DailySelection, ScreenVerdict};
use crate::models::settings::{ExecutionMode, ScreenerSettings};
use crate::models::stock::{StockCode, UniverseEntry};
use crate::services::event_log::{EventSink, ScreenEvent};
use crate::services::gateway::{GatewayError, MarketDataGateway};
use crate::services::screener::StockScreener;
use crate::utils::retry::fetch_with_retry;

/// 单个交易日的选股调度
///
/// 顺序模式：逐只处理，每只之间按 `pacing_ms` 间隔，结果顺序与股票池一致。
/// 并发模式：固定数量的工作任务，结果按完成先后收集，顺序不固定。
pub struct DailySelector {
    gateway: Arc<dyn MarketDataGateway>,
    screener: Arc<StockScreener>,
    settings: Arc<ScreenerSettings>,
    board_filter: Regex,
    events: EventSink,
}

enum TaskOutcome {
    Finished(ScreenVerdict),
    TimedOut,
    /// 没等到工作名额就被取消
    Skipped,
}

/// 约三十年，当作"不限时"
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 86_400);

impl DailySelector {
    pub fn new(
        gateway: Arc<dyn MarketDataGateway>,
        settings: Arc<ScreenerSettings>,
        events: EventSink,
    ) -> Result<Self> {
        let board_filter = board_regex(&settings.board_prefixes)?;
        let screener = Arc::new(StockScreener::new(gateway.clone(), settings.clone()));
        Ok(Self { gateway, screener, settings, board_filter, events })
    }

    /// 处理一个交易日。股票池拿不到时返回错误，由上层跳过该日。
    pub async fn run(&self, date: NaiveDate) -> Result<DailySelection> {
        let universe = self.resolve_universe().await?;
        self.events.emit(ScreenEvent::DateStarted { date, universe: universe.len() });

        let selection = match self.settings.execution.mode {
            ExecutionMode::Sequential => self.run_sequential(date, universe).await,
            ExecutionMode::Concurrent => self.run_concurrent(date, universe).await,
        };
        Ok(selection)
    }

    /// 主板股票池：按前缀过滤、剔除创业板/科创板/北交所、剔除ST，去重
    pub async fn resolve_universe(&self) -> Result<Vec<StockCode>> {
        let gateway = self.gateway.as_ref();
        let entries = fetch_with_retry(&self.settings.retry_policy(), "获取股票列表", || async move {
            let list = gateway.list_universe().await?;
            Ok::<_, GatewayError>((!list.is_empty()).then_some(list))
        })
        .await
        .context("获取股票列表失败")?
        .ok_or_else(|| anyhow!("获取股票列表失败: 无数据"))?;

        Ok(filter_universe(entries, &self.board_filter, self.settings.exclude_st))
    }

    async fn run_sequential(&self, date: NaiveDate, universe: Vec<StockCode>) -> DailySelection {
        let total = universe.len();
        let pacing = Duration::from_millis(self.settings.execution.pacing_ms);
        let mut selection = DailySelection { date: Some(date), ..Default::default() };

        for (i, code) in universe.into_iter().enumerate() {
            self.events.emit(ScreenEvent::Progress { date, index: i + 1, total, code: code.clone() });
            if !pacing.is_zero() {
                sleep(pacing).await;
            }

            selection.attempted += 1;
            let verdict = self.screener.evaluate(&code, date).await;
            if verdict.passed() {
                selection.stocks.push(code);
            }
            self.events.emit(ScreenEvent::Verdict(verdict));
        }

        selection
    }

    async fn run_concurrent(&self, date: NaiveDate, universe: Vec<StockCode>) -> DailySelection {
        let exec = &self.settings.execution;
        let semaphore = Arc::new(Semaphore::new(exec.workers.max(1)));
        let task_timeout = Duration::from_secs(exec.task_timeout_secs);
        let deadline = deadline_after(Duration::from_secs(exec.batch_timeout_secs));

        let mut selection = DailySelection { date: Some(date), ..Default::default() };
        let mut tasks = FuturesUnordered::new();
        let mut abort_handles = Vec::with_capacity(universe.len());

        for code in universe {
            let screener = self.screener.clone();
            let semaphore = semaphore.clone();
            let task_code = code.clone();
            let handle = tokio::spawn(async move {
                // 批量超时后信号量被关闭，排队中的任务直接退出
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return TaskOutcome::Skipped;
                };
                // 排队等待不计入单任务超时
                match timeout(task_timeout, screener.evaluate(&task_code, date)).await {
                    Ok(verdict) => TaskOutcome::Finished(verdict),
                    Err(_) => TaskOutcome::TimedOut,
                }
            });
            abort_handles.push(handle.abort_handle());
            selection.attempted += 1;
            tasks.push(async move { (code, handle.await) });
        }

        loop {
            match timeout_at(deadline, tasks.next()).await {
                Ok(Some((code, joined))) => absorb(&self.events, date, &mut selection, code, joined),
                Ok(None) => break,
                Err(_) => {
                    self.events.emit(ScreenEvent::BatchTimedOut { date, pending: tasks.len() });
                    semaphore.close();
                    abort_handles.iter().for_each(|h| h.abort());
                    // 中止前刚好完成的任务结论照常保留
                    while let Some((code, joined)) = tasks.next().await {
                        absorb(&self.events, date, &mut selection, code, joined);
                    }
                    break;
                }
            }
        }

        selection
    }
}

/// 批量截止时间；超时配置过大时视为不设上限
fn deadline_after(limit: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(limit)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// 把一个任务的结果记入当日选股
fn absorb(
    events: &EventSink,
    date: NaiveDate,
    selection: &mut DailySelection,
    code: StockCode,
    joined: Result<TaskOutcome, JoinError>,
) {
    match joined {
        Ok(TaskOutcome::Finished(verdict)) => {
            if verdict.passed() {
                selection.stocks.push(code);
            }
            events.emit(ScreenEvent::Verdict(verdict));
        }
        Ok(TaskOutcome::TimedOut) => {
            events.emit(ScreenEvent::TaskTimedOut { date, code: code.clone() });
            selection.unfinished.push(code);
        }
        Ok(TaskOutcome::Skipped) => selection.unfinished.push(code),
        Err(e) if e.is_cancelled() => selection.unfinished.push(code),
        Err(e) => {
            events.emit(ScreenEvent::TaskFailed { date, code: code.clone(), message: e.to_string() });
            selection.unfinished.push(code);
        }
    }
}

/// 把前缀列表编译成 `^(600|601|...)` 形式的正则
fn board_regex(prefixes: &[String]) -> Result<Regex> {
    let alternatives: Vec<String> = prefixes.iter().map(|p| regex::escape(p)).collect();
    Regex::new(&format!("^({})", alternatives.join("|"))).context("股票池前缀配置无效")
}

fn filter_universe(entries: Vec<UniverseEntry>, board_filter: &Regex, exclude_st: bool) -> Vec<StockCode> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|e| board_filter.is_match(e.code.as_str()))
        .filter(|e| !e.code.is_growth_board())
        .filter(|e| !(exclude_st && e.is_special_treatment()))
        .filter_map(|e| seen.insert(e.code.clone()).then_some(e.code))
        .collect()
}
