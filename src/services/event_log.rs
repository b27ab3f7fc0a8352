//! 筛选过程的日志事件。
//!
//! 工作任务只往通道里发事件，由单独的消费任务统一写日志，
//! 多个并发任务的输出不会交错。

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::models::screening::ScreenVerdict;
use crate::models::stock::StockCode;

#[derive(Debug, Clone)]
pub enum ScreenEvent {
    DateStarted { date: NaiveDate, universe: usize },
    Progress { date: NaiveDate, index: usize, total: usize, code: StockCode },
    Verdict(ScreenVerdict),
    TaskTimedOut { date: NaiveDate, code: StockCode },
    TaskFailed { date: NaiveDate, code: StockCode, message: String },
    BatchTimedOut { date: NaiveDate, pending: usize },
}

/// 事件发送端，可随意克隆；接收端关闭后发送静默失败
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<ScreenEvent>,
}

impl EventSink {
    pub fn emit(&self, event: ScreenEvent) {
        let _ = self.tx.send(event);
    }

    /// 没有消费者的发送端，事件直接丢弃
    pub fn detached() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self { tx }
    }
}

/// 整个运行期间的事件统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventTally {
    pub screened: usize,
    pub passed: usize,
    pub timed_out: usize,
    pub failed: usize,
    pub batch_timeouts: usize,
    pub rejections: BTreeMap<&'static str, usize>,
}

impl EventTally {
    fn record(&mut self, event: &ScreenEvent) {
        match event {
            ScreenEvent::Verdict(v) => {
                self.screened += 1;
                match &v.rejection {
                    None => self.passed += 1,
                    Some(r) => *self.rejections.entry(r.kind()).or_insert(0) += 1,
                }
            }
            ScreenEvent::TaskTimedOut { .. } => self.timed_out += 1,
            ScreenEvent::TaskFailed { .. } => self.failed += 1,
            ScreenEvent::BatchTimedOut { .. } => self.batch_timeouts += 1,
            ScreenEvent::DateStarted { .. } | ScreenEvent::Progress { .. } => {}
        }
    }
}

pub struct EventLog;

impl EventLog {
    /// 启动消费任务。所有 `EventSink` 释放后任务结束并返回统计。
    pub fn spawn() -> (EventSink, JoinHandle<EventTally>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<ScreenEvent>();
        let handle = tokio::spawn(async move {
            let mut tally = EventTally::default();
            while let Some(event) = rx.recv().await {
                write_event(&event);
                tally.record(&event);
            }
            tally
        });
        (EventSink { tx }, handle)
    }
}

fn write_event(event: &ScreenEvent) {
    match event {
        ScreenEvent::DateStarted { date, universe } => {
            log::info!("开始处理日期: {}，股票池 {} 只", date, universe);
        }
        ScreenEvent::Progress { date, index, total, code } => {
            log::info!("{}  -   正在处理: {}，{}/{}", date, code, index, total);
        }
        ScreenEvent::Verdict(v) => match &v.rejection {
            None => log::info!("股票{}满足所有条件", v.code),
            Some(r) => log::debug!("股票{}{}", v.code, r),
        },
        ScreenEvent::TaskTimedOut { date, code } => {
            log::warn!("{} 处理股票 {} 超时", date, code);
        }
        ScreenEvent::TaskFailed { date, code, message } => {
            log::error!("{} 处理股票 {} 时发生错误: {}", date, code, message);
        }
        ScreenEvent::BatchTimedOut { date, pending } => {
            log::warn!("{} 批量处理超时，{} 只股票未完成", date, pending);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::screening::Rejection;

    #[tokio::test]
    async fn test_tally_counts_events_from_all_sinks() {
        let (sink, handle) = EventLog::spawn();
        let date = NaiveDate::from_ymd_opt(2024, 8, 5).unwrap();
        let a: StockCode = "600001".parse().unwrap();
        let b: StockCode = "002693".parse().unwrap();

        let worker = sink.clone();
        tokio::spawn(async move {
            worker.emit(ScreenEvent::Verdict(ScreenVerdict::pass(a.clone(), date)));
            worker.emit(ScreenEvent::TaskTimedOut { date, code: a });
        })
        .await
        .unwrap();

        sink.emit(ScreenEvent::Verdict(ScreenVerdict::reject(b.clone(), date, Rejection::RecentLimitUp)));
        sink.emit(ScreenEvent::Verdict(ScreenVerdict::reject(b, date, Rejection::RecentLimitUp)));
        sink.emit(ScreenEvent::BatchTimedOut { date, pending: 3 });
        drop(sink);

        let tally = handle.await.unwrap();
        assert_eq!(tally.screened, 3);
        assert_eq!(tally.passed, 1);
        assert_eq!(tally.timed_out, 1);
        assert_eq!(tally.batch_timeouts, 1);
        assert_eq!(tally.rejections.get("recent_limit_up"), Some(&2));
    }

    #[test]
    fn test_detached_sink_does_not_panic() {
        let sink = EventSink::detached();
        sink.emit(ScreenEvent::BatchTimedOut {
            date: NaiveDate::from_ymd_opt(2024, 8, 5).unwrap(),
            pending: 1,
        });
    }
}
