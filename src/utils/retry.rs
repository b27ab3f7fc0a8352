use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use crate::services::gateway::GatewayError;

/// 数据接口的重试策略
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// 总调用次数（含首次）
    pub attempts: u32,
    /// 可重试错误后的等待
    pub backoff: Duration,
    /// 接口返回空数据后的等待
    pub empty_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_secs(1),
            empty_backoff: Duration::from_millis(500),
        }
    }
}

/// 带重试地拉取一份数据。
///
/// 空数据（`Ok(None)`）和网络类错误都会重试，全部失败后返回 `Ok(None)`，
/// 由调用方当作"无数据"处理；格式错误等不可重试的错误直接返回。
///
/// # Arguments
/// * `policy` - 重试次数与等待时间
/// * `what` - 日志里描述这次拉取的内容
/// * `operation` - 异步操作闭包
pub async fn fetch_with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    what: &str,
    mut operation: F,
) -> Result<Option<T>, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, GatewayError>>,
{
    let attempts = policy.attempts.max(1);

    for attempt in 1..=attempts {
        let last = attempt == attempts;
        match operation().await {
            Ok(Some(val)) => return Ok(Some(val)),
            Ok(None) => {
                if !last {
                    sleep(policy.empty_backoff).await;
                }
            }
            Err(e) if e.is_transient() => {
                if last {
                    log::warn!("{}失败（已重试 {} 次）: {}", what, attempts, e);
                } else {
                    log::debug!("{}失败（第 {} 次），稍后重试: {}", what, attempt, e);
                    sleep(policy.backoff).await;
                }
            }
            Err(e) => return Err(e),
        }
    }

    Ok(None)
}
