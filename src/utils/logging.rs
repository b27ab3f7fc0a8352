use chrono::Local;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 本地时间，精确到毫秒
struct LocalTime;

impl FormatTime for LocalTime {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

/// 初始化日志。级别取 RUST_LOG，默认 info。
/// `log` 宏的输出经 tracing-log 桥接到同一个 subscriber。
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,reqwest=warn,hyper=warn"));

    let console_layer = fmt::layer()
        .with_timer(LocalTime)
        .with_target(false)
        .with_thread_ids(false);

    if let Err(e) = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .try_init()
    {
        eprintln!("日志初始化失败: {}", e);
    }
}
