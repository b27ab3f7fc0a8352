use crate::models::settings::LimitUpRule;
use crate::models::stock::DailyBar;

/// 量能判断至少需要的K线条数
pub const MIN_VOLUME_BARS: usize = 5;
/// 一字板判断看最近几根K线
pub const LIMIT_UP_LOOKBACK: usize = 2;

/// 放量：当日成交量 > 前一日的2倍，且 > 最近5日均量的3倍（5日含当日）
pub fn volume_spike(bars: &[DailyBar]) -> bool {
    let n = bars.len();
    if n < MIN_VOLUME_BARS {
        return false;
    }

    let current = bars[n - 1].volume;
    let last = bars[n - 2].volume;
    let avg = bars[n - MIN_VOLUME_BARS..].iter().map(|b| b.volume).sum::<f64>()
        / MIN_VOLUME_BARS as f64;

    current > 2.0 * last && current > 3.0 * avg
}

/// 最近两根K线里是否有一字涨停（开盘价≈收盘价）。
/// 数据不足两根时按"有"处理。
pub fn has_recent_limit_up(bars: &[DailyBar], epsilon: f64) -> bool {
    has_recent_limit_up_with(bars, epsilon, LimitUpRule::OpenClose)
}

pub fn has_recent_limit_up_with(bars: &[DailyBar], epsilon: f64, rule: LimitUpRule) -> bool {
    let n = bars.len();
    if n < LIMIT_UP_LOOKBACK {
        return true;
    }

    bars[n - LIMIT_UP_LOOKBACK..].iter().any(|bar| {
        let one_word = price_eq(bar.open, bar.close, epsilon);
        match (rule, bar.high_limit) {
            (LimitUpRule::AtHighLimit, Some(limit)) => one_word && price_eq(bar.close, limit, epsilon),
            _ => one_word,
        }
    })
}

fn price_eq(a: f64, b: f64, epsilon: f64) -> bool {
    if epsilon > 0.0 {
        (a - b).abs() < epsilon
    } else {
        a == b
    }
}
