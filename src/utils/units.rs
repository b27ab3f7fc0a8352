use anyhow::{anyhow, Result};

const YI: f64 = 100_000_000.0;
const WAN: f64 = 10_000.0;

/// 把带 "亿"/"万" 单位的金额文本换算成元
///
/// "1.23亿" -> 123000000, "-45万" -> -450000, "3200" -> 3200。
/// 财报里的 "--"、"" 等占位符视为无效数据。
pub fn parse_scaled_amount(value: &str) -> Result<f64> {
    let s = value.trim().replace(',', "");
    let (number, scale) = if let Some(n) = s.strip_suffix('亿') {
        (n, YI)
    } else if let Some(n) = s.strip_suffix('万') {
        (n, WAN)
    } else {
        (s.as_str(), 1.0)
    };

    let parsed: f64 = number
        .trim()
        .parse()
        .map_err(|_| anyhow!("无法解析金额: {:?}", value))?;
    if !parsed.is_finite() {
        return Err(anyhow!("无法解析金额: {:?}", value));
    }
    Ok(parsed * scale)
}

/// 解析持股比例，兼容 "35.2%" 和 "35.2"
pub fn parse_percent(value: &str) -> Option<f64> {
    let s = value.trim().trim_end_matches('%').trim();
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}
