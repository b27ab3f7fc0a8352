use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use serde_json::Value;

use crate::models::stock::{DailyBar, FinancialSummary, ReportedAmount, StockCode, UniverseEntry};
use crate::services::gateway::{GatewayError, GatewayResult, MarketDataGateway};
use crate::utils::dates::parse_date_prefix;
use crate::utils::http::{build_f10_client, build_stock_client};
use crate::utils::units::parse_percent;

const CLIST_URL: &str = "https://push2.eastmoney.com/api/qt/clist/get";
const STOCK_GET_URL: &str = "https://push2.eastmoney.com/api/qt/stock/get";
const HOLDERS_URL: &str = "https://emweb.securities.eastmoney.com/PC_HSF10/ShareholderResearch/PageSDGD";
const FINANCE_URL: &str = "https://datacenter.eastmoney.com/securities/api/data/get";
const QQ_KLINE_URL: &str = "https://web.ifzq.gtimg.cn/appstock/app/fqkline/get";

/// 用上证指数的日K线推出交易日历
const CALENDAR_INDEX: &str = "sh000001";
/// 腾讯K线单次最多约640条
const KLINE_PAGE: u32 = 640;
const CLIST_PAGE: u32 = 100;
/// 接口忽略页码时防止死循环
const CLIST_MAX_PAGES: u32 = 200;

/// clist 单页
#[derive(Debug, Default)]
struct ClistPage {
    /// 接口给出的总条数，缺失时为 None
    total: Option<u64>,
    /// 本页原始条数（含无法识别的代码）
    rows: usize,
    entries: Vec<UniverseEntry>,
}

/// 一期财报以及它的披露日
#[derive(Debug, Clone)]
struct DisclosedReport {
    notice_date: Option<NaiveDate>,
    summary: FinancialSummary,
}

/// 东方财富 + 腾讯行情的数据源实现
pub struct EastmoneyGateway {
    client: reqwest::Client,
    f10_client: reqwest::Client,
    shares_cache: Mutex<HashMap<StockCode, Option<f64>>>,
    report_cache: Mutex<HashMap<StockCode, Vec<DisclosedReport>>>,
}

impl EastmoneyGateway {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: build_stock_client()?,
            f10_client: build_f10_client()?,
            shares_cache: Mutex::new(HashMap::new()),
            report_cache: Mutex::new(HashMap::new()),
        })
    }

    async fn get_json(&self, client: &reqwest::Client, url: &str) -> GatewayResult<Value> {
        let resp = client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(GatewayError::Status { status: status.as_u16(), url: url.to_string() });
        }
        let text = resp.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn fetch_universe_page(&self, page: u32) -> GatewayResult<ClistPage> {
        let url = format!(
            "{}?pn={}&pz={}&po=1&np=1&ut=bd1d9ddb04089700cf9c27f6f7426281&fltt=2&invt=2&fid=f12&fs={}&fields=f12,f13,f14",
            CLIST_URL,
            page,
            CLIST_PAGE,
            "m:0+t:6,m:0+t:80,m:1+t:2,m:1+t:23"
        );
        let json = self.get_json(&self.client, &url).await?;
        Ok(parse_clist_page(&json))
    }

    /// 总股本（股），同一只股票只查一次
    async fn total_shares(&self, code: &StockCode) -> GatewayResult<Option<f64>> {
        if let Some(cached) = self.lock_shares().get(code) {
            return Ok(*cached);
        }
        let url = format!("{}?secid={}&fields=f57,f84&fltt=2&invt=2", STOCK_GET_URL, code.secid());
        let json = self.get_json(&self.client, &url).await?;
        let shares = parse_total_shares(&json);
        self.lock_shares().insert(code.clone(), shares);
        Ok(shares)
    }

    async fn disclosed_reports(&self, code: &StockCode) -> GatewayResult<Vec<DisclosedReport>> {
        if let Some(cached) = self.lock_reports().get(code) {
            return Ok(cached.clone());
        }
        let filter = format!("(SECUCODE=\"{}\")", code.secucode());
        let url = format!(
            "{}?type=RPT_F10_FINANCE_MAINFINADATA&sty=APP_F10_MAINFINADATA&quoteColumns=&filter={}&p=1&ps=200&sr=-1&st=REPORT_DATE&source=HSF10&client=PC",
            FINANCE_URL,
            urlencoding::encode(&filter)
        );
        let json = self.get_json(&self.f10_client, &url).await?;
        let reports = parse_financial_reports(&json);
        self.lock_reports().insert(code.clone(), reports.clone());
        Ok(reports)
    }

    /// 腾讯不复权日K线，超过单页上限时分段拉取
    async fn fetch_kline_full(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> GatewayResult<Vec<DailyBar>> {
        let mut all: Vec<DailyBar> = Vec::new();
        let mut current_start = start;

        loop {
            let page = self.fetch_kline(symbol, current_start, end, KLINE_PAGE).await?;
            let Some(last) = page.last().map(|b| b.date) else {
                break;
            };
            let is_last_batch = page.len() < KLINE_PAGE as usize;

            let newest = all.last().map(|b| b.date);
            all.extend(page.into_iter().filter(|b| newest.map_or(true, |n| b.date > n)));

            if is_last_batch {
                break;
            }
            match last.checked_add_days(Days::new(1)) {
                Some(next) if next <= end => current_start = next,
                _ => break,
            }
        }

        Ok(all)
    }

    async fn fetch_kline(&self, symbol: &str, start: NaiveDate, end: NaiveDate, count: u32) -> GatewayResult<Vec<DailyBar>> {
        let param = format!("{},day,{},{},{},", symbol, start.format("%Y-%m-%d"), end.format("%Y-%m-%d"), count);
        let url = format!("{}?param={}", QQ_KLINE_URL, param);
        let json = self.get_json(&self.client, &url).await?;
        parse_tencent_kline(&json, symbol)
    }

    fn lock_shares(&self) -> std::sync::MutexGuard<'_, HashMap<StockCode, Option<f64>>> {
        self.shares_cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_reports(&self) -> std::sync::MutexGuard<'_, HashMap<StockCode, Vec<DisclosedReport>>> {
        self.report_cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl MarketDataGateway for EastmoneyGateway {
    async fn list_universe(&self) -> GatewayResult<Vec<UniverseEntry>> {
        let mut all = Vec::new();
        let mut seen_rows = 0;
        for page in 1..=CLIST_MAX_PAGES {
            let ClistPage { total, rows, entries } = self.fetch_universe_page(page).await?;
            seen_rows += rows;
            all.extend(entries);
            if !has_more_pages(total, rows, seen_rows) {
                break;
            }
        }
        Ok(all)
    }

    async fn market_cap(&self, code: &StockCode, date: NaiveDate) -> GatewayResult<Option<f64>> {
        let Some(shares) = self.total_shares(code).await? else {
            return Ok(None);
        };
        let bars = self.fetch_kline(&code.qualified(), date, date, 1).await?;
        let close = bars.iter().find(|b| b.date == date).map(|b| b.close);
        Ok(close.map(|c| shares * c))
    }

    async fn major_holder_ratio(&self, code: &StockCode, date: NaiveDate) -> GatewayResult<Option<f64>> {
        let url = format!(
            "{}?code={}{}&date={}",
            HOLDERS_URL,
            code.exchange().suffix(),
            code.as_str(),
            date.format("%Y-%m-%d")
        );
        let json = self.get_json(&self.f10_client, &url).await?;
        Ok(parse_holder_ratio(&json, date))
    }

    async fn financial_summary(&self, code: &StockCode, date: NaiveDate) -> GatewayResult<Option<FinancialSummary>> {
        let reports = self.disclosed_reports(code).await?;
        Ok(latest_disclosed(&reports, date))
    }

    async fn daily_bars(&self, code: &StockCode, start: NaiveDate, end: NaiveDate) -> GatewayResult<Vec<DailyBar>> {
        self.fetch_kline_full(&code.qualified(), start, end).await
    }

    async fn trading_calendar(&self, start: NaiveDate, end: NaiveDate) -> GatewayResult<Vec<NaiveDate>> {
        let bars = self.fetch_kline_full(CALENDAR_INDEX, start, end).await?;
        Ok(bars.into_iter().map(|b| b.date).collect())
    }
}

fn parse_clist_page(json: &Value) -> ClistPage {
    let Some(data) = json.get("data").filter(|d| !d.is_null()) else {
        return ClistPage::default();
    };
    let total = data.get("total").and_then(|v| v.as_u64());

    // diff 可能是数组，也可能是以序号为 key 的对象
    let items: Vec<&Value> = match data.get("diff") {
        Some(Value::Array(arr)) => arr.iter().collect(),
        Some(Value::Object(map)) => map.values().collect(),
        _ => vec![],
    };

    let entries = items
        .iter()
        .filter_map(|item| {
            let code = item.get("f12")?.as_str()?.parse::<StockCode>().ok()?;
            let name = item.get("f14").and_then(|v| v.as_str()).unwrap_or("").to_string();
            Some(UniverseEntry { code, name })
        })
        .collect();
    ClistPage { total, rows: items.len(), entries }
}

/// 空页一定结束；有总数时取够即止，没有总数就一直翻到空页
fn has_more_pages(total: Option<u64>, page_rows: usize, seen_rows: usize) -> bool {
    if page_rows == 0 {
        return false;
    }
    match total {
        Some(total) => (seen_rows as u64) < total,
        None => true,
    }
}

fn parse_total_shares(json: &Value) -> Option<f64> {
    json.get("data")?
        .get("f84")
        .and_then(value_as_f64)
        .filter(|v| *v > 0.0)
}

/// 十大股东中第一名的持股比例，要求报告期与查询日期一致
fn parse_holder_ratio(json: &Value, date: NaiveDate) -> Option<f64> {
    let first = json.get("sdgd")?.as_array()?.first()?;
    if let Some(end) = first.get("END_DATE").and_then(|v| v.as_str()).and_then(parse_date_prefix) {
        if end != date {
            return None;
        }
    }
    first.get("HOLD_NUM_RATIO").and_then(value_as_f64)
}

fn parse_financial_reports(json: &Value) -> Vec<DisclosedReport> {
    let rows = json
        .get("result")
        .and_then(|r| r.get("data"))
        .and_then(|d| d.as_array());
    let Some(rows) = rows else {
        return vec![];
    };

    rows.iter()
        .filter_map(|row| {
            let report_date = row.get("REPORT_DATE")?.as_str().and_then(parse_date_prefix)?;
            let notice_date = row.get("NOTICE_DATE").and_then(|v| v.as_str()).and_then(parse_date_prefix);
            let revenue = reported_amount(row.get("TOTALOPERATEREVE")?)?;
            // 扣非净利润缺失时退回归母净利润
            let net_profit = row
                .get("KCFJCXSYJLR")
                .and_then(reported_amount)
                .or_else(|| row.get("PARENTNETPROFIT").and_then(reported_amount))?;
            Some(DisclosedReport {
                notice_date,
                summary: FinancialSummary { report_date, revenue, net_profit },
            })
        })
        .collect()
}

fn latest_disclosed(reports: &[DisclosedReport], date: NaiveDate) -> Option<FinancialSummary> {
    reports
        .iter()
        .filter(|r| r.notice_date.unwrap_or(r.summary.report_date) <= date && r.summary.report_date <= date)
        .max_by_key(|r| r.summary.report_date)
        .map(|r| r.summary.clone())
}

fn parse_tencent_kline(json: &Value, symbol: &str) -> GatewayResult<Vec<DailyBar>> {
    let Some(data) = json.get("data").and_then(|d| d.get(symbol.to_lowercase())) else {
        return Ok(vec![]);
    };
    // 复权数据在 qfqday 字段，不复权/指数在 day 字段
    let Some(rows) = data.get("day").or_else(|| data.get("qfqday")).and_then(|v| v.as_array()) else {
        return Ok(vec![]);
    };

    let mut bars = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(arr) = row.as_array().filter(|a| a.len() >= 6) else {
            continue;
        };
        let date = arr[0]
            .as_str()
            .and_then(parse_date_prefix)
            .ok_or_else(|| GatewayError::Malformed(format!("K线日期无效: {}", arr[0])))?;
        bars.push(DailyBar {
            date,
            open: parse_kline_f64(&arr[1]),
            close: parse_kline_f64(&arr[2]),
            high: parse_kline_f64(&arr[3]),
            low: parse_kline_f64(&arr[4]),
            volume: parse_kline_f64(&arr[5]),
            high_limit: None,
            low_limit: None,
        });
    }
    bars.sort_by_key(|b| b.date);
    Ok(bars)
}

fn parse_kline_f64(val: &Value) -> f64 {
    value_as_f64(val).unwrap_or(0.0)
}

fn value_as_f64(val: &Value) -> Option<f64> {
    match val {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_percent(s),
        _ => None,
    }
}

fn reported_amount(val: &Value) -> Option<ReportedAmount> {
    match val {
        Value::Number(n) => n.as_f64().map(ReportedAmount::Value),
        Value::String(s) if !s.trim().is_empty() => Some(ReportedAmount::Text(s.clone())),
        _ => None,
    }
}
