//! Deterministic extraction used by the rule-based fallback states.

use chrono::{Duration, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;

pub use crate::query_plan::Metric;

pub const DEFAULT_DAYS: u32 = 7;
pub const MAX_DAYS: u32 = 90;

pub const DATE_COLUMNS: &[&str] = &["SalesDate", "sale_date", "tr_date", "stock_date", "CRT_YMD"];
pub const STORE_COLUMNS: &[&str] = &["StoreID", "Store", "BIZLOC_CD", "STORE_ID"];
/// Tried after the requested metric's own column.
pub const METRIC_FALLBACK_COLUMNS: &[&str] =
    &["NetSale", "NetSales", "GrossSale", "GrossSales", "Qty", "SoldQty"];

/// Prefixes of tokens that look like store codes but name a period.
const PERIOD_PREFIXES: &[&str] = &["FY"];

lazy_static! {
    static ref ALNUM_RUN_RE: Regex = Regex::new(r"[A-Z0-9]+").unwrap();
    static ref STORE_RE: Regex = Regex::new(r"^[A-Z]{2}[0-9]{3,4}$").unwrap();
    static ref DAYS_RE: Regex = Regex::new(r"(\d+)\s*(?:хоног|өдөр|days?\b)").unwrap();
}

/// Store code such as `CU520`: two letters then 3 or 4 digits, standing
/// alone. `FY2025` and the like are not stores.
pub fn extract_store(question: &str) -> Option<String> {
    ALNUM_RUN_RE
        .find_iter(&question.to_uppercase())
        .map(|m| m.as_str())
        .find(|run| STORE_RE.is_match(run) && !PERIOD_PREFIXES.iter().any(|p| run.starts_with(p)))
        .map(str::to_string)
}

/// Length of the trailing date window the question asks about.
pub fn extract_days(question: &str) -> u32 {
    let q = question.to_lowercase();
    if q.contains("өнөөдөр") || q.contains("today") {
        return 1;
    }
    if q.contains("өчигдөр") || q.contains("yesterday") {
        return 2;
    }
    if q.contains("7 хоног") || q.contains("7хоног") {
        return 7;
    }
    if q.contains("30 хоног") || q.contains("30хоног") {
        return 30;
    }
    if let Some(n) = DAYS_RE
        .captures(&q)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
    {
        return n.clamp(1, MAX_DAYS);
    }
    if q.contains("week") {
        return 7;
    }
    if q.contains("month") {
        return 30;
    }
    DEFAULT_DAYS
}

/// Inclusive `[today - (days - 1), today]`.
pub fn date_window(days: u32, today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let span = i64::from(days.max(1)) - 1;
    (today - Duration::days(span), today)
}

/// Everything the rule-based states need from one question.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleInputs {
    pub store: Option<String>,
    pub days: u32,
    pub metric: Metric,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl RuleInputs {
    pub fn extract(question: &str, today: NaiveDate) -> Self {
        let days = extract_days(question);
        let (start, end) = date_window(days, today);
        Self {
            store: extract_store(question),
            days,
            metric: Metric::from_question(question),
            start,
            end,
        }
    }

    /// Metric column candidates, the requested one first.
    pub fn metric_columns(&self) -> Vec<&'static str> {
        let mut cols = vec![self.metric.column()];
        cols.extend(
            METRIC_FALLBACK_COLUMNS
                .iter()
                .filter(|c| **c != self.metric.column()),
        );
        cols
    }
}
