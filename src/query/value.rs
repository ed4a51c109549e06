use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;

/// 过滤值的封闭类型集合
/// Closed set of coerced filter value types
///
/// 查询参数到达时全部是字符串，按固定顺序推断实际类型：
/// 布尔 -> 数字 -> 日期 -> 标识符 -> 数组 -> 原始字符串。
/// Query parameters arrive as strings; the actual type is inferred in a
/// fixed order: bool -> number -> date -> identifier -> array -> raw string.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Date(DateTime<Utc>),
    /// 文档存储原生标识符（24位十六进制）
    /// Store-native identifier (24 hex chars)
    Id(String),
    Text(String),
    List(Vec<FilterValue>),
}

impl FilterValue {
    /// 按既定顺序强制转换一个原始字符串值
    /// Coerce a raw string value following the fixed order
    ///
    /// 空值返回 None（调用方跳过该过滤条件）。不可解析的值退化为原始
    /// 字符串比较，永不报错。
    /// Empty values return None (the caller skips the predicate).
    /// Unparseable values degrade to raw string comparison; never fails.
    pub fn coerce(raw: &str) -> Option<FilterValue> {
        if raw.is_empty() {
            return None;
        }

        if raw == "true" {
            return Some(FilterValue::Bool(true));
        }
        if raw == "false" {
            return Some(FilterValue::Bool(false));
        }

        if let Ok(n) = raw.parse::<i64>() {
            return Some(FilterValue::Int(n));
        }
        if let Ok(f) = raw.parse::<f64>() {
            if f.is_finite() {
                return Some(FilterValue::Float(f));
            }
        }

        // 形如 YYYY-MM-DD 开头且能解析为有效日期才算日期，否则落回后续规则
        // Only an ISO-looking prefix that parses to a valid date counts
        if looks_like_iso_date(raw) {
            if let Some(date) = parse_date(raw) {
                return Some(FilterValue::Date(date));
            }
        }

        if is_store_id(raw) {
            return Some(FilterValue::Id(raw.to_string()));
        }

        if raw.contains(',') {
            let items = raw
                .split(',')
                .map(|part| FilterValue::coerce(part.trim()).unwrap_or(FilterValue::Null))
                .collect();
            return Some(FilterValue::List(items));
        }

        Some(FilterValue::Text(raw.to_string()))
    }

    /// 转换为存储端JSON表示（日期序列化为RFC3339字符串）
    /// Store-side JSON representation (dates as RFC3339 strings)
    pub fn to_json(&self) -> Value {
        match self {
            FilterValue::Null => Value::Null,
            FilterValue::Bool(b) => Value::Bool(*b),
            FilterValue::Int(n) => Value::from(*n),
            FilterValue::Float(f) => {
                serde_json::Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null)
            }
            FilterValue::Date(d) => Value::String(d.to_rfc3339()),
            FilterValue::Id(s) | FilterValue::Text(s) => Value::String(s.clone()),
            FilterValue::List(items) => Value::Array(items.iter().map(|v| v.to_json()).collect()),
        }
    }
}

fn looks_like_iso_date(raw: &str) -> bool {
    let b = raw.as_bytes();
    b.len() >= 10
        && b[0].is_ascii_digit()
        && b[1].is_ascii_digit()
        && b[2].is_ascii_digit()
        && b[3].is_ascii_digit()
        && b[4] == b'-'
        && b[5].is_ascii_digit()
        && b[6].is_ascii_digit()
        && b[7] == b'-'
        && b[8].is_ascii_digit()
        && b[9].is_ascii_digit()
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d").ok()?;
    Utc.from_local_datetime(&date.and_hms_opt(0, 0, 0)?).single()
}

/// 24位十六进制即视为存储原生标识符
/// 24 hex chars are treated as a store-native identifier
fn is_store_id(raw: &str) -> bool {
    raw.len() == 24 && raw.bytes().all(|b| b.is_ascii_hexdigit())
}
