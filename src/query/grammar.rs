//! 查询文法解析器
//! Query grammar parser
//!
//! 将扁平的字符串查询参数解析为类型化的过滤谓词与分页/搜索/排序/投影
//! 指令。保留键先被提取，剩余键一律视为过滤字段。
//! Parses flat string query parameters into typed filter predicates plus
//! pagination/search/sort/projection directives. Reserved keys are
//! extracted first; every remaining key is a filter field.

use std::collections::HashMap;

use serde_json::{Map, Value};

use super::value::FilterValue;

/// 保留参数名 / Reserved parameter names
const RESERVED_KEYS: &[&str] = &[
    "page",
    "limit",
    "pagination",
    "search",
    "searchkey",
    "searchOperator",
    "multiSort",
    "sortDir",
    "sortKey",
    "fields",
    "exclude",
    "exists",
    "notExists",
];

/// 过滤操作符（封闭集合）
/// Filter operators (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    In,
    Nin,
    Gte,
    Gt,
    Lte,
    Lt,
    Ne,
    Exists,
    Regex,
}

impl FilterOp {
    /// `key__op` 后缀到操作符的映射；未知后缀退化为 eq
    /// Map a `key__op` suffix to an operator; unknown suffixes degrade to eq
    fn from_suffix(suffix: &str) -> FilterOp {
        match suffix {
            "in" => FilterOp::In,
            "nin" => FilterOp::Nin,
            "gte" => FilterOp::Gte,
            "gt" => FilterOp::Gt,
            "lte" => FilterOp::Lte,
            "lt" => FilterOp::Lt,
            "ne" => FilterOp::Ne,
            "exists" => FilterOp::Exists,
            "regex" => FilterOp::Regex,
            _ => FilterOp::Eq,
        }
    }

    fn store_key(self) -> &'static str {
        match self {
            FilterOp::Eq => "$eq",
            FilterOp::In => "$in",
            FilterOp::Nin => "$nin",
            FilterOp::Gte => "$gte",
            FilterOp::Gt => "$gt",
            FilterOp::Lte => "$lte",
            FilterOp::Lt => "$lt",
            FilterOp::Ne => "$ne",
            FilterOp::Exists => "$exists",
            FilterOp::Regex => "$regex",
        }
    }
}

/// 单个字段级过滤条件
/// A single field-level filter condition
#[derive(Debug, Clone, PartialEq)]
pub struct FilterPredicate {
    /// 点分路径字段名 / Dotted-path field name
    pub field: String,
    pub op: FilterOp,
    pub value: FilterValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOperator {
    Or,
    And,
}

/// 排序方向：1 升序，-1 降序 / Sort direction: 1 asc, -1 desc
pub type SortSpec = Vec<(String, i32)>;

/// 解析后的分页/搜索/排序/投影指令
/// Parsed pagination/search/sort/projection directives
#[derive(Debug, Clone)]
pub struct QueryDirectives {
    pub page: u64,
    pub limit: u64,
    pub pagination: bool,
    pub search: String,
    pub search_keys: Vec<String>,
    pub search_operator: SearchOperator,
    /// 已归一的排序：multiSort 优先于 sortKey/sortDir，缺省 createdAt 降序
    /// Resolved sort: multiSort wins over sortKey/sortDir, default createdAt desc
    pub sort: SortSpec,
    pub fields: Vec<String>,
    pub exclude: Vec<String>,
    pub exists: Vec<String>,
    pub not_exists: Vec<String>,
}

impl Default for QueryDirectives {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 10,
            pagination: true,
            search: String::new(),
            search_keys: Vec::new(),
            search_operator: SearchOperator::Or,
            sort: vec![("createdAt".to_string(), -1)],
            fields: Vec::new(),
            exclude: Vec::new(),
            exists: Vec::new(),
            not_exists: Vec::new(),
        }
    }
}

/// 解析结果：谓词列表 + 指令
/// Parse output: predicate list + directives
#[derive(Debug, Clone)]
pub struct ParsedQuery {
    pub predicates: Vec<FilterPredicate>,
    pub directives: QueryDirectives,
}

impl ParsedQuery {
    /// 生成嵌套的匹配谓词树（含 exists/notExists 列表）
    /// Build the nested match predicate tree (incl. exists/notExists lists)
    pub fn match_document(&self) -> Map<String, Value> {
        let mut doc = Map::new();
        for predicate in &self.predicates {
            set_nested(&mut doc, &predicate.field, predicate_condition(predicate));
        }
        for field in &self.directives.exists {
            set_nested(&mut doc, field, serde_json::json!({ "$exists": true }));
        }
        for field in &self.directives.not_exists {
            set_nested(&mut doc, field, serde_json::json!({ "$exists": false }));
        }
        doc
    }
}

/// 解析扁平查询参数。解析器永不失败：不可解析的过滤值退化为字符串比较
/// Parse flat query parameters. The parser never fails: unparseable filter
/// values degrade to string comparison.
pub fn parse(params: &HashMap<String, String>) -> ParsedQuery {
    let mut directives = QueryDirectives::default();

    if let Some(page) = params.get("page") {
        directives.page = page.parse::<u64>().unwrap_or(1).max(1);
    }
    if let Some(limit) = params.get("limit") {
        directives.limit = limit.parse::<u64>().unwrap_or(10).max(1);
    }
    if let Some(flag) = params.get("pagination") {
        directives.pagination = to_boolean(flag);
    }
    if let Some(search) = params.get("search") {
        directives.search = search.clone();
    }
    if let Some(keys) = params.get("searchkey") {
        directives.search_keys = split_list(keys);
    }
    if params.get("searchOperator").map(String::as_str) == Some("and") {
        directives.search_operator = SearchOperator::And;
    }
    directives.sort = resolve_sort(
        params.get("multiSort").map(String::as_str).unwrap_or(""),
        params.get("sortKey").map(String::as_str).unwrap_or("createdAt"),
        params.get("sortDir").map(String::as_str).unwrap_or("desc"),
    );
    if let Some(fields) = params.get("fields") {
        directives.fields = split_list(fields);
    }
    if let Some(exclude) = params.get("exclude") {
        directives.exclude = split_list(exclude);
    }
    if let Some(exists) = params.get("exists") {
        directives.exists = split_list(exists);
    }
    if let Some(not_exists) = params.get("notExists") {
        directives.not_exists = split_list(not_exists);
    }

    let mut predicates = Vec::new();
    for (key, raw) in params {
        if RESERVED_KEYS.contains(&key.as_str()) {
            continue;
        }
        if let Some(predicate) = parse_field(key, raw) {
            predicates.push(predicate);
        }
    }
    // HashMap迭代顺序不稳定，按字段名排序保证确定性
    // HashMap iteration order is unstable; sort by field for determinism
    predicates.sort_by(|a, b| a.field.cmp(&b.field));

    ParsedQuery { predicates, directives }
}

/// `key` 或 `key__operator` 形式的单个过滤字段
/// A single filter field of form `key` or `key__operator`
fn parse_field(key: &str, raw: &str) -> Option<FilterPredicate> {
    let (field, op) = match key.split_once("__") {
        Some((field, suffix)) => (field, FilterOp::from_suffix(suffix)),
        None => (key, FilterOp::Eq),
    };
    if field.is_empty() {
        return None;
    }

    let value = match op {
        // 正则操作符保留原始模式串 / Regex keeps the raw pattern
        FilterOp::Regex => {
            if raw.is_empty() {
                return None;
            }
            FilterValue::Text(raw.to_string())
        }
        FilterOp::Exists => FilterValue::Bool(FilterValue::coerce(raw) == Some(FilterValue::Bool(true))),
        FilterOp::In | FilterOp::Nin => match FilterValue::coerce(raw)? {
            FilterValue::List(items) => FilterValue::List(items),
            single => FilterValue::List(vec![single]),
        },
        _ => FilterValue::coerce(raw)?,
    };

    Some(FilterPredicate {
        field: field.to_string(),
        op,
        value,
    })
}

/// 谓词到存储端条件文档的转换
/// Predicate to store-side condition document
fn predicate_condition(predicate: &FilterPredicate) -> Value {
    match (&predicate.op, &predicate.value) {
        // 字符串等值按锚定的不区分大小写正则匹配（保留的历史行为：
        // 含正则元字符的值会失去精确性）
        // String equality is an anchored case-insensitive regex match
        // (preserved behavior: regex metacharacters lose exactness)
        (FilterOp::Eq, FilterValue::Text(s)) => {
            serde_json::json!({ "$regex": format!("^{}$", s), "$options": "i" })
        }
        (FilterOp::Eq, value) => value.to_json(),
        (FilterOp::Regex, FilterValue::Text(pattern)) => {
            serde_json::json!({ "$regex": pattern, "$options": "i" })
        }
        (op, value) => {
            let mut cond = Map::new();
            cond.insert(op.store_key().to_string(), value.to_json());
            Value::Object(cond)
        }
    }
}

/// 沿点分路径创建中间对象并写入条件；同一字段上的操作符条件合并
/// Walk/create intermediate objects along the dotted path and insert the
/// condition; operator conditions on the same field are merged
fn set_nested(doc: &mut Map<String, Value>, path: &str, condition: Value) {
    let mut segments = path.split('.').peekable();
    let mut current = doc;

    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            match (current.get_mut(segment), &condition) {
                (Some(Value::Object(existing)), Value::Object(incoming))
                    if is_operator_doc(existing) && incoming.keys().all(|k| k.starts_with('$')) =>
                {
                    for (k, v) in incoming {
                        existing.insert(k.clone(), v.clone());
                    }
                }
                _ => {
                    current.insert(segment.to_string(), condition);
                }
            }
            return;
        }
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Some(next) = entry.as_object_mut() else {
            return;
        };
        current = next;
    }
}

fn is_operator_doc(doc: &Map<String, Value>) -> bool {
    !doc.is_empty() && doc.keys().all(|k| k.starts_with('$'))
}

fn resolve_sort(multi_sort: &str, sort_key: &str, sort_dir: &str) -> SortSpec {
    if !multi_sort.is_empty() {
        let spec: SortSpec = multi_sort
            .split(',')
            .filter_map(|pair| {
                let mut parts = pair.trim().splitn(2, ':');
                let field = parts.next().unwrap_or("").trim();
                if field.is_empty() {
                    return None;
                }
                // 未指定方向默认降序 / Unspecified direction defaults to desc
                let dir = if parts.next().map(str::trim) == Some("asc") { 1 } else { -1 };
                Some((field.to_string(), dir))
            })
            .collect();
        if !spec.is_empty() {
            return spec;
        }
    }
    let key = if sort_key.is_empty() { "createdAt" } else { sort_key };
    let dir = if sort_dir == "asc" { 1 } else { -1 };
    vec![(key.to_string(), dir)]
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// 宽松的布尔解析："false"/"0"/空为假，其余为真
/// Lenient boolean parsing: "false"/"0"/empty are false, anything else true
fn to_boolean(raw: &str) -> bool {
    !matches!(raw, "" | "0" | "false")
}
