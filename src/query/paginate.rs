//! 分页结果封装
//! Pagination result envelope

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::grammar::QueryDirectives;

/// 分页元数据 / Pagination metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total_items: u64,
    pub total_pages: u64,
    pub current_page: u64,
    pub items_per_page: u64,
}

/// 统一的分页响应 / Uniform paginated envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResult<T = Value> {
    pub result: Vec<T>,
    pub pagination: Pagination,
}

/// 查询输出：请求分页时为信封，否则为原始行集
/// Query output: the envelope when pagination was requested, raw rows otherwise
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum QueryOutput {
    Paginated(PaginatedResult),
    Raw(Vec<Value>),
}

impl QueryOutput {
    pub fn rows(&self) -> &[Value] {
        match self {
            QueryOutput::Paginated(p) => &p.result,
            QueryOutput::Raw(rows) => rows,
        }
    }
}

/// 将存储端执行结果整形为最终输出
/// Shape the store execution result into the final output
///
/// 分页开启时解开分叉分支结构（空结果集时 data/total 安全缺省为
/// 空数组和0）；关闭时原样透传。
/// With pagination on, unwraps the forked-branch shape (data/total
/// default to empty/0 on an empty result set); off, rows pass through.
pub fn format(rows: Vec<Value>, directives: &QueryDirectives) -> QueryOutput {
    if !directives.pagination {
        return QueryOutput::Raw(rows);
    }

    let first = rows.into_iter().next().unwrap_or(Value::Null);
    let result = match first.get("data") {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    };
    let total_items = first.get("total").and_then(Value::as_u64).unwrap_or(0);
    let limit = directives.limit.max(1);
    let total_pages = total_items.div_ceil(limit);

    QueryOutput::Paginated(PaginatedResult {
        result,
        pagination: Pagination {
            total_items,
            total_pages,
            current_page: directives.page,
            items_per_page: directives.limit,
        },
    })
}
