//! 动态查询管道
//! Dynamic query pipeline
//!
//! 所有资源控制器共用的查询/聚合层：把未类型化的HTTP查询参数变成
//! 安全的、可分页/过滤/排序/搜索的数据检索计划。
//! The query/aggregation layer shared by every resource controller:
//! turns untyped HTTP query parameters into a safe, paginated,
//! filterable, sortable, searchable retrieval plan.

pub mod grammar;
pub mod paginate;
pub mod pipeline;
pub mod value;

pub use grammar::{parse, FilterOp, FilterPredicate, ParsedQuery, QueryDirectives};
pub use paginate::{format, PaginatedResult, Pagination, QueryOutput};
pub use pipeline::{apply_transforms, assemble, Stage, StageTransform};
pub use value::FilterValue;
