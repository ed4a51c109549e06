//! 文档存储协作方接口
//! Document store collaborator interface
//!
//! 存储被视为外部协作方：接受有序聚合阶段并返回结果集，支持按调用
//! 传递的不透明会话句柄。内置内存实现用于开发与测试。
//! The store is an external collaborator: it accepts ordered aggregation
//! stages and returns result sets, with an opaque per-call session handle
//! passed through untouched. A built-in memory implementation serves
//! development and tests.

pub mod memory;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::query::Stage;

pub use memory::MemoryStore;

/// 外部事务/会话句柄，门面原样透传，不做任何解释
/// External transaction/session handle; the facade passes it through
/// without interpretation
#[derive(Debug, Clone)]
pub struct StoreSession {
    pub id: String,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{0}")]
    Backend(String),
}

/// 实体校验钩子（模式校验在存储侧执行）
/// Entity validation hook (schema validation runs store-side)
pub type Validator = std::sync::Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert(
        &self,
        collection: &str,
        doc: Value,
        session: Option<&StoreSession>,
    ) -> Result<Value, StoreError>;

    async fn find_by_id(
        &self,
        collection: &str,
        id: &str,
        session: Option<&StoreSession>,
    ) -> Result<Option<Value>, StoreError>;

    /// 浅合并补丁并返回更新后的文档；`run_validators` 控制是否执行
    /// 模式校验
    /// Shallow-merges the patch and returns the updated document;
    /// `run_validators` gates schema validation
    async fn update_by_id(
        &self,
        collection: &str,
        id: &str,
        patch: Value,
        run_validators: bool,
        session: Option<&StoreSession>,
    ) -> Result<Option<Value>, StoreError>;

    async fn delete_by_id(
        &self,
        collection: &str,
        id: &str,
        session: Option<&StoreSession>,
    ) -> Result<Option<Value>, StoreError>;

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: &[Stage],
        session: Option<&StoreSession>,
    ) -> Result<Vec<Value>, StoreError>;
}
