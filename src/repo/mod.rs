//! 实体仓库门面
//! Entity repository facade
//!
//! 资源控制器唯一的数据入口：创建/按键读取/列表查询/更新/删除五个
//! 操作，统一套用查询管道、关联填充与校验语义。控制器通过阶段钩子
//! 定制管道，而不是绕过门面直接操作存储。
//! The sole data entry point for resource controllers: create, get by
//! key, list query, update and delete with uniform pipeline, population
//! and validation semantics. Controllers customize the pipeline through
//! stage hooks instead of bypassing the facade.

pub mod populate;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::query::{self, QueryOutput, Stage, StageTransform};
use crate::store::{DocumentStore, StoreError, StoreSession};

pub use populate::{
    populate_document, EntityMeta, PopulateDirective, PopulateSpec, RelationField, RelationMap,
};

/// 查询执行后的行级钩子
/// Row-level hook run after query execution
pub type AfterHook = Box<dyn Fn(Vec<Value>) -> Vec<Value> + Send + Sync>;

/// 列表查询的管道定制点
/// Pipeline customization points for list queries
#[derive(Default)]
pub struct GetAllOptions {
    /// 置于装配管道之前 / Placed before the assembled pipeline
    pub prepend_stages: Vec<Stage>,
    /// 注入匹配阶段之后 / Injected right after the match stage
    pub extra_stages: Vec<Stage>,
    /// 追加在装配管道之后 / Appended after the assembled pipeline
    pub append_stages: Vec<Stage>,
    /// 装配后按序应用 / Applied in order after assembly
    pub transforms: Vec<StageTransform>,
    pub after: Option<AfterHook>,
    pub session: Option<StoreSession>,
}

/// 写路径与单键读取选项
/// Options for write paths and keyed reads
pub struct MutationOptions {
    pub populate: PopulateSpec,
    pub run_validators: bool,
    pub session: Option<StoreSession>,
}

impl Default for MutationOptions {
    fn default() -> Self {
        Self {
            populate: PopulateSpec::All,
            run_validators: true,
            session: None,
        }
    }
}

pub struct Repository {
    store: Arc<dyn DocumentStore>,
    meta: EntityMeta,
    relations: Arc<RelationMap>,
}

impl Repository {
    pub fn new(store: Arc<dyn DocumentStore>, meta: EntityMeta, relations: Arc<RelationMap>) -> Self {
        Self { store, meta, relations }
    }

    pub fn collection(&self) -> &'static str {
        self.meta.collection
    }

    pub async fn create(&self, doc: Value, opts: MutationOptions) -> AppResult<Value> {
        let mut created = self
            .store
            .insert(self.meta.collection, doc, opts.session.as_ref())
            .await
            .map_err(|e| self.map_store_error(e))?;
        self.populate(&mut created, &opts.populate, opts.session.as_ref())
            .await?;
        Ok(created)
    }

    pub async fn get_by_id(&self, id: &str, opts: MutationOptions) -> AppResult<Value> {
        let mut doc = self
            .store
            .find_by_id(self.meta.collection, id, opts.session.as_ref())
            .await
            .map_err(|e| self.map_store_error(e))?
            .ok_or_else(|| AppError::not_found(self.meta.collection))?;
        self.populate(&mut doc, &opts.populate, opts.session.as_ref())
            .await?;
        Ok(doc)
    }

    /// 列表查询：解析 -> 装配 -> 前置/变换 -> 执行 -> 整形 -> 后钩子
    /// List query: parse -> assemble -> prepend/transform -> execute ->
    /// shape -> after hook
    pub async fn get_all(
        &self,
        params: &HashMap<String, String>,
        opts: GetAllOptions,
    ) -> AppResult<QueryOutput> {
        let parsed = query::parse(params);
        let mut pipeline = opts.prepend_stages;
        pipeline.extend(query::assemble(&parsed, opts.extra_stages));
        pipeline.extend(opts.append_stages);
        let pipeline = query::apply_transforms(pipeline, &opts.transforms);

        let rows = self
            .store
            .aggregate(self.meta.collection, &pipeline, opts.session.as_ref())
            .await
            .map_err(|e| self.map_store_error(e))?;

        let mut output = query::format(rows, &parsed.directives);
        if let Some(after) = opts.after {
            output = match output {
                QueryOutput::Paginated(mut p) => {
                    p.result = after(p.result);
                    QueryOutput::Paginated(p)
                }
                QueryOutput::Raw(rows) => QueryOutput::Raw(after(rows)),
            };
        }
        Ok(output)
    }

    pub async fn update_by_id(
        &self,
        id: &str,
        patch: Value,
        opts: MutationOptions,
    ) -> AppResult<Value> {
        let mut updated = self
            .store
            .update_by_id(
                self.meta.collection,
                id,
                patch,
                opts.run_validators,
                opts.session.as_ref(),
            )
            .await
            .map_err(|e| self.map_store_error(e))?
            .ok_or_else(|| AppError::not_found(self.meta.collection))?;
        self.populate(&mut updated, &opts.populate, opts.session.as_ref())
            .await?;
        Ok(updated)
    }

    pub async fn delete_by_id(
        &self,
        id: &str,
        session: Option<&StoreSession>,
    ) -> AppResult<Value> {
        self.store
            .delete_by_id(self.meta.collection, id, session)
            .await
            .map_err(|e| self.map_store_error(e))?
            .ok_or_else(|| AppError::not_found(self.meta.collection))
    }

    async fn populate(
        &self,
        doc: &mut Value,
        spec: &PopulateSpec,
        session: Option<&StoreSession>,
    ) -> AppResult<()> {
        populate_document(&self.store, &self.relations, self.meta.collection, doc, spec, session)
            .await
            .map_err(|e| self.map_store_error(e))
    }

    fn map_store_error(&self, err: StoreError) -> AppError {
        match err {
            StoreError::Validation(message) => AppError::validation(self.meta.collection, message),
            StoreError::Backend(message) => AppError::query(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    const OUTLET_META: EntityMeta = EntityMeta {
        collection: "outlets",
        relations: &[RelationField { field: "ownerId", collection: "owners" }],
    };
    const OWNER_META: EntityMeta = EntityMeta { collection: "owners", relations: &[] };

    fn repo(memory: Arc<MemoryStore>, meta: EntityMeta) -> Repository {
        let relations = Arc::new(RelationMap::new(&[OUTLET_META, OWNER_META]));
        Repository::new(memory, meta, relations)
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn create_then_get_populates_relations() {
        let memory = Arc::new(MemoryStore::new());
        let owners = repo(memory.clone(), OWNER_META);
        let outlets = repo(memory, OUTLET_META);

        let owner = owners
            .create(json!({"name": "Asha"}), MutationOptions::default())
            .await
            .unwrap();
        let outlet = outlets
            .create(
                json!({"name": "Dosa Hut", "ownerId": owner["id"]}),
                MutationOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(outlet["ownerId"]["name"], "Asha");

        let fetched = outlets
            .get_by_id(outlet["id"].as_str().unwrap(), MutationOptions::default())
            .await
            .unwrap();
        assert_eq!(fetched["ownerId"]["name"], "Asha");
    }

    #[tokio::test]
    async fn get_by_id_miss_is_not_found() {
        let memory = Arc::new(MemoryStore::new());
        let outlets = repo(memory, OUTLET_META);
        let err = outlets
            .get_by_id("nope", MutationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn get_all_runs_the_full_pipeline() {
        let memory = Arc::new(MemoryStore::new());
        let outlets = repo(memory, OUTLET_META);
        for (name, status) in [("A", "active"), ("B", "active"), ("C", "closed")] {
            outlets
                .create(
                    json!({"name": name, "status": status}),
                    MutationOptions { populate: PopulateSpec::None, ..Default::default() },
                )
                .await
                .unwrap();
        }
        let out = outlets
            .get_all(&params(&[("status", "active"), ("limit", "1")]), GetAllOptions::default())
            .await
            .unwrap();
        let QueryOutput::Paginated(p) = out else { panic!("expected envelope") };
        assert_eq!(p.pagination.total_items, 2);
        assert_eq!(p.pagination.total_pages, 2);
        assert_eq!(p.result.len(), 1);
    }

    #[tokio::test]
    async fn after_hook_reshapes_rows() {
        let memory = Arc::new(MemoryStore::new());
        let outlets = repo(memory, OUTLET_META);
        outlets
            .create(
                json!({"name": "A", "password": "secret"}),
                MutationOptions { populate: PopulateSpec::None, ..Default::default() },
            )
            .await
            .unwrap();
        let opts = GetAllOptions {
            after: Some(Box::new(|rows| {
                rows.into_iter()
                    .map(|mut row| {
                        if let Some(map) = row.as_object_mut() {
                            map.remove("password");
                        }
                        row
                    })
                    .collect()
            })),
            ..Default::default()
        };
        let out = outlets.get_all(&params(&[]), opts).await.unwrap();
        assert!(out.rows()[0].get("password").is_none());
    }

    #[tokio::test]
    async fn update_miss_and_delete_roundtrip() {
        let memory = Arc::new(MemoryStore::new());
        let outlets = repo(memory, OUTLET_META);
        let err = outlets
            .update_by_id("nope", json!({"name": "X"}), MutationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));

        let doc = outlets
            .create(json!({"name": "A"}), MutationOptions { populate: PopulateSpec::None, ..Default::default() })
            .await
            .unwrap();
        let id = doc["id"].as_str().unwrap();
        let updated = outlets
            .update_by_id(id, json!({"name": "B"}), MutationOptions::default())
            .await
            .unwrap();
        assert_eq!(updated["name"], "B");
        outlets.delete_by_id(id, None).await.unwrap();
        let err = outlets.delete_by_id(id, None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }
}
