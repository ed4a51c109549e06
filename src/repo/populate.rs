//! 关联填充
//! Relation population
//!
//! 每个实体声明一张静态关联表：哪些字段持有哪个集合的外键。填充在
//! 读写路径上把外键替换为被引用文档；默认沿全局关联表递归展开全部
//! 关联，也可用显式指令只展开指定路径并裁剪字段。
//! Each entity declares a static relation table: which fields hold
//! foreign keys into which collection. Population swaps keys for the
//! referenced documents on read/write paths; by default every relation
//! expands recursively along the global relation map, or an explicit
//! directive expands selected paths only with field trimming.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::{Map, Value};

use crate::store::{DocumentStore, StoreError, StoreSession};

/// 防环递归深度上限 / Cycle-guarding recursion depth cap
const MAX_DEPTH: usize = 3;

/// 持有外键的字段及其目标集合
/// A foreign-key field and its target collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationField {
    pub field: &'static str,
    pub collection: &'static str,
}

/// 实体的存储元数据
/// Storage metadata for an entity
#[derive(Debug, Clone, Copy)]
pub struct EntityMeta {
    pub collection: &'static str,
    pub relations: &'static [RelationField],
}

/// 集合名到关联表的全局映射，引导期构建一次
/// Global collection-to-relations map, built once at bootstrap
#[derive(Debug, Default, Clone)]
pub struct RelationMap {
    by_collection: HashMap<&'static str, &'static [RelationField]>,
}

impl RelationMap {
    pub fn new(entities: &[EntityMeta]) -> Self {
        let mut by_collection = HashMap::new();
        for meta in entities {
            by_collection.insert(meta.collection, meta.relations);
        }
        Self { by_collection }
    }

    pub fn relations_of(&self, collection: &str) -> &'static [RelationField] {
        self.by_collection.get(collection).copied().unwrap_or(&[])
    }
}

/// 单条填充指令：路径、字段裁剪与嵌套填充
/// One population directive: path, field trimming, nested population
#[derive(Debug, Clone, Default)]
pub struct PopulateDirective {
    pub path: String,
    pub select: Vec<String>,
    pub populate: Vec<PopulateDirective>,
}

impl PopulateDirective {
    pub fn path(path: &str) -> Self {
        Self {
            path: path.to_string(),
            ..Self::default()
        }
    }
}

/// 填充策略：全部展开、不展开、或按指令展开
/// Population policy: expand all, none, or per directive
#[derive(Debug, Clone, Default)]
pub enum PopulateSpec {
    #[default]
    All,
    None,
    Paths(Vec<PopulateDirective>),
}

impl PopulateSpec {
    /// 逗号分隔的路径列表 / Comma-separated path list
    pub fn paths(list: &str) -> Self {
        let dirs: Vec<PopulateDirective> = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(PopulateDirective::path)
            .collect();
        if dirs.is_empty() {
            PopulateSpec::None
        } else {
            PopulateSpec::Paths(dirs)
        }
    }
}

/// 按策略就地填充单个文档
/// Populate a document in place per the policy
pub async fn populate_document(
    store: &Arc<dyn DocumentStore>,
    relations: &RelationMap,
    collection: &str,
    doc: &mut Value,
    spec: &PopulateSpec,
    session: Option<&StoreSession>,
) -> Result<(), StoreError> {
    match spec {
        PopulateSpec::None => Ok(()),
        PopulateSpec::All => populate_all(store, relations, collection, doc, session, 0).await,
        PopulateSpec::Paths(dirs) => {
            populate_paths(store, relations, collection, doc, dirs, session).await
        }
    }
}

fn populate_all<'a>(
    store: &'a Arc<dyn DocumentStore>,
    relations: &'a RelationMap,
    collection: &'a str,
    doc: &'a mut Value,
    session: Option<&'a StoreSession>,
    depth: usize,
) -> BoxFuture<'a, Result<(), StoreError>> {
    Box::pin(async move {
        if depth >= MAX_DEPTH {
            return Ok(());
        }
        for relation in relations.relations_of(collection) {
            let Some(current) = doc.get(relation.field).cloned() else {
                continue;
            };
            match current {
                Value::String(id) => {
                    let Some(mut fetched) =
                        store.find_by_id(relation.collection, &id, session).await?
                    else {
                        // 悬挂外键保持原样 / Dangling keys stay untouched
                        continue;
                    };
                    populate_all(
                        store,
                        relations,
                        relation.collection,
                        &mut fetched,
                        session,
                        depth + 1,
                    )
                    .await?;
                    if let Some(map) = doc.as_object_mut() {
                        map.insert(relation.field.to_string(), fetched);
                    }
                }
                Value::Array(items) => {
                    let mut resolved = Vec::with_capacity(items.len());
                    for item in items {
                        let Value::String(id) = item else {
                            resolved.push(item);
                            continue;
                        };
                        match store.find_by_id(relation.collection, &id, session).await? {
                            Some(mut fetched) => {
                                populate_all(
                                    store,
                                    relations,
                                    relation.collection,
                                    &mut fetched,
                                    session,
                                    depth + 1,
                                )
                                .await?;
                                resolved.push(fetched);
                            }
                            None => resolved.push(Value::String(id)),
                        }
                    }
                    if let Some(map) = doc.as_object_mut() {
                        map.insert(relation.field.to_string(), Value::Array(resolved));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    })
}

fn populate_paths<'a>(
    store: &'a Arc<dyn DocumentStore>,
    relations: &'a RelationMap,
    collection: &'a str,
    doc: &'a mut Value,
    directives: &'a [PopulateDirective],
    session: Option<&'a StoreSession>,
) -> BoxFuture<'a, Result<(), StoreError>> {
    Box::pin(async move {
        for directive in directives {
            let Some(relation) = relations
                .relations_of(collection)
                .iter()
                .find(|r| r.field == directive.path)
            else {
                // 未声明的路径忽略 / Undeclared paths are ignored
                continue;
            };
            let Some(current) = doc.get(relation.field).cloned() else {
                continue;
            };
            match current {
                Value::String(id) => {
                    let Some(fetched) =
                        fetch_directed(store, relations, relation, &id, directive, session).await?
                    else {
                        continue;
                    };
                    if let Some(map) = doc.as_object_mut() {
                        map.insert(relation.field.to_string(), fetched);
                    }
                }
                Value::Array(items) => {
                    let mut resolved = Vec::with_capacity(items.len());
                    for item in items {
                        let Value::String(id) = item else {
                            resolved.push(item);
                            continue;
                        };
                        match fetch_directed(store, relations, relation, &id, directive, session)
                            .await?
                        {
                            Some(fetched) => resolved.push(fetched),
                            None => resolved.push(Value::String(id)),
                        }
                    }
                    if let Some(map) = doc.as_object_mut() {
                        map.insert(relation.field.to_string(), Value::Array(resolved));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    })
}

/// 取回被引用文档并应用嵌套指令与字段裁剪
/// Fetch the referenced document, applying nested directives and trimming
async fn fetch_directed(
    store: &Arc<dyn DocumentStore>,
    relations: &RelationMap,
    relation: &RelationField,
    id: &str,
    directive: &PopulateDirective,
    session: Option<&StoreSession>,
) -> Result<Option<Value>, StoreError> {
    let Some(mut fetched) = store.find_by_id(relation.collection, id, session).await? else {
        return Ok(None);
    };
    if !directive.populate.is_empty() {
        populate_paths(
            store,
            relations,
            relation.collection,
            &mut fetched,
            &directive.populate,
            session,
        )
        .await?;
    }
    if !directive.select.is_empty() {
        apply_select(&mut fetched, &directive.select);
    }
    Ok(Some(fetched))
}

/// 字段裁剪：保留 id 与选中字段
/// Field trimming: keep id plus the selected fields
fn apply_select(doc: &mut Value, select: &[String]) {
    let Some(map) = doc.as_object() else {
        return;
    };
    let mut out = Map::new();
    if let Some(id) = map.get("id") {
        out.insert("id".to_string(), id.clone());
    }
    for field in select {
        if let Some(value) = map.get(field.as_str()) {
            out.insert(field.clone(), value.clone());
        }
    }
    *doc = Value::Object(out);
}
