//! 内存文档存储
//! In-memory document store
//!
//! 在进程内的 `Vec<Value>` 集合上执行聚合阶段子集（匹配/联结/展开/
//! 投影/排序/跳过/截取/计数/分页分叉）。开发环境的缺省存储，也是
//! 查询管道可测性的载体。
//! Executes the aggregation stage subset (match/lookup/unwind/project/
//! sort/skip/limit/count/pagination fork) over in-process `Vec<Value>`
//! collections. The default store for development and the vehicle for
//! query pipeline testability.

use std::cmp::Ordering;

use async_trait::async_trait;
use dashmap::DashMap;
use regex::RegexBuilder;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::{DocumentStore, StoreError, StoreSession, Validator};
use crate::query::Stage;

#[derive(Default)]
pub struct MemoryStore {
    collections: DashMap<String, Vec<Value>>,
    validators: DashMap<String, Validator>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册集合级模式校验器
    /// Register a collection-level schema validator
    pub fn set_validator(&self, collection: &str, validator: Validator) {
        self.validators.insert(collection.to_string(), validator);
    }

    fn validate(&self, collection: &str, doc: &Value) -> Result<(), StoreError> {
        if let Some(validator) = self.validators.get(collection) {
            validator(doc).map_err(StoreError::Validation)?;
        }
        Ok(())
    }

    fn snapshot(&self, collection: &str) -> Vec<Value> {
        self.collections
            .get(collection)
            .map(|docs| docs.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(
        &self,
        collection: &str,
        doc: Value,
        _session: Option<&StoreSession>,
    ) -> Result<Value, StoreError> {
        let mut map = match doc {
            Value::Object(map) => map,
            other => {
                return Err(StoreError::Validation(format!(
                    "document must be an object, got {}",
                    type_name(&other)
                )))
            }
        };
        let now = chrono::Utc::now().to_rfc3339();
        map.entry("id".to_string())
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        map.entry("createdAt".to_string())
            .or_insert_with(|| Value::String(now.clone()));
        map.insert("updatedAt".to_string(), Value::String(now));

        let doc = Value::Object(map);
        self.validate(collection, &doc)?;
        self.collections
            .entry(collection.to_string())
            .or_default()
            .push(doc.clone());
        Ok(doc)
    }

    async fn find_by_id(
        &self,
        collection: &str,
        id: &str,
        _session: Option<&StoreSession>,
    ) -> Result<Option<Value>, StoreError> {
        Ok(self
            .snapshot(collection)
            .into_iter()
            .find(|doc| doc.get("id").and_then(Value::as_str) == Some(id)))
    }

    async fn update_by_id(
        &self,
        collection: &str,
        id: &str,
        patch: Value,
        run_validators: bool,
        _session: Option<&StoreSession>,
    ) -> Result<Option<Value>, StoreError> {
        let patch = match patch {
            Value::Object(map) => map,
            other => {
                return Err(StoreError::Validation(format!(
                    "patch must be an object, got {}",
                    type_name(&other)
                )))
            }
        };

        let mut updated = None;
        if let Some(mut docs) = self.collections.get_mut(collection) {
            if let Some(doc) = docs
                .iter_mut()
                .find(|doc| doc.get("id").and_then(Value::as_str) == Some(id))
            {
                let mut merged = doc.as_object().cloned().unwrap_or_default();
                for (key, value) in &patch {
                    merged.insert(key.clone(), value.clone());
                }
                merged.insert(
                    "updatedAt".to_string(),
                    Value::String(chrono::Utc::now().to_rfc3339()),
                );
                let candidate = Value::Object(merged);
                if run_validators {
                    if let Some(validator) = self.validators.get(collection) {
                        validator(&candidate).map_err(StoreError::Validation)?;
                    }
                }
                *doc = candidate.clone();
                updated = Some(candidate);
            }
        }
        Ok(updated)
    }

    async fn delete_by_id(
        &self,
        collection: &str,
        id: &str,
        _session: Option<&StoreSession>,
    ) -> Result<Option<Value>, StoreError> {
        let mut removed = None;
        if let Some(mut docs) = self.collections.get_mut(collection) {
            if let Some(pos) = docs
                .iter()
                .position(|doc| doc.get("id").and_then(Value::as_str) == Some(id))
            {
                removed = Some(docs.remove(pos));
            }
        }
        Ok(removed)
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: &[Stage],
        _session: Option<&StoreSession>,
    ) -> Result<Vec<Value>, StoreError> {
        let mut docs = self.snapshot(collection);
        for stage in pipeline {
            docs = self.execute_stage(docs, stage)?;
        }
        Ok(docs)
    }
}

impl MemoryStore {
    fn execute_stage(&self, docs: Vec<Value>, stage: &Stage) -> Result<Vec<Value>, StoreError> {
        match stage {
            Stage::Match(cond) => Ok(docs
                .into_iter()
                .filter(|doc| eval_match(doc, cond))
                .collect()),
            Stage::Lookup {
                from,
                local_field,
                foreign_field,
                as_field,
            } => {
                let foreign = self.snapshot(from);
                Ok(docs
                    .into_iter()
                    .map(|mut doc| {
                        let local_values = candidates(&doc, local_field);
                        let joined: Vec<Value> = foreign
                            .iter()
                            .filter(|fdoc| {
                                candidates(fdoc, foreign_field)
                                    .iter()
                                    .any(|fv| local_values.iter().any(|lv| loose_eq(lv, fv)))
                            })
                            .cloned()
                            .collect();
                        if let Some(map) = doc.as_object_mut() {
                            map.insert(as_field.clone(), Value::Array(joined));
                        }
                        doc
                    })
                    .collect())
            }
            Stage::Unwind { path } => {
                let mut out = Vec::new();
                for doc in docs {
                    match get_path(&doc, path) {
                        Some(Value::Array(items)) if !items.is_empty() => {
                            for item in items {
                                let mut unwound = doc.clone();
                                set_path(&mut unwound, path, item);
                                out.push(unwound);
                            }
                        }
                        // 空数组或缺失字段保留原文档 / Empty or missing keeps the doc
                        _ => out.push(doc),
                    }
                }
                Ok(out)
            }
            Stage::Project(projection) => Ok(docs
                .into_iter()
                .map(|doc| project_doc(doc, projection))
                .collect()),
            Stage::Sort(spec) => {
                let mut docs = docs;
                docs.sort_by(|a, b| {
                    for (field, dir) in spec {
                        let ord = compare_values(
                            first_candidate(a, field).as_ref(),
                            first_candidate(b, field).as_ref(),
                        );
                        let ord = if *dir < 0 { ord.reverse() } else { ord };
                        if ord != Ordering::Equal {
                            return ord;
                        }
                    }
                    Ordering::Equal
                });
                Ok(docs)
            }
            Stage::Skip(n) => Ok(docs.into_iter().skip(*n as usize).collect()),
            Stage::Limit(n) => Ok(docs.into_iter().take(*n as usize).collect()),
            Stage::Count(name) => {
                let mut doc = Map::new();
                doc.insert(name.clone(), json!(docs.len()));
                Ok(vec![Value::Object(doc)])
            }
            Stage::Paginate { page, limit } => {
                let total = docs.len() as u64;
                let skip = (page.saturating_sub(1) * limit) as usize;
                let data: Vec<Value> = docs
                    .into_iter()
                    .skip(skip)
                    .take(*limit as usize)
                    .collect();
                Ok(vec![json!({
                    "data": data,
                    "total": total,
                    "page": page,
                    "limit": limit,
                    "totalPages": total.div_ceil((*limit).max(1))
                })])
            }
            Stage::Raw(value) => Err(StoreError::Backend(format!(
                "memory store cannot execute raw stage: {}",
                value
            ))),
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// 匹配文档求值：顶层键为 $or/$and 分组或字段路径
/// Match document evaluation: top-level keys are $or/$and groups or
/// field paths
fn eval_match(doc: &Value, cond: &Map<String, Value>) -> bool {
    cond.iter().all(|(key, sub)| match key.as_str() {
        "$or" => sub
            .as_array()
            .map(|branches| {
                branches.iter().any(|branch| {
                    branch
                        .as_object()
                        .map(|b| eval_match(doc, b))
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false),
        "$and" => sub
            .as_array()
            .map(|branches| {
                branches.iter().all(|branch| {
                    branch
                        .as_object()
                        .map(|b| eval_match(doc, b))
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false),
        _ => matches_condition(&candidates(doc, key), sub),
    })
}

/// 解析路径并展开数组元素作为候选值
/// Resolve the path and expand array elements as candidate values
fn candidates(doc: &Value, path: &str) -> Vec<Value> {
    let mut resolved = Vec::new();
    resolve(doc, &path.split('.').collect::<Vec<_>>(), &mut resolved);
    let mut out = Vec::new();
    for value in resolved {
        out.push(value.clone());
        if let Value::Array(items) = value {
            out.extend(items.iter().cloned());
        }
    }
    out
}

fn first_candidate(doc: &Value, path: &str) -> Option<Value> {
    let mut resolved = Vec::new();
    resolve(doc, &path.split('.').collect::<Vec<_>>(), &mut resolved);
    resolved.first().map(|v| (*v).clone())
}

fn resolve<'a>(value: &'a Value, segments: &[&str], out: &mut Vec<&'a Value>) {
    let Some((head, rest)) = segments.split_first() else {
        out.push(value);
        return;
    };
    match value {
        Value::Object(map) => {
            if let Some(next) = map.get(*head) {
                resolve(next, rest, out);
            }
        }
        Value::Array(items) => {
            if let Ok(index) = head.parse::<usize>() {
                if let Some(next) = items.get(index) {
                    resolve(next, rest, out);
                }
            } else {
                for item in items {
                    resolve(item, segments, out);
                }
            }
        }
        _ => {}
    }
}

fn set_path(doc: &mut Value, path: &str, new_value: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    let mut current = doc;
    for (i, segment) in segments.iter().enumerate() {
        let Some(map) = current.as_object_mut() else {
            return;
        };
        if i == segments.len() - 1 {
            map.insert(segment.to_string(), new_value);
            return;
        }
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

fn get_path(doc: &Value, path: &str) -> Option<Value> {
    first_candidate(doc, path)
}

fn matches_condition(cands: &[Value], cond: &Value) -> bool {
    match cond {
        Value::Object(map) if is_operator_doc(map) => map.iter().all(|(op, operand)| {
            match op.as_str() {
                "$regex" => {
                    let Some(pattern) = operand.as_str() else {
                        return false;
                    };
                    let insensitive = map
                        .get("$options")
                        .and_then(Value::as_str)
                        .map(|o| o.contains('i'))
                        .unwrap_or(false);
                    let Ok(re) = RegexBuilder::new(pattern)
                        .case_insensitive(insensitive)
                        .build()
                    else {
                        return false;
                    };
                    cands
                        .iter()
                        .filter_map(Value::as_str)
                        .any(|s| re.is_match(s))
                }
                // 与$regex一并处理 / Handled together with $regex
                "$options" => true,
                "$exists" => {
                    let wanted = operand.as_bool().unwrap_or(false);
                    !cands.is_empty() == wanted
                }
                "$eq" => cands.iter().any(|c| loose_eq(c, operand)),
                "$ne" => !cands.iter().any(|c| loose_eq(c, operand)),
                "$gt" => any_ordering(cands, operand, |o| o == Ordering::Greater),
                "$gte" => any_ordering(cands, operand, |o| o != Ordering::Less),
                "$lt" => any_ordering(cands, operand, |o| o == Ordering::Less),
                "$lte" => any_ordering(cands, operand, |o| o != Ordering::Greater),
                "$in" => operand
                    .as_array()
                    .map(|items| {
                        items
                            .iter()
                            .any(|item| cands.iter().any(|c| loose_eq(c, item)))
                    })
                    .unwrap_or(false),
                "$nin" => operand
                    .as_array()
                    .map(|items| {
                        !items
                            .iter()
                            .any(|item| cands.iter().any(|c| loose_eq(c, item)))
                    })
                    .unwrap_or(false),
                _ => false,
            }
        }),
        // 非操作符对象按嵌套谓词树逐层下钻
        // Non-operator objects drill down the nested predicate tree
        Value::Object(map) => cands.iter().any(|cand| {
            map.iter()
                .all(|(key, sub)| matches_condition(&candidates(cand, key), sub))
        }),
        literal => cands.iter().any(|c| loose_eq(c, literal)),
    }
}

fn is_operator_doc(map: &Map<String, Value>) -> bool {
    !map.is_empty() && map.keys().all(|k| k.starts_with('$'))
}

fn any_ordering(cands: &[Value], operand: &Value, ok: impl Fn(Ordering) -> bool) -> bool {
    cands.iter().any(|c| {
        compare_same_type(c, operand)
            .map(&ok)
            .unwrap_or(false)
    })
}

/// 数值按浮点比较的宽松相等 / Loose equality with numeric f64 comparison
fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// 同类型比较；类型不同返回 None（范围操作符不命中）
/// Same-type comparison; mismatched types yield None (range ops miss)
fn compare_same_type(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// 排序比较：缺失/空值最小，随后数值、字符串、数组、对象、布尔
/// Sort comparison: missing/null lowest, then numbers, strings, arrays,
/// objects, bools
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Number(_)) => 1,
            Some(Value::String(_)) => 2,
            Some(Value::Array(_)) => 3,
            Some(Value::Object(_)) => 4,
            Some(Value::Bool(_)) => 5,
        }
    }
    match (a, b) {
        (Some(x), Some(y)) => {
            compare_same_type(x, y).unwrap_or_else(|| rank(a).cmp(&rank(b)))
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

/// 投影：出现任一 1 即为包含模式（id 始终保留，除非显式置 0）；
/// 点分路径按嵌套结构保留或剔除
/// Projection: any 1 switches to inclusion mode (id always kept unless
/// explicitly zeroed); dotted paths keep or strip the nested structure
fn project_doc(doc: Value, projection: &Map<String, Value>) -> Value {
    if !doc.is_object() {
        return doc;
    }
    let inclusion = projection.values().any(|v| v.as_i64() == Some(1));
    if inclusion {
        let mut out = Value::Object(Map::new());
        if projection.get("id").and_then(Value::as_i64) != Some(0) {
            if let Some(id) = doc.get("id") {
                set_path(&mut out, "id", id.clone());
            }
        }
        for (field, flag) in projection {
            if flag.as_i64() == Some(1) {
                if let Some(value) = get_path(&doc, field) {
                    set_path(&mut out, field, value);
                }
            }
        }
        out
    } else {
        let mut out = doc;
        for (field, flag) in projection {
            if flag.as_i64() == Some(0) {
                remove_path(&mut out, field);
            }
        }
        out
    }
}

fn remove_path(doc: &mut Value, path: &str) {
    let segments: Vec<&str> = path.split('.').collect();
    let mut current = doc;
    for (i, segment) in segments.iter().enumerate() {
        let Some(map) = current.as_object_mut() else {
            return;
        };
        if i == segments.len() - 1 {
            map.remove(*segment);
            return;
        }
        match map.get_mut(*segment) {
            Some(next) => current = next,
            None => return,
        }
    }
}
