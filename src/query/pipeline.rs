//! 管道装配器
//! Pipeline assembler
//!
//! 将解析结果与调用方附加阶段组合为固定顺序的执行计划：
//! 匹配 -> 附加阶段 -> 搜索 -> 投影 -> 排序 -> 分页。
//! Composes parser output plus caller-supplied stages into a fixed-order
//! execution plan: match -> extra stages -> search -> projection -> sort
//! -> pagination.

use serde_json::{json, Map, Value};

use super::grammar::{ParsedQuery, SearchOperator, SortSpec};

/// 类型化的管道阶段描述符，可序列化为存储端的聚合文档
/// Typed pipeline stage descriptor, serializable to store-side
/// aggregation documents
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Map<String, Value>),
    Lookup {
        from: String,
        local_field: String,
        foreign_field: String,
        as_field: String,
    },
    Unwind {
        path: String,
    },
    /// 字段名到 0/1 的投影表 / Field-name to 0/1 projection table
    Project(Map<String, Value>),
    Sort(SortSpec),
    Skip(u64),
    Limit(u64),
    Count(String),
    /// 终结分页阶段：同一上游结果集分叉为页切片与总数两个分支
    /// Terminal pagination stage: forks the upstream result set into a
    /// page-slice branch and a count branch
    Paginate {
        page: u64,
        limit: u64,
    },
    /// 逃生通道：原样传递的阶段文档 / Escape hatch: stage document passed through
    Raw(Value),
}

impl Stage {
    pub fn lookup(from: &str, local_field: &str, foreign_field: &str, as_field: &str) -> Stage {
        Stage::Lookup {
            from: from.to_string(),
            local_field: local_field.to_string(),
            foreign_field: foreign_field.to_string(),
            as_field: as_field.to_string(),
        }
    }

    /// 存储端文档表示；分页阶段展开为分叉加合并两个文档
    /// Store-side document form; pagination expands into the fork plus
    /// merge pair
    pub fn to_documents(&self) -> Vec<Value> {
        match self {
            Stage::Match(doc) => vec![json!({ "$match": Value::Object(doc.clone()) })],
            Stage::Lookup {
                from,
                local_field,
                foreign_field,
                as_field,
            } => vec![json!({
                "$lookup": {
                    "from": from,
                    "localField": local_field,
                    "foreignField": foreign_field,
                    "as": as_field
                }
            })],
            Stage::Unwind { path } => vec![json!({
                "$unwind": { "path": format!("${}", path), "preserveNullAndEmptyArrays": true }
            })],
            Stage::Project(doc) => vec![json!({ "$project": Value::Object(doc.clone()) })],
            Stage::Sort(spec) => {
                let mut doc = Map::new();
                for (field, dir) in spec {
                    doc.insert(field.clone(), json!(dir));
                }
                vec![json!({ "$sort": Value::Object(doc) })]
            }
            Stage::Skip(n) => vec![json!({ "$skip": n })],
            Stage::Limit(n) => vec![json!({ "$limit": n })],
            Stage::Count(name) => vec![json!({ "$count": name })],
            Stage::Paginate { page, limit } => vec![
                json!({
                    "$facet": {
                        "data": [
                            { "$skip": page.saturating_sub(1) * limit },
                            { "$limit": limit }
                        ],
                        "metadata": [
                            { "$count": "total" },
                            {
                                "$addFields": {
                                    "page": page,
                                    "limit": limit,
                                    "totalPages": { "$ceil": { "$divide": ["$total", limit] } }
                                }
                            }
                        ]
                    }
                }),
                json!({
                    "$project": {
                        "data": 1,
                        "total": { "$ifNull": [ { "$arrayElemAt": ["$metadata.total", 0] }, 0 ] },
                        "page": { "$ifNull": [ { "$arrayElemAt": ["$metadata.page", 0] }, 1 ] },
                        "limit": { "$ifNull": [ { "$arrayElemAt": ["$metadata.limit", 0] }, limit ] },
                        "totalPages": { "$ifNull": [ { "$arrayElemAt": ["$metadata.totalPages", 0] }, 0 ] }
                    }
                }),
            ],
            Stage::Raw(value) => vec![value.clone()],
        }
    }
}

/// 装配后应用的有序阶段变换（返回 None 表示保持原样）
/// Ordered stage transform applied after assembly (None keeps the list)
pub type StageTransform = Box<dyn Fn(&[Stage]) -> Option<Vec<Stage>> + Send + Sync>;

/// 按固定顺序装配执行计划
/// Assemble the execution plan in its fixed order
pub fn assemble(parsed: &ParsedQuery, extra_stages: Vec<Stage>) -> Vec<Stage> {
    let directives = &parsed.directives;
    let mut pipeline = Vec::new();

    let match_doc = parsed.match_document();
    if !match_doc.is_empty() {
        pipeline.push(Stage::Match(match_doc));
    }

    // 附加阶段紧随匹配之后，使搜索/投影/排序能引用联结字段
    // Extra stages go right after match so search/projection/sort can
    // reference joined fields
    pipeline.extend(extra_stages);

    if !directives.search.is_empty() && !directives.search_keys.is_empty() {
        let conditions: Vec<Value> = directives
            .search_keys
            .iter()
            .map(|key| json!({ key: { "$regex": directives.search, "$options": "i" } }))
            .collect();
        let group_key = match directives.search_operator {
            SearchOperator::Or => "$or",
            SearchOperator::And => "$and",
        };
        let mut doc = Map::new();
        doc.insert(group_key.to_string(), Value::Array(conditions));
        pipeline.push(Stage::Match(doc));
    }

    if !directives.fields.is_empty() || !directives.exclude.is_empty() {
        let mut projection = Map::new();
        for field in &directives.fields {
            projection.insert(field.clone(), json!(1));
        }
        for field in &directives.exclude {
            projection.insert(field.clone(), json!(0));
        }
        pipeline.push(Stage::Project(projection));
    }

    // 恒定只有一个排序阶段 / Exactly one sort stage, always
    pipeline.push(Stage::Sort(directives.sort.clone()));

    if directives.pagination {
        pipeline.push(Stage::Paginate {
            page: directives.page,
            limit: directives.limit,
        });
    }

    pipeline
}

/// 依次应用装配后变换
/// Apply post-assembly transforms in order
pub fn apply_transforms(mut pipeline: Vec<Stage>, transforms: &[StageTransform]) -> Vec<Stage> {
    for transform in transforms {
        if let Some(next) = transform(&pipeline) {
            pipeline = next;
        }
    }
    pipeline
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::grammar::parse;
    use std::collections::HashMap;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn stage_order_is_fixed() {
        let parsed = parse(&params(&[
            ("status", "active"),
            ("search", "tea"),
            ("searchkey", "name,description"),
            ("fields", "name,price"),
        ]));
        let extra = vec![Stage::lookup("owners", "ownerId", "id", "owner")];
        let pipeline = assemble(&parsed, extra);

        assert!(matches!(pipeline[0], Stage::Match(_)));
        assert!(matches!(pipeline[1], Stage::Lookup { .. }));
        assert!(matches!(pipeline[2], Stage::Match(_))); // search
        assert!(matches!(pipeline[3], Stage::Project(_)));
        assert!(matches!(pipeline[4], Stage::Sort(_)));
        assert!(matches!(pipeline[5], Stage::Paginate { .. }));
        assert_eq!(pipeline.len(), 6);
    }

    #[test]
    fn no_filters_means_no_match_stage() {
        let parsed = parse(&params(&[("pagination", "false")]));
        let pipeline = assemble(&parsed, Vec::new());
        assert_eq!(pipeline, vec![Stage::Sort(vec![("createdAt".to_string(), -1)])]);
    }

    #[test]
    fn search_operator_and_builds_and_group() {
        let parsed = parse(&params(&[
            ("search", "veg"),
            ("searchkey", "name,tags"),
            ("searchOperator", "and"),
        ]));
        let pipeline = assemble(&parsed, Vec::new());
        let Stage::Match(doc) = &pipeline[0] else {
            panic!("expected search match stage");
        };
        assert!(doc.contains_key("$and"));
    }

    #[test]
    fn pagination_stage_is_terminal_and_forked() {
        let parsed = parse(&params(&[("page", "2"), ("limit", "5")]));
        let pipeline = assemble(&parsed, Vec::new());
        let docs = pipeline.last().unwrap().to_documents();
        assert_eq!(
            docs[0]["$facet"]["data"][0],
            serde_json::json!({ "$skip": 5 })
        );
        assert_eq!(
            docs[0]["$facet"]["data"][1],
            serde_json::json!({ "$limit": 5 })
        );
        assert_eq!(
            docs[0]["$facet"]["metadata"][0],
            serde_json::json!({ "$count": "total" })
        );
    }

    #[test]
    fn transforms_apply_in_order_and_none_is_identity() {
        let parsed = parse(&params(&[]));
        let pipeline = assemble(&parsed, Vec::new());
        let transforms: Vec<StageTransform> = vec![
            Box::new(|_stages| None),
            Box::new(|stages| {
                let mut next = stages.to_vec();
                next.insert(0, Stage::Limit(1));
                Some(next)
            }),
        ];
        let result = apply_transforms(pipeline.clone(), &transforms);
        assert_eq!(result.len(), pipeline.len() + 1);
        assert_eq!(result[0], Stage::Limit(1));
    }
}
