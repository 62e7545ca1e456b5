//! 检索后端抽象与内置政策库
//!
//! 真实知识库是外部协作者：核心只依赖 Retriever（query + top_k -> 有序段落）。
//! StaticRetriever 内置少量差旅政策条目，供测试与知识库不可用时兜底。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 知识库调用错误
#[derive(Error, Debug, Clone)]
pub enum KnowledgeError {
    #[error("Knowledge backend error: {0}")]
    Backend(String),

    #[error("Knowledge backend unavailable")]
    Unavailable,
}

/// 检索结果段落
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    pub content: String,
    pub source: String,
    /// 相关度得分，越大越相关
    pub score: f64,
}

/// 检索后端 trait：按相关度降序返回至多 top_k 个段落
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Passage>, KnowledgeError>;
}

/// 静态检索器：固定语料 + 字符重合计分
pub struct StaticRetriever {
    passages: Vec<Passage>,
}

impl StaticRetriever {
    pub fn new(passages: Vec<Passage>) -> Self {
        Self { passages }
    }

    /// 内置差旅政策语料
    pub fn with_builtin_policies() -> Self {
        Self::new(vec![
            Passage {
                content: "差标是指本次差旅行程中，出行人乘坐飞机以及入住酒店等差旅类目的费用标准。"
                    .to_string(),
                source: "差旅政策".to_string(),
                score: 0.95,
            },
            Passage {
                content: "预算指的是本次差旅出行的整体预算费用，包括交通、住宿、餐饮等各项支出。"
                    .to_string(),
                source: "差旅政策".to_string(),
                score: 0.85,
            },
            Passage {
                content: "平台支持机票、火车票、酒店等多种差旅预订服务，报销需在行程结束后 30 日内提交。"
                    .to_string(),
                source: "服务说明".to_string(),
                score: 0.75,
            },
        ])
    }

    /// 查询词与段落的字符重合率，作为排序依据
    fn overlap_score(query: &str, passage: &Passage) -> f64 {
        let total = query.chars().filter(|c| !c.is_whitespace()).count();
        if total == 0 {
            return passage.score;
        }
        let hits = query
            .chars()
            .filter(|c| !c.is_whitespace())
            .filter(|c| passage.content.contains(*c))
            .count();
        passage.score * (hits as f64) / (total as f64)
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Passage>, KnowledgeError> {
        let mut scored: Vec<(f64, &Passage)> = self
            .passages
            .iter()
            .map(|p| (Self::overlap_score(query, p), p))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(score, p)| Passage {
                content: p.content.clone(),
                source: p.source.clone(),
                score,
            })
            .collect())
    }
}
