//! 知识类工具：检索知识库、查询差旅政策

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::knowledge::Retriever;
use crate::tools::registry::Tool;

/// 默认检索条数
const DEFAULT_TOP_K: usize = 3;

/// 知识库检索工具
pub struct SearchKnowledgeTool {
    retriever: Arc<dyn Retriever>,
}

impl SearchKnowledgeTool {
    pub fn new(retriever: Arc<dyn Retriever>) -> Self {
        Self { retriever }
    }
}

#[async_trait]
impl Tool for SearchKnowledgeTool {
    fn name(&self) -> &str {
        "search_knowledge"
    }

    fn description(&self) -> &str {
        "按相关度检索企业差旅知识库"
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .ok_or("缺少参数: query")?;
        let top_k = args
            .get("top_k")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_TOP_K);

        let results = self
            .retriever
            .search(query, top_k)
            .await
            .map_err(|e| e.to_string())?;

        if results.is_empty() {
            return Ok("未找到相关内容".to_string());
        }

        let mut output = String::from("搜索结果：\n");
        for (i, r) in results.iter().enumerate() {
            output.push_str(&format!(
                "\n{}. {}\n   来源: {}, 相似度: {:.2}\n",
                i + 1,
                r.content,
                r.source,
                r.score
            ));
        }
        Ok(output)
    }
}

/// 差旅政策查询工具
pub struct QueryTripPolicyTool {
    retriever: Arc<dyn Retriever>,
}

impl QueryTripPolicyTool {
    pub fn new(retriever: Arc<dyn Retriever>) -> Self {
        Self { retriever }
    }
}

#[async_trait]
impl Tool for QueryTripPolicyTool {
    fn name(&self) -> &str {
        "query_trip_policy"
    }

    fn description(&self) -> &str {
        "查询指定类型的差旅政策（差标、预算、报销等）"
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let policy_type = args
            .get("policy_type")
            .and_then(Value::as_str)
            .unwrap_or("差标");

        let results = self
            .retriever
            .search(&format!("什么是{}", policy_type), 1)
            .await
            .map_err(|e| e.to_string())?;

        match results.first() {
            Some(r) => Ok(r.content.clone()),
            None => Ok(format!("未找到关于{}的相关政策", policy_type)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::StaticRetriever;
    use serde_json::json;

    fn retriever() -> Arc<dyn Retriever> {
        Arc::new(StaticRetriever::with_builtin_policies())
    }

    #[tokio::test]
    async fn test_search_knowledge_formats_results() {
        let tool = SearchKnowledgeTool::new(retriever());
        let output = tool
            .execute(json!({"query": "差标", "top_k": 2}))
            .await
            .unwrap();
        assert!(output.starts_with("搜索结果："));
        assert!(output.contains("1. "));
        assert!(output.contains("来源: "));
    }

    #[tokio::test]
    async fn test_search_knowledge_requires_query() {
        let tool = SearchKnowledgeTool::new(retriever());
        let err = tool.execute(json!({})).await.unwrap_err();
        assert!(err.contains("query"));
    }

    #[tokio::test]
    async fn test_query_policy_defaults_to_standard() {
        let tool = QueryTripPolicyTool::new(retriever());
        let output = tool.execute(json!({})).await.unwrap();
        assert!(output.contains("差标"));
    }
}
