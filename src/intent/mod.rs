//! 双车道意图路由
//!
//! 快车道（规则表匹配，不调模型）与慢车道（LLM 分析）都实现 Classifier，
//! 路由器先问快车道，未命中再走慢车道；慢车道永远给出结果（解析失败降级为 unknown）。

pub mod classifier;
pub mod recognizer;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::memory::LogEntry;

pub use classifier::RuleClassifier;
pub use recognizer::LlmClassifier;

/// 未知意图标签（慢车道降级结果）
pub const UNKNOWN_INTENT: &str = "unknown";

/// 识别车道
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    /// 规则快车道
    Fast,
    /// LLM 慢车道
    Slow,
}

/// 意图识别结果：每个用户回合产出一次，即用即弃
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent: String,
    /// [0, 1]
    pub confidence: f64,
    pub reasoning: String,
    pub entities: Map<String, Value>,
    pub lane: Lane,
    /// 快车道命中的规则模式
    pub pattern: Option<String>,
}

impl IntentResult {
    /// 慢车道降级结果：unknown / 0.0 / 原始文本截断
    pub fn unknown(reasoning: impl Into<String>) -> Self {
        Self {
            intent: UNKNOWN_INTENT.to_string(),
            confidence: 0.0,
            reasoning: reasoning.into(),
            entities: Map::new(),
            lane: Lane::Slow,
            pattern: None,
        }
    }
}

/// 意图标签的中文说明
pub fn intent_description(intent: &str) -> &'static str {
    match intent {
        "trip_planner" => "行程规划",
        "apply" => "订单申请",
        "rag_agent" => "知识库查询",
        "info_query" => "信息查询",
        "collect" => "事项收集",
        _ => "未知意图",
    }
}

/// 分类器接口：快慢两条车道各自实现，便于在测试中替换慢车道
#[async_trait]
pub trait Classifier: Send + Sync {
    /// 本车道无法判定时返回 None
    async fn recognize(&self, query: &str, context: &[LogEntry]) -> Option<IntentResult>;
}

/// 意图路由器：快车道未命中则走慢车道
pub struct IntentRouter {
    fast: Arc<dyn Classifier>,
    slow: Arc<dyn Classifier>,
    enable_fast_lane: bool,
}

impl IntentRouter {
    pub fn new(fast: Arc<dyn Classifier>, slow: Arc<dyn Classifier>) -> Self {
        Self {
            fast,
            slow,
            enable_fast_lane: true,
        }
    }

    /// 关闭快车道后所有输入都交给慢车道
    pub fn with_fast_lane_enabled(mut self, enabled: bool) -> Self {
        self.enable_fast_lane = enabled;
        self
    }

    /// 路由一条用户输入；总会给出一个 IntentResult
    pub async fn route(&self, query: &str, context: &[LogEntry]) -> IntentResult {
        if self.enable_fast_lane {
            if let Some(result) = self.fast.recognize(query, context).await {
                return result;
            }
        }

        match self.slow.recognize(query, context).await {
            Some(result) => result,
            None => IntentResult::unknown(query.chars().take(100).collect::<String>()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedClassifier {
        result: Option<IntentResult>,
        calls: AtomicUsize,
    }

    impl FixedClassifier {
        fn new(result: Option<IntentResult>) -> Arc<Self> {
            Arc::new(Self {
                result,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Classifier for FixedClassifier {
        async fn recognize(&self, _query: &str, _context: &[LogEntry]) -> Option<IntentResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn fast_hit() -> IntentResult {
        IntentResult {
            intent: "rag_agent".to_string(),
            confidence: 1.0,
            reasoning: String::new(),
            entities: Map::new(),
            lane: Lane::Fast,
            pattern: Some("差标".to_string()),
        }
    }

    #[tokio::test]
    async fn test_route_fast_hit_skips_slow_lane() {
        let fast = FixedClassifier::new(Some(fast_hit()));
        let slow = FixedClassifier::new(Some(IntentResult::unknown("不应触达")));
        let router = IntentRouter::new(fast.clone(), slow.clone());

        let result = router.route("差标", &[]).await;
        assert_eq!(result.intent, "rag_agent");
        assert_eq!(slow.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_route_miss_falls_to_slow_lane() {
        let fast = FixedClassifier::new(None);
        let slow = FixedClassifier::new(Some(IntentResult::unknown("慢车道结果")));
        let router = IntentRouter::new(fast, slow.clone());

        let result = router.route("今天天气怎么样", &[]).await;
        assert_eq!(result.intent, UNKNOWN_INTENT);
        assert_eq!(slow.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_route_fast_lane_disabled() {
        let fast = FixedClassifier::new(Some(fast_hit()));
        let slow = FixedClassifier::new(Some(IntentResult::unknown("慢车道结果")));
        let router = IntentRouter::new(fast.clone(), slow).with_fast_lane_enabled(false);

        let result = router.route("差标", &[]).await;
        assert_eq!(result.intent, UNKNOWN_INTENT);
        assert_eq!(fast.calls.load(Ordering::SeqCst), 0);
    }
}
