//! 快车道：规则表匹配
//!
//! 两趟扫描：先整句精确匹配（置信度 1.0），再子串包含匹配（0.8）；
//! 每趟都按表序取第一个命中。表序是可观测契约，跨运行必须稳定。

use async_trait::async_trait;

use crate::intent::{Classifier, IntentResult, Lane};
use crate::memory::LogEntry;
use serde_json::Map;

/// 快车道规则表：(模式, 意图)，顺序即优先级
const FAST_LANE_PATTERNS: &[(&str, &str)] = &[
    // 行程规划
    ("为我规划行程", "trip_planner"),
    ("开始规划", "trip_planner"),
    ("帮我规划", "trip_planner"),
    ("规划行程", "trip_planner"),
    // 申请
    ("为我提申请", "apply"),
    ("申请订单", "apply"),
    ("提申请", "apply"),
    // 知识库查询
    ("查差旅政策", "rag_agent"),
    ("查政策", "rag_agent"),
    ("差标", "rag_agent"),
    ("什么是差标", "rag_agent"),
    ("差旅规定", "rag_agent"),
    // 信息查询
    ("查询", "info_query"),
    ("帮我查", "info_query"),
    // 事项收集
    ("收集事项", "collect"),
    ("确认信息", "collect"),
];

/// 规则分类器：纯函数、无副作用、结果可复现
#[derive(Debug, Default)]
pub struct RuleClassifier;

impl RuleClassifier {
    pub fn new() -> Self {
        Self
    }

    /// 匹配规则表；未命中返回 None（调用方据此转慢车道）
    pub fn classify(&self, query: &str) -> Option<IntentResult> {
        let query = query.trim();

        // 第一趟：精确匹配
        for (pattern, intent) in FAST_LANE_PATTERNS {
            if *pattern == query {
                return Some(Self::hit(intent, 1.0, pattern));
            }
        }

        // 第二趟：子串包含
        for (pattern, intent) in FAST_LANE_PATTERNS {
            if query.contains(pattern) {
                return Some(Self::hit(intent, 0.8, pattern));
            }
        }

        None
    }

    fn hit(intent: &str, confidence: f64, pattern: &str) -> IntentResult {
        IntentResult {
            intent: intent.to_string(),
            confidence,
            reasoning: String::new(),
            entities: Map::new(),
            lane: Lane::Fast,
            pattern: Some(pattern.to_string()),
        }
    }
}

#[async_trait]
impl Classifier for RuleClassifier {
    async fn recognize(&self, query: &str, _context: &[LogEntry]) -> Option<IntentResult> {
        self.classify(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_full_confidence() {
        let c = RuleClassifier::new();
        let result = c.classify("差标").unwrap();
        assert_eq!(result.intent, "rag_agent");
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.lane, Lane::Fast);
        assert_eq!(result.pattern.as_deref(), Some("差标"));
    }

    #[test]
    fn test_substring_match_lower_confidence() {
        let c = RuleClassifier::new();
        let result = c.classify("请帮我查一下差标政策吗").unwrap();
        assert_eq!(result.intent, "rag_agent");
        assert_eq!(result.confidence, 0.8);
    }

    #[test]
    fn test_no_match_routes_to_slow_lane() {
        let c = RuleClassifier::new();
        assert!(c.classify("今天天气怎么样").is_none());
    }

    #[test]
    fn test_table_order_decides_overlapping_patterns() {
        let c = RuleClassifier::new();
        // 同时包含「差标」(rag_agent) 与「查询」(info_query)：
        // 表中靠前的「差标」胜出，与子串在句中的位置无关
        assert_eq!(c.classify("查询差标").unwrap().intent, "rag_agent");
        assert_eq!(c.classify("差标查询").unwrap().intent, "rag_agent");
    }

    #[test]
    fn test_whitespace_trimmed_before_exact_match() {
        let c = RuleClassifier::new();
        let result = c.classify("  差标  ").unwrap();
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn test_classify_is_deterministic() {
        let c = RuleClassifier::new();
        let a = c.classify("帮我规划一次出差");
        let b = c.classify("帮我规划一次出差");
        assert_eq!(a, b);
        assert_eq!(a.unwrap().intent, "trip_planner");
    }
}
