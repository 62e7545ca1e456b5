//! 慢车道：LLM 意图识别
//!
//! 用至多最近 3 条上下文拼有界 Prompt，调用模型后从回复文本中提取
//! 第一个配平的顶层 JSON 对象（容忍前后散文）。解析失败降级为
//! unknown 结果，绝不向调用方抛错。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::intent::{Classifier, IntentResult, Lane, UNKNOWN_INTENT};
use crate::llm::LlmClient;
use crate::memory::{LogEntry, Message};

/// Prompt 拼入的上下文条数（默认值，可由配置覆盖）
const INTENT_CONTEXT_TURNS: usize = 3;
/// 单条上下文截断长度（字符）
const CONTEXT_PREVIEW_CHARS: usize = 100;
/// 降级结果中原始回复的截断长度（字符）
const REASONING_PREVIEW_CHARS: usize = 100;

/// 字符级安全截断（不会切在多字节字符中间）
fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// LLM 慢车道分类器
pub struct LlmClassifier {
    llm: Arc<dyn LlmClient>,
    context_turns: usize,
}

impl LlmClassifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            context_turns: INTENT_CONTEXT_TURNS,
        }
    }

    /// 设置 Prompt 拼入的上下文条数
    pub fn with_context_turns(mut self, turns: usize) -> Self {
        self.context_turns = turns;
        self
    }

    /// 识别复杂意图；任何失败都降级为 unknown 结果
    pub async fn recognize_complex(&self, query: &str, context: &[LogEntry]) -> IntentResult {
        let prompt = self.build_prompt(query, context);
        let messages = [Message::user(prompt)];

        let response = match self.llm.complete(&messages).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "slow-lane model call failed, degrading to unknown");
                return IntentResult::unknown(format!("意图识别调用失败: {}", e));
            }
        };

        parse_intent_response(&response)
    }

    fn build_prompt(&self, query: &str, context: &[LogEntry]) -> String {
        let skip = context.len().saturating_sub(self.context_turns);
        let context_str = context[skip..]
            .iter()
            .map(|e| {
                format!(
                    "{}: {}",
                    e.kind.role().as_str(),
                    truncate_chars(&e.content, CONTEXT_PREVIEW_CHARS)
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"你是一个意图识别专家。请分析用户的查询，理解其真实意图。

上一轮对话：
{context_str}

当前用户查询：{query}

请进行两步推理：
1. 先思考用户的意图是什么
2. 然后输出 JSON 格式的识别结果

意图类型包括：
- trip_planner: 行程规划
- apply: 订单申请
- rag_agent: 差旅政策/知识查询
- info_query: 信息查询
- collect: 事项收集

输出格式（JSON）：
{{
    "intent": "意图类型",
    "confidence": 0.0-1.0,
    "reasoning": "推理过程",
    "entities": {{"实体信息"}}
}}

请直接输出 JSON，不要其他内容。"#
        )
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn recognize(&self, query: &str, context: &[LogEntry]) -> Option<IntentResult> {
        Some(self.recognize_complex(query, context).await)
    }
}

/// 解析模型回复：提取 JSON 对象并读取 intent / confidence / reasoning / entities
fn parse_intent_response(response: &str) -> IntentResult {
    let Some(json_str) = extract_first_json_object(response) else {
        return IntentResult::unknown(truncate_chars(response, REASONING_PREVIEW_CHARS));
    };

    let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(&json_str) else {
        return IntentResult::unknown(truncate_chars(response, REASONING_PREVIEW_CHARS));
    };

    let intent = fields
        .get("intent")
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN_INTENT)
        .to_string();
    let confidence = fields
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);
    let reasoning = fields
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let entities = match fields.get("entities") {
        Some(Value::Object(map)) => map.clone(),
        _ => serde_json::Map::new(),
    };

    IntentResult {
        intent,
        confidence,
        reasoning,
        entities,
        lane: Lane::Slow,
        pattern: None,
    }
}

/// 找出文本中第一个配平且可解析的顶层 JSON 对象
///
/// 逐个候选起点尝试：跟踪括号深度与字符串转义，配平后交给 serde 验证，
/// 无效则继续向后找（容忍正文里出现非 JSON 的花括号）。
fn extract_first_json_object(text: &str) -> Option<String> {
    for (start, c) in text.char_indices() {
        if c != '{' {
            continue;
        }
        let Some(end) = balanced_object_end(text, start) else {
            continue;
        };
        let candidate = &text[start..=end];
        if matches!(serde_json::from_str::<Value>(candidate), Ok(Value::Object(_))) {
            return Some(candidate.to_string());
        }
    }
    None
}

/// 从 start（指向 '{'）开始找配平的 '}' 字节位置
fn balanced_object_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}
