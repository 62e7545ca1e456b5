//! 动态 Prompt 构建器
//!
//! 持有会话的阶段与已收集信息（写穿覆盖，仅显式 reset 清空）。

use std::collections::BTreeMap;

use serde_json::Value;

use crate::dialogue::stage::ConversationStage;
use crate::intent::IntentResult;
use crate::memory::LogEntry;

/// 主 Prompt 拼入的对话历史条数
const DEFAULT_HISTORY_WINDOW: usize = 5;

/// Prompt 构建器：一个会话一个实例，跨回合存活
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    stage: ConversationStage,
    collected: BTreeMap<String, Value>,
    history_window: usize,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self {
            stage: ConversationStage::Greeting,
            collected: BTreeMap::new(),
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    pub fn stage(&self) -> ConversationStage {
        self.stage
    }

    pub fn set_stage(&mut self, stage: ConversationStage) {
        self.stage = stage;
    }

    /// 按识别出的意图推进阶段并返回新阶段
    pub fn advance(&mut self, intent: &str) -> ConversationStage {
        self.stage = ConversationStage::for_intent(intent);
        self.stage
    }

    /// 记录一条槽位信息；同键后写覆盖先写
    pub fn update_info(&mut self, key: impl Into<String>, value: Value) {
        self.collected.insert(key.into(), value);
    }

    /// 已收集信息快照
    pub fn collected_info(&self) -> BTreeMap<String, Value> {
        self.collected.clone()
    }

    /// 显式重置：清空已收集信息并回到问候阶段
    pub fn reset(&mut self) {
        self.stage = ConversationStage::Greeting;
        self.collected.clear();
    }

    /// 构建主智能体 Prompt
    ///
    /// 固定顺序：阶段指导语、已收集信息（key: value 行）、
    /// 最近 N 条历史（role: content 行）、最新输入。
    pub fn build_main_prompt(&self, user_input: &str, context: &[LogEntry]) -> String {
        let stage_prompt = self.stage.guidance();

        let collected = if self.collected.is_empty() {
            String::new()
        } else {
            let mut block = String::from("\n已收集的信息:\n");
            for (k, v) in &self.collected {
                block.push_str(&format!("- {}: {}\n", k, render_value(v)));
            }
            block
        };

        let skip = context.len().saturating_sub(self.history_window);
        let context_str = context[skip..]
            .iter()
            .map(|e| format!("{}: {}", e.kind.role().as_str(), e.content))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "{stage_prompt}\n\n{collected}\n\n对话历史：\n{context_str}\n\n用户最新输入：{user_input}\n\n请根据当前阶段处理用户输入，并输出你的响应。"
        )
    }

    /// 构建意图识别 Prompt
    ///
    /// 快车道已命中时给出简短的「路由到子智能体」指令；
    /// 否则给出完整的慢车道分类指令（列出五种意图）。
    pub fn build_intent_prompt(&self, user_input: &str, rule_match: Option<&IntentResult>) -> String {
        match rule_match {
            Some(hit) => format!(
                "用户输入：{}\n\n规则匹配结果：{}（模式「{}」，置信度 {:.1}）\n\n请直接路由到对应的子智能体。",
                user_input,
                hit.intent,
                hit.pattern.as_deref().unwrap_or("-"),
                hit.confidence,
            ),
            None => format!(
                "请分析以下用户输入的意图：\n\n用户输入：{}\n\n意图类型：\n- trip_planner: 行程规划\n- apply: 订单申请\n- rag_agent: 差旅政策/知识查询\n- info_query: 信息查询\n- collect: 事项收集\n\n请进行推理并输出结构化的意图识别结果。",
                user_input,
            ),
        }
    }
}

/// 槽位值渲染：字符串去引号，其余用 JSON 文本
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
