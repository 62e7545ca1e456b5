//! 行程规划子智能体
//!
//! 槽位齐备（至少有目的地）时调用 plan_trip 工具生成草案，
//! 再由 LLM 整理为面向用户的答复；槽位不足则引导用户逐步补充。

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::agents::{AgentError, ChunkEmitter};
use crate::chain::TaskCollector;
use crate::llm::LlmClient;
use crate::memory::{LogKind, Message, SessionLog};
use crate::tools::ToolExecutor;

/// 槽位键的中英文别名（慢车道实体可能用任一命名）
const SLOT_ALIASES: &[(&str, &[&str])] = &[
    ("destination", &["destination", "目的地"]),
    ("start_date", &["start_date", "出发时间"]),
    ("end_date", &["end_date", "返回时间"]),
    ("purpose", &["purpose", "出差目的"]),
    ("budget", &["budget", "预算"]),
];

pub struct TripPlannerAgent {
    llm: Arc<dyn LlmClient>,
    executor: Arc<ToolExecutor>,
    log: Arc<dyn SessionLog>,
}

impl TripPlannerAgent {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        executor: Arc<ToolExecutor>,
        log: Arc<dyn SessionLog>,
    ) -> Self {
        Self { llm, executor, log }
    }

    /// 流式规划：工具草案（可选）+ LLM 组稿，返回最终答复文本
    pub(crate) async fn stream_plan(
        &self,
        user_input: &str,
        collected: &BTreeMap<String, Value>,
        parent_task: &str,
        collector: &TaskCollector,
        emitter: &ChunkEmitter,
    ) -> Result<String, AgentError> {
        let args = slot_args(collected);
        let draft = if args.contains_key("destination") {
            let args = Value::Object(args);
            let subtask = collector.begin_tool_call(parent_task, "plan_trip", args.clone());
            match self.executor.execute("plan_trip", args).await {
                Ok(output) => {
                    collector.record_result(&subtask, json!(output.clone()));
                    Some(output)
                }
                Err(e) => {
                    // 工具失败只标记叶子任务，不中断组稿
                    collector.fail_task(&subtask, e.to_string());
                    None
                }
            }
        } else {
            None
        };

        let prompt = match &draft {
            Some(draft) => format!(
                "你是行程规划专家。以下是系统生成的行程草案：\n{}\n\n用户输入：{}\n\n请把草案整理为面向用户的行程答复。",
                draft, user_input
            ),
            None => format!(
                "你是行程规划专家。当前行程信息还不完整（至少需要目的地）。\n\n用户输入：{}\n\n请循序渐进地引导用户补充目的地、出发/返回时间、出差目的与预算，不要一次性询问所有问题。",
                user_input
            ),
        };

        let reply = self.llm.complete(&[Message::user(prompt)]).await?;
        emitter.text_chunked(&reply).await?;
        self.log
            .append("trip_planner", LogKind::AgentNote, &reply)
            .await;
        Ok(reply)
    }
}

/// 从已收集信息中按别名取槽位，组装工具参数
fn slot_args(collected: &BTreeMap<String, Value>) -> serde_json::Map<String, Value> {
    let mut args = serde_json::Map::new();
    for (canonical, aliases) in SLOT_ALIASES {
        if let Some(value) = aliases.iter().find_map(|a| collected.get(*a)) {
            args.insert(canonical.to_string(), value.clone());
        }
    }
    args
}
