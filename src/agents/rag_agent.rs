//! 知识库问答子智能体
//!
//! 先经 search_knowledge 工具检索，再由 LLM 结合检索结果作答；
//! 检索失败时只标记叶子任务失败，答复降级为说明知识库不可用。

use std::sync::Arc;

use serde_json::json;

use crate::agents::{AgentError, ChunkEmitter};
use crate::chain::TaskCollector;
use crate::llm::LlmClient;
use crate::memory::{LogKind, Message, SessionLog};
use crate::tools::ToolExecutor;

/// 检索条数
const RAG_TOP_K: usize = 3;

pub struct RagAgent {
    llm: Arc<dyn LlmClient>,
    executor: Arc<ToolExecutor>,
    log: Arc<dyn SessionLog>,
}

impl RagAgent {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        executor: Arc<ToolExecutor>,
        log: Arc<dyn SessionLog>,
    ) -> Self {
        Self { llm, executor, log }
    }

    /// 流式问答：检索 + LLM 组稿，返回最终答复文本
    pub(crate) async fn stream_query(
        &self,
        user_input: &str,
        parent_task: &str,
        collector: &TaskCollector,
        emitter: &ChunkEmitter,
    ) -> Result<String, AgentError> {
        let args = json!({ "query": user_input, "top_k": RAG_TOP_K });
        let subtask = collector.begin_tool_call(parent_task, "search_knowledge", args.clone());

        let knowledge = match self.executor.execute("search_knowledge", args).await {
            Ok(output) => {
                collector.record_result(&subtask, json!(output.clone()));
                Some(output)
            }
            Err(e) => {
                collector.fail_task(&subtask, e.to_string());
                None
            }
        };

        let prompt = match &knowledge {
            Some(knowledge) => format!(
                "你是企业差旅知识库助手。请结合检索结果回答用户问题；检索结果中没有的内容要明确告知用户。\n\n检索结果：\n{}\n\n用户问题：{}",
                knowledge, user_input
            ),
            None => format!(
                "你是企业差旅知识库助手。知识库暂时不可用，请向用户说明情况并建议稍后再试。\n\n用户问题：{}",
                user_input
            ),
        };

        let reply = self.llm.complete(&[Message::user(prompt)]).await?;
        emitter.text_chunked(&reply).await?;
        self.log.append("rag_agent", LogKind::AgentNote, &reply).await;
        Ok(reply)
    }
}
