//! 主规划智能体
//!
//! 每个回合：意图路由（intent 事件最先发出）-> 推进对话阶段 ->
//! 路由到子智能体或按阶段 Prompt 直接作答 -> 任务树状态经桥接
//! 进入对外事件流。收集器与聚合器都是回合私有的，回合结束即丢弃。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{stream, Stream, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::agents::{AgentError, ChunkEmitter, RagAgent, TripPlannerAgent};
use crate::chain::{FinalResponse, RawChunk, StreamEvent, Streamer, TaskCollector, TrackerBridge};
use crate::config::AppConfig;
use crate::dialogue::{ConversationStage, PromptBuilder};
use crate::intent::{
    intent_description, Classifier, IntentRouter, LlmClassifier, RuleClassifier,
};
use crate::knowledge::Retriever;
use crate::llm::LlmClient;
use crate::memory::{LogEntry, LogKind, Message, SessionLog};
use crate::tools::{
    BookTicketTool, CollectTripInfoTool, PlanTripTool, QueryTripPolicyTool, SearchKnowledgeTool,
    ToolExecutor, ToolRegistry,
};

/// 回合 chunk 通道容量
const CHUNK_QUEUE_CAPACITY: usize = 64;

/// 主规划智能体：一个会话一个实例，阶段状态跨回合存活
pub struct MainAgent {
    session_id: String,
    cfg: AppConfig,
    log: Arc<dyn SessionLog>,
    router: Arc<IntentRouter>,
    builder: Arc<Mutex<PromptBuilder>>,
    llm: Arc<dyn LlmClient>,
    executor: Arc<ToolExecutor>,
}

impl MainAgent {
    pub fn new(
        session_id: impl Into<String>,
        cfg: AppConfig,
        llm: Arc<dyn LlmClient>,
        retriever: Arc<dyn Retriever>,
        log: Arc<dyn SessionLog>,
    ) -> Self {
        let mut registry = ToolRegistry::new();
        registry.register(PlanTripTool);
        registry.register(BookTicketTool);
        registry.register(CollectTripInfoTool);
        registry.register(SearchKnowledgeTool::new(retriever.clone()));
        registry.register(QueryTripPolicyTool::new(retriever));
        let executor = Arc::new(ToolExecutor::new(
            registry,
            Duration::from_secs(cfg.tools.tool_timeout_secs),
        ));

        let fast: Arc<dyn Classifier> = Arc::new(RuleClassifier::new());
        let slow: Arc<dyn Classifier> = Arc::new(
            LlmClassifier::new(llm.clone()).with_context_turns(cfg.app.intent_context_turns),
        );
        let router = Arc::new(
            IntentRouter::new(fast, slow).with_fast_lane_enabled(cfg.intent.enable_fast_lane),
        );

        let builder = Arc::new(Mutex::new(
            PromptBuilder::new().with_history_window(cfg.app.history_window),
        ));

        Self {
            session_id: session_id.into(),
            cfg,
            log,
            router,
            builder,
            llm,
            executor,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn current_stage(&self) -> ConversationStage {
        self.builder.lock().unwrap().stage()
    }

    /// 显式重置对话阶段与已收集信息
    pub fn reset_dialogue(&self) {
        self.builder.lock().unwrap().reset();
    }

    /// 处理用户消息（流式）：返回对外事件序列，意图事件最先、done 收尾
    pub fn stream_chat(
        &self,
        message: &str,
        cancel: CancellationToken,
    ) -> impl Stream<Item = StreamEvent> + Send + 'static {
        self.run_turn(message, cancel).1
    }

    /// 处理用户消息（非流式）：把本回合事件序列归并为最终响应
    pub async fn chat(&self, message: &str) -> FinalResponse {
        let (collector, events) = self.run_turn(message, CancellationToken::new());
        let events: Vec<StreamEvent> = events.collect().await;
        Streamer::new(collector).aggregate(&events)
    }

    /// 启动一个回合：创建回合私有的收集器 + 桥接 + 产出任务
    fn run_turn(
        &self,
        message: &str,
        cancel: CancellationToken,
    ) -> (
        Arc<TaskCollector>,
        impl Stream<Item = StreamEvent> + Send + 'static,
    ) {
        let collector = Arc::new(
            TaskCollector::new()
                .with_recursive_completion(self.cfg.tracker.recursive_completion)
                .with_channel_capacity(self.cfg.tracker.channel_capacity),
        );

        let (tx, rx) = mpsc::channel::<Result<RawChunk, AgentError>>(CHUNK_QUEUE_CAPACITY);
        let bridge = TrackerBridge::new(collector.clone(), tx.clone());
        let emitter = ChunkEmitter::new(tx.clone(), self.cfg.stream.chunk_chars, cancel.clone());

        let turn = TurnContext {
            session_id: self.session_id.clone(),
            cfg: self.cfg.clone(),
            log: self.log.clone(),
            router: self.router.clone(),
            builder: self.builder.clone(),
            llm: self.llm.clone(),
            executor: self.executor.clone(),
            collector: collector.clone(),
        };
        let message = message.to_string();

        tokio::spawn(async move {
            // 桥接订阅持有到产出结束，随后退订并释放发送端
            let _bridge = bridge;
            match turn.run(&message, &emitter).await {
                Ok(()) | Err(AgentError::Canceled) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "turn failed");
                    let _ = tx.send(Err(e)).await;
                }
            }
        });

        let source = stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|c| (c, rx)) });
        (collector, Streamer::stream(source, cancel))
    }
}

/// 回合执行上下文（克隆自 MainAgent，供产出任务独占使用）
struct TurnContext {
    session_id: String,
    cfg: AppConfig,
    log: Arc<dyn SessionLog>,
    router: Arc<IntentRouter>,
    builder: Arc<Mutex<PromptBuilder>>,
    llm: Arc<dyn LlmClient>,
    executor: Arc<ToolExecutor>,
    collector: Arc<TaskCollector>,
}

impl TurnContext {
    async fn run(&self, message: &str, emitter: &ChunkEmitter) -> Result<(), AgentError> {
        // 上下文不含本条输入：先读再记
        let context = self.log.read(None, self.cfg.app.history_window).await;

        let intent = self.router.route(message, &context).await;
        emitter
            .event(StreamEvent::Intent {
                intent: intent.intent.clone(),
                lane: intent.lane,
                confidence: intent.confidence,
            })
            .await?;

        self.log.append("user", LogKind::UserMessage, message).await;
        if let Ok(serialized) = serde_json::to_string(&intent) {
            self.log
                .append("main", LogKind::IntentResult, &serialized)
                .await;
        }

        let stage = {
            let mut builder = self.builder.lock().unwrap();
            for (key, value) in &intent.entities {
                builder.update_info(key.clone(), value.clone());
            }
            builder.advance(&intent.intent)
        };
        tracing::info!(
            session = %self.session_id,
            intent = %intent.intent,
            lane = ?intent.lane,
            stage = ?stage,
            "intent routed"
        );

        let root = self.collector.create_task(
            format!("处理用户请求: {}", intent_description(&intent.intent)),
            None,
        );

        let reply = match intent.intent.as_str() {
            "trip_planner" => {
                let agent = TripPlannerAgent::new(
                    self.llm.clone(),
                    self.executor.clone(),
                    self.log.clone(),
                );
                let collected = self.builder.lock().unwrap().collected_info();
                agent
                    .stream_plan(message, &collected, &root, &self.collector, emitter)
                    .await?
            }
            "rag_agent" => {
                let agent =
                    RagAgent::new(self.llm.clone(), self.executor.clone(), self.log.clone());
                agent
                    .stream_query(message, &root, &self.collector, emitter)
                    .await?
            }
            _ => self.respond_by_stage(message, &context, &root, emitter).await?,
        };

        self.log
            .append("main", LogKind::AssistantMessage, &reply)
            .await;
        Ok(())
    }

    /// 无子智能体的意图：按当前阶段 Prompt 直接流式作答
    async fn respond_by_stage(
        &self,
        message: &str,
        context: &[LogEntry],
        root: &str,
        emitter: &ChunkEmitter,
    ) -> Result<String, AgentError> {
        let prompt = self
            .builder
            .lock()
            .unwrap()
            .build_main_prompt(message, context);
        let messages = [Message::user(prompt)];

        let mut tokens = self.llm.complete_stream(&messages).await?;
        let mut reply = String::new();
        while let Some(token) = tokens.next().await {
            let token = token?;
            emitter.text_chunked(&token).await?;
            reply.push_str(&token);
        }

        self.collector
            .record_result(root, json!({ "message": reply.clone() }));
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::Lane;
    use crate::knowledge::StaticRetriever;
    use crate::llm::MockLlmClient;
    use crate::memory::InMemorySessionLog;

    fn agent_with(llm: MockLlmClient) -> MainAgent {
        MainAgent::new(
            "session_test",
            AppConfig::default(),
            Arc::new(llm),
            Arc::new(StaticRetriever::with_builtin_policies()),
            Arc::new(InMemorySessionLog::new()),
        )
    }

    fn concat_text(events: &[StreamEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Text { content } => Some(content.as_str()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_fast_lane_turn_streams_tool_trace() {
        let llm = MockLlmClient::with_responses(vec!["根据企业政策，差标即差旅费用标准。"]);
        let agent = agent_with(llm);

        let events: Vec<StreamEvent> = agent
            .stream_chat("差标", CancellationToken::new())
            .collect()
            .await;

        // intent 事件最先发出，且走了快车道
        assert!(matches!(
            &events[0],
            StreamEvent::Intent { intent, lane: Lane::Fast, confidence }
                if intent == "rag_agent" && *confidence == 1.0
        ));

        // 工具调用轨迹可见
        assert!(events.iter().any(|e| matches!(
            e,
            StreamEvent::ToolUse { tool_name, .. } if tool_name == "search_knowledge"
        )));
        assert!(events
            .iter()
            .any(|e| matches!(e, StreamEvent::ToolResult { .. })));

        // 子任务完成带动根任务合拢
        assert!(events.iter().any(|e| matches!(
            e,
            StreamEvent::Thought { content } if content.contains("全部完成")
        )));

        // 恰好一条 done，且在最后
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, StreamEvent::Done))
                .count(),
            1
        );
        assert_eq!(events.last(), Some(&StreamEvent::Done));

        assert_eq!(concat_text(&events), "根据企业政策，差标即差旅费用标准。");
        assert_eq!(agent.current_stage(), ConversationStage::PolicyQuery);
    }

    #[tokio::test]
    async fn test_slow_lane_turn_uses_llm_classifier() {
        // 第一条脚本给慢车道意图识别，第二条给回复生成
        let llm = MockLlmClient::with_responses(vec![
            r#"{"intent": "collect", "confidence": 0.85, "reasoning": "用户在补充信息", "entities": {"目的地": "杭州"}}"#,
            "好的，已记录目的地杭州。",
        ]);
        let agent = agent_with(llm);

        let events: Vec<StreamEvent> = agent
            .stream_chat("今天天气怎么样", CancellationToken::new())
            .collect()
            .await;

        assert!(matches!(
            &events[0],
            StreamEvent::Intent { intent, lane: Lane::Slow, .. } if intent == "collect"
        ));
        assert_eq!(agent.current_stage(), ConversationStage::InfoCollect);
        assert_eq!(concat_text(&events), "好的，已记录目的地杭州。");

        // 慢车道抽取的实体进入槽位
        let collected = agent.builder.lock().unwrap().collected_info();
        assert_eq!(
            collected.get("目的地").and_then(serde_json::Value::as_str),
            Some("杭州")
        );
    }

    #[tokio::test]
    async fn test_chat_aggregates_final_response() {
        let llm = MockLlmClient::with_responses(vec!["差标即差旅费用标准。"]);
        let agent = agent_with(llm);

        let response = agent.chat("查差旅政策").await;
        assert_eq!(response.message, "差标即差旅费用标准。");
        assert_eq!(response.tools_used, vec!["search_knowledge"]);
        assert!(!response.thought_chain.is_empty());
        assert!(response.metadata.contains_key("task_status"));
    }

    #[tokio::test]
    async fn test_canceled_turn_still_terminates_with_done() {
        let agent = agent_with(MockLlmClient::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let events: Vec<StreamEvent> = agent.stream_chat("差标", cancel).collect().await;
        assert_eq!(events, vec![StreamEvent::Done]);
    }

    #[tokio::test]
    async fn test_stage_state_survives_across_turns() {
        let llm = MockLlmClient::with_responses(vec!["已开始规划。", "继续收集信息。"]);
        let agent = agent_with(llm);

        let _ = agent.chat("规划行程").await;
        assert_eq!(agent.current_stage(), ConversationStage::InfoCollect);

        // 未映射意图把阶段重置回问候
        let llm_events: Vec<StreamEvent> = agent
            .stream_chat("随便聊聊", CancellationToken::new())
            .collect()
            .await;
        assert!(!llm_events.is_empty());
        assert_eq!(agent.current_stage(), ConversationStage::Greeting);

        agent.reset_dialogue();
        assert_eq!(agent.current_stage(), ConversationStage::Greeting);
    }
}
