//! 智能体层：主规划智能体与子智能体
//!
//! MainAgent 按会话持有阶段状态，每个回合独占一对
//! TaskCollector + Streamer；子智能体通过工具执行器落地任务树。

pub mod main_agent;
pub mod rag_agent;
pub mod trip_planner;

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::chain::{RawChunk, StreamEvent};
use crate::config::{load_config, AppConfig};
use crate::knowledge::{KnowledgeError, Retriever, StaticRetriever};
use crate::llm::{LlmClient, LlmError, MockLlmClient};
use crate::memory::{InMemorySessionLog, SessionLog};

pub use main_agent::MainAgent;
pub use rag_agent::RagAgent;
pub use trip_planner::TripPlannerAgent;

/// 智能体运行错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Knowledge base error: {0}")]
    Knowledge(#[from] KnowledgeError),

    /// 回合被取消或消费端已断开
    #[error("Turn canceled")]
    Canceled,
}

/// 回合内的 chunk 发送器：统一做取消检查与打字式分段
pub(crate) struct ChunkEmitter {
    tx: mpsc::Sender<Result<RawChunk, AgentError>>,
    chunk_chars: usize,
    cancel: CancellationToken,
}

impl ChunkEmitter {
    pub(crate) fn new(
        tx: mpsc::Sender<Result<RawChunk, AgentError>>,
        chunk_chars: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            tx,
            chunk_chars: chunk_chars.max(1),
            cancel,
        }
    }

    /// 发送一个结构化事件
    pub(crate) async fn event(&self, event: StreamEvent) -> Result<(), AgentError> {
        self.send(RawChunk::Event(event)).await
    }

    /// 按 chunk_chars 分段发送文本（模拟打字效果）
    pub(crate) async fn text_chunked(&self, text: &str) -> Result<(), AgentError> {
        let chars: Vec<char> = text.chars().collect();
        for piece in chars.chunks(self.chunk_chars) {
            self.send(RawChunk::Text(piece.iter().collect())).await?;
        }
        Ok(())
    }

    async fn send(&self, chunk: RawChunk) -> Result<(), AgentError> {
        if self.cancel.is_cancelled() {
            return Err(AgentError::Canceled);
        }
        self.tx
            .send(Ok(chunk))
            .await
            .map_err(|_| AgentError::Canceled)
    }
}

/// 组装默认运行时：配置 + Mock LLM + 内置政策库 + 内存会话日志
///
/// 真实 LLM / 知识库由嵌入方实现相应 trait 后用 MainAgent::new 注入。
pub fn bootstrap(config_path: Option<PathBuf>) -> anyhow::Result<MainAgent> {
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    tracing::warn!("No external LLM wired, using Mock LLM");
    let llm: Arc<dyn LlmClient> = Arc::new(MockLlmClient::new());
    let retriever: Arc<dyn Retriever> = Arc::new(StaticRetriever::with_builtin_policies());
    let log: Arc<dyn SessionLog> = Arc::new(InMemorySessionLog::new());
    let session_id = format!("session_{}", uuid::Uuid::new_v4());

    Ok(MainAgent::new(session_id, cfg, llm, retriever, log))
}
