//! 会话级追加日志
//!
//! 核心只消费该接口来重建上下文窗口；持久化由外部实现负责，
//! 这里提供内存版参考实现供测试与单进程部署使用。

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::conversation::Role;

/// 日志条目种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    UserMessage,
    AssistantMessage,
    /// 意图识别结果（JSON 文本）
    IntentResult,
    /// 子智能体的过程性记录
    AgentNote,
}

impl LogKind {
    /// 渲染上下文时使用的角色
    pub fn role(&self) -> Role {
        match self {
            LogKind::UserMessage => Role::User,
            LogKind::AssistantMessage => Role::Assistant,
            LogKind::IntentResult | LogKind::AgentNote => Role::System,
        }
    }
}

/// 单条会话日志
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// 写入方（main / trip_planner / rag_agent / user）
    pub agent_name: String,
    pub kind: LogKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// 会话日志接口：追加与按序读取
///
/// 实现方自行处理存储失败（记录日志并吞掉），核心不感知存储错误。
#[async_trait]
pub trait SessionLog: Send + Sync {
    /// 追加一条记录
    async fn append(&self, agent_name: &str, kind: LogKind, content: &str);

    /// 读取最近 limit 条（时间正序）；agent_name 为 None 时不过滤写入方
    async fn read(&self, agent_name: Option<&str>, limit: usize) -> Vec<LogEntry>;
}

/// 内存版会话日志
#[derive(Default)]
pub struct InMemorySessionLog {
    entries: RwLock<Vec<LogEntry>>,
}

impl InMemorySessionLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionLog for InMemorySessionLog {
    async fn append(&self, agent_name: &str, kind: LogKind, content: &str) {
        let entry = LogEntry {
            agent_name: agent_name.to_string(),
            kind,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        self.entries.write().unwrap().push(entry);
    }

    async fn read(&self, agent_name: Option<&str>, limit: usize) -> Vec<LogEntry> {
        let entries = self.entries.read().unwrap();
        let filtered: Vec<LogEntry> = entries
            .iter()
            .filter(|e| agent_name.map_or(true, |n| e.agent_name == n))
            .cloned()
            .collect();
        let skip = filtered.len().saturating_sub(limit);
        filtered.into_iter().skip(skip).collect()
    }
}
