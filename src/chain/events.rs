//! 任务事件：收集器发布、订阅者消费
//!
//! 每个事件种类有静态定形的载荷，避免字符串分发；事件只在
//! 本回合收集器存活期间存在，不落盘。

use serde::Serialize;
use serde_json::Value;

use crate::chain::collector::TaskId;

/// 事件种类（订阅键）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskEventKind {
    Created,
    ToolUse,
    Result,
    Completed,
    Failed,
}

/// 任务事件（按种类定形的载荷）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TaskEvent {
    /// 任务已创建
    Created { task_id: TaskId, name: String },
    /// 开始调用工具（task_id 为子任务）
    ToolUse {
        task_id: TaskId,
        tool_name: String,
        tool_input: Value,
    },
    /// 任务产出结果并转为 DONE
    Result { task_id: TaskId, result: Value },
    /// 所有子任务完成，父任务合拢
    Completed { task_id: TaskId },
    /// 任务失败
    Failed { task_id: TaskId, error: String },
}

impl TaskEvent {
    pub fn kind(&self) -> TaskEventKind {
        match self {
            TaskEvent::Created { .. } => TaskEventKind::Created,
            TaskEvent::ToolUse { .. } => TaskEventKind::ToolUse,
            TaskEvent::Result { .. } => TaskEventKind::Result,
            TaskEvent::Completed { .. } => TaskEventKind::Completed,
            TaskEvent::Failed { .. } => TaskEventKind::Failed,
        }
    }

    pub fn task_id(&self) -> &TaskId {
        match self {
            TaskEvent::Created { task_id, .. }
            | TaskEvent::ToolUse { task_id, .. }
            | TaskEvent::Result { task_id, .. }
            | TaskEvent::Completed { task_id }
            | TaskEvent::Failed { task_id, .. } => task_id,
        }
    }
}
