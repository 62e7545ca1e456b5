//! 流式聚合器
//!
//! 把任务收集器的状态通知与执行流程的原始数据块合并为对外事件序列，
//! 并支持把有限序列归并为最终结构化响应。对外线格式为 SSE：
//! 每个事件一行 `data: <json>\n\n`，流结束先发内部 done 事件，
//! 再发传输层哨兵 `[DONE]`，两者不可互换。

use std::pin::Pin;
use std::sync::Arc;

use futures_util::{stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::chain::collector::{SubscriptionId, TaskCollector};
use crate::chain::events::{TaskEvent, TaskEventKind};
use crate::intent::Lane;

/// 传输层结束哨兵：在内部 done 事件之后单独发送一次
pub const DONE_SENTINEL: &str = "[DONE]";

/// 对外事件（SSE 数据体，按 type 打标）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// 意图识别结果（每回合最先发出）
    Intent {
        intent: String,
        lane: Lane,
        confidence: f64,
    },
    /// 回复正文片段
    Text { content: String },
    /// 中间推理/过程说明
    Thought { content: String },
    /// 工具调用
    ToolUse { tool_name: String, tool_input: Value },
    /// 工具/任务结果
    ToolResult { task_id: String, content: Value },
    /// 无法识别的数据块（字符串形式兜底）
    Unknown { content: String },
    /// 错误（用户可见，带可读信息）
    Error { content: String },
    /// 终止事件：每个流恰好一条
    Done,
}

/// 执行流程产出的原始数据块
#[derive(Debug, Clone)]
pub enum RawChunk {
    /// 结构化事件：原样透传
    Event(StreamEvent),
    /// 纯文本：包装为 text 事件
    Text(String),
    /// 其他：包装为 unknown 事件
    Other(Value),
}

impl RawChunk {
    fn into_event(self) -> StreamEvent {
        match self {
            RawChunk::Event(ev) => ev,
            RawChunk::Text(content) => StreamEvent::Text { content },
            RawChunk::Other(value) => StreamEvent::Unknown {
                content: value.to_string(),
            },
        }
    }
}

/// 最终结构化响应（有限序列的归并结果）
#[derive(Debug, Clone, Serialize)]
pub struct FinalResponse {
    /// 所有 text 事件内容按序拼接
    pub message: String,
    /// thought 类事件（按序）
    pub thought_chain: Vec<StreamEvent>,
    /// 工具名，首次出现顺序，重复保留
    pub tools_used: Vec<String>,
    pub metadata: serde_json::Map<String, Value>,
}

/// 任务事件 -> 对外事件的固定映射
pub fn task_event_to_stream(event: &TaskEvent) -> StreamEvent {
    match event {
        TaskEvent::Created { task_id, name } => StreamEvent::Thought {
            content: format!("创建任务 {}: {}", task_id, name),
        },
        TaskEvent::ToolUse {
            tool_name,
            tool_input,
            ..
        } => StreamEvent::ToolUse {
            tool_name: tool_name.clone(),
            tool_input: tool_input.clone(),
        },
        TaskEvent::Result { task_id, result } => StreamEvent::ToolResult {
            task_id: task_id.clone(),
            content: result.clone(),
        },
        TaskEvent::Completed { task_id } => StreamEvent::Thought {
            content: format!("任务 {} 全部完成", task_id),
        },
        TaskEvent::Failed { task_id, error } => StreamEvent::Error {
            content: format!("任务 {} 失败: {}", task_id, error),
        },
    }
}

/// 收集器 -> chunk 通道的桥接订阅
///
/// 由产出流程持有：把五种任务事件映射为结构化 chunk 推入本回合通道；
/// Drop 时退订并释放发送端，通道随产出流程结束而关闭。
pub struct TrackerBridge {
    collector: Arc<TaskCollector>,
    handles: Vec<(TaskEventKind, SubscriptionId)>,
}

impl TrackerBridge {
    pub fn new<E: Send + 'static>(
        collector: Arc<TaskCollector>,
        tx: mpsc::Sender<Result<RawChunk, E>>,
    ) -> Self {
        const KINDS: [TaskEventKind; 5] = [
            TaskEventKind::Created,
            TaskEventKind::ToolUse,
            TaskEventKind::Result,
            TaskEventKind::Completed,
            TaskEventKind::Failed,
        ];

        let mut handles = Vec::with_capacity(KINDS.len());
        for kind in KINDS {
            let bridge_tx = tx.clone();
            let id = collector.subscribe(
                kind,
                Arc::new(move |ev: &TaskEvent| {
                    let chunk = RawChunk::Event(task_event_to_stream(ev));
                    if bridge_tx.try_send(Ok(chunk)).is_err() {
                        tracing::warn!(kind = ?ev.kind(), "chunk channel full or closed, task event dropped");
                    }
                }),
            );
            handles.push((kind, id));
        }

        Self { collector, handles }
    }
}

impl Drop for TrackerBridge {
    fn drop(&mut self) {
        for (kind, id) in self.handles.drain(..) {
            self.collector.unsubscribe(kind, id);
        }
    }
}

/// 流式聚合器：与任务收集器同回合创建、同回合丢弃
pub struct Streamer {
    collector: Arc<TaskCollector>,
}

impl Streamer {
    pub fn new(collector: Arc<TaskCollector>) -> Self {
        Self { collector }
    }

    pub fn collector(&self) -> &Arc<TaskCollector> {
        &self.collector
    }

    /// 把原始 chunk 源转换为惰性对外事件序列（单次消费）
    ///
    /// 透传规则：结构化块原样转发，文本块包装为 text，其余包装为 unknown。
    /// 源出错时恰好发出一条 error；无论成功、失败还是取消，
    /// 退出路径上都恰好补一条终止 done。
    pub fn stream<S, E>(
        source: S,
        cancel: CancellationToken,
    ) -> impl Stream<Item = StreamEvent> + Send
    where
        S: Stream<Item = Result<RawChunk, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        enum Phase<S> {
            Open(Pin<Box<S>>, CancellationToken),
            Closing,
            Closed,
        }

        stream::unfold(Phase::Open(Box::pin(source), cancel), |phase| async move {
            match phase {
                Phase::Open(mut src, cancel) => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Some((StreamEvent::Done, Phase::Closed)),
                        next = src.next() => match next {
                            Some(Ok(chunk)) => {
                                Some((chunk.into_event(), Phase::Open(src, cancel)))
                            }
                            Some(Err(e)) => Some((
                                StreamEvent::Error {
                                    content: e.to_string(),
                                },
                                Phase::Closing,
                            )),
                            None => Some((StreamEvent::Done, Phase::Closed)),
                        },
                    }
                }
                Phase::Closing => Some((StreamEvent::Done, Phase::Closed)),
                Phase::Closed => None,
            }
        })
    }

    /// 把有限事件序列归并为最终响应
    ///
    /// 空输入得到空 message 与空列表；tools_used 按首次出现顺序、重复保留。
    pub fn aggregate(&self, chunks: &[StreamEvent]) -> FinalResponse {
        let mut message = String::new();
        let mut thought_chain = Vec::new();
        let mut tools_used = Vec::new();

        for chunk in chunks {
            match chunk {
                StreamEvent::Text { content } => message.push_str(content),
                StreamEvent::Thought { .. } => thought_chain.push(chunk.clone()),
                StreamEvent::ToolUse { tool_name, .. } => tools_used.push(tool_name.clone()),
                _ => {}
            }
        }

        let mut metadata = serde_json::Map::new();
        metadata.insert(
            "task_status".to_string(),
            serde_json::to_value(self.collector.list_tasks()).unwrap_or(Value::Null),
        );

        FinalResponse {
            message,
            thought_chain,
            tools_used,
            metadata,
        }
    }
}

/// 序列化单个事件为 SSE 帧（UTF-8 原样编码，非 ASCII 不转义）
pub fn format_event(event: &StreamEvent) -> Result<String, serde_json::Error> {
    Ok(format!("data: {}\n\n", serde_json::to_string(event)?))
}

/// 传输层哨兵帧
pub fn sse_done_frame() -> String {
    format!("data: {}\n\n", DONE_SENTINEL)
}

/// 把事件流写入传输通道
///
/// 传输失败时中止转发，尽力补发一条 error 帧，并始终尝试 done 帧；
/// 正常结束时（流的末尾就是内部 done 事件）再补发哨兵帧。
pub async fn pump_sse<S>(events: S, sink: mpsc::Sender<String>)
where
    S: Stream<Item = StreamEvent> + Send,
{
    futures_util::pin_mut!(events);

    while let Some(event) = events.next().await {
        let frame = match format_event(&event) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "event serialization failed, frame skipped");
                continue;
            }
        };
        if sink.send(frame).await.is_err() {
            tracing::warn!("transport closed, aborting stream");
            if let Ok(frame) = format_event(&StreamEvent::Error {
                content: "传输通道中断".to_string(),
            }) {
                let _ = sink.try_send(frame);
            }
            if let Ok(frame) = format_event(&StreamEvent::Done) {
                let _ = sink.try_send(frame);
            }
            break;
        }
    }

    let _ = sink.send(sse_done_frame()).await;
}
