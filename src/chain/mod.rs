//! 思考链核心：任务收集器与流式聚合器
//!
//! 每个请求回合创建一对 TaskCollector + Streamer，回合结束即丢弃；
//! 任务树与事件均不持久化，也不跨回合共享。

pub mod collector;
pub mod events;
pub mod streamer;

pub use collector::{SubscriptionId, Task, TaskCollector, TaskId, TaskStatus};
pub use events::{TaskEvent, TaskEventKind};
pub use streamer::{
    format_event, pump_sse, sse_done_frame, FinalResponse, RawChunk, StreamEvent, Streamer,
    TrackerBridge, DONE_SENTINEL,
};
