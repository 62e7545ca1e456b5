//! 记忆层：LLM 消息类型与会话级追加日志

pub mod conversation;
pub mod session_log;

pub use conversation::{Message, Role};
pub use session_log::{InMemorySessionLog, LogEntry, LogKind, SessionLog};
