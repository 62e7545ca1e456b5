//! LLM 层：客户端抽象与实现（外部后端由使用方注入 / Mock）

pub mod mock;
pub mod traits;

pub use mock::MockLlmClient;
pub use traits::{LlmClient, LlmError};
