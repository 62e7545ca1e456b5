//! 对话阶段状态机与动态 Prompt 组装
//!
//! 阶段状态归会话所有、跨回合存活；识别出意图后推进阶段，
//! Prompt 按「阶段指导语 + 已收集信息 + 对话历史 + 最新输入」定序拼装。

pub mod prompt_builder;
pub mod stage;

pub use prompt_builder::PromptBuilder;
pub use stage::ConversationStage;
