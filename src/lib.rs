//! Caravan - Rust 差旅智能体编排层
//!
//! 模块划分：
//! - **agents**: 主规划智能体与子智能体（行程规划 / 知识库问答）
//! - **chain**: 思考链核心（任务收集器 + 流式聚合器）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **dialogue**: 对话阶段状态机与动态 Prompt 组装
//! - **intent**: 双车道意图路由（规则快车道 / LLM 慢车道）
//! - **knowledge**: 检索后端抽象与内置政策库
//! - **llm**: LLM 客户端抽象（外部后端 / Mock）
//! - **memory**: 会话级追加日志与消息类型
//! - **tools**: 工具箱（行程 / 知识查询）与执行器

pub mod agents;
pub mod chain;
pub mod config;
pub mod dialogue;
pub mod intent;
pub mod knowledge;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod tools;

pub use agents::{bootstrap, AgentError, MainAgent};
