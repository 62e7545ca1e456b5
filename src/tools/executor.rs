//! 工具执行器
//!
//! 在注册表之上对每次调用施加超时，并把失败统一映射为 AgentError
//! （ToolTimeout / ToolExecutionFailed）；每次调用落一条结构化审计日志。

use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::agents::AgentError;
use crate::tools::ToolRegistry;

/// 审计日志中参数预览的最大字符数
const ARGS_PREVIEW_CHARS: usize = 200;

/// 工具执行器
pub struct ToolExecutor {
    registry: ToolRegistry,
    call_timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, call_timeout: Duration) -> Self {
        Self {
            registry,
            call_timeout,
        }
    }

    /// 执行指定工具；超时返回 ToolTimeout，工具返回 Err 则转为 ToolExecutionFailed
    pub async fn execute(
        &self,
        tool_name: &str,
        args: serde_json::Value,
    ) -> Result<String, AgentError> {
        let started = Instant::now();
        let args_preview = preview(&args);

        let outcome = match timeout(self.call_timeout, self.registry.execute(tool_name, args)).await
        {
            Ok(Ok(content)) => Ok(content),
            Ok(Err(e)) => Err(AgentError::ToolExecutionFailed(e)),
            Err(_) => Err(AgentError::ToolTimeout(tool_name.to_string())),
        };

        let verdict = match &outcome {
            Ok(_) => "ok",
            Err(AgentError::ToolTimeout(_)) => "timeout",
            Err(_) => "error",
        };
        tracing::info!(
            target: "tool_audit",
            tool = tool_name,
            outcome = verdict,
            duration_ms = started.elapsed().as_millis() as u64,
            args = %args_preview,
            "tool call finished"
        );

        outcome
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }
}

fn preview(args: &serde_json::Value) -> String {
    let rendered = args.to_string();
    if rendered.chars().count() > ARGS_PREVIEW_CHARS {
        let mut p: String = rendered.chars().take(ARGS_PREVIEW_CHARS).collect();
        p.push_str("...");
        p
    } else {
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::registry::Tool;
    use async_trait::async_trait;
    use serde_json::json;

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "永远超时"
        }
        async fn execute(&self, _args: serde_json::Value) -> Result<String, String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }
    }

    struct FailTool;

    #[async_trait]
    impl Tool for FailTool {
        fn name(&self) -> &str {
            "fail"
        }
        fn description(&self) -> &str {
            "总是失败"
        }
        async fn execute(&self, _args: serde_json::Value) -> Result<String, String> {
            Err("内部故障".to_string())
        }
    }

    #[tokio::test]
    async fn test_timeout_maps_to_tool_timeout() {
        let mut registry = ToolRegistry::new();
        registry.register(SlowTool);
        // 零超时：首次轮询即超时，不真等
        let executor = ToolExecutor::new(registry, Duration::ZERO);

        let err = executor.execute("slow", json!({})).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolTimeout(ref name) if name == "slow"));
    }

    #[tokio::test]
    async fn test_tool_error_maps_to_execution_failed() {
        let mut registry = ToolRegistry::new();
        registry.register(FailTool);
        let executor = ToolExecutor::new(registry, Duration::from_secs(5));

        let err = executor.execute("fail", json!({})).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolExecutionFailed(ref msg) if msg.contains("内部故障")));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_execution_failure() {
        let executor = ToolExecutor::new(ToolRegistry::new(), Duration::from_secs(5));
        let err = executor.execute("不存在", json!({})).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolExecutionFailed(ref msg) if msg.contains("未注册的工具")));
    }
}
