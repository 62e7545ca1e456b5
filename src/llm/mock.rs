//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 可预置脚本化回复按序弹出；脚本耗尽后回显最后一条 User 消息，
//! 便于本地跑通完整对话流程。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;

use crate::llm::{LlmClient, LlmError, TokenStream};
use crate::memory::{Message, Role};

/// Mock 客户端：按序返回预置回复，耗尽后回显用户输入
#[derive(Debug, Default)]
pub struct MockLlmClient {
    scripted: Mutex<VecDeque<String>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置一组按序返回的回复
    pub fn with_responses(responses: Vec<impl Into<String>>) -> Self {
        Self {
            scripted: Mutex::new(responses.into_iter().map(Into::into).collect()),
        }
    }

    /// 追加一条脚本化回复
    pub fn push_response(&self, response: impl Into<String>) {
        self.scripted.lock().unwrap().push_back(response.into());
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        if let Some(scripted) = self.scripted.lock().unwrap().pop_front() {
            return Ok(scripted);
        }

        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        Ok(format!("收到您的请求：{}", last_user))
    }

    async fn complete_stream(&self, messages: &[Message]) -> Result<TokenStream, LlmError> {
        let content = self.complete(messages).await?;
        Ok(Box::pin(stream::iter(vec![Ok(content)])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_responses_in_order() {
        let llm = MockLlmClient::with_responses(vec!["一", "二"]);
        let msgs = [Message::user("x")];
        assert_eq!(llm.complete(&msgs).await.unwrap(), "一");
        assert_eq!(llm.complete(&msgs).await.unwrap(), "二");
        // 脚本耗尽后回显
        assert!(llm.complete(&msgs).await.unwrap().contains("x"));
    }
}
