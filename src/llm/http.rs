//! HTTP 后端 Agent 客户端
//!
//! 向后端聊天端点 POST `{"message", "agentMode", "tools"}`，期望返回 `{"response", "metadata"}`。
//! 不设置请求超时：远端负责失败或自行处理挂起。

use async_trait::async_trait;
use serde::Serialize;

use crate::llm::{AgentClient, AgentReply, DispatchError, SendOptions};

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    #[serde(flatten)]
    options: &'a SendOptions,
}

/// 后端 Agent 客户端：持有 reqwest::Client、端点地址与可选 Bearer Token
pub struct HttpAgentClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpAgentClient {
    pub fn new(base_url: &str, chat_path: &str, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: join_url(base_url, chat_path),
            api_key,
        }
    }

}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn send(&self, prompt: &str, options: SendOptions) -> Result<AgentReply, DispatchError> {
        let body = ChatRequest {
            message: prompt,
            options: &options,
        };
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DispatchError::Status {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<AgentReply>()
            .await
            .map_err(|e| DispatchError::InvalidResponse(e.to_string()))
    }
}
