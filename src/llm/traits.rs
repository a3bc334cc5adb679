//! 外部 Agent 派发抽象
//!
//! 所有后端（HTTP 后端 / Mock）实现 AgentClient：send（单次阻塞请求，无流式）。
//! agent_mode=true 时由远端 Agent 调用工具并在 metadata 中回报执行步骤。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 派发失败（传输层或 Agent 侧错误）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Agent returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid agent response: {0}")]
    InvalidResponse(String),
}

/// 派发选项：是否以 Agent 模式执行、可用工具名列表
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOptions {
    pub agent_mode: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
}

impl SendOptions {
    /// 普通文本请求（不调用工具）
    pub fn plain() -> Self {
        Self::default()
    }

    pub fn agent(tools: Vec<String>) -> Self {
        Self {
            agent_mode: true,
            tools: Some(tools),
        }
    }
}

/// 远端 Agent 回报的单个执行步骤
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStep {
    pub tool_name: String,
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub locator: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl ExecutionStep {
    /// 步骤是否被报告为失败（status 含 fail / error）
    pub fn is_failure(&self) -> bool {
        self.status
            .as_deref()
            .map(|s| {
                let s = s.to_ascii_lowercase();
                s.contains("fail") || s.contains("error")
            })
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyMetadata {
    #[serde(default)]
    pub tool_calls_executed: u32,
    #[serde(default)]
    pub execution_steps: Vec<ExecutionStep>,
    #[serde(default)]
    pub tokens_used: Option<u64>,
}

/// 派发结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentReply {
    pub response: String,
    #[serde(default)]
    pub metadata: Option<ReplyMetadata>,
}

impl AgentReply {
    pub fn text(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            metadata: None,
        }
    }
}

/// 外部 Agent 客户端：单次请求 / 响应
#[async_trait]
pub trait AgentClient: Send + Sync {
    async fn send(&self, prompt: &str, options: SendOptions) -> Result<AgentReply, DispatchError>;
}
