//! Mock Agent 客户端（用于测试与离线演示，无需后端）
//!
//! 按顺序消费预置的应答脚本；脚本耗尽后回显 prompt。所有请求都会被记录，便于断言。

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{AgentClient, AgentReply, DispatchError, SendOptions};

/// 记录下来的一次请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub prompt: String,
    pub options: SendOptions,
}

/// Mock 客户端：脚本化应答 + 请求记录
#[derive(Debug, Default)]
pub struct MockAgentClient {
    script: Mutex<VecDeque<Result<AgentReply, DispatchError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
    latency: Option<Duration>,
}

impl MockAgentClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每次请求前等待的模拟延迟
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn push_reply(&self, reply: AgentReply) -> &Self {
        self.lock_script().push_back(Ok(reply));
        self
    }

    pub fn push_error(&self, error: DispatchError) -> &Self {
        self.lock_script().push_back(Err(error));
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// 普通（非 Agent 模式）请求，如总结
    pub fn plain_requests(&self) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| !r.options.agent_mode)
            .collect()
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<AgentReply, DispatchError>>> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl AgentClient for MockAgentClient {
    async fn send(&self, prompt: &str, options: SendOptions) -> Result<AgentReply, DispatchError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest {
                prompt: prompt.to_string(),
                options,
            });
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let scripted = self.lock_script().pop_front();
        scripted.unwrap_or_else(|| Ok(AgentReply::text(format!("Echo from Mock: {}", prompt))))
    }
}
