//! 执行日志：只追加、单写者
//!
//! 由控制器 actor 独占写入；新条目同时广播给订阅者（实时展示）。
//! 超过容量时丢弃最旧的条目。

use std::collections::VecDeque;

use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub timestamp: i64,
    pub level: LogLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// 工具所属提供方
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp_millis(),
            level,
            task_id: None,
            server: None,
            tool: None,
            status: None,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }

    pub fn for_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_tool(mut self, server: Option<String>, tool: impl Into<String>, status: Option<String>) -> Self {
        self.server = server;
        self.tool = Some(tool.into());
        self.status = status;
        self
    }

    /// 单行文本形式：`[server] tool (status) message`
    pub fn render(&self) -> String {
        let mut line = String::new();
        if let Some(server) = &self.server {
            line.push_str(&format!("[{}] ", server));
        }
        if let Some(tool) = &self.tool {
            line.push_str(tool);
            if let Some(status) = &self.status {
                line.push_str(&format!(" ({})", status));
            }
            line.push(' ');
        }
        line.push_str(&self.message);
        line
    }
}

pub struct ExecutionLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    /// 每次追加 / 清空递增，供快照判断是否需要重建
    revision: u64,
    live_tx: broadcast::Sender<LogEntry>,
}

impl ExecutionLog {
    pub fn new(capacity: usize) -> Self {
        let (live_tx, _) = broadcast::channel(256);
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
            revision: 0,
            live_tx,
        }
    }

    pub fn append(&mut self, entry: LogEntry) {
        match entry.level {
            LogLevel::Error => tracing::warn!(task_id = ?entry.task_id, "{}", entry.render()),
            _ => tracing::info!(task_id = ?entry.task_id, "{}", entry.render()),
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        let _ = self.live_tx.send(entry.clone());
        self.entries.push_back(entry);
        self.revision += 1;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.revision += 1;
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 最后 n 条（按追加顺序）
    pub fn tail(&self, n: usize) -> Vec<LogEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.live_tx.subscribe()
    }

    /// 供句柄在 actor 之外订阅
    pub fn sender(&self) -> broadcast::Sender<LogEntry> {
        self.live_tx.clone()
    }
}
