//! 工具就绪门控
//!
//! 派发任务前确认所需工具提供方已连接且至少贡献了一个工具：
//! 查询状态 → 对未连接的提供方发起 connect → 有界轮询工具目录。
//! 目录缓存为进程级共享，任何组件可读，只有门控的刷新 / 连接会修改它。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::tools::{ProviderStatus, ToolInfo, ToolProviderRegistry};

/// 门控轮询参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessSettings {
    /// 轮询工具目录的最大次数
    pub poll_attempts: u32,
    /// 两次轮询之间的间隔
    pub poll_interval: Duration,
    /// 整体门控失败后再试一次前的等待
    pub gate_retry_delay: Duration,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            poll_attempts: 5,
            poll_interval: Duration::from_millis(1500),
            gate_retry_delay: Duration::from_millis(2000),
        }
    }
}

/// 工具目录缓存
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolCatalogue {
    pub statuses: HashMap<String, ProviderStatus>,
    pub tools: Vec<ToolInfo>,
    pub refreshed_at: Option<i64>,
}

impl ToolCatalogue {
    /// 尚未贡献任何工具的必需提供方
    pub fn missing<'a>(&self, required: &'a [String]) -> Vec<&'a str> {
        required
            .iter()
            .filter(|provider| !self.tools.iter().any(|t| &t.server == *provider))
            .map(String::as_str)
            .collect()
    }

    /// 缺失提供方附带原因：未连接，或已连接但尚无工具
    pub fn describe_missing(&self, required: &[String]) -> Vec<String> {
        self.missing(required)
            .into_iter()
            .map(|provider| {
                let connected = self.statuses.get(provider).map(|s| s.connected).unwrap_or(false);
                if connected {
                    format!("{} (no tools)", provider)
                } else {
                    format!("{} (not connected)", provider)
                }
            })
            .collect()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name.clone()).collect()
    }
}

#[derive(Clone)]
pub struct ReadinessGate {
    registry: Arc<dyn ToolProviderRegistry>,
    settings: ReadinessSettings,
    catalogue: Arc<RwLock<ToolCatalogue>>,
}

impl ReadinessGate {
    pub fn new(registry: Arc<dyn ToolProviderRegistry>, settings: ReadinessSettings) -> Self {
        Self {
            registry,
            settings,
            catalogue: Arc::new(RwLock::new(ToolCatalogue::default())),
        }
    }

    pub fn settings(&self) -> ReadinessSettings {
        self.settings
    }

    /// 当前缓存的目录快照
    pub async fn catalogue(&self) -> ToolCatalogue {
        self.catalogue.read().await.clone()
    }

    pub async fn tool_names(&self) -> Vec<String> {
        self.catalogue.read().await.tool_names()
    }

    /// 刷新连接状态
    pub async fn refresh_statuses(&self) -> HashMap<String, ProviderStatus> {
        let statuses = match self.registry.list_statuses().await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("Failed to query tool provider status: {}", e);
                HashMap::new()
            }
        };
        self.catalogue.write().await.statuses = statuses.clone();
        statuses
    }

    /// 刷新工具目录
    pub async fn refresh_tools(&self) -> Vec<ToolInfo> {
        let tools = match self.registry.list_tools().await {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!("Failed to list tools: {}", e);
                Vec::new()
            }
        };
        let mut catalogue = self.catalogue.write().await;
        catalogue.tools = tools.clone();
        catalogue.refreshed_at = Some(chrono::Utc::now().timestamp_millis());
        tools
    }

    /// 对未连接的必需提供方发起连接；连接失败只记录日志
    pub async fn connect_missing(&self, required: &[String]) {
        let statuses = self.refresh_statuses().await;
        for provider in required {
            let connected = statuses.get(provider).map(|s| s.connected).unwrap_or(false);
            if connected {
                continue;
            }
            tracing::info!(provider = %provider, "connecting tool provider");
            if let Err(e) = self.registry.connect(provider).await {
                tracing::warn!(provider = %provider, "connect failed: {}", e);
            }
        }
    }

    /// 单次门控：连接缺失的提供方并有界轮询，全部就绪返回 true
    pub async fn ensure_ready(&self, required: &[String]) -> bool {
        self.connect_missing(required).await;

        let attempts = self.settings.poll_attempts.max(1);
        for attempt in 1..=attempts {
            self.refresh_tools().await;
            let missing: Vec<String> = self
                .catalogue
                .read()
                .await
                .missing(required)
                .into_iter()
                .map(String::from)
                .collect();
            if missing.is_empty() {
                if attempt > 1 {
                    self.refresh_statuses().await;
                }
                return true;
            }
            tracing::debug!(attempt, ?missing, "tool providers not ready yet");
            if attempt < attempts {
                tokio::time::sleep(self.settings.poll_interval).await;
            }
        }
        // 连接之后的状态，供 describe_missing 区分原因
        self.refresh_statuses().await;
        false
    }

    /// 门控失败时等待 gate_retry_delay 再试一次（运行开始时使用）
    pub async fn ensure_ready_with_retry(&self, required: &[String]) -> bool {
        if self.ensure_ready(required).await {
            return true;
        }
        tracing::warn!(
            "Tool providers not ready, retrying in {:?}",
            self.settings.gate_retry_delay
        );
        tokio::time::sleep(self.settings.gate_retry_delay).await;
        self.ensure_ready(required).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::LocalToolRegistry;

    fn fast() -> ReadinessSettings {
        ReadinessSettings {
            poll_attempts: 3,
            poll_interval: Duration::from_millis(5),
            gate_retry_delay: Duration::from_millis(5),
        }
    }

    fn required(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_gate_connects_missing_provider() {
        let registry = Arc::new(LocalToolRegistry::new());
        registry.register("playwright", &["browser_navigate"], false);
        let gate = ReadinessGate::new(registry, fast());

        assert!(gate.ensure_ready(&required(&["playwright"])).await);
        let catalogue = gate.catalogue().await;
        assert_eq!(catalogue.tool_names(), vec!["browser_navigate".to_string()]);
        assert!(catalogue.refreshed_at.is_some());
    }

    #[tokio::test]
    async fn test_gate_closed_when_provider_unavailable() {
        let registry = Arc::new(LocalToolRegistry::new());
        registry.register("playwright", &["browser_navigate"], false);
        let gate = ReadinessGate::new(registry, fast());
        assert!(!gate.ensure_ready(&required(&["playwright", "filesystem"])).await);
    }

    #[tokio::test]
    async fn test_gate_retry_recovers_after_connect_failure() {
        let registry = Arc::new(LocalToolRegistry::new());
        registry.register("playwright", &["browser_navigate"], false);
        registry.fail_next_connects("playwright", 1);
        let gate = ReadinessGate::new(registry, fast());

        assert!(gate.ensure_ready_with_retry(&required(&["playwright"])).await);
    }

    #[tokio::test]
    async fn test_catalogue_describes_why_provider_missing() {
        let registry = Arc::new(LocalToolRegistry::new());
        registry.register("playwright", &["browser_navigate"], false);
        registry.register("filesystem", &[], false);
        let gate = ReadinessGate::new(registry, fast());

        let required = required(&["playwright", "filesystem", "search"]);
        assert!(!gate.ensure_ready(&required).await);
        let catalogue = gate.catalogue().await;
        assert_eq!(
            catalogue.describe_missing(&required),
            vec!["filesystem (no tools)".to_string(), "search (not connected)".to_string()]
        );
    }

    #[tokio::test]
    async fn test_gate_empty_requirements_ready() {
        let gate = ReadinessGate::new(Arc::new(LocalToolRegistry::new()), fast());
        assert!(gate.ensure_ready(&[]).await);
    }
}
