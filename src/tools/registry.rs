//! 工具提供方注册表
//!
//! 外部工具提供方（浏览器自动化、文件读写等）通过 ToolProviderRegistry 暴露：
//! 连接状态、连接请求与工具目录。LocalToolRegistry 为内存实现，用于离线运行与测试。

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 注册表访问错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unknown tool provider: {0}")]
    UnknownProvider(String),
    #[error("Failed to connect provider {provider}: {reason}")]
    ConnectFailed { provider: String, reason: String },
    #[error("Registry request failed: {0}")]
    Request(String),
}

/// 提供方连接状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub connected: bool,
}

/// 工具目录中的一项：工具名及其所属提供方
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub server: String,
}

/// 工具提供方注册表 trait
#[async_trait]
pub trait ToolProviderRegistry: Send + Sync {
    async fn list_statuses(&self) -> Result<HashMap<String, ProviderStatus>, RegistryError>;

    async fn connect(&self, provider: &str) -> Result<(), RegistryError>;

    async fn list_tools(&self) -> Result<Vec<ToolInfo>, RegistryError>;
}

#[derive(Debug, Default)]
struct LocalProvider {
    connected: bool,
    tools: Vec<String>,
    /// 连接请求失败次数（模拟连接不稳定）
    failing_connects: u32,
}

/// 内存版注册表：已连接的提供方才会把工具暴露到目录中
#[derive(Debug, Default)]
pub struct LocalToolRegistry {
    providers: Mutex<HashMap<String, LocalProvider>>,
}

impl LocalToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册提供方及其工具；connected 表示初始是否已连接
    pub fn register(&self, provider: &str, tools: &[&str], connected: bool) -> &Self {
        self.lock().insert(
            provider.to_string(),
            LocalProvider {
                connected,
                tools: tools.iter().map(|t| t.to_string()).collect(),
                failing_connects: 0,
            },
        );
        self
    }

    /// 接下来 n 次 connect 请求失败
    pub fn fail_next_connects(&self, provider: &str, n: u32) {
        if let Some(p) = self.lock().get_mut(provider) {
            p.failing_connects = n;
        }
    }

    /// 模拟连接中途断开
    pub fn disconnect(&self, provider: &str) {
        if let Some(p) = self.lock().get_mut(provider) {
            p.connected = false;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, LocalProvider>> {
        self.providers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ToolProviderRegistry for LocalToolRegistry {
    async fn list_statuses(&self) -> Result<HashMap<String, ProviderStatus>, RegistryError> {
        Ok(self
            .lock()
            .iter()
            .map(|(id, p)| (id.clone(), ProviderStatus { connected: p.connected }))
            .collect())
    }

    async fn connect(&self, provider: &str) -> Result<(), RegistryError> {
        let mut providers = self.lock();
        let p = providers
            .get_mut(provider)
            .ok_or_else(|| RegistryError::UnknownProvider(provider.to_string()))?;
        if p.failing_connects > 0 {
            p.failing_connects -= 1;
            return Err(RegistryError::ConnectFailed {
                provider: provider.to_string(),
                reason: "simulated failure".to_string(),
            });
        }
        p.connected = true;
        Ok(())
    }

    async fn list_tools(&self) -> Result<Vec<ToolInfo>, RegistryError> {
        let mut tools: Vec<ToolInfo> = self
            .lock()
            .iter()
            .filter(|(_, p)| p.connected)
            .flat_map(|(id, p)| {
                p.tools.iter().map(move |name| ToolInfo {
                    name: name.clone(),
                    server: id.clone(),
                })
            })
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tools)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_registry_exposes_tools_after_connect() {
        let registry = LocalToolRegistry::new();
        registry.register("playwright", &["browser_navigate", "browser_click"], false);
        assert!(registry.list_tools().await.unwrap().is_empty());

        registry.connect("playwright").await.unwrap();
        let tools = registry.list_tools().await.unwrap();
        assert_eq!(tools.len(), 2);
        assert!(tools.iter().all(|t| t.server == "playwright"));
    }

    #[tokio::test]
    async fn test_local_registry_unknown_provider() {
        let registry = LocalToolRegistry::new();
        let err = registry.connect("nope").await.unwrap_err();
        assert!(matches!(err, RegistryError::UnknownProvider(_)));
    }

    #[tokio::test]
    async fn test_local_registry_failing_connects() {
        let registry = LocalToolRegistry::new();
        registry.register("fs", &["read_file"], false);
        registry.fail_next_connects("fs", 1);
        assert!(registry.connect("fs").await.is_err());
        assert!(registry.connect("fs").await.is_ok());
        assert!(registry.list_statuses().await.unwrap()["fs"].connected);
    }
}
