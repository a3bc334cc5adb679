//! HTTP 后端工具注册表
//!
//! 后端暴露三个端点：
//! - GET  `{base}/api/mcp/status`            → `{"<provider>": {"connected": bool}}`
//! - POST `{base}/api/mcp/connect/{provider}` → 2xx 表示成功
//! - GET  `{base}/api/mcp/tools`             → `[{"name", "server"}]`

use std::collections::HashMap;

use async_trait::async_trait;

use crate::llm::http::join_url;
use crate::tools::{ProviderStatus, RegistryError, ToolInfo, ToolProviderRegistry};

pub struct HttpToolRegistry {
    client: reqwest::Client,
    base_url: String,
}

impl HttpToolRegistry {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, RegistryError> {
        let response = self
            .client
            .get(join_url(&self.base_url, path))
            .send()
            .await
            .map_err(|e| RegistryError::Request(e.to_string()))?
            .error_for_status()
            .map_err(|e| RegistryError::Request(e.to_string()))?;
        response
            .json::<T>()
            .await
            .map_err(|e| RegistryError::Request(e.to_string()))
    }
}

#[async_trait]
impl ToolProviderRegistry for HttpToolRegistry {
    async fn list_statuses(&self) -> Result<HashMap<String, ProviderStatus>, RegistryError> {
        self.get_json("api/mcp/status").await
    }

    async fn connect(&self, provider: &str) -> Result<(), RegistryError> {
        let url = join_url(&self.base_url, &format!("api/mcp/connect/{}", provider));
        let response = self
            .client
            .post(url)
            .send()
            .await
            .map_err(|e| RegistryError::ConnectFailed {
                provider: provider.to_string(),
                reason: e.to_string(),
            })?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(RegistryError::ConnectFailed {
                provider: provider.to_string(),
                reason: format!("status {}", response.status()),
            })
        }
    }

    async fn list_tools(&self) -> Result<Vec<ToolInfo>, RegistryError> {
        self.get_json("api/mcp/tools").await
    }
}
