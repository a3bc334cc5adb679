//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `RALPH__*` 覆盖（双下划线表示嵌套，如 `RALPH__RETRY__MAX_ATTEMPTS=0`）。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::core::{ExecutorSettings, RetryPolicy};
use crate::tools::ReadinessSettings;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub agent: AgentSection,
    pub tools: ToolsSection,
    pub readiness: ReadinessSection,
    pub executor: ExecutorSection,
    pub retry: RetrySection,
    pub log: LogSection,
}

/// [app] 段
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 提示词模板目录（`<name>.txt`），未设置时按 config/prompts 查找
    pub prompts_dir: Option<PathBuf>,
}

/// [agent] 段：后端 Agent 服务
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// 未设置时使用 Mock 客户端（离线）
    pub base_url: Option<String>,
    pub chat_path: String,
    /// 存放 API Key 的环境变量名
    pub api_key_env: String,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            base_url: None,
            chat_path: "/api/chat".to_string(),
            api_key_env: "RALPH_API_KEY".to_string(),
        }
    }
}

impl AgentSection {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok().filter(|k| !k.is_empty())
    }
}

/// [tools] 段：工具提供方注册表
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 未设置时使用内存注册表
    pub registry_url: Option<String>,
    /// 派发任务前必须就绪的提供方
    pub required_providers: Vec<String>,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            registry_url: None,
            required_providers: vec!["playwright".to_string()],
        }
    }
}

/// [readiness] 段：门控轮询
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReadinessSection {
    pub poll_attempts: u32,
    pub poll_interval_ms: u64,
    pub gate_retry_delay_ms: u64,
}

impl Default for ReadinessSection {
    fn default() -> Self {
        Self {
            poll_attempts: 5,
            poll_interval_ms: 1500,
            gate_retry_delay_ms: 2000,
        }
    }
}

impl ReadinessSection {
    pub fn settings(&self) -> ReadinessSettings {
        ReadinessSettings {
            poll_attempts: self.poll_attempts.max(1),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            gate_retry_delay: Duration::from_millis(self.gate_retry_delay_ms),
        }
    }
}

/// [executor] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutorSection {
    pub settle_delay_ms: u64,
    pub not_ready_delay_ms: u64,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            settle_delay_ms: 2000,
            not_ready_delay_ms: 3000,
        }
    }
}

impl ExecutorSection {
    pub fn settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            not_ready_delay: Duration::from_millis(self.not_ready_delay_ms),
        }
    }
}

/// [retry] 段；max_attempts = 0 表示不设上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 3000,
            multiplier: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

impl RetrySection {
    pub fn policy(&self) -> RetryPolicy {
        let base_delay = Duration::from_millis(self.base_delay_ms);
        if self.max_attempts == 0 {
            return RetryPolicy::unbounded(base_delay);
        }
        RetryPolicy {
            max_attempts: Some(self.max_attempts),
            base_delay,
            multiplier: self.multiplier,
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

/// [log] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// 执行日志保留条数
    pub capacity: usize,
}

impl Default for LogSection {
    fn default() -> Self {
        Self { capacity: 2000 }
    }
}

/// 从 config 目录加载配置，环境变量 RALPH__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 RALPH__*
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default"] {
        if Path::new(&format!("{}.toml", name)).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path).required(false));
        } else {
            tracing::warn!("Config file {} not found, ignored", path.display());
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("RALPH")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("tools.required_providers"),
    );

    builder.build()?.try_deserialize()
}
