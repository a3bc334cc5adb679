//! Headless 运行时装配
//!
//! 按配置构建 Agent 客户端、工具注册表、就绪门控、执行器与控制器，
//! 供 CLI 与集成测试共用。未配置后端地址时使用 Mock 客户端与内存注册表（离线运行）。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::{ExecutionController, Session, SummarySynthesizer, TaskExecutor};
use crate::llm::{AgentClient, HttpAgentClient, MockAgentClient};
use crate::plan::PlanGenerator;
use crate::prompts::PromptSet;
use crate::tools::{HttpToolRegistry, LocalToolRegistry, ReadinessGate, ToolProviderRegistry};

/// 离线模式下内存注册表为每个必需提供方暴露的工具
const OFFLINE_TOOLS: &[&str] = &["browser_navigate", "browser_click", "browser_type", "browser_snapshot"];

/// 预构建的运行时组件
pub struct AgentComponents {
    pub agent: Arc<dyn AgentClient>,
    pub gate: ReadinessGate,
    pub prompts: Arc<PromptSet>,
    pub generator: PlanGenerator,
    pub session: Session,
}

pub fn create_agent_client(cfg: &AppConfig) -> Arc<dyn AgentClient> {
    match cfg.agent.base_url.as_deref() {
        Some(url) => {
            tracing::info!(url, "using HTTP agent backend");
            Arc::new(HttpAgentClient::new(url, &cfg.agent.chat_path, cfg.agent.api_key()))
        }
        None => {
            tracing::warn!("agent.base_url not set, using mock agent client");
            Arc::new(MockAgentClient::new())
        }
    }
}

pub fn create_tool_registry(cfg: &AppConfig) -> Arc<dyn ToolProviderRegistry> {
    match cfg.tools.registry_url.as_deref() {
        Some(url) => Arc::new(HttpToolRegistry::new(url)),
        None => {
            let registry = LocalToolRegistry::new();
            for provider in &cfg.tools.required_providers {
                registry.register(provider, OFFLINE_TOOLS, false);
            }
            Arc::new(registry)
        }
    }
}

/// 用给定的客户端与注册表装配（测试注入 Mock 时使用）
pub fn assemble(
    cfg: &AppConfig,
    agent: Arc<dyn AgentClient>,
    registry: Arc<dyn ToolProviderRegistry>,
) -> AgentComponents {
    let prompts = Arc::new(PromptSet::load(cfg.app.prompts_dir.clone()));
    let gate = ReadinessGate::new(registry, cfg.readiness.settings());
    let executor = Arc::new(TaskExecutor::new(
        agent.clone(),
        gate.clone(),
        prompts.clone(),
        cfg.retry.policy(),
        cfg.executor.settings(),
        cfg.tools.required_providers.clone(),
    ));
    let synthesizer = Arc::new(SummarySynthesizer::new(agent.clone(), prompts.clone()));
    let controller = ExecutionController::spawn(executor, synthesizer, cfg.log.capacity);

    AgentComponents {
        generator: PlanGenerator::new(agent.clone(), prompts.clone()),
        session: Session::new(controller),
        agent,
        gate,
        prompts,
    }
}

/// 按配置装配；需在 tokio 运行时内调用
pub fn create_agent_components(cfg: &AppConfig) -> AgentComponents {
    assemble(cfg, create_agent_client(cfg), create_tool_registry(cfg))
}
