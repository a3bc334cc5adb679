//! Ralph - 自动化测试计划编排器
//!
//! 模块划分：
//! - **agent**: 按配置装配运行时组件
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 任务执行器、执行控制器（运行生命周期）、会话、重试与总结
//! - **llm**: 外部 Agent 客户端抽象与实现（HTTP / Mock）
//! - **memory**: 执行日志与学习日志
//! - **observability**: tracing 初始化
//! - **plan**: 计划模型、分级解析器、计划生成与站点探索
//! - **prompts**: 指令模板
//! - **tools**: 工具提供方注册表与就绪门控

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod plan;
pub mod prompts;
pub mod tools;

pub use crate::core::{ControllerHandle, OrchestratorError, RunLifecycle, RunSnapshot, Session};
pub use crate::plan::{Plan, Task, TaskStatus};
