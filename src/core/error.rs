//! 编排错误类型
//!
//! 解析错误在解析器内部回退，不会出现在这里；派发错误由执行器转为任务失败并重试；
//! 总结错误降级为占位文本。会到达调用方的只有下面这些。

use thiserror::Error;

use crate::core::RunLifecycle;
use crate::llm::DispatchError;
use crate::plan::PlanError;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// 必需的工具提供方不可用（暂时性，调用方可稍后重试）
    #[error("Tool providers not ready: {}", .missing.join(", "))]
    NotReady { missing: Vec<String> },

    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Cannot {action} while {state:?}")]
    InvalidState {
        action: &'static str,
        state: RunLifecycle,
    },

    #[error("Plan has no tasks")]
    EmptyPlan,

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("Execution controller has shut down")]
    ControllerClosed,
}
