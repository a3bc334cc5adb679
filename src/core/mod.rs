//! 核心编排层：错误、状态投影、重试策略、任务执行器、执行控制器与会话

pub mod controller;
pub mod error;
pub mod executor;
pub mod retry;
pub mod session;
pub mod state;
pub mod summary;

pub use controller::{Command, ControllerHandle, ExecutionController};
pub use error::OrchestratorError;
pub use executor::{ExecutingRun, ExecutorSettings, GateCheck, NextStep, TaskExecutor};
pub use retry::{RetryDecision, RetryPolicy};
pub use session::Session;
pub use state::{RunLifecycle, RunSnapshot, RunSummary};
pub use summary::{SummaryReport, SummarySynthesizer, SUMMARY_LOG_TAIL};
