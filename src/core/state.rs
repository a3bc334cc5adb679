//! 状态定义：运行生命周期与对外快照
//!
//! 控制器内部持有完整的执行状态；外部（UI / CLI）只看到 RunSnapshot 投影，通过 watch 通道获取。

use std::sync::Arc;

use serde::Serialize;

use crate::memory::{LearningEntry, LogEntry};
use crate::plan::{Plan, TaskStatus};

/// 运行生命周期
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunLifecycle {
    #[default]
    Idle,
    Running,
    Paused,
    Completed,
}

/// 运行结束时生成的总结
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunSummary {
    pub text: String,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    /// 总结请求失败时为 true，text 为占位文本
    pub placeholder: bool,
    pub generated_at: i64,
}

/// 对外可见的运行快照
#[derive(Clone, Debug, Default, Serialize)]
pub struct RunSnapshot {
    pub lifecycle: RunLifecycle,
    /// 运行代次：每次 start / cancel / 重新开始时递增
    pub epoch: u64,
    /// 当前处理的任务下标
    pub cursor: usize,
    pub executing_plan: Option<Plan>,
    /// 日志与学习条目在内容未变时跨快照共享
    pub log: Arc<Vec<LogEntry>>,
    pub learnings: Arc<Vec<LearningEntry>>,
    pub summary: Option<RunSummary>,
    /// 就绪门控关闭时的提示
    pub warning: Option<String>,
}

impl RunSnapshot {
    pub fn task_status(&self, index: usize) -> Option<TaskStatus> {
        self.executing_plan
            .as_ref()
            .and_then(|p| p.tasks.get(index))
            .map(|t| t.status)
    }

    pub fn in_progress_count(&self) -> usize {
        self.executing_plan
            .as_ref()
            .map(Plan::in_progress_count)
            .unwrap_or(0)
    }

    pub fn is_finished(&self) -> bool {
        self.lifecycle == RunLifecycle::Completed && self.summary.is_some()
    }
}
