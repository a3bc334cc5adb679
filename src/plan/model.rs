//! 计划数据模型：Plan / Task 及其不变量
//!
//! Task 状态机见 core::executor；这里只负责字段、变更与重置。
//! 时间戳统一为毫秒时间戳（chrono::Utc::now().timestamp_millis()）。

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::plan::exploration::ExplorationScenario;
use crate::plan::parser::ParsedTask;

/// 任务 ID
pub type TaskId = String;

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    /// 等待执行
    Pending,
    /// 正在执行（同一计划内至多一个）
    InProgress,
    /// 已完成
    Completed,
    /// 执行失败，等待重试
    Failed,
    /// 重试次数耗尽，不再调度
    FailedTerminal,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::FailedTerminal => "failed-terminal",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 计划中的单个任务
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    /// 进度（0-100），执行期间只增不减
    pub progress: u8,
    /// Agent 返回文本，仅 Completed 时存在
    pub result: Option<String>,
    /// 错误信息，仅失败时存在
    pub error: Option<String>,
    pub executed_at: Option<i64>,
    pub completed_at: Option<i64>,
    /// 耗时（秒）
    pub duration: Option<f64>,
    /// 本轮运行中已派发次数
    #[serde(default)]
    pub attempts: u32,
}

impl Task {
    pub fn new(id: impl Into<TaskId>, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            status: TaskStatus::Pending,
            progress: 0,
            result: None,
            error: None,
            executed_at: None,
            completed_at: None,
            duration: None,
            attempts: 0,
        }
    }

    /// 进度只允许前进
    pub fn advance_progress(&mut self, progress: u8) {
        self.progress = self.progress.max(progress.min(100));
    }

    /// 显式重置：回到 pending，清空结果、错误、时间戳与计数
    pub fn reset(&mut self) {
        self.status = TaskStatus::Pending;
        self.progress = 0;
        self.result = None;
        self.error = None;
        self.executed_at = None;
        self.completed_at = None;
        self.duration = None;
        self.attempts = 0;
    }
}

/// 计划变更错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),
    #[error("Task index out of range: {0}")]
    IndexOutOfRange(usize),
    #[error("Task is in progress and cannot be moved or removed: {0}")]
    TaskInProgress(TaskId),
}

/// 计划：有序任务序列（顺序即执行顺序）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub title: String,
    /// 用户原始需求文本
    pub requirements: String,
    pub tasks: Vec<Task>,
    pub created_at: i64,
    pub updated_at: i64,
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl Plan {
    pub fn new(title: impl Into<String>, requirements: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            id: format!("plan_{}", uuid::Uuid::new_v4()),
            title: title.into(),
            requirements: requirements.into(),
            tasks: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// 由解析结果构建计划；任务 ID 为 `task-<毫秒>-<序号>`，计划内唯一即可
    pub fn from_parsed(
        title: impl Into<String>,
        requirements: impl Into<String>,
        parsed: Vec<ParsedTask>,
    ) -> Self {
        let mut plan = Self::new(title, requirements);
        let stamp = plan.created_at;
        plan.tasks = parsed
            .into_iter()
            .enumerate()
            .map(|(i, p)| Task::new(format!("task-{}-{}", stamp, i), p.title, p.description))
            .collect();
        plan
    }

    /// 由探索得到的测试场景构建计划，步骤并入任务描述
    pub fn from_scenarios(title: impl Into<String>, scenarios: &[ExplorationScenario]) -> Self {
        let requirements = scenarios
            .iter()
            .map(|s| s.title.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let parsed = scenarios
            .iter()
            .map(|s| {
                let mut description = s.description.clone();
                if !s.page.is_empty() {
                    description.push_str(&format!(" (page: {})", s.page));
                }
                if !s.steps.is_empty() {
                    description.push_str(" Steps: ");
                    description.push_str(&s.steps.join("; "));
                }
                ParsedTask {
                    title: s.title.clone(),
                    description,
                }
            })
            .collect();
        Self::from_parsed(title, requirements, parsed)
    }

    fn touch(&mut self) {
        self.updated_at = now_millis().max(self.updated_at);
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// 按下标修改任务，并刷新 updated_at
    pub fn with_task_mut<R>(&mut self, index: usize, f: impl FnOnce(&mut Task) -> R) -> Option<R> {
        let out = self.tasks.get_mut(index).map(f)?;
        self.touch();
        Some(out)
    }

    pub fn add_task(&mut self, title: impl Into<String>, description: impl Into<String>) -> TaskId {
        let id = format!("task-{}-{}", now_millis(), self.tasks.len());
        self.tasks.push(Task::new(id.clone(), title, description));
        self.touch();
        id
    }

    pub fn update_task(
        &mut self,
        id: &str,
        title: Option<String>,
        description: Option<String>,
    ) -> Result<(), PlanError> {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| PlanError::TaskNotFound(id.to_string()))?;
        if let Some(title) = title {
            task.title = title;
        }
        if let Some(description) = description {
            task.description = description;
        }
        self.touch();
        Ok(())
    }

    pub fn remove_task(&mut self, id: &str) -> Result<Task, PlanError> {
        let index = self
            .tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| PlanError::TaskNotFound(id.to_string()))?;
        if self.tasks[index].status == TaskStatus::InProgress {
            return Err(PlanError::TaskInProgress(id.to_string()));
        }
        let task = self.tasks.remove(index);
        self.touch();
        Ok(task)
    }

    /// 调整顺序：把 from 处任务移到 to 处；不得移动正在执行的任务
    pub fn move_task(&mut self, from: usize, to: usize) -> Result<(), PlanError> {
        let len = self.tasks.len();
        if from >= len {
            return Err(PlanError::IndexOutOfRange(from));
        }
        if to >= len {
            return Err(PlanError::IndexOutOfRange(to));
        }
        let (lo, hi) = (from.min(to), from.max(to));
        if let Some(t) = self.tasks[lo..=hi]
            .iter()
            .find(|t| t.status == TaskStatus::InProgress)
        {
            return Err(PlanError::TaskInProgress(t.id.clone()));
        }
        let task = self.tasks.remove(from);
        self.tasks.insert(to, task);
        self.touch();
        Ok(())
    }

    pub fn reset_tasks(&mut self) {
        self.tasks.iter_mut().for_each(Task::reset);
        self.touch();
    }

    pub fn all_completed(&self) -> bool {
        !self.tasks.is_empty() && self.tasks.iter().all(|t| t.status == TaskStatus::Completed)
    }

    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }

    pub fn in_progress_count(&self) -> usize {
        self.count(TaskStatus::InProgress)
    }
}
