//! 任务执行器：单个任务的状态机
//!
//! pending → in-progress → completed | failed；failed → in-progress（重试）；
//! 重试次数耗尽 → failed-terminal。
//!
//! 每步拆成三段：begin（同步改状态并生成派发作业）→ dispatch（异步，在独立任务中运行）
//! → apply（回到控制器，比对代次后写回结果）。状态只在控制器 actor 中修改。

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::{RetryDecision, RetryPolicy};
use crate::llm::{AgentClient, AgentReply, DispatchError, ReplyMetadata, SendOptions};
use crate::memory::{ExecutionLog, LearningEntry, LearningJournal, LogEntry};
use crate::plan::{Plan, TaskId, TaskStatus};
use crate::prompts::PromptSet;
use crate::tools::ReadinessGate;

/// 派发开始时设置的进度
const DISPATCH_PROGRESS: u8 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorSettings {
    /// 任务完成后进入下一个任务前的等待
    pub settle_delay: Duration,
    /// 门控关闭时推迟任务的等待（不计入失败）
    pub not_ready_delay: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(2),
            not_ready_delay: Duration::from_secs(3),
        }
    }
}

/// 控制器独占的执行中计划
#[derive(Debug, Clone)]
pub struct ExecutingRun {
    pub epoch: u64,
    pub plan: Plan,
    pub cursor: usize,
    /// 总结已发起（每轮运行只发起一次）
    pub summary_requested: bool,
}

impl ExecutingRun {
    pub fn new(epoch: u64, plan: Plan) -> Self {
        Self {
            epoch,
            plan,
            cursor: 0,
            summary_requested: false,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.plan.tasks.len()
    }

    /// 游标越过已完成的任务（结束后恢复时只重跑未完成的）
    pub fn skip_completed(&mut self) {
        while self
            .plan
            .tasks
            .get(self.cursor)
            .map(|t| t.status == TaskStatus::Completed)
            .unwrap_or(false)
        {
            self.cursor += 1;
        }
    }
}

/// 门控检查结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateCheck {
    pub ready: bool,
    pub missing: Vec<String>,
    /// 缺失提供方及原因，用于日志
    pub details: Vec<String>,
    pub tools: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DispatchJob {
    pub epoch: u64,
    pub index: usize,
    pub task_id: TaskId,
    pub prompt: String,
    pub tools: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub epoch: u64,
    pub index: usize,
    pub task_id: TaskId,
    pub prompt: String,
    pub result: Result<AgentReply, DispatchError>,
    pub elapsed: Duration,
}

/// apply 之后的下一步
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    /// 游标已前移，等待后处理下一个任务
    Advance(Duration),
    /// 同一任务等待后重试
    Retry(Duration),
}

pub struct TaskExecutor {
    agent: Arc<dyn AgentClient>,
    gate: ReadinessGate,
    prompts: Arc<PromptSet>,
    retry: RetryPolicy,
    settings: ExecutorSettings,
    required: Vec<String>,
}

impl TaskExecutor {
    pub fn new(
        agent: Arc<dyn AgentClient>,
        gate: ReadinessGate,
        prompts: Arc<PromptSet>,
        retry: RetryPolicy,
        settings: ExecutorSettings,
        required: Vec<String>,
    ) -> Self {
        Self {
            agent,
            gate,
            prompts,
            retry,
            settings,
            required,
        }
    }

    pub fn settings(&self) -> ExecutorSettings {
        self.settings
    }

    pub fn required_providers(&self) -> &[String] {
        &self.required
    }

    pub fn gate(&self) -> &ReadinessGate {
        &self.gate
    }

    /// 步骤 1：派发前的门控检查
    pub async fn check_gate(&self) -> GateCheck {
        let ready = self.gate.ensure_ready(&self.required).await;
        let catalogue = self.gate.catalogue().await;
        GateCheck {
            ready,
            missing: catalogue
                .missing(&self.required)
                .into_iter()
                .map(String::from)
                .collect(),
            details: catalogue.describe_missing(&self.required),
            tools: catalogue.tool_names(),
        }
    }

    /// 步骤 2：把游标处任务置为 in-progress 并生成派发作业
    pub fn begin(&self, run: &mut ExecutingRun, log: &mut ExecutionLog, tools: Vec<String>) -> Option<DispatchJob> {
        let index = run.cursor;
        let epoch = run.epoch;
        let now = chrono::Utc::now().timestamp_millis();
        let (task_id, title, description, attempts) = run.plan.with_task_mut(index, |task| {
            task.status = TaskStatus::InProgress;
            task.error = None;
            task.advance_progress(DISPATCH_PROGRESS);
            task.executed_at.get_or_insert(now);
            task.attempts += 1;
            (
                task.id.clone(),
                task.title.clone(),
                task.description.clone(),
                task.attempts,
            )
        })?;

        let message = if attempts > 1 {
            format!("Executing task {} (attempt {}): {}", index + 1, attempts, title)
        } else {
            format!("Executing task {}: {}", index + 1, title)
        };
        log.append(LogEntry::info(message).for_task(task_id.clone()));

        Some(DispatchJob {
            epoch,
            index,
            task_id,
            prompt: self.prompts.task_prompt(&title, &description),
            tools,
        })
    }

    /// 步骤 3：单次阻塞请求，无客户端超时
    pub async fn dispatch(&self, job: DispatchJob) -> DispatchOutcome {
        let start = Instant::now();
        let result = self
            .agent
            .send(&job.prompt, SendOptions::agent(job.tools))
            .await;
        DispatchOutcome {
            epoch: job.epoch,
            index: job.index,
            task_id: job.task_id,
            prompt: job.prompt,
            result,
            elapsed: start.elapsed(),
        }
    }

    /// 步骤 4 / 5：写回派发结果。代次或任务不匹配（已取消 / 已重新开始）时返回 None
    pub fn apply(
        &self,
        run: &mut ExecutingRun,
        log: &mut ExecutionLog,
        journal: &mut LearningJournal,
        outcome: DispatchOutcome,
    ) -> Option<NextStep> {
        let matches = run.epoch == outcome.epoch
            && run
                .plan
                .tasks
                .get(outcome.index)
                .map(|t| t.id == outcome.task_id && t.status == TaskStatus::InProgress)
                .unwrap_or(false);
        if !matches {
            tracing::debug!(task_id = %outcome.task_id, "discarding stale dispatch result");
            return None;
        }

        let index = outcome.index;
        let seconds = outcome.elapsed.as_secs_f64();
        match outcome.result {
            Ok(reply) => {
                if let Some(metadata) = &reply.metadata {
                    log_steps(log, &outcome.task_id, metadata);
                }
                let now = chrono::Utc::now().timestamp_millis();
                let task = run.plan.with_task_mut(index, |task| {
                    task.status = TaskStatus::Completed;
                    task.advance_progress(100);
                    task.result = Some(reply.response.clone());
                    task.error = None;
                    task.completed_at.get_or_insert(now);
                    task.duration = Some(seconds);
                    task.clone()
                })?;
                journal.record(LearningEntry::from_reply(&task, &outcome.prompt, &reply, seconds));
                log.append(
                    LogEntry::success(format!("Task {} completed in {:.1}s: {}", index + 1, seconds, task.title))
                        .for_task(task.id),
                );
                run.cursor = index + 1;
                Some(NextStep::Advance(self.settings.settle_delay))
            }
            Err(err) => {
                let message = err.to_string();
                let attempts = run.plan.with_task_mut(index, |task| {
                    task.status = TaskStatus::Failed;
                    task.error = Some(message.clone());
                    task.attempts
                })?;
                match self.retry.decide(attempts) {
                    RetryDecision::RetryAfter(delay) => {
                        log.append(
                            LogEntry::error(format!(
                                "Task {} failed: {}. Retrying in {:.1}s",
                                index + 1,
                                message,
                                delay.as_secs_f64()
                            ))
                            .for_task(outcome.task_id),
                        );
                        Some(NextStep::Retry(delay))
                    }
                    RetryDecision::GiveUp => {
                        run.plan.with_task_mut(index, |task| {
                            task.status = TaskStatus::FailedTerminal;
                        });
                        log.append(
                            LogEntry::error(format!(
                                "Task {} failed after {} attempt(s), giving up: {}",
                                index + 1,
                                attempts,
                                message
                            ))
                            .for_task(outcome.task_id),
                        );
                        run.cursor = index + 1;
                        Some(NextStep::Advance(self.settings.settle_delay))
                    }
                }
            }
        }
    }
}

/// 逐步记录远端执行的工具调用（仅用于观察，不影响状态机）
fn log_steps(log: &mut ExecutionLog, task_id: &str, metadata: &ReplyMetadata) {
    for step in &metadata.execution_steps {
        let mut details: Vec<String> = Vec::new();
        if let Some(action) = step.action.as_deref().filter(|s| !s.is_empty()) {
            details.push(action.to_string());
        }
        if let Some(locator) = step.locator.as_deref().filter(|s| !s.is_empty()) {
            details.push(format!("locator={}", locator));
        }
        if let Some(value) = step.value.as_deref().filter(|s| !s.is_empty()) {
            details.push(format!("value={}", value));
        }
        let entry = if step.is_failure() {
            LogEntry::warning(details.join(" "))
        } else {
            LogEntry::info(details.join(" "))
        };
        log.append(
            entry
                .for_task(task_id)
                .with_tool(step.server.clone(), step.tool_name.clone(), step.status.clone()),
        );
    }
}
