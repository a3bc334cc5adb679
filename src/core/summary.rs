//! 总结生成：所有任务进入终态后，向外部 Agent 发送一次普通（不调用工具）请求
//!
//! 请求体为结构化报告（计划标题、计数、逐任务结果、日志尾部）。
//! 失败不向上传播，改为占位总结。

use std::sync::Arc;

use serde::Serialize;

use crate::core::RunSummary;
use crate::llm::{AgentClient, SendOptions};
use crate::memory::LogEntry;
use crate::plan::{Plan, TaskStatus};
use crate::prompts::PromptSet;

/// 报告中携带的日志尾部条数
pub const SUMMARY_LOG_TAIL: usize = 50;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskReport {
    pub title: String,
    pub status: TaskStatus,
    pub description: String,
    pub duration: Option<f64>,
    /// 完成时为结果，失败时为错误
    pub outcome: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryReport {
    pub plan_title: String,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub tasks: Vec<TaskReport>,
    pub execution_log: Vec<String>,
}

impl SummaryReport {
    pub fn build(plan: &Plan, log_tail: &[LogEntry]) -> Self {
        let tasks = plan
            .tasks
            .iter()
            .map(|t| TaskReport {
                title: t.title.clone(),
                status: t.status,
                description: t.description.clone(),
                duration: t.duration,
                outcome: t.result.clone().or_else(|| t.error.clone()),
            })
            .collect();
        Self {
            plan_title: plan.title.clone(),
            total_tasks: plan.tasks.len(),
            completed_tasks: plan.count(TaskStatus::Completed),
            failed_tasks: plan.count(TaskStatus::Failed) + plan.count(TaskStatus::FailedTerminal),
            tasks,
            execution_log: log_tail.iter().map(LogEntry::render).collect(),
        }
    }
}

pub struct SummarySynthesizer {
    agent: Arc<dyn AgentClient>,
    prompts: Arc<PromptSet>,
}

impl SummarySynthesizer {
    pub fn new(agent: Arc<dyn AgentClient>, prompts: Arc<PromptSet>) -> Self {
        Self { agent, prompts }
    }

    pub async fn synthesize(&self, report: &SummaryReport) -> RunSummary {
        let body = serde_json::to_string_pretty(report).unwrap_or_else(|_| format!("{:?}", report));
        let prompt = self.prompts.summary_prompt(&body);

        let (text, placeholder) = match self.agent.send(&prompt, SendOptions::plain()).await {
            Ok(reply) => (reply.response, false),
            Err(e) => {
                tracing::warn!("Summary generation failed: {}", e);
                (
                    format!(
                        "Summary unavailable ({}). {} of {} task(s) completed, {} failed.",
                        e, report.completed_tasks, report.total_tasks, report.failed_tasks
                    ),
                    true,
                )
            }
        };

        RunSummary {
            text,
            total: report.total_tasks,
            completed: report.completed_tasks,
            failed: report.failed_tasks,
            placeholder,
            generated_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{AgentReply, DispatchError, MockAgentClient};
    use crate::plan::{ParsedTask, Plan};

    fn finished_plan() -> Plan {
        let mut plan = Plan::from_parsed(
            "Checkout",
            "req",
            vec![
                ParsedTask { title: "Add item".into(), description: "add".into() },
                ParsedTask { title: "Pay".into(), description: "pay".into() },
            ],
        );
        plan.with_task_mut(0, |t| {
            t.status = TaskStatus::Completed;
            t.result = Some("added".into());
            t.duration = Some(1.2);
        });
        plan.with_task_mut(1, |t| {
            t.status = TaskStatus::FailedTerminal;
            t.error = Some("card declined".into());
        });
        plan
    }

    #[test]
    fn test_report_counts_and_outcomes() {
        let log: Vec<LogEntry> = (0..60).map(|i| LogEntry::info(format!("l{}", i))).collect();
        let report = SummaryReport::build(&finished_plan(), &log[log.len() - SUMMARY_LOG_TAIL..]);
        assert_eq!(report.total_tasks, 2);
        assert_eq!(report.completed_tasks, 1);
        assert_eq!(report.failed_tasks, 1);
        assert_eq!(report.tasks[0].outcome.as_deref(), Some("added"));
        assert_eq!(report.tasks[1].outcome.as_deref(), Some("card declined"));
        assert_eq!(report.execution_log.len(), 50);
        assert_eq!(report.execution_log[0], "l10");
    }

    #[tokio::test]
    async fn test_synthesize_sends_plain_request() {
        let mock = Arc::new(MockAgentClient::new());
        mock.push_reply(AgentReply::text("All good"));
        let synth = SummarySynthesizer::new(mock.clone(), Arc::new(PromptSet::default()));
        let summary = synth.synthesize(&SummaryReport::build(&finished_plan(), &[])).await;
        assert_eq!(summary.text, "All good");
        assert!(!summary.placeholder);

        let requests = mock.requests();
        assert!(!requests[0].options.agent_mode);
        assert!(requests[0].options.tools.is_none());
        assert!(requests[0].prompt.contains("\"planTitle\": \"Checkout\""));
    }

    #[tokio::test]
    async fn test_synthesize_failure_yields_placeholder() {
        let mock = Arc::new(MockAgentClient::new());
        mock.push_error(DispatchError::Transport("boom".into()));
        let synth = SummarySynthesizer::new(mock, Arc::new(PromptSet::default()));
        let summary = synth.synthesize(&SummaryReport::build(&finished_plan(), &[])).await;
        assert!(summary.placeholder);
        assert!(summary.text.contains("1 of 2"));
    }
}
