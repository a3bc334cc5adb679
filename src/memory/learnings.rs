//! 学习日志：每个成功完成的任务追加一条结构化遥测
//!
//! - whatWorked：成功的工具步骤（`工具: 动作`）
//! - whatFailed：报告失败的工具步骤
//! - insights：执行概况与回复摘要
//!
//! 条目创建后不可变，编排器从不删除（导出 / 清理由外部负责）。

use serde::{Deserialize, Serialize};

use crate::llm::{AgentReply, ExecutionStep};
use crate::plan::Task;

/// 回复摘要的最大字符数
const INSIGHT_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningEntry {
    pub id: String,
    /// 反向引用，不拥有任务
    pub task_id: String,
    pub what_worked: Vec<String>,
    pub what_failed: Vec<String>,
    pub insights: String,
    pub tokens_used: u64,
    /// 执行耗时（秒）
    pub execution_time: f64,
    pub timestamp: i64,
}

fn describe_step(step: &ExecutionStep) -> String {
    let mut text = step.tool_name.clone();
    if let Some(action) = step.action.as_deref().filter(|a| !a.is_empty()) {
        text.push_str(": ");
        text.push_str(action);
    }
    if let Some(locator) = step.locator.as_deref().filter(|l| !l.is_empty()) {
        text.push_str(&format!(" [{}]", locator));
    }
    text
}

/// 没有 token 统计时按字符数粗略估算（约 4 字符 / token）
fn estimate_tokens(prompt: &str, response: &str) -> u64 {
    ((prompt.chars().count() + response.chars().count()) / 4) as u64
}

impl LearningEntry {
    /// 由已完成任务与 Agent 回复构建条目
    pub fn from_reply(task: &Task, prompt: &str, reply: &AgentReply, execution_time: f64) -> Self {
        let steps = reply
            .metadata
            .as_ref()
            .map(|m| m.execution_steps.as_slice())
            .unwrap_or_default();
        let (failed, worked): (Vec<&ExecutionStep>, Vec<&ExecutionStep>) =
            steps.iter().partition(|s| s.is_failure());

        let tool_calls = reply
            .metadata
            .as_ref()
            .map(|m| m.tool_calls_executed)
            .unwrap_or(0);
        let preview: String = reply.response.chars().take(INSIGHT_PREVIEW_CHARS).collect();
        let insights = format!(
            "Task \"{}\" completed with {} tool call(s) in {:.1}s. {}",
            task.title,
            tool_calls,
            execution_time,
            preview.trim()
        );

        Self {
            id: format!("learning_{}", uuid::Uuid::new_v4()),
            task_id: task.id.clone(),
            what_worked: worked.into_iter().map(describe_step).collect(),
            what_failed: failed.into_iter().map(describe_step).collect(),
            insights: insights.trim().to_string(),
            tokens_used: reply
                .metadata
                .as_ref()
                .and_then(|m| m.tokens_used)
                .unwrap_or_else(|| estimate_tokens(prompt, &reply.response)),
            execution_time,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// 只追加的学习条目序列
#[derive(Debug, Clone, Default, Serialize)]
pub struct LearningJournal {
    entries: Vec<LearningEntry>,
}

impl LearningJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: LearningEntry) {
        tracing::debug!(task_id = %entry.task_id, tokens = entry.tokens_used, "learning recorded");
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[LearningEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn for_task<'a>(&'a self, task_id: &'a str) -> impl Iterator<Item = &'a LearningEntry> + 'a {
        self.entries.iter().filter(move |e| e.task_id == task_id)
    }

    /// 导出为 JSON 数组
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.entries)
    }
}
