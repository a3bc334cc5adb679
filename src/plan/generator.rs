//! 计划生成：把用户需求交给外部 Agent，再用分级解析器转成计划

use std::sync::Arc;

use crate::core::OrchestratorError;
use crate::llm::{AgentClient, SendOptions};
use crate::plan::{parse_exploration_result, parse_plan, ExplorationScenario, Plan};
use crate::prompts::PromptSet;

/// 计划标题的最大字符数（取需求首行）
const TITLE_CHARS: usize = 60;

pub struct PlanGenerator {
    agent: Arc<dyn AgentClient>,
    prompts: Arc<PromptSet>,
}

fn title_from_requirements(requirements: &str) -> String {
    let first = requirements
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("Test plan");
    first.chars().take(TITLE_CHARS).collect()
}

impl PlanGenerator {
    pub fn new(agent: Arc<dyn AgentClient>, prompts: Arc<PromptSet>) -> Self {
        Self { agent, prompts }
    }

    /// 生成计划；解析永不失败，只有请求本身失败才返回 Dispatch 错误
    pub async fn generate(&self, requirements: &str) -> Result<Plan, OrchestratorError> {
        let prompt = self.prompts.plan_prompt(requirements);
        let reply = self.agent.send(&prompt, SendOptions::plain()).await?;
        let parsed = parse_plan(&reply.response);
        tracing::info!(tasks = parsed.len(), "plan generated");
        Ok(Plan::from_parsed(
            title_from_requirements(requirements),
            requirements,
            parsed,
        ))
    }

    /// 不经 Agent，直接把需求文本当作计划解析（需求本身就是编号列表时）
    pub fn from_requirements(requirements: &str) -> Plan {
        Plan::from_parsed(
            title_from_requirements(requirements),
            requirements,
            parse_plan(requirements),
        )
    }

    /// 让 Agent 用工具探索目标站点，返回发现的测试场景
    pub async fn explore(
        &self,
        target: &str,
        tools: Vec<String>,
    ) -> Result<Vec<ExplorationScenario>, OrchestratorError> {
        let prompt = self.prompts.explore_prompt(target);
        let reply = self.agent.send(&prompt, SendOptions::agent(tools)).await?;
        Ok(parse_exploration_result(&reply.response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{AgentReply, DispatchError, MockAgentClient};
    use crate::plan::TaskStatus;

    #[tokio::test]
    async fn test_generate_parses_agent_output() {
        let mock = Arc::new(MockAgentClient::new());
        mock.push_reply(AgentReply::text(
            r#"Plan: [{"title": "Open", "description": "open home"}, {"title": "Login", "description": "sign in"}]"#,
        ));
        let generator = PlanGenerator::new(mock.clone(), Arc::new(PromptSet::default()));

        let plan = generator.generate("Test login\nfor x.com").await.unwrap();
        assert_eq!(plan.title, "Test login");
        assert_eq!(plan.tasks.len(), 2);
        assert_eq!(plan.tasks[1].title, "Login");

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].options.agent_mode);
        assert!(requests[0].prompt.contains("Test login"));
    }

    #[tokio::test]
    async fn test_generate_propagates_transport_error() {
        let mock = Arc::new(MockAgentClient::new());
        mock.push_error(DispatchError::Transport("connection refused".into()));
        let generator = PlanGenerator::new(mock, Arc::new(PromptSet::default()));
        let err = generator.generate("anything").await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Dispatch(DispatchError::Transport(ref m)) if m == "connection refused"
        ));
    }

    #[test]
    fn test_from_requirements_numbered_list() {
        let plan = PlanGenerator::from_requirements("1. Open https://x.com\n2. Click login");
        let titles: Vec<_> = plan.tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Open https://x.com", "Click login"]);
        assert!(plan.tasks.iter().all(|t| t.status == TaskStatus::Pending));
    }

    #[tokio::test]
    async fn test_explore_uses_agent_mode() {
        let mock = Arc::new(MockAgentClient::new());
        mock.push_reply(AgentReply::text(r#"{"scenarios": [{"title": "Login", "priority": "high"}]}"#));
        let generator = PlanGenerator::new(mock.clone(), Arc::new(PromptSet::default()));
        let scenarios = generator
            .explore("https://x.com", vec!["browser_navigate".into()])
            .await
            .unwrap();
        assert_eq!(scenarios.len(), 1);
        assert!(mock.requests()[0].options.agent_mode);

        let plan = Plan::from_scenarios("Explored", &scenarios);
        assert_eq!(plan.tasks[0].title, "Login");
    }
}
