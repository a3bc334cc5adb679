//! 会话：一份可编辑计划 + 一个执行控制器
//!
//! 可编辑计划与执行中的副本相互独立：编辑不会影响正在运行的计划，
//! start 时把当前可编辑计划复制一份交给控制器。

use crate::core::{ControllerHandle, OrchestratorError, RunSnapshot};
use crate::plan::{Plan, TaskId};

pub struct Session {
    editable: Option<Plan>,
    controller: ControllerHandle,
}

impl Session {
    pub fn new(controller: ControllerHandle) -> Self {
        Self {
            editable: None,
            controller,
        }
    }

    pub fn controller(&self) -> &ControllerHandle {
        &self.controller
    }

    /// 替换可编辑计划（生成 / 解析得到的新计划）
    pub fn set_plan(&mut self, plan: Plan) {
        self.editable = Some(plan);
    }

    pub fn plan(&self) -> Option<&Plan> {
        self.editable.as_ref()
    }

    fn editable_mut(&mut self) -> Result<&mut Plan, OrchestratorError> {
        self.editable.as_mut().ok_or(OrchestratorError::EmptyPlan)
    }

    pub fn add_task(&mut self, title: &str, description: &str) -> Result<TaskId, OrchestratorError> {
        Ok(self.editable_mut()?.add_task(title, description))
    }

    pub fn update_task(
        &mut self,
        id: &str,
        title: Option<String>,
        description: Option<String>,
    ) -> Result<(), OrchestratorError> {
        Ok(self.editable_mut()?.update_task(id, title, description)?)
    }

    pub fn remove_task(&mut self, id: &str) -> Result<(), OrchestratorError> {
        self.editable_mut()?.remove_task(id)?;
        Ok(())
    }

    pub fn move_task(&mut self, from: usize, to: usize) -> Result<(), OrchestratorError> {
        Ok(self.editable_mut()?.move_task(from, to)?)
    }

    /// 以当前可编辑计划的副本开始运行
    pub async fn start(&self) -> Result<u64, OrchestratorError> {
        let plan = self
            .editable
            .clone()
            .filter(|p| !p.tasks.is_empty())
            .ok_or(OrchestratorError::EmptyPlan)?;
        self.controller.start(plan).await
    }

    pub async fn pause(&self) -> Result<(), OrchestratorError> {
        self.controller.pause().await
    }

    pub async fn resume(&self) -> Result<(), OrchestratorError> {
        self.controller.resume().await
    }

    pub async fn cancel(&self) -> Result<(), OrchestratorError> {
        self.controller.cancel().await
    }

    pub fn snapshot(&self) -> RunSnapshot {
        self.controller.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::core::{ExecutionController, ExecutorSettings, RetryPolicy, SummarySynthesizer, TaskExecutor};
    use crate::llm::MockAgentClient;
    use crate::plan::{ParsedTask, PlanError, TaskStatus};
    use crate::prompts::PromptSet;
    use crate::tools::{LocalToolRegistry, ReadinessGate, ReadinessSettings};

    fn session() -> Session {
        let registry = Arc::new(LocalToolRegistry::new());
        registry.register("playwright", &["browser_click"], true);
        let gate = ReadinessGate::new(registry, ReadinessSettings::default());
        let mock = Arc::new(MockAgentClient::new().with_latency(Duration::from_millis(100)));
        let prompts = Arc::new(PromptSet::default());
        let executor = Arc::new(TaskExecutor::new(
            mock.clone(),
            gate,
            prompts.clone(),
            RetryPolicy::default(),
            ExecutorSettings::default(),
            vec!["playwright".into()],
        ));
        let synthesizer = Arc::new(SummarySynthesizer::new(mock, prompts));
        Session::new(ExecutionController::spawn(executor, synthesizer, 100))
    }

    #[tokio::test]
    async fn test_start_without_plan_is_rejected() {
        let session = session();
        assert!(matches!(session.start().await, Err(OrchestratorError::EmptyPlan)));
    }

    #[tokio::test]
    async fn test_editing_does_not_touch_executing_copy() {
        let mut session = session();
        session.set_plan(Plan::from_parsed(
            "p",
            "r",
            vec![ParsedTask { title: "A".into(), description: String::new() }],
        ));
        session.start().await.unwrap();

        let id = session.add_task("B", "second").unwrap();
        session.update_task(&id, Some("B2".into()), None).unwrap();
        assert_eq!(session.plan().unwrap().tasks.len(), 2);

        let snapshot = session.snapshot();
        let executing = snapshot.executing_plan.unwrap();
        assert_eq!(executing.tasks.len(), 1);
        assert_eq!(session.plan().unwrap().tasks[0].status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_plan_errors_are_wrapped() {
        let mut session = session();
        session.set_plan(Plan::new("p", "r"));
        let err = session.remove_task("missing").unwrap_err();
        assert!(matches!(err, OrchestratorError::Plan(PlanError::TaskNotFound(_))));
        assert!(matches!(
            session.move_task(0, 1),
            Err(OrchestratorError::Plan(PlanError::IndexOutOfRange(0)))
        ));
    }
}
