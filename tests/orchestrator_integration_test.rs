//! 编排端到端测试：解析 → 运行 → 重试 / 暂停 / 取消 → 总结

use std::sync::Arc;
use std::time::Duration;

use ralph::agent::{assemble, AgentComponents};
use ralph::config::AppConfig;
use ralph::llm::{AgentReply, DispatchError, MockAgentClient};
use ralph::plan::{parse_plan, Plan, PlanGenerator, TaskStatus};
use ralph::tools::LocalToolRegistry;
use ralph::{RunLifecycle, RunSnapshot};

const WAIT: Duration = Duration::from_secs(10);

fn fast_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.readiness.poll_attempts = 2;
    cfg.readiness.poll_interval_ms = 5;
    cfg.readiness.gate_retry_delay_ms = 5;
    cfg.executor.settle_delay_ms = 5;
    cfg.executor.not_ready_delay_ms = 10;
    cfg.retry.base_delay_ms = 20;
    cfg.retry.max_delay_ms = 40;
    cfg
}

fn components(cfg: &AppConfig, mock: Arc<MockAgentClient>) -> AgentComponents {
    let registry = Arc::new(LocalToolRegistry::new());
    registry.register("playwright", &["browser_navigate", "browser_click"], false);
    assemble(cfg, mock, registry)
}

async fn wait(
    components: &AgentComponents,
    predicate: impl FnMut(&RunSnapshot) -> bool,
) -> RunSnapshot {
    tokio::time::timeout(WAIT, components.session.controller().wait_for(predicate))
        .await
        .expect("timed out waiting for run state")
        .unwrap()
}

#[test]
fn test_scenario_a_numbered_requirements_parse() {
    let plan = PlanGenerator::from_requirements("1. Open https://x.com\n2. Click login");
    let titles: Vec<_> = plan.tasks.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["Open https://x.com", "Click login"]);
    assert!(plan.tasks.iter().all(|t| t.status == TaskStatus::Pending));
}

#[test]
fn test_parse_plan_never_empty() {
    for raw in ["", "   ", "no structure at all", "[]", "{\"a\": 1}"] {
        assert!(!parse_plan(raw).is_empty(), "empty plan for {:?}", raw);
    }
}

#[tokio::test]
async fn test_scenario_b_transport_error_retries_same_task() {
    let mock = Arc::new(MockAgentClient::new());
    mock.push_error(DispatchError::Transport("connection reset".into()));
    let mut app = components(&fast_config(), mock.clone());
    app.session
        .set_plan(PlanGenerator::from_requirements("1. Open: go to https://x.com\n2. Click login"));

    app.session.start().await.unwrap();
    let failed = wait(&app, |s| s.task_status(0) == Some(TaskStatus::Failed)).await;
    let failed_task = failed.executing_plan.as_ref().unwrap().tasks[0].clone();
    assert_eq!(failed.cursor, 0);

    let finished = wait(&app, RunSnapshot::is_finished).await;
    let task = &finished.executing_plan.as_ref().unwrap().tasks[0];
    assert_eq!(task.id, failed_task.id);
    assert_eq!(task.title, failed_task.title);
    assert_eq!(task.description, failed_task.description);
    assert_eq!(task.status, TaskStatus::Completed);

    let dispatched: Vec<_> = mock
        .requests()
        .into_iter()
        .filter(|r| r.options.agent_mode)
        .collect();
    assert_eq!(dispatched.len(), 3);
    assert_eq!(dispatched[0].prompt, dispatched[1].prompt);
}

#[tokio::test]
async fn test_scenario_c_summary_requested_exactly_once() {
    let mock = Arc::new(MockAgentClient::new());
    let mut app = components(&fast_config(), mock.clone());
    app.session
        .set_plan(PlanGenerator::from_requirements("1. Open site\n2. Log in\n3. Log out"));

    app.session.start().await.unwrap();
    let finished = wait(&app, RunSnapshot::is_finished).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let summary = finished.summary.unwrap();
    assert_eq!(summary.completed, 3);
    assert_eq!(summary.total, 3);
    let plain = mock.plain_requests();
    assert_eq!(plain.len(), 1);
    assert!(plain[0].prompt.contains("\"completedTasks\": 3"));
    assert!(plain[0].options.tools.is_none());
}

#[tokio::test]
async fn test_at_most_one_task_in_progress() {
    let mock = Arc::new(MockAgentClient::new().with_latency(Duration::from_millis(10)));
    let mut app = components(&fast_config(), mock);
    app.session.set_plan(PlanGenerator::from_requirements(
        "1. One\n2. Two\n3. Three\n4. Four",
    ));

    let mut rx = app.session.controller().subscribe();
    let watcher = tokio::spawn(async move {
        let mut max = 0;
        while rx.changed().await.is_ok() {
            let snapshot = rx.borrow_and_update().clone();
            max = max.max(snapshot.in_progress_count());
            if snapshot.is_finished() {
                break;
            }
        }
        max
    });

    app.session.start().await.unwrap();
    let max = tokio::time::timeout(WAIT, watcher).await.unwrap().unwrap();
    assert_eq!(max, 1);
}

#[tokio::test]
async fn test_resume_after_completion_resets_all_tasks() {
    let mock = Arc::new(MockAgentClient::new().with_latency(Duration::from_millis(30)));
    let mut app = components(&fast_config(), mock);
    app.session.set_plan(PlanGenerator::from_requirements("1. One\n2. Two"));

    app.session.start().await.unwrap();
    let first = wait(&app, RunSnapshot::is_finished).await;

    app.session.resume().await.unwrap();
    let restarted = app.session.snapshot();
    assert_eq!(restarted.lifecycle, RunLifecycle::Running);
    assert_eq!(restarted.cursor, 0);
    let plan = restarted.executing_plan.unwrap();
    assert_eq!(plan.tasks[1].status, TaskStatus::Pending);
    assert_eq!(plan.tasks[1].progress, 0);
    assert!(plan.tasks[1].result.is_none());
    assert!(plan.tasks[1].duration.is_none());

    let second = wait(&app, |s| s.is_finished() && s.epoch > first.epoch).await;
    assert_eq!(second.executing_plan.unwrap().count(TaskStatus::Completed), 2);
}

#[tokio::test]
async fn test_cancel_then_start_sees_fresh_state() {
    let mock = Arc::new(MockAgentClient::new().with_latency(Duration::from_millis(80)));
    let mut app = components(&fast_config(), mock.clone());
    app.session.set_plan(PlanGenerator::from_requirements("1. One\n2. Two"));

    app.session.start().await.unwrap();
    wait(&app, |s| s.task_status(0) == Some(TaskStatus::InProgress)).await;
    app.session.cancel().await.unwrap();

    let replacement = Plan::from_parsed(
        "Replacement",
        "new",
        parse_plan("1. Alpha\n2. Beta"),
    );
    app.session.set_plan(replacement);
    app.session.start().await.unwrap();

    let snapshot = app.session.snapshot();
    assert_eq!(snapshot.cursor, 0);
    assert!(snapshot
        .log
        .iter()
        .all(|e| !e.message.contains("One") && !e.message.contains("Two")));

    let finished = wait(&app, RunSnapshot::is_finished).await;
    let plan = finished.executing_plan.unwrap();
    assert_eq!(plan.title, "Replacement");
    assert!(plan.tasks.iter().all(|t| t.status == TaskStatus::Completed));
    // 被取消运行的迟到结果不会写进学习日志
    assert!(finished
        .learnings
        .iter()
        .all(|l| plan.task(&l.task_id).is_some()));
}

#[tokio::test]
async fn test_bounded_retry_reaches_failed_terminal_and_run_completes() {
    let mut cfg = fast_config();
    cfg.retry.max_attempts = 2;
    let mock = Arc::new(MockAgentClient::new());
    mock.push_error(DispatchError::Status { status: 500, message: "boom".into() });
    mock.push_error(DispatchError::Status { status: 500, message: "boom".into() });
    mock.push_reply(AgentReply::text("second ok"));
    let mut app = components(&cfg, mock);
    app.session.set_plan(PlanGenerator::from_requirements("1. Flaky\n2. Fine"));

    app.session.start().await.unwrap();
    let finished = wait(&app, RunSnapshot::is_finished).await;
    let plan = finished.executing_plan.unwrap();
    assert_eq!(plan.tasks[0].status, TaskStatus::FailedTerminal);
    assert_eq!(plan.tasks[0].attempts, 2);
    assert_eq!(plan.tasks[1].status, TaskStatus::Completed);
    assert_eq!(finished.summary.unwrap().failed, 1);
}
