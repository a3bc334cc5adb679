//! 执行控制器：运行生命周期（start / pause / resume / cancel）
//!
//! 单个 actor 任务独占执行中的计划、执行日志与学习日志：
//! - 命令经 mpsc 通道送入，oneshot 回复结果；
//! - 门控、派发、总结与定时器在独立任务中运行，完成后带着运行代次（epoch）回报事件；
//! - 代次不匹配的事件（取消后迟到的响应等）直接丢弃；
//! - 每次状态变化后通过 watch 通道发布 RunSnapshot。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::core::executor::{DispatchOutcome, ExecutingRun, GateCheck, NextStep, TaskExecutor};
use crate::core::summary::{SummaryReport, SummarySynthesizer, SUMMARY_LOG_TAIL};
use crate::core::{OrchestratorError, RunLifecycle, RunSnapshot, RunSummary};
use crate::memory::{ExecutionLog, LearningEntry, LearningJournal, LogEntry};
use crate::plan::{Plan, TaskStatus};

type Reply<T> = oneshot::Sender<Result<T, OrchestratorError>>;

/// 发往控制器的命令
#[derive(Debug)]
pub enum Command {
    /// 开始运行计划，回复新的运行代次
    Start { plan: Plan, reply: Reply<u64> },
    Pause { reply: Reply<()> },
    Resume { reply: Reply<()> },
    Cancel { reply: Reply<()> },
}

/// 后台作业完成后回报给 actor 的事件
#[derive(Debug)]
enum Event {
    Wake { epoch: u64, seq: u64 },
    GateChecked { epoch: u64, check: GateCheck },
    Dispatched(DispatchOutcome),
    Summarized { epoch: u64, summary: RunSummary },
}

/// 当前正在进行的后台作业（同一时刻至多一个）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InFlight {
    Nothing,
    Sleeping(u64),
    Gating,
    Dispatching,
    Summarizing,
}

/// 控制器句柄：可克隆，供 Session / CLI / 测试使用
#[derive(Clone)]
pub struct ControllerHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    snapshot_rx: watch::Receiver<RunSnapshot>,
    log_tx: broadcast::Sender<LogEntry>,
    executor: Arc<TaskExecutor>,
    shutdown: CancellationToken,
}

impl ControllerHandle {
    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T, OrchestratorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(make(reply_tx))
            .map_err(|_| OrchestratorError::ControllerClosed)?;
        reply_rx.await.map_err(|_| OrchestratorError::ControllerClosed)?
    }

    /// 开始运行：先做一次带重试的门控检查（在调用方执行，actor 期间仍可处理命令）
    ///
    /// 已在运行或暂停时直接拒绝，不触发门控；actor 收到命令时会再检查一次。
    pub async fn start(&self, plan: Plan) -> Result<u64, OrchestratorError> {
        let state = self.snapshot_rx.borrow().lifecycle;
        if matches!(state, RunLifecycle::Running | RunLifecycle::Paused) {
            return Err(OrchestratorError::InvalidState { action: "start", state });
        }
        let gate = self.executor.gate();
        let required = self.executor.required_providers();
        if !gate.ensure_ready_with_retry(required).await {
            let missing = gate
                .catalogue()
                .await
                .missing(required)
                .into_iter()
                .map(String::from)
                .collect();
            return Err(OrchestratorError::NotReady { missing });
        }
        self.request(|reply| Command::Start { plan, reply }).await
    }

    pub async fn pause(&self) -> Result<(), OrchestratorError> {
        self.request(|reply| Command::Pause { reply }).await
    }

    pub async fn resume(&self) -> Result<(), OrchestratorError> {
        self.request(|reply| Command::Resume { reply }).await
    }

    pub async fn cancel(&self) -> Result<(), OrchestratorError> {
        self.request(|reply| Command::Cancel { reply }).await
    }

    pub fn snapshot(&self) -> RunSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunSnapshot> {
        self.snapshot_rx.clone()
    }

    /// 实时日志流
    pub fn subscribe_log(&self) -> broadcast::Receiver<LogEntry> {
        self.log_tx.subscribe()
    }

    /// 等待快照满足条件
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&RunSnapshot) -> bool,
    ) -> Result<RunSnapshot, OrchestratorError> {
        let mut rx = self.snapshot_rx.clone();
        let snapshot = rx
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| OrchestratorError::ControllerClosed)?;
        Ok(snapshot.clone())
    }

    /// 停止 actor；已发出的派发不会被召回
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

pub struct ExecutionController {
    executor: Arc<TaskExecutor>,
    synthesizer: Arc<SummarySynthesizer>,
    lifecycle: RunLifecycle,
    epoch: u64,
    run: Option<ExecutingRun>,
    log: ExecutionLog,
    journal: LearningJournal,
    summary: Option<RunSummary>,
    warning: Option<String>,
    in_flight: InFlight,
    wake_seq: u64,
    event_tx: mpsc::UnboundedSender<Event>,
    snapshot_tx: watch::Sender<RunSnapshot>,
    /// 上次发布的日志（按 revision）与学习条目（按条数），未变化时复用
    shared_log: (u64, Arc<Vec<LogEntry>>),
    shared_learnings: (usize, Arc<Vec<LearningEntry>>),
}

impl ExecutionController {
    /// 启动控制器 actor，返回句柄
    pub fn spawn(
        executor: Arc<TaskExecutor>,
        synthesizer: Arc<SummarySynthesizer>,
        log_capacity: usize,
    ) -> ControllerHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(RunSnapshot::default());
        let log = ExecutionLog::new(log_capacity);
        let log_tx = log.sender();
        let shutdown = CancellationToken::new();

        let actor = Self {
            executor: executor.clone(),
            synthesizer,
            lifecycle: RunLifecycle::Idle,
            epoch: 0,
            run: None,
            log,
            journal: LearningJournal::new(),
            summary: None,
            warning: None,
            in_flight: InFlight::Nothing,
            wake_seq: 0,
            event_tx,
            snapshot_tx,
            shared_log: (0, Arc::default()),
            shared_learnings: (0, Arc::default()),
        };
        tokio::spawn(actor.run_loop(cmd_rx, event_rx, shutdown.clone()));

        ControllerHandle {
            cmd_tx,
            snapshot_rx,
            log_tx,
            executor,
            shutdown,
        }
    }

    async fn run_loop(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
        mut event_rx: mpsc::UnboundedReceiver<Event>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
                Some(event) = event_rx.recv() => {
                    self.handle_event(event);
                    self.publish();
                }
            }
        }
        tracing::info!("Execution controller stopped");
    }

    /// 先发布快照再回复，调用方拿到回复时快照已是最新
    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Start { plan, reply } => {
                let result = self.start(plan);
                self.publish();
                let _ = reply.send(result);
            }
            Command::Pause { reply } => {
                let result = self.pause();
                self.publish();
                let _ = reply.send(result);
            }
            Command::Resume { reply } => {
                let result = self.resume();
                self.publish();
                let _ = reply.send(result);
            }
            Command::Cancel { reply } => {
                self.cancel();
                self.publish();
                let _ = reply.send(Ok(()));
            }
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Wake { epoch, seq } => {
                if epoch != self.epoch || self.in_flight != InFlight::Sleeping(seq) {
                    return;
                }
                self.in_flight = InFlight::Nothing;
                self.step();
            }
            Event::GateChecked { epoch, check } => {
                if epoch != self.epoch {
                    return;
                }
                self.in_flight = InFlight::Nothing;
                self.on_gate_checked(check);
            }
            Event::Dispatched(outcome) => {
                if outcome.epoch != self.epoch {
                    tracing::debug!(task_id = %outcome.task_id, "late response after cancel ignored");
                    return;
                }
                self.in_flight = InFlight::Nothing;
                self.on_dispatched(outcome);
            }
            Event::Summarized { epoch, summary } => {
                if epoch != self.epoch {
                    return;
                }
                self.in_flight = InFlight::Nothing;
                self.log.append(LogEntry::success(format!(
                    "Run completed: {}/{} task(s) completed, {} failed",
                    summary.completed, summary.total, summary.failed
                )));
                self.summary = Some(summary);
                self.lifecycle = RunLifecycle::Completed;
            }
        }
    }

    fn next_epoch(&mut self) -> u64 {
        self.epoch += 1;
        self.wake_seq += 1;
        self.in_flight = InFlight::Nothing;
        self.epoch
    }

    fn start(&mut self, mut plan: Plan) -> Result<u64, OrchestratorError> {
        if matches!(self.lifecycle, RunLifecycle::Running | RunLifecycle::Paused) {
            return Err(OrchestratorError::InvalidState {
                action: "start",
                state: self.lifecycle,
            });
        }
        if plan.tasks.is_empty() {
            return Err(OrchestratorError::EmptyPlan);
        }

        let epoch = self.next_epoch();
        plan.reset_tasks();
        self.log.clear();
        self.summary = None;
        self.warning = None;
        self.log.append(LogEntry::info(format!(
            "Starting plan \"{}\" ({} task(s))",
            plan.title,
            plan.tasks.len()
        )));
        self.run = Some(ExecutingRun::new(epoch, plan));
        self.lifecycle = RunLifecycle::Running;
        self.step();
        Ok(epoch)
    }

    fn pause(&mut self) -> Result<(), OrchestratorError> {
        if self.lifecycle != RunLifecycle::Running {
            return Err(OrchestratorError::InvalidState {
                action: "pause",
                state: self.lifecycle,
            });
        }
        self.lifecycle = RunLifecycle::Paused;
        if let InFlight::Sleeping(_) = self.in_flight {
            self.wake_seq += 1;
            self.in_flight = InFlight::Nothing;
        }
        self.log.append(LogEntry::info("Execution paused"));
        Ok(())
    }

    fn resume(&mut self) -> Result<(), OrchestratorError> {
        let from = self.lifecycle;
        if !matches!(from, RunLifecycle::Paused | RunLifecycle::Completed) || self.run.is_none() {
            return Err(OrchestratorError::InvalidState {
                action: "resume",
                state: from,
            });
        }

        let restart = self.run.as_ref().map(|r| r.plan.all_completed()).unwrap_or(false);
        let epoch = if restart { self.next_epoch() } else { self.epoch };
        if let Some(run) = self.run.as_mut() {
            if restart {
                run.epoch = epoch;
                run.plan.reset_tasks();
                run.cursor = 0;
                run.summary_requested = false;
                self.summary = None;
                self.log.append(LogEntry::info("All tasks completed, restarting plan from the beginning"));
            } else if from == RunLifecycle::Completed {
                // 结束后恢复：重置终止失败的任务，从第一个未完成任务继续
                for task in run.plan.tasks.iter_mut().filter(|t| t.status == TaskStatus::FailedTerminal) {
                    task.reset();
                }
                run.cursor = run
                    .plan
                    .tasks
                    .iter()
                    .position(|t| t.status != TaskStatus::Completed)
                    .unwrap_or(run.plan.tasks.len());
                run.summary_requested = false;
                self.summary = None;
                self.log.append(LogEntry::info("Retrying failed tasks"));
            } else {
                self.log.append(LogEntry::info(format!("Resuming at task {}", run.cursor + 1)));
            }
        }

        self.lifecycle = RunLifecycle::Running;
        if self.in_flight == InFlight::Nothing {
            self.step();
        }
        Ok(())
    }

    fn cancel(&mut self) {
        if self.lifecycle == RunLifecycle::Idle && self.run.is_none() {
            return;
        }
        let epoch = self.next_epoch();
        tracing::info!(epoch, "run cancelled, executing plan discarded");
        self.run = None;
        self.log.clear();
        self.summary = None;
        self.warning = None;
        self.lifecycle = RunLifecycle::Idle;
    }

    /// 步骤 1：处理游标处任务（或在全部处理完后发起总结）
    fn step(&mut self) {
        if self.lifecycle != RunLifecycle::Running {
            return;
        }
        let exhausted = match self.run.as_mut() {
            Some(run) => {
                run.skip_completed();
                run.is_exhausted()
            }
            None => return,
        };
        if exhausted {
            self.start_summary();
            return;
        }

        self.in_flight = InFlight::Gating;
        let epoch = self.epoch;
        let executor = self.executor.clone();
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let check = executor.check_gate().await;
            let _ = tx.send(Event::GateChecked { epoch, check });
        });
    }

    fn on_gate_checked(&mut self, check: GateCheck) {
        if self.lifecycle != RunLifecycle::Running {
            return;
        }
        let Some(run) = self.run.as_mut() else {
            return;
        };

        if !check.ready {
            let warning = format!("Tool providers not ready: {}", check.details.join(", "));
            let task_id = run.plan.tasks.get(run.cursor).map(|t| t.id.clone());
            let mut entry = LogEntry::warning(format!("{}, task deferred", warning));
            if let Some(id) = task_id {
                entry = entry.for_task(id);
            }
            self.log.append(entry);
            self.warning = Some(warning);
            let delay = self.executor.settings().not_ready_delay;
            self.schedule(delay);
            return;
        }

        self.warning = None;
        let Some(job) = self.executor.begin(run, &mut self.log, check.tools) else {
            return;
        };
        self.in_flight = InFlight::Dispatching;
        let executor = self.executor.clone();
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let outcome = executor.dispatch(job).await;
            let _ = tx.send(Event::Dispatched(outcome));
        });
    }

    fn on_dispatched(&mut self, outcome: DispatchOutcome) {
        let next = match self.run.as_mut() {
            Some(run) => self
                .executor
                .apply(run, &mut self.log, &mut self.journal, outcome),
            None => return,
        };
        match next {
            Some(NextStep::Advance(delay)) | Some(NextStep::Retry(delay)) => self.schedule(delay),
            None => self.step(),
        }
    }

    /// 定时回到步骤 1；暂停时不安排
    fn schedule(&mut self, delay: Duration) {
        if self.lifecycle != RunLifecycle::Running {
            self.in_flight = InFlight::Nothing;
            return;
        }
        self.wake_seq += 1;
        let seq = self.wake_seq;
        let epoch = self.epoch;
        self.in_flight = InFlight::Sleeping(seq);
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Event::Wake { epoch, seq });
        });
    }

    fn start_summary(&mut self) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        if run.summary_requested {
            return;
        }
        run.summary_requested = true;
        let report = SummaryReport::build(&run.plan, &self.log.tail(SUMMARY_LOG_TAIL));
        self.log.append(LogEntry::info("All tasks processed, generating summary"));

        self.in_flight = InFlight::Summarizing;
        let epoch = self.epoch;
        let synthesizer = self.synthesizer.clone();
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let summary = synthesizer.synthesize(&report).await;
            let _ = tx.send(Event::Summarized { epoch, summary });
        });
    }

    fn publish(&mut self) {
        if self.shared_log.0 != self.log.revision() {
            self.shared_log = (self.log.revision(), Arc::new(self.log.entries()));
        }
        if self.shared_learnings.0 != self.journal.len() {
            self.shared_learnings = (self.journal.len(), Arc::new(self.journal.entries().to_vec()));
        }
        self.snapshot_tx.send_replace(RunSnapshot {
            lifecycle: self.lifecycle,
            epoch: self.epoch,
            cursor: self.run.as_ref().map(|r| r.cursor).unwrap_or(0),
            executing_plan: self.run.as_ref().map(|r| r.plan.clone()),
            log: self.shared_log.1.clone(),
            learnings: self.shared_learnings.1.clone(),
            summary: self.summary.clone(),
            warning: self.warning.clone(),
        });
    }
}
