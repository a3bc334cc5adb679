//! Ralph - 自动化测试计划编排器
//!
//! 入口：加载配置、初始化日志、得到计划（解析需求 / 让 Agent 生成 / 探索站点），
//! 运行并实时输出执行日志，结束后打印总结。

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use ralph::agent::create_agent_components;
use ralph::config::load_config;
use ralph::memory::LogLevel;
use ralph::plan::{Plan, PlanGenerator};
use ralph::{observability, RunSnapshot};

#[derive(Parser, Debug)]
#[command(name = "ralph")]
#[command(about = "Ralph - 测试计划编排：解析 / 生成计划并逐个派发给 Agent 执行")]
struct CliArgs {
    /// 需求文件（编号列表或自由文本）
    #[arg(required_unless_present = "explore", conflicts_with = "explore")]
    requirements: Option<PathBuf>,

    /// 额外配置文件，覆盖 config/default.toml
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// 让 Agent 根据需求生成计划，而不是直接解析
    #[arg(long, short = 'g')]
    generate: bool,

    /// 探索目标站点并把发现的场景作为计划
    #[arg(long, short = 'e', value_name = "URL")]
    explore: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();
    let args = CliArgs::parse();

    let cfg = load_config(args.config.clone()).context("Failed to load config")?;
    let mut components = create_agent_components(&cfg);

    let plan: Plan = if let Some(target) = &args.explore {
        if !components.gate.ensure_ready_with_retry(&cfg.tools.required_providers).await {
            bail!("tool providers not ready, cannot explore {}", target);
        }
        let tools = components.gate.tool_names().await;
        let scenarios = components
            .generator
            .explore(target, tools)
            .await
            .context("Exploration request failed")?;
        Plan::from_scenarios(format!("Exploration of {}", target), &scenarios)
    } else {
        let path = args.requirements.as_ref().context("requirements file missing")?;
        let requirements = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if args.generate {
            components
                .generator
                .generate(&requirements)
                .await
                .context("Plan generation failed")?
        } else {
            PlanGenerator::from_requirements(&requirements)
        }
    };

    println!("Plan: {} ({} task(s))", plan.title, plan.tasks.len());
    for (i, task) in plan.tasks.iter().enumerate() {
        println!("  {}. {}", i + 1, task.title);
    }

    components.session.set_plan(plan);
    let controller = components.session.controller().clone();
    let mut log_rx = controller.subscribe_log();
    let printer = tokio::spawn(async move {
        while let Ok(entry) = log_rx.recv().await {
            let marker = match entry.level {
                LogLevel::Info => " ",
                LogLevel::Success => "+",
                LogLevel::Warning => "!",
                LogLevel::Error => "x",
            };
            println!("[{}] {}", marker, entry.render());
        }
    });

    components.session.start().await.context("Failed to start run")?;

    let finished: RunSnapshot = tokio::select! {
        snapshot = controller.wait_for(RunSnapshot::is_finished) => snapshot?,
        _ = tokio::signal::ctrl_c() => {
            controller.cancel().await?;
            controller.shutdown();
            printer.abort();
            println!("Cancelled");
            return Ok(());
        }
    };

    controller.shutdown();
    printer.abort();

    if let Some(summary) = &finished.summary {
        println!();
        println!(
            "Completed {}/{} task(s), {} failed",
            summary.completed, summary.total, summary.failed
        );
        println!("{}", summary.text);
    }
    Ok(())
}
