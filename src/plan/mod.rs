//! 计划层：数据模型、计划 / 探索结果解析、计划生成请求

pub mod exploration;
pub mod generator;
pub mod model;
pub mod parser;

pub use exploration::{parse_exploration_result, ExplorationScenario, ScenarioPriority};
pub use generator::PlanGenerator;
pub use model::{Plan, PlanError, Task, TaskId, TaskStatus};
pub use parser::{parse_plan, ParsedTask, FALLBACK_TASK_TITLE};
