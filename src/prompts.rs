//! 指令模板
//!
//! 依次查找 config/prompts/<name>.txt、../config/prompts/<name>.txt，找不到时使用内置模板。
//! 占位符：`{title}` `{description}` `{requirements}` `{target}` `{report}`。

use std::path::PathBuf;

const TASK_TEMPLATE: &str = "Execute the following test task using the available tools.\n\
Task: {title}\n\
Details: {description}\n\
Perform every step, then report what you did and whether it succeeded.";

const PLAN_TEMPLATE: &str = "Break the following test requirements into an ordered list of tasks.\n\
Respond with a JSON array of objects with \"title\" and \"description\" fields.\n\n\
Requirements:\n{requirements}";

const EXPLORE_TEMPLATE: &str = "Explore {target} with the browser tools and list the test scenarios you discover.\n\
Respond with a JSON object {\"scenarios\": [{\"title\", \"description\", \"page\", \"category\", \"priority\", \"steps\"}]}.\n\
priority must be one of high, medium, low.";

const SUMMARY_TEMPLATE: &str = "Write a concise test execution report from the data below: \
overall outcome, per-task results, notable failures and recommendations.\n\n{report}";

/// 运行期使用的全部模板
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    pub task: String,
    pub plan: String,
    pub explore: String,
    pub summary: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            task: TASK_TEMPLATE.to_string(),
            plan: PLAN_TEMPLATE.to_string(),
            explore: EXPLORE_TEMPLATE.to_string(),
            summary: SUMMARY_TEMPLATE.to_string(),
        }
    }
}

fn load_one(dirs: &[PathBuf], name: &str, fallback: &str) -> String {
    dirs.iter()
        .map(|d| d.join(format!("{}.txt", name)))
        .find_map(|p| std::fs::read_to_string(p).ok())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

impl PromptSet {
    /// 从目录加载；`dir` 优先于默认查找路径
    pub fn load(dir: Option<PathBuf>) -> Self {
        let mut dirs: Vec<PathBuf> = dir.into_iter().collect();
        dirs.push(PathBuf::from("config/prompts"));
        dirs.push(PathBuf::from("../config/prompts"));
        Self {
            task: load_one(&dirs, "task", TASK_TEMPLATE),
            plan: load_one(&dirs, "plan", PLAN_TEMPLATE),
            explore: load_one(&dirs, "explore", EXPLORE_TEMPLATE),
            summary: load_one(&dirs, "summary", SUMMARY_TEMPLATE),
        }
    }

    pub fn task_prompt(&self, title: &str, description: &str) -> String {
        self.task
            .replace("{title}", title)
            .replace("{description}", description)
    }

    pub fn plan_prompt(&self, requirements: &str) -> String {
        self.plan.replace("{requirements}", requirements)
    }

    pub fn explore_prompt(&self, target: &str) -> String {
        self.explore.replace("{target}", target)
    }

    pub fn summary_prompt(&self, report: &str) -> String {
        self.summary.replace("{report}", report)
    }
}
