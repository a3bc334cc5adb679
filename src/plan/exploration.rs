//! 探索结果解析：把 Agent 描述的测试场景转成结构化记录
//!
//! 与 parse_plan 同样的分级策略：`{"scenarios": [...]}` 对象 → 裸数组 → 单个兜底场景。

use serde::{Deserialize, Deserializer, Serialize};

use crate::plan::parser::find_literal;

/// 场景优先级；无法识别的值按 Medium 处理
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioPriority {
    High,
    #[default]
    Medium,
    Low,
}

impl ScenarioPriority {
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Self::High,
            "low" => Self::Low,
            _ => Self::Medium,
        }
    }
}

impl<'de> Deserialize<'de> for ScenarioPriority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(value
            .as_str()
            .map(Self::parse_lenient)
            .unwrap_or_default())
    }
}

/// 探索发现的测试场景
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplorationScenario {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub page: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub priority: ScenarioPriority,
    #[serde(default)]
    pub steps: Vec<String>,
}

#[derive(Deserialize)]
struct ScenarioEnvelope {
    scenarios: Vec<ExplorationScenario>,
}

/// 解析探索输出；永不失败，至少返回一个场景
pub fn parse_exploration_result(raw: &str) -> Vec<ExplorationScenario> {
    let from_object = find_literal(raw, '{', '}', |literal| {
        serde_json::from_str::<ScenarioEnvelope>(literal)
            .ok()
            .map(|env| env.scenarios)
            .filter(|s| !s.is_empty())
    });
    if let Some(scenarios) = from_object {
        return scenarios;
    }

    let from_array = find_literal(raw, '[', ']', |literal| {
        serde_json::from_str::<Vec<ExplorationScenario>>(literal)
            .ok()
            .filter(|s| !s.is_empty())
    });
    if let Some(scenarios) = from_array {
        return scenarios;
    }

    tracing::debug!("exploration output unstructured, using fallback scenario");
    vec![ExplorationScenario {
        title: "Explored application".to_string(),
        description: raw.trim().to_string(),
        page: String::new(),
        category: "general".to_string(),
        priority: ScenarioPriority::Medium,
        steps: Vec::new(),
    }]
}
