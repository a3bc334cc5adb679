//! 记忆层：执行日志（单写者、只追加）与学习日志（每任务遥测）

pub mod execution_log;
pub mod learnings;

pub use execution_log::{ExecutionLog, LogEntry, LogLevel};
pub use learnings::{LearningEntry, LearningJournal};
