//! 失败重试策略
//!
//! 默认：有上限的指数退避，超过次数后任务进入 failed-terminal。
//! max_attempts 为 None 时退化为无上限、固定间隔重试。

use std::time::Duration;

/// 一次失败后的决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// 等待后重试同一任务
    RetryAfter(Duration),
    /// 次数耗尽
    GiveUp,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// 单个任务最多派发次数（含首次）；None 表示不设上限
    pub max_attempts: Option<u32>,
    pub base_delay: Duration,
    /// 每次失败后延迟乘数；1.0 即固定间隔
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(5),
            base_delay: Duration::from_secs(3),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// 无上限、固定 3 秒
    pub fn unbounded(delay: Duration) -> Self {
        Self {
            max_attempts: None,
            base_delay: delay,
            multiplier: 1.0,
            max_delay: delay,
        }
    }

    /// attempts：该任务到目前为止已派发的次数（≥1）
    pub fn decide(&self, attempts: u32) -> RetryDecision {
        if let Some(max) = self.max_attempts {
            if attempts >= max {
                return RetryDecision::GiveUp;
            }
        }
        RetryDecision::RetryAfter(self.delay_for(attempts))
    }

    fn delay_for(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(32) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);
        let cap = self.max_delay.max(self.base_delay).as_secs_f64();
        Duration::from_secs_f64((self.base_delay.as_secs_f64() * factor).min(cap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.decide(1), RetryDecision::RetryAfter(Duration::from_secs(3)));
        assert_eq!(policy.decide(2), RetryDecision::RetryAfter(Duration::from_secs(6)));
        assert_eq!(policy.decide(3), RetryDecision::RetryAfter(Duration::from_secs(12)));
        assert_eq!(policy.decide(4), RetryDecision::RetryAfter(Duration::from_secs(24)));
        assert_eq!(policy.decide(5), RetryDecision::GiveUp);
    }

    #[test]
    fn test_cap_applies() {
        let policy = RetryPolicy {
            max_attempts: Some(10),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.decide(6), RetryDecision::RetryAfter(Duration::from_secs(30)));
    }

    #[test]
    fn test_unbounded_never_gives_up() {
        let policy = RetryPolicy::unbounded(Duration::from_secs(3));
        for attempts in [1, 10, 1000, u32::MAX] {
            assert_eq!(policy.decide(attempts), RetryDecision::RetryAfter(Duration::from_secs(3)));
        }
    }
}
