/// 重连退避策略

use std::time::Duration;

use crate::{Error, Result};

/// 指数退避参数
///
/// 第 n 次（从 0 开始）重连的等待时间为 `min(initial_delay * multiplier^n, max_delay)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

impl ReconnectPolicy {
    pub fn new(initial_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
        }
    }

    /// 计算第 `attempt` 次重连的等待时间（attempt 从 0 开始）
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let initial_ms = self.initial_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_ms = (initial_ms * self.multiplier.powi(exponent)).min(max_ms);
        Duration::from_millis(delay_ms as u64)
    }

    /// 校验参数
    pub fn validate(&self) -> Result<()> {
        if self.initial_delay.is_zero() {
            return Err(Error::Config("初始重连间隔必须大于 0".to_string()));
        }
        if self.max_delay < self.initial_delay {
            return Err(Error::Config("最大重连间隔不能小于初始重连间隔".to_string()));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(Error::Config("退避倍数必须 >= 1.0".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_delay_sequence() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u64> = (0..7)
            .map(|n| policy.delay_for_attempt(n).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![5000, 10000, 20000, 40000, 60000, 60000, 60000]);
    }

    #[test]
    fn test_huge_attempt_is_capped() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_multiplier_one_is_constant() {
        let policy = ReconnectPolicy::new(Duration::from_millis(250), Duration::from_secs(1), 1.0);
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(250));
        assert_eq!(policy.delay_for_attempt(9), Duration::from_millis(250));
    }

    #[test]
    fn test_validate() {
        assert!(ReconnectPolicy::default().validate().is_ok());

        let zero = ReconnectPolicy::new(Duration::ZERO, Duration::from_secs(1), 2.0);
        assert!(zero.validate().is_err());

        let inverted = ReconnectPolicy::new(Duration::from_secs(10), Duration::from_secs(1), 2.0);
        assert!(inverted.validate().is_err());

        let shrinking = ReconnectPolicy::new(Duration::from_secs(1), Duration::from_secs(10), 0.5);
        assert!(shrinking.validate().is_err());

        let nan = ReconnectPolicy::new(Duration::from_secs(1), Duration::from_secs(10), f64::NAN);
        assert!(nan.validate().is_err());
    }
}
