/// 网关客户端配置

use std::time::Duration;

use super::backoff::ReconnectPolicy;
use crate::{Error, Result};

/// 连接超时默认值
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// 单个请求超时默认值
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// 网关客户端配置
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// 网关地址（ws:// 或 wss://）
    pub url: String,

    /// 握手时携带的 access token（`Authorization: Bearer ...`）
    pub access_token: Option<String>,

    /// 重连退避策略
    pub reconnect: ReconnectPolicy,

    /// 建立连接的超时时间
    pub connect_timeout: Duration,

    /// 单个请求等待响应的超时时间
    pub request_timeout: Duration,
}

impl ClientConfig {
    /// 使用默认参数创建配置
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            access_token: None,
            reconnect: ReconnectPolicy::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(Error::Config("网关地址不能为空".to_string()));
        }
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(Error::Config(format!(
                "网关地址必须以 ws:// 或 wss:// 开头: {}",
                self.url
            )));
        }
        if self.connect_timeout.is_zero() {
            return Err(Error::Config("连接超时必须大于 0".to_string()));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::Config("请求超时必须大于 0".to_string()));
        }
        self.reconnect.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = ClientConfig::new("ws://127.0.0.1:3001");
        assert_eq!(cfg.connect_timeout, Duration::from_secs(15));
        assert_eq!(cfg.request_timeout, Duration::from_secs(30));
        assert_eq!(cfg.reconnect.initial_delay, Duration::from_secs(5));
        assert_eq!(cfg.reconnect.max_delay, Duration::from_secs(60));
        assert_eq!(cfg.reconnect.multiplier, 2.0);
        assert!(cfg.access_token.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_scheme() {
        let cfg = ClientConfig::new("http://127.0.0.1:3001");
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
        assert!(ClientConfig::new("").validate().is_err());
    }

    #[test]
    fn test_rejects_zero_timeouts() {
        let cfg = ClientConfig::new("ws://localhost").request_timeout(Duration::ZERO);
        assert!(cfg.validate().is_err());

        let cfg = ClientConfig::new("ws://localhost").connect_timeout(Duration::ZERO);
        assert!(cfg.validate().is_err());
    }
}
