/// 配置管理

use std::time::Duration;

use common::ws_rpc::{ClientConfig, ReconnectPolicy};

#[derive(Debug, Clone)]
pub struct Config {
    pub gateway_ws_url: String,
    pub access_token: Option<String>,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
    pub reconnect_multiplier: f64,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 从任意键值来源加载配置
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let gateway_ws_url = lookup("GATEWAY_WS_URL")
            .unwrap_or_else(|| "ws://127.0.0.1:3001".to_string());

        let access_token = lookup("GATEWAY_ACCESS_TOKEN").filter(|t| !t.is_empty());

        let reconnect_initial_ms = lookup("RECONNECT_INITIAL_MS")
            .unwrap_or_else(|| "5000".to_string())
            .parse()?;

        let reconnect_max_ms = lookup("RECONNECT_MAX_MS")
            .unwrap_or_else(|| "60000".to_string())
            .parse()?;

        let reconnect_multiplier = lookup("RECONNECT_MULTIPLIER")
            .unwrap_or_else(|| "2".to_string())
            .parse()?;

        let connect_timeout_secs = lookup("CONNECT_TIMEOUT_SECS")
            .unwrap_or_else(|| "15".to_string())
            .parse()?;

        let request_timeout_secs = lookup("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|| "30".to_string())
            .parse()?;

        Ok(Self {
            gateway_ws_url,
            access_token,
            reconnect_initial_ms,
            reconnect_max_ms,
            reconnect_multiplier,
            connect_timeout_secs,
            request_timeout_secs,
        })
    }

    /// 转换为网关客户端配置并校验
    pub fn client_config(&self) -> common::Result<ClientConfig> {
        let mut config = ClientConfig::new(&self.gateway_ws_url)
            .reconnect(ReconnectPolicy::new(
                Duration::from_millis(self.reconnect_initial_ms),
                Duration::from_millis(self.reconnect_max_ms),
                self.reconnect_multiplier,
            ))
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .request_timeout(Duration::from_secs(self.request_timeout_secs));

        if let Some(token) = &self.access_token {
            config = config.access_token(token);
        }

        config.validate()?;
        Ok(config)
    }
}
