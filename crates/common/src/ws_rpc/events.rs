/// 连接状态、生命周期通知与事件回调

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::RpcError;

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// 生命周期通知
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// 成功进入 connected 状态
    Connect,
    /// 已建立的连接意外断开（主动 disconnect 不触发）
    Disconnect,
    /// 一次连接尝试失败
    ConnectError(RpcError),
}

/// 推送事件处理器
///
/// 由连接以 fire-and-forget 方式调用，返回的错误只会被记录
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_event(&self, event: Value) -> anyhow::Result<()>;
}

/// 基于闭包的事件处理器
pub struct FnEventHandler<F> {
    f: F,
}

/// 用异步闭包构造事件处理器
pub fn event_handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnEventHandler { f })
}

#[async_trait]
impl<F, Fut> EventHandler for FnEventHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn on_event(&self, event: Value) -> anyhow::Result<()> {
        (self.f)(event).await
    }
}

/// 机器人 ID 回调
pub type BotIdCallback = Arc<dyn Fn(String) + Send + Sync>;

/// 生命周期监听器
pub type ConnectionListener = Arc<dyn Fn(&ConnectionEvent) + Send + Sync>;

/// 监听器列表
#[derive(Default)]
pub struct Listeners {
    listeners: RwLock<Vec<ConnectionListener>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, listener: ConnectionListener) {
        let mut listeners = self.listeners.write().await;
        listeners.push(listener);
    }

    /// 依次通知所有监听器
    pub async fn emit(&self, event: ConnectionEvent) {
        let listeners = self.listeners.read().await.clone();
        for listener in listeners {
            listener(&event);
        }
    }
}
