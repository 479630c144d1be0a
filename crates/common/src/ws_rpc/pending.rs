/// 待响应请求表
///
/// 按 echo token 关联请求与响应，不依赖到达顺序。
/// 每个条目自带超时计时器，调用方提前放弃等待时条目仍会按时清除

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{oneshot, RwLock};
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use super::{ActionResponse, RpcError};

/// RPC 响应等待器
type ResponseWaiter = oneshot::Sender<Result<Value, RpcError>>;

/// 单个待处理请求
struct PendingEntry {
    waiter: ResponseWaiter,

    /// 超时计时器，条目被其他路径取走时中止
    timer: AbortHandle,
}

type WaiterMap = Arc<RwLock<HashMap<String, PendingEntry>>>;

/// 待响应请求表
pub struct PendingRequests {
    /// echo -> 等待器与计时器
    waiters: WaiterMap,

    /// 单调递增序号，整个客户端生命周期内不重置
    next_seq: AtomicU64,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self {
            waiters: Arc::new(RwLock::new(HashMap::new())),
            next_seq: AtomicU64::new(0),
        }
    }

    /// 分配新的 echo token: `<毫秒时间戳>-<序号>`
    pub fn next_echo(&self) -> String {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", chrono::Utc::now().timestamp_millis(), seq)
    }

    /// 注册等待响应
    ///
    /// `timeout` 到期后条目被移除，并以 `on_timeout` 拒绝
    pub async fn register(
        &self,
        echo: &str,
        timeout: Duration,
        on_timeout: RpcError,
    ) -> oneshot::Receiver<Result<Value, RpcError>> {
        let (tx, rx) = oneshot::channel();
        let mut waiters = self.waiters.write().await;

        let timer = tokio::spawn(expire(Arc::clone(&self.waiters), echo.to_string(), timeout, on_timeout));
        let previous = waiters.insert(
            echo.to_string(),
            PendingEntry {
                waiter: tx,
                timer: timer.abort_handle(),
            },
        );
        if let Some(previous) = previous {
            warn!("echo token 重复注册: {}", echo);
            previous.timer.abort();
        }
        rx
    }

    /// 移除等待器但不通知
    pub async fn remove(&self, echo: &str) -> bool {
        let entry = {
            let mut waiters = self.waiters.write().await;
            waiters.remove(echo)
        };
        match entry {
            Some(entry) => {
                entry.timer.abort();
                true
            }
            None => false,
        }
    }

    /// 用响应完成对应请求
    ///
    /// 返回 false 表示没有对应请求（未知 token 或已超时）
    pub async fn settle(&self, response: ActionResponse) -> bool {
        let echo = response.echo_key();
        let entry = {
            let mut waiters = self.waiters.write().await;
            waiters.remove(&echo)
        };

        match entry {
            Some(entry) => {
                entry.timer.abort();
                // 调用方可能已放弃等待
                let _ = entry.waiter.send(response.into_result());
                true
            }
            None => false,
        }
    }

    /// 以同一个错误拒绝全部待处理请求，返回被拒绝的数量
    pub async fn fail_all(&self, err: RpcError) -> usize {
        let mut waiters = self.waiters.write().await;
        let count = waiters.len();
        for (echo, entry) in waiters.drain() {
            debug!("清理待处理请求: {}", echo);
            entry.timer.abort();
            let _ = entry.waiter.send(Err(err.clone()));
        }
        count
    }

    /// 获取待处理请求数量
    pub async fn len(&self) -> usize {
        let waiters = self.waiters.read().await;
        waiters.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new()
    }
}

/// 超时计时器：到期时取走条目并拒绝
async fn expire(waiters: WaiterMap, echo: String, timeout: Duration, err: RpcError) {
    tokio::time::sleep(timeout).await;

    let entry = {
        let mut waiters = waiters.write().await;
        waiters.remove(&echo)
    };
    if let Some(entry) = entry {
        debug!("请求超时，移除等待器: {}", echo);
        let _ = entry.waiter.send(Err(err));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws_rpc::RpcErrorCode;
    use serde_json::json;
    use std::collections::HashSet;

    const LONG: Duration = Duration::from_secs(30);

    fn response(value: Value) -> ActionResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_echo_tokens_are_unique() {
        let pending = PendingRequests::new();
        let tokens: HashSet<String> = (0..1000).map(|_| pending.next_echo()).collect();
        assert_eq!(tokens.len(), 1000);
    }

    #[tokio::test]
    async fn test_settle_out_of_order() {
        let pending = PendingRequests::new();
        let rx_a = pending.register("a", LONG, RpcError::timeout("a")).await;
        let rx_b = pending.register("b", LONG, RpcError::timeout("b")).await;

        assert!(pending.settle(response(json!({"status": "ok", "echo": "b", "data": 2}))).await);
        assert!(pending.settle(response(json!({"status": "ok", "echo": "a", "data": 1}))).await);

        assert_eq!(rx_a.await.unwrap().unwrap(), json!(1));
        assert_eq!(rx_b.await.unwrap().unwrap(), json!(2));
        assert!(pending.is_empty().await);
    }

    #[tokio::test]
    async fn test_settle_unknown_is_noop() {
        let pending = PendingRequests::new();
        let _rx = pending.register("known", LONG, RpcError::timeout("known")).await;
        assert!(!pending.settle(response(json!({"status": "ok", "echo": "unknown"}))).await);
        assert_eq!(pending.len().await, 1);
    }

    #[tokio::test]
    async fn test_settle_after_remove_is_noop() {
        let pending = PendingRequests::new();
        let rx = pending.register("late", LONG, RpcError::timeout("late")).await;
        assert!(pending.remove("late").await);
        assert!(!pending.settle(response(json!({"status": "ok", "echo": "late"}))).await);
        // 等待器已被丢弃，接收端只会看到通道关闭
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_fail_all_drains() {
        let pending = PendingRequests::new();
        let rx_a = pending.register("a", LONG, RpcError::timeout("a")).await;
        let rx_b = pending.register("b", LONG, RpcError::timeout("b")).await;

        assert_eq!(pending.fail_all(RpcError::connection_closed()).await, 2);
        assert!(pending.is_empty().await);

        for rx in [rx_a, rx_b] {
            let err = rx.await.unwrap().unwrap_err();
            assert_eq!(err.code, RpcErrorCode::ConnectionClosed);
        }
        assert_eq!(pending.fail_all(RpcError::connection_closed()).await, 0);
    }

    #[tokio::test]
    async fn test_timer_rejects_and_removes() {
        let pending = PendingRequests::new();
        let rx = pending
            .register("slow", Duration::from_millis(30), RpcError::timeout("请求超时: slow"))
            .await;

        let err = rx.await.unwrap().unwrap_err();
        assert!(err.is_timeout());
        assert!(pending.is_empty().await);
        assert!(!pending.settle(response(json!({"status": "ok", "echo": "slow"}))).await);
    }

    #[tokio::test]
    async fn test_abandoned_waiters_expire() {
        let pending = PendingRequests::new();
        for i in 0..5 {
            // 接收端立即丢弃，相当于调用方不再等待
            drop(
                pending
                    .register(&format!("gone-{}", i), Duration::from_millis(20), RpcError::timeout("gone"))
                    .await,
            );
        }
        assert_eq!(pending.len().await, 5);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(pending.is_empty().await);
    }

    #[tokio::test]
    async fn test_settle_cancels_timer() {
        let pending = PendingRequests::new();
        let rx = pending
            .register("fast", Duration::from_millis(30), RpcError::timeout("fast"))
            .await;
        assert!(pending.settle(response(json!({"status": "ok", "echo": "fast", "data": 1}))).await);
        assert_eq!(rx.await.unwrap().unwrap(), json!(1));

        // 计时器到期后不会再有任何动作
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(pending.is_empty().await);
    }
}
