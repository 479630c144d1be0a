/// 推送事件处理器
///
/// 只记录事件摘要，具体的消息处理逻辑由上层业务接入

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use common::ws_rpc::EventHandler;
use serde_json::Value;
use tracing::{debug, info};

/// 记录推送事件的处理器
#[derive(Default)]
pub struct EventLogger {
    received: AtomicU64,
}

impl EventLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已处理的事件数量
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}

/// 事件摘要，例如 `message/group` 或 `meta_event/heartbeat`
pub fn summarize(event: &Value) -> String {
    let post_type = event
        .get("post_type")
        .and_then(Value::as_str)
        .unwrap_or("unknown");

    let detail_key = format!("{}_type", post_type);
    match event.get(detail_key.as_str()).and_then(Value::as_str) {
        Some(detail) => format!("{}/{}", post_type, detail),
        None => post_type.to_string(),
    }
}

/// 事件字段的日志文本，缺失时为 "-"
fn field_text(event: &Value, key: &str) -> String {
    match event.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "-".to_string(),
        Some(other) => other.to_string(),
    }
}

#[async_trait]
impl EventHandler for EventLogger {
    async fn on_event(&self, event: Value) -> anyhow::Result<()> {
        self.received.fetch_add(1, Ordering::Relaxed);

        let summary = summarize(&event);
        if summary.starts_with("meta_event") {
            debug!("收到元事件: {}", summary);
            return Ok(());
        }

        let user_id = field_text(&event, "user_id");
        let group_id = field_text(&event, "group_id");
        info!("📨 收到事件: {}, user_id={}, group_id={}", summary, user_id, group_id);
        Ok(())
    }
}
