/// 网关机器人宿主程序
/// 
/// 连接消息网关，记录推送事件，断线后自动重连

use std::sync::Arc;

use common::ws_rpc::{BotIdCallback, ConnectionEvent, GatewayClient};
use serde_json::json;
use tokio::sync::watch;
use tracing::{error, info, warn};

mod config;
mod handler;

use handler::EventLogger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    // 可以通过环境变量 RUST_LOG 设置日志级别，例如：
    // RUST_LOG=debug cargo run
    // RUST_LOG=common=debug,bot=info cargo run
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
        )
        .init();

    info!("🚀 启动网关机器人...");

    // 加载配置
    dotenvy::dotenv().ok();
    let cfg = config::Config::from_env()?;
    let client_config = cfg.client_config()?;
    info!("✅ 配置加载成功");

    // 机器人 ID 由生命周期事件推送
    let (bot_id_tx, mut bot_id_rx) = watch::channel::<Option<String>>(None);
    let on_bot_id: BotIdCallback = Arc::new(move |id: String| {
        bot_id_tx.send_replace(Some(id));
    });

    let events = Arc::new(EventLogger::new());
    let client = GatewayClient::new(client_config, events.clone(), Some(on_bot_id));

    // 每次连接成功后查询登录信息
    let login_client = client.clone();
    client
        .on(move |event: &ConnectionEvent| match event {
            ConnectionEvent::Connect => {
                let client = login_client.clone();
                tokio::spawn(async move {
                    match client.send_request("get_login_info", json!({})).await {
                        Ok(info) => info!("✅ 登录信息: {}", info),
                        Err(e) => warn!("获取登录信息失败: {}", e),
                    }
                });
            }
            ConnectionEvent::Disconnect => warn!("与网关的连接已断开，等待自动重连"),
            ConnectionEvent::ConnectError(e) => error!("连接网关失败: {}", e),
        })
        .await;

    info!("🎯 连接到网关: {}", cfg.gateway_ws_url);
    if let Err(e) = client.connect().await {
        // 首次连接失败后客户端会按退避策略继续重试
        warn!("首次连接失败: {}", e);
    }

    loop {
        tokio::select! {
            changed = bot_id_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(id) = bot_id_rx.borrow_and_update().clone() {
                    info!("📌 机器人 ID: {}", id);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("收到退出信号");
                break;
            }
        }
    }

    client.disconnect().await;
    info!("👋 已断开连接，共处理 {} 个事件", events.received());

    Ok(())
}
