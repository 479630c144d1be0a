/// WebSocket RPC 模块
/// 
/// 基于 WebSocket 的网关客户端：请求/响应关联、推送事件分发、断线自动重连

pub mod backoff;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod message;
pub mod pending;

pub use backoff::ReconnectPolicy;
pub use client::GatewayClient;
pub use codec::Payload;
pub use config::ClientConfig;
pub use error::{RpcError, RpcErrorCode};
pub use events::{
    event_handler_fn, BotIdCallback, ConnectionEvent, ConnectionState, EventHandler,
};
pub use message::{ActionRequest, ActionResponse, Inbound};
