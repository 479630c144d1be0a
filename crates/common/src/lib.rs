/// 网关客户端公共库
/// 
/// 提供与消息网关通信的 WebSocket RPC 客户端、错误处理等

pub mod errors;
pub mod ws_rpc;

// 重新导出常用类型
pub use errors::{Error, Result};
pub use ws_rpc::{ClientConfig, GatewayClient, RpcError, RpcErrorCode};
