/// WebSocket RPC 错误定义

use serde::{Deserialize, Serialize};
use std::fmt;

/// RPC 错误码
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RpcErrorCode {
    /// 连接未建立时发起请求
    NotConnected,
    /// 连接超时或请求超时
    Timeout,
    /// 底层 socket 错误
    TransportError,
    /// 网关返回非 ok 状态
    RemoteError,
    /// 入站数据无法解码
    DecodeError,
    /// 连接已关闭，等待中的请求被批量拒绝
    ConnectionClosed,
    InvalidRequest,
    InternalError,
}

impl RpcErrorCode {
    /// 转换为字符串码
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotConnected => "NOT_CONNECTED",
            Self::Timeout => "TIMEOUT",
            Self::TransportError => "TRANSPORT_ERROR",
            Self::RemoteError => "REMOTE_ERROR",
            Self::DecodeError => "DECODE_ERROR",
            Self::ConnectionClosed => "CONNECTION_CLOSED",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for RpcErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// RPC 错误
///
/// 需要 `Clone`：同一次连接尝试的结果会分发给所有并发的 `connect()` 调用方
#[derive(Debug, Clone)]
pub struct RpcError {
    pub code: RpcErrorCode,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl RpcError {
    /// 创建新的 RPC 错误
    pub fn new(code: RpcErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// 创建带详情的 RPC 错误
    pub fn with_details(
        code: RpcErrorCode,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    /// 未连接
    pub fn not_connected() -> Self {
        Self::new(RpcErrorCode::NotConnected, "WebSocket 未连接")
    }

    /// 超时错误
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::Timeout, message)
    }

    /// 传输层错误
    pub fn transport(err: impl fmt::Display) -> Self {
        Self::new(RpcErrorCode::TransportError, format!("传输错误: {}", err))
    }

    /// 网关拒绝请求
    pub fn remote(message: impl Into<String>, details: serde_json::Value) -> Self {
        Self::with_details(RpcErrorCode::RemoteError, message, details)
    }

    /// 解码错误
    pub fn decode(err: impl fmt::Display) -> Self {
        Self::new(RpcErrorCode::DecodeError, format!("解码错误: {}", err))
    }

    /// 连接关闭错误
    pub fn connection_closed() -> Self {
        Self::new(RpcErrorCode::ConnectionClosed, "连接已关闭")
    }

    /// 无效请求错误
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::InvalidRequest, message)
    }

    /// 内部错误
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::InternalError, message)
    }

    pub fn is_timeout(&self) -> bool {
        self.code == RpcErrorCode::Timeout
    }

    pub fn is_connection_closed(&self) -> bool {
        self.code == RpcErrorCode::ConnectionClosed
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::decode(err)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for RpcError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::transport(err)
    }
}
