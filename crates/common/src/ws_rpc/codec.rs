/// 帧编解码
///
/// 入站数据可能是文本、二进制、二进制视图或延迟读取的 blob，统一归一化为文本后再解析

use std::fmt;
use std::io;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use super::{ActionRequest, RpcError};

/// 入站负载
pub enum Payload {
    /// 文本帧
    Text(String),

    /// 二进制帧
    Binary(Vec<u8>),

    /// 大缓冲区中的一段
    ///
    /// tungstenite 帧不会产生此类负载，供共享缓冲区的其他传输层接入
    View {
        buffer: Arc<[u8]>,
        offset: usize,
        len: usize,
    },

    /// 需要异步读取的 blob
    ///
    /// 同样只供其他传输层使用，例如先落盘再读取的大消息
    Deferred(BoxFuture<'static, io::Result<Vec<u8>>>),

    /// 不支持的负载类型
    Unsupported(&'static str),
}

impl Payload {
    /// 包装一个异步读取的 blob
    pub fn deferred<F>(read: F) -> Self
    where
        F: std::future::Future<Output = io::Result<Vec<u8>>> + Send + 'static,
    {
        Self::Deferred(Box::pin(read))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Binary(_) => "binary",
            Self::View { .. } => "view",
            Self::Deferred(_) => "deferred",
            Self::Unsupported(kind) => kind,
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(&text.len()).finish(),
            Self::Binary(data) => f.debug_tuple("Binary").field(&data.len()).finish(),
            Self::View { offset, len, .. } => f
                .debug_struct("View")
                .field("offset", offset)
                .field("len", len)
                .finish(),
            Self::Deferred(_) => f.write_str("Deferred"),
            Self::Unsupported(kind) => f.debug_tuple("Unsupported").field(kind).finish(),
        }
    }
}

impl From<WsMessage> for Payload {
    fn from(msg: WsMessage) -> Self {
        match msg {
            WsMessage::Text(text) => Self::Text(text),
            WsMessage::Binary(data) => Self::Binary(data),
            WsMessage::Ping(_) => Self::Unsupported("ping"),
            WsMessage::Pong(_) => Self::Unsupported("pong"),
            WsMessage::Close(_) => Self::Unsupported("close"),
            WsMessage::Frame(_) => Self::Unsupported("frame"),
        }
    }
}

/// 将负载归一化为 UTF-8 文本
pub async fn normalize(payload: Payload) -> Result<String, RpcError> {
    match payload {
        Payload::Text(text) => Ok(text),
        Payload::Binary(data) => String::from_utf8(data).map_err(RpcError::decode),
        Payload::View {
            buffer,
            offset,
            len,
        } => {
            let slice = offset
                .checked_add(len)
                .and_then(|end| buffer.get(offset..end))
                .ok_or_else(|| {
                    RpcError::decode(format!(
                        "视图越界: offset={}, len={}, buffer={}",
                        offset,
                        len,
                        buffer.len()
                    ))
                })?;
            std::str::from_utf8(slice)
                .map(str::to_owned)
                .map_err(RpcError::decode)
        }
        Payload::Deferred(read) => {
            let data = read.await.map_err(RpcError::decode)?;
            String::from_utf8(data).map_err(RpcError::decode)
        }
        Payload::Unsupported(kind) => Err(RpcError::decode(format!("不支持的负载类型: {}", kind))),
    }
}

/// 编码请求为 WebSocket 文本帧
pub fn encode(request: &ActionRequest) -> Result<WsMessage, RpcError> {
    let json = request.to_json()?;
    Ok(WsMessage::Text(json))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws_rpc::RpcErrorCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_text_passthrough() {
        let text = normalize(Payload::Text("{\"a\":1}".to_string())).await.unwrap();
        assert_eq!(text, "{\"a\":1}");
    }

    #[tokio::test]
    async fn test_binary_matches_text() {
        let raw = r#"{"post_type":"message"}"#;
        let from_binary = normalize(Payload::from(WsMessage::Binary(raw.as_bytes().to_vec())))
            .await
            .unwrap();
        let from_text = normalize(Payload::from(WsMessage::Text(raw.to_string())))
            .await
            .unwrap();
        assert_eq!(from_binary, from_text);
    }

    #[tokio::test]
    async fn test_view_honors_sub_range() {
        let buffer: Arc<[u8]> = Arc::from(&b"xxxx{\"ok\":true}yyyy"[..]);
        let text = normalize(Payload::View {
            buffer,
            offset: 4,
            len: 11,
        })
        .await
        .unwrap();
        assert_eq!(text, "{\"ok\":true}");
    }

    #[tokio::test]
    async fn test_view_out_of_range() {
        let buffer: Arc<[u8]> = Arc::from(&b"short"[..]);
        let err = normalize(Payload::View {
            buffer: buffer.clone(),
            offset: 3,
            len: 10,
        })
        .await
        .unwrap_err();
        assert_eq!(err.code, RpcErrorCode::DecodeError);

        let overflow = normalize(Payload::View {
            buffer,
            offset: usize::MAX,
            len: 2,
        })
        .await;
        assert!(overflow.is_err());
    }

    #[tokio::test]
    async fn test_deferred_blob() {
        let payload = Payload::deferred(async {
            tokio::task::yield_now().await;
            Ok(br#"{"post_type":"notice"}"#.to_vec())
        });
        assert_eq!(normalize(payload).await.unwrap(), r#"{"post_type":"notice"}"#);

        let failing = Payload::deferred(async {
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "读取中断"))
        });
        assert!(normalize(failing).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_utf8_and_unsupported() {
        assert!(normalize(Payload::Binary(vec![0xff, 0xfe])).await.is_err());
        assert!(normalize(Payload::from(WsMessage::Ping(vec![1]))).await.is_err());
    }

    #[test]
    fn test_encode_request() {
        let req = ActionRequest::new("get_login_info", json!({}), "1-0");
        match encode(&req).unwrap() {
            WsMessage::Text(text) => {
                let value: serde_json::Value = serde_json::from_str(&text).unwrap();
                assert_eq!(value["action"], "get_login_info");
                assert_eq!(value["echo"], "1-0");
            }
            other => panic!("期望文本帧，实际为 {:?}", other),
        }
    }
}
