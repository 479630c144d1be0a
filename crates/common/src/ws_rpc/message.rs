/// 网关消息信封定义
///
/// 请求: `{action, params, echo}`
/// 响应: `{status, echo, data?, message?}`
/// 推送事件: 携带事件类型字段的任意 JSON 对象

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::RpcError;

/// 响应成功状态
pub const STATUS_OK: &str = "ok";

/// 推送事件的类型字段（按顺序匹配）
pub const EVENT_DISCRIMINATORS: &[&str] = &["post_type", "type", "kind"];

/// 动作请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    /// 动作名
    pub action: String,

    /// 动作参数
    pub params: Value,

    /// 关联 token，网关会在响应中原样返回
    pub echo: String,
}

impl ActionRequest {
    pub fn new(action: impl Into<String>, params: Value, echo: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            params,
            echo: echo.into(),
        }
    }

    /// 序列化为 JSON 字符串
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// 动作响应
///
/// 除 echo 外的字段都按原始 JSON 保存，网关填错类型时仍能把失败结果交给调用方
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    /// "ok" 或其他失败状态
    pub status: Value,

    /// 请求中的 echo，可能是字符串也可能是数字
    pub echo: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wording: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retcode: Option<Value>,
}

/// JSON 值的展示文本，字符串不带引号
fn display_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 非空字符串字段
fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

impl ActionResponse {
    /// 关联 token 的字符串形式
    pub fn echo_key(&self) -> String {
        display_text(&self.echo)
    }

    /// 判断是否是成功响应
    pub fn is_success(&self) -> bool {
        self.status.as_str() == Some(STATUS_OK)
    }

    /// 转换为调用结果：成功时返回 data 字段，否则返回远端错误
    pub fn into_result(self) -> Result<Value, RpcError> {
        if self.is_success() {
            return Ok(self.data.unwrap_or(Value::Null));
        }

        let message = non_empty_str(self.message.as_ref())
            .or_else(|| non_empty_str(self.wording.as_ref()))
            .unwrap_or_else(|| format!("请求失败: status={}", display_text(&self.status)));

        let mut details = serde_json::json!({ "status": self.status });
        if let Some(retcode) = self.retcode {
            details["retcode"] = retcode;
        }

        Err(RpcError::remote(message, details))
    }
}

/// 入站消息分类结果
#[derive(Debug, Clone)]
pub enum Inbound {
    /// 对某个请求的响应
    Response(ActionResponse),

    /// 推送事件，原样转发
    Event(Value),

    /// 无法识别的对象
    Unrecognized(Value),
}

impl Inbound {
    /// 从 JSON 文本解析并分类
    pub fn parse(text: &str) -> Result<Self, RpcError> {
        let value: Value = serde_json::from_str(text)?;
        Self::classify(value)
    }

    /// 分类已解码的 JSON 值
    ///
    /// 同时带有 status 与 echo 字段的对象视为响应，带事件类型字段的对象视为推送事件
    pub fn classify(value: Value) -> Result<Self, RpcError> {
        let Some(object) = value.as_object() else {
            return Err(RpcError::decode("入站消息不是 JSON 对象"));
        };

        if object.contains_key("status") && object.contains_key("echo") {
            let response: ActionResponse = serde_json::from_value(value)?;
            return Ok(Self::Response(response));
        }

        if EVENT_DISCRIMINATORS.iter().any(|key| object.contains_key(*key)) {
            return Ok(Self::Event(value));
        }

        Ok(Self::Unrecognized(value))
    }
}

/// 从生命周期元事件中提取机器人自身 ID
///
/// 形如 `{"post_type":"meta_event","meta_event_type":"lifecycle","self_id":10001}`
pub fn lifecycle_self_id(event: &Value) -> Option<String> {
    if event.get("post_type").and_then(Value::as_str) != Some("meta_event") {
        return None;
    }
    if event.get("meta_event_type").and_then(Value::as_str) != Some("lifecycle") {
        return None;
    }

    match event.get("self_id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
