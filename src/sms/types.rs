use crate::sms::error::{Result, SmsError};
use crate::sms::serialization::deserialize_count;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

/// 推送事件名
pub mod event_name {
    pub const NEW_SMS: &str = "new_sms";
    pub const UNREAD_COUNT_UPDATE: &str = "sms_unread_count_update";
}

/// 远程方法调用的统一响应包装结构体
///
/// 服务端返回 `{"message": <payload>}`；方法返回空值时 message 字段缺失，因此使用 Option<T>
#[derive(Debug, Deserialize)]
pub struct MethodResponse<T> {
    pub message: Option<T>,
}

/// 远程方法失败时的响应体
#[derive(Debug, Default, Deserialize)]
pub struct MethodErrorBody {
    #[serde(default)]
    pub exc_type: Option<String>,
    #[serde(default)]
    pub exception: Option<String>,
    /// JSON 编码的字符串数组，每个元素又是一个 JSON 对象字符串
    #[serde(rename = "_server_messages", default)]
    pub server_messages: Option<String>,
}

impl MethodErrorBody {
    /// 取第一条服务端提示消息
    fn first_server_message(&self) -> Option<String> {
        let raw = self.server_messages.as_deref()?;
        let items: Vec<String> = serde_json::from_str(raw).ok()?;
        items.iter().find_map(|item| {
            serde_json::from_str::<serde_json::Value>(item)
                .ok()
                .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
                .or_else(|| Some(item.clone()))
        })
    }

    /// 组装失败原因：服务端提示 > 异常信息 > 异常类型
    pub fn reason(&self) -> Option<String> {
        self.first_server_message()
            .or_else(|| self.exception.clone())
            .or_else(|| self.exc_type.clone())
    }
}

/// 从失败响应体中提取原因，无法解析时退回 HTTP 状态 + 原始 body
pub fn extract_error_reason(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<MethodErrorBody>(body)
        .ok()
        .and_then(|b| b.reason())
    {
        Some(reason) => reason,
        None => format!("HTTP 错误 {}: {}", status, body),
    }
}

/// 通用 HTTP 响应处理函数：校验状态码并反序列化 message 字段
///
/// 所有 API 共用此方法；返回 `Option<T>`，调用方决定 None 的含义
pub async fn handle_http_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    operation_name: &str,
) -> Result<Option<T>> {
    let status = response.status();

    // 读取 body bytes（只能读取一次）
    let body_bytes = response
        .bytes()
        .await
        .map_err(|e| SmsError::remote(format!("读取响应 body 失败: {}", e)))?;
    let body_str = String::from_utf8_lossy(&body_bytes);
    debug!("[HTTP] {}响应 Body: {}", operation_name, body_str);

    if !status.is_success() {
        let reason = extract_error_reason(status, &body_str);
        error!(
            "[HTTP] {}请求失败，HTTP状态: {}, 原因: {}",
            operation_name, status, reason
        );
        return Err(SmsError::remote(reason));
    }
    debug!("[HTTP] {}请求成功，HTTP状态: {}", operation_name, status);

    let api_resp: MethodResponse<T> = serde_json::from_slice(&body_bytes).map_err(|e| {
        error!(
            "[HTTP] {}反序列化失败: {:?}\n原始响应: {}",
            operation_name, e, body_str
        );
        SmsError::remote(format!("反序列化响应失败: {:?}", e))
    })?;

    Ok(api_resp.message)
}

/// 推送通道事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum PushEvent {
    /// 收到新短信
    #[serde(rename = "new_sms")]
    NewMessage {
        sender: String,
        preview: String,
        #[serde(default)]
        phone: String,
        #[serde(deserialize_with = "deserialize_count")]
        new_count: u32,
    },
    /// 未读总数变更
    #[serde(rename = "sms_unread_count_update")]
    UnreadCountChanged {
        #[serde(deserialize_with = "deserialize_count")]
        new_count: u32,
    },
}

impl PushEvent {
    /// 解析推送帧；不认识的事件返回 Ok(None)
    pub fn parse(text: &str) -> Result<Option<PushEvent>> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let name = value.get("event").and_then(|v| v.as_str()).unwrap_or("");
        match name {
            event_name::NEW_SMS | event_name::UNREAD_COUNT_UPDATE => {
                let event = serde_json::from_value::<PushEvent>(value)?;
                Ok(Some(event))
            }
            other => {
                info!("[Push] 忽略未知事件: {}", other);
                Ok(None)
            }
        }
    }

    /// 事件携带的新未读总数
    pub fn new_count(&self) -> u32 {
        match self {
            PushEvent::NewMessage { new_count, .. } => *new_count,
            PushEvent::UnreadCountChanged { new_count } => *new_count,
        }
    }
}
