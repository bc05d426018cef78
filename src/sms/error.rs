//! 短信模块错误类型
//!
//! 远程调用失败（网络错误、5xx、响应无法解析）统一归为 `RemoteCall`；
//! 业务层失败（`success: false`）不走这里，由各结果结构体自行携带。

use thiserror::Error;

/// 短信客户端错误
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SmsError {
    /// 传输层或服务器失败
    #[error("远程调用失败: {reason}")]
    RemoteCall { reason: String },

    /// 参数校验失败（在发起请求之前）
    #[error("参数无效: {0}")]
    InvalidArgument(String),

    /// 关联目标类型不在允许的集合内
    #[error("不允许关联到该记录类型: {0}")]
    AttachTargetNotAllowed(String),

    /// 推送通道错误
    #[error("推送通道错误: {0}")]
    Push(String),
}

impl SmsError {
    pub fn remote(reason: impl Into<String>) -> Self {
        SmsError::RemoteCall {
            reason: reason.into(),
        }
    }

    /// 是否为传输层/服务器失败
    pub fn is_remote(&self) -> bool {
        matches!(self, SmsError::RemoteCall { .. })
    }
}

impl From<reqwest::Error> for SmsError {
    fn from(e: reqwest::Error) -> Self {
        SmsError::remote(e.to_string())
    }
}

impl From<serde_json::Error> for SmsError {
    fn from(e: serde_json::Error) -> Self {
        SmsError::remote(format!("反序列化响应失败: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, SmsError>;

/// 校验字符串参数非空（去掉首尾空白后）
pub(crate) fn require_non_empty(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SmsError::InvalidArgument(format!("{} 不能为空", field)));
    }
    Ok(())
}
