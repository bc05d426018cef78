//! 短信数据模型
//!
//! 所有结构体都可直接从服务端 JSON 反序列化，缺失字段使用默认值

use crate::sms::error::SmsError;
use crate::sms::serialization::{
    deserialize_count, deserialize_datetime, deserialize_flag, deserialize_non_empty,
    deserialize_null_as_default, deserialize_opt_datetime, deserialize_string_or_null,
    deserialize_vec_or_null,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 默认国家区号
pub const DEFAULT_COUNTRY_CODE: &str = "+61";

/// 消息方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    /// 列表预览前缀
    pub fn marker(self) -> &'static str {
        match self {
            Direction::Inbound => "←",
            Direction::Outbound => "→",
        }
    }

    /// 气泡样式类名
    pub fn css_class(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// 投递状态
///
/// 服务端还会返回 "Sending" / "Received" 等值，客户端只区分 Sent / Failed，其余（包括 null）归为 Pending
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum DeliveryStatus {
    Sent,
    Failed,
    #[default]
    Pending,
}

impl From<String> for DeliveryStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Sent" => DeliveryStatus::Sent,
            "Failed" => DeliveryStatus::Failed,
            _ => DeliveryStatus::Pending,
        }
    }
}

impl DeliveryStatus {
    /// 出站消息的状态图标
    pub fn glyph(self) -> Option<&'static str> {
        match self {
            DeliveryStatus::Sent => Some("✓"),
            DeliveryStatus::Failed => Some("✗"),
            DeliveryStatus::Pending => None,
        }
    }
}

/// 关联的业务记录（类型 + ID）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedRecord {
    pub doctype: String,
    pub name: String,
}

/// 会话摘要（以号码为唯一键）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub phone_number: String,
    #[serde(default, deserialize_with = "deserialize_non_empty")]
    pub contact_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_non_empty")]
    pub linked_doctype: Option<String>,
    #[serde(default, deserialize_with = "deserialize_non_empty")]
    pub linked_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    pub last_message: String,
    #[serde(default, deserialize_with = "deserialize_opt_datetime")]
    pub last_message_time: Option<NaiveDateTime>,
    #[serde(default, deserialize_with = "deserialize_count")]
    pub unread_count: u32,
    pub direction: Direction,
}

impl Conversation {
    /// 显示名：有联系人名用联系人名，否则用号码
    pub fn display_name(&self) -> &str {
        self.contact_name.as_deref().unwrap_or(&self.phone_number)
    }

    pub fn linked_record(&self) -> Option<LinkedRecord> {
        match (&self.linked_doctype, &self.linked_name) {
            (Some(doctype), Some(name)) => Some(LinkedRecord {
                doctype: doctype.clone(),
                name: name.clone(),
            }),
            _ => None,
        }
    }
}

/// 单条消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub name: String,
    pub direction: Direction,
    #[serde(rename = "message", default, deserialize_with = "deserialize_string_or_null")]
    pub body: String,
    #[serde(deserialize_with = "deserialize_datetime")]
    pub sent_at: NaiveDateTime,
    #[serde(default, deserialize_with = "deserialize_null_as_default")]
    pub status: DeliveryStatus,
    #[serde(default, deserialize_with = "deserialize_non_empty")]
    pub sender_full_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_non_empty")]
    pub contact_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_non_empty")]
    pub linked_doctype: Option<String>,
    #[serde(default, deserialize_with = "deserialize_non_empty")]
    pub linked_name: Option<String>,
    #[serde(rename = "twilio_sid", default, deserialize_with = "deserialize_non_empty")]
    pub provider_sid: Option<String>,
}

impl Message {
    /// 发送人显示名：仅出站且有值时返回
    pub fn sender_display(&self) -> Option<&str> {
        match self.direction {
            Direction::Outbound => self.sender_full_name.as_deref(),
            Direction::Inbound => None,
        }
    }

    /// 状态图标：仅出站消息有
    pub fn status_glyph(&self) -> Option<&'static str> {
        match self.direction {
            Direction::Outbound => self.status.glyph(),
            Direction::Inbound => None,
        }
    }
}

/// 短信模板
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    pub template_name: String,
    #[serde(
        rename = "message",
        alias = "message_template",
        default,
        deserialize_with = "deserialize_string_or_null"
    )]
    pub body: String,
}

impl Template {
    pub fn label(&self) -> &str {
        if self.template_name.is_empty() {
            &self.name
        } else {
            &self.template_name
        }
    }
}

/// 收件人选项（标签 + 号码）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientOption {
    pub label: String,
    pub value: String,
}

/// 收件人选项列表
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientOptions {
    #[serde(default, deserialize_with = "deserialize_vec_or_null")]
    pub options: Vec<RecipientOption>,
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    pub last_used: String,
}

impl RecipientOptions {
    /// 默认号码：上次使用的号码，否则第一个选项
    pub fn default_phone(&self) -> Option<&str> {
        if !self.last_used.trim().is_empty() {
            return Some(self.last_used.as_str());
        }
        self.options.first().map(|o| o.value.as_str())
    }
}

/// 发送请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendRequest {
    #[serde(rename = "recipient_number")]
    pub recipient: String,
    #[serde(rename = "message")]
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_doctype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
}

impl SendRequest {
    pub fn new(recipient: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            body: body.into(),
            linked_doctype: None,
            linked_name: None,
            contact_name: None,
        }
    }

    pub fn linked_to(mut self, record: Option<LinkedRecord>) -> Self {
        if let Some(record) = record {
            self.linked_doctype = Some(record.doctype);
            self.linked_name = Some(record.name);
        }
        self
    }

    pub fn with_contact_name(mut self, contact_name: Option<String>) -> Self {
        self.contact_name = contact_name;
        self
    }
}

/// 发送结果（业务层失败通过 success=false 表达）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResult {
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub success: bool,
    #[serde(default, deserialize_with = "deserialize_non_empty")]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "deserialize_non_empty")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "deserialize_non_empty")]
    pub sid: Option<String>,
    #[serde(default, deserialize_with = "deserialize_non_empty")]
    pub log_name: Option<String>,
}

/// 标记已读/未读结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadStateResult {
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub success: bool,
    /// 操作后整个收件箱的未读总数
    #[serde(default, deserialize_with = "deserialize_count")]
    pub new_unread_count: u32,
}

/// 可关联的记录类型（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachTarget {
    Opportunity,
    Project,
}

impl AttachTarget {
    pub const ALL: [AttachTarget; 2] = [AttachTarget::Opportunity, AttachTarget::Project];

    pub fn as_str(self) -> &'static str {
        match self {
            AttachTarget::Opportunity => "Opportunity",
            AttachTarget::Project => "Project",
        }
    }
}

impl fmt::Display for AttachTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttachTarget {
    type Err = SmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AttachTarget::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| SmsError::AttachTargetNotAllowed(s.to_string()))
    }
}

/// 关联会话结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachResult {
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub success: bool,
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    pub message: String,
}

/// 记录上的短信历史条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub name: String,
    pub direction: Direction,
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    pub phone_number: String,
    #[serde(rename = "message", default, deserialize_with = "deserialize_string_or_null")]
    pub body: String,
    #[serde(default, deserialize_with = "deserialize_null_as_default")]
    pub status: DeliveryStatus,
    #[serde(deserialize_with = "deserialize_datetime")]
    pub sent_at: NaiveDateTime,
    #[serde(default, deserialize_with = "deserialize_non_empty")]
    pub contact_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_non_empty")]
    pub sent_by: Option<String>,
}

/// 短信服务商配置状态
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsSettings {
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub enabled: bool,
    #[serde(default, deserialize_with = "deserialize_non_empty")]
    pub phone_number: Option<String>,
}

/// 号码规范化（E.164 风格）
///
/// 去掉空格、短横线和括号；以 0 开头的替换为国家区号；不以 + 开头的补上国家区号
pub fn normalize_phone_number(phone: &str, default_country_code: &str) -> String {
    let clean: String = phone
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();
    if clean.is_empty() {
        return clean;
    }
    if let Some(rest) = clean.strip_prefix('0') {
        return format!("{}{}", default_country_code, rest);
    }
    if !clean.starts_with('+') {
        return format!("{}{}", default_country_code, clean);
    }
    clean
}
