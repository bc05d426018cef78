//! 短信 HTTP API 客户端
//!
//! 每个操作一一对应一个远程方法；传输层/服务器失败返回 `SmsError::RemoteCall`，
//! 业务层失败通过结果结构体的 `success` 字段表达

use crate::sms::error::{require_non_empty, Result, SmsError};
use crate::sms::models::{
    AttachResult, AttachTarget, Conversation, HistoryEntry, Message, ReadStateResult,
    RecipientOptions, SendRequest, SendResult, SmsSettings, Template,
};
use crate::sms::types::handle_http_response;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 默认远程方法前缀
pub const DEFAULT_METHOD_PREFIX: &str = "probuild.probuild.api.twilio";

/// 远程方法名
pub mod method {
    pub const GET_CONVERSATIONS: &str = "get_conversations";
    pub const GET_CONVERSATION_MESSAGES: &str = "get_conversation_messages";
    pub const SEND_SMS: &str = "send_sms";
    pub const MARK_CONVERSATION_READ: &str = "mark_conversation_read";
    pub const MARK_CONVERSATION_UNREAD: &str = "mark_conversation_unread";
    pub const ATTACH_CONVERSATION: &str = "attach_conversation_to_record";
    pub const GET_SMS_TEMPLATES: &str = "get_sms_templates";
    pub const GET_RECIPIENT_OPTIONS: &str = "get_sms_recipient_options_for_opportunity";
    pub const GET_UNREAD_SMS_COUNT: &str = "get_unread_sms_count";
    pub const GET_SMS_HISTORY: &str = "get_sms_history";
    pub const GET_SETTINGS: &str = "get_twilio_settings";
    /// 框架自带的字段查询方法（不带前缀）
    pub const GET_VALUE: &str = "frappe.client.get_value";
}

/// 短信远程调用接口
///
/// 视图层只依赖这个 trait，测试中用 mock 替换
#[async_trait]
pub trait MessagingApi: Send + Sync {
    /// 会话列表（服务端排序，最近的在前）
    async fn list_conversations(&self) -> Result<Vec<Conversation>>;

    /// 某个号码的消息（按时间升序）
    async fn list_messages(&self, phone_number: &str) -> Result<Vec<Message>>;

    /// 发送短信；服务商拒绝时返回 success=false 而不是 Err
    async fn send_message(&self, request: &SendRequest) -> Result<SendResult>;

    /// 标记会话已读
    async fn mark_read(&self, phone_number: &str) -> Result<ReadStateResult>;

    /// 标记会话未读
    async fn mark_unread(&self, phone_number: &str) -> Result<ReadStateResult>;

    /// 把会话关联到业务记录
    async fn attach_conversation(
        &self,
        phone_number: &str,
        target: AttachTarget,
        target_id: &str,
    ) -> Result<AttachResult>;

    /// 某类记录可用的模板
    async fn list_templates(&self, doctype: &str) -> Result<Vec<Template>>;

    /// 记录的收件人选项
    async fn get_recipient_options(&self, record_id: &str) -> Result<RecipientOptions>;

    /// 收件箱未读总数
    async fn get_unread_count(&self) -> Result<u32>;

    /// 记录上的短信历史（最新的在前）
    async fn list_history(&self, doctype: &str, name: &str) -> Result<Vec<HistoryEntry>>;

    /// 读取某条记录的单个字段
    async fn get_field_value(&self, doctype: &str, name: &str, field: &str)
        -> Result<Option<String>>;

    /// 服务商配置状态
    async fn get_settings(&self) -> Result<SmsSettings>;
}

/// 基于 reqwest 的实现
pub struct HttpMessagingApi {
    client: reqwest::Client,
    api_base_url: String,
    method_prefix: String,
}

impl HttpMessagingApi {
    /// 创建新的短信 API 客户端
    ///
    /// `client` 应该已经在外部配置好认证头
    pub fn new(client: reqwest::Client, api_base_url: String, method_prefix: String) -> Self {
        Self {
            client,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            method_prefix,
        }
    }

    fn method_url(&self, method: &str) -> String {
        if method.contains('.') {
            format!("{}/api/method/{}", self.api_base_url, method)
        } else {
            format!(
                "{}/api/method/{}.{}",
                self.api_base_url, self.method_prefix, method
            )
        }
    }

    /// 调用远程方法
    async fn call<A, T>(&self, method: &str, args: &A) -> Result<Option<T>>
    where
        A: Serialize + ?Sized + Sync,
        T: DeserializeOwned + Send,
    {
        let request_id = Uuid::new_v4().to_string();
        let url = self.method_url(method);

        info!("[SmsApi] 📡 调用远程方法: {}", method);
        debug!("[SmsApi]   请求URL: {}, 请求ID: {}", url, request_id);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .header("X-Request-ID", &request_id)
            .json(args)
            .send()
            .await
            .map_err(|e| {
                warn!("[SmsApi] 请求失败: {}, 方法: {}", e, method);
                SmsError::remote(format!("请求失败: {}", e))
            })?;

        handle_http_response::<T>(response, method).await
    }

    /// 调用远程方法，要求 message 字段存在
    async fn call_required<A, T>(&self, method: &str, args: &A) -> Result<T>
    where
        A: Serialize + ?Sized + Sync,
        T: DeserializeOwned + Send,
    {
        self.call(method, args)
            .await?
            .ok_or_else(|| SmsError::remote(format!("{} 响应中缺少 message 字段", method)))
    }
}

#[async_trait]
impl MessagingApi for HttpMessagingApi {
    async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let conversations: Vec<Conversation> = self
            .call(method::GET_CONVERSATIONS, &serde_json::json!({}))
            .await?
            .unwrap_or_default();
        info!("[SmsApi] ✅ 会话列表响应，会话数: {}", conversations.len());
        Ok(conversations)
    }

    async fn list_messages(&self, phone_number: &str) -> Result<Vec<Message>> {
        require_non_empty(phone_number, "phone_number")?;
        let messages: Vec<Message> = self
            .call(
                method::GET_CONVERSATION_MESSAGES,
                &serde_json::json!({ "phone_number": phone_number }),
            )
            .await?
            .unwrap_or_default();
        info!(
            "[SmsApi] ✅ 消息列表响应，号码: {}, 消息数: {}",
            phone_number,
            messages.len()
        );
        Ok(messages)
    }

    async fn send_message(&self, request: &SendRequest) -> Result<SendResult> {
        require_non_empty(&request.recipient, "recipient_number")?;
        require_non_empty(&request.body, "message")?;
        let result: SendResult =
            self.call_required(method::SEND_SMS, request).await?;
        if result.success {
            info!(
                "[SmsApi] ✅ 短信发送成功，号码: {}, sid: {:?}",
                request.recipient, result.sid
            );
        } else {
            warn!(
                "[SmsApi] ⚠️ 短信被拒绝，号码: {}, 原因: {:?}",
                request.recipient, result.error
            );
        }
        Ok(result)
    }

    async fn mark_read(&self, phone_number: &str) -> Result<ReadStateResult> {
        require_non_empty(phone_number, "phone_number")?;
        self.call_required(
            method::MARK_CONVERSATION_READ,
            &serde_json::json!({ "phone_number": phone_number }),
        )
        .await
    }

    async fn mark_unread(&self, phone_number: &str) -> Result<ReadStateResult> {
        require_non_empty(phone_number, "phone_number")?;
        self.call_required(
            method::MARK_CONVERSATION_UNREAD,
            &serde_json::json!({ "phone_number": phone_number }),
        )
        .await
    }

    async fn attach_conversation(
        &self,
        phone_number: &str,
        target: AttachTarget,
        target_id: &str,
    ) -> Result<AttachResult> {
        require_non_empty(phone_number, "phone_number")?;
        require_non_empty(target_id, "target_name")?;
        self.call_required(
            method::ATTACH_CONVERSATION,
            &serde_json::json!({
                "phone_number": phone_number,
                "target_doctype": target.as_str(),
                "target_name": target_id,
            }),
        )
        .await
    }

    async fn list_templates(&self, doctype: &str) -> Result<Vec<Template>> {
        let templates: Vec<Template> = self
            .call(
                method::GET_SMS_TEMPLATES,
                &serde_json::json!({ "doctype": doctype }),
            )
            .await?
            .unwrap_or_default();
        debug!("[SmsApi]   模板数: {}", templates.len());
        Ok(templates)
    }

    async fn get_recipient_options(&self, record_id: &str) -> Result<RecipientOptions> {
        require_non_empty(record_id, "opportunity_name")?;
        Ok(self
            .call(
                method::GET_RECIPIENT_OPTIONS,
                &serde_json::json!({ "opportunity_name": record_id }),
            )
            .await?
            .unwrap_or_default())
    }

    async fn get_unread_count(&self) -> Result<u32> {
        let count: Option<i64> = self
            .call(method::GET_UNREAD_SMS_COUNT, &serde_json::json!({}))
            .await?;
        Ok(count.unwrap_or(0).clamp(0, u32::MAX as i64) as u32)
    }

    async fn list_history(&self, doctype: &str, name: &str) -> Result<Vec<HistoryEntry>> {
        require_non_empty(doctype, "doctype")?;
        require_non_empty(name, "name")?;
        Ok(self
            .call(
                method::GET_SMS_HISTORY,
                &serde_json::json!({ "doctype": doctype, "name": name }),
            )
            .await?
            .unwrap_or_default())
    }

    async fn get_field_value(
        &self,
        doctype: &str,
        name: &str,
        field: &str,
    ) -> Result<Option<String>> {
        require_non_empty(name, "name")?;
        let row: Option<serde_json::Value> = self
            .call(
                method::GET_VALUE,
                &serde_json::json!({
                    "doctype": doctype,
                    "filters": name,
                    "fieldname": field,
                }),
            )
            .await?;
        Ok(row
            .and_then(|v| v.get(field).and_then(|f| f.as_str()).map(str::to_string))
            .filter(|s| !s.trim().is_empty()))
    }

    async fn get_settings(&self) -> Result<SmsSettings> {
        Ok(self
            .call(method::GET_SETTINGS, &serde_json::json!({}))
            .await?
            .unwrap_or_default())
    }
}
