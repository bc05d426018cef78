//! 测试辅助：MessagingApi 的 mock、日志初始化和数据构造

use crate::sms::api::MessagingApi;
use crate::sms::error::Result;
use crate::sms::models::{
    AttachResult, AttachTarget, Conversation, DeliveryStatus, Direction, HistoryEntry, Message,
    ReadStateResult, RecipientOptions, SendRequest, SendResult, SmsSettings, Template,
};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use mockall::mock;
use std::sync::Once;

mock! {
    pub Api {}

    #[async_trait]
    impl MessagingApi for Api {
        async fn list_conversations(&self) -> Result<Vec<Conversation>>;
        async fn list_messages(&self, phone_number: &str) -> Result<Vec<Message>>;
        async fn send_message(&self, request: &SendRequest) -> Result<SendResult>;
        async fn mark_read(&self, phone_number: &str) -> Result<ReadStateResult>;
        async fn mark_unread(&self, phone_number: &str) -> Result<ReadStateResult>;
        async fn attach_conversation(
            &self,
            phone_number: &str,
            target: AttachTarget,
            target_id: &str,
        ) -> Result<AttachResult>;
        async fn list_templates(&self, doctype: &str) -> Result<Vec<Template>>;
        async fn get_recipient_options(&self, record_id: &str) -> Result<RecipientOptions>;
        async fn get_unread_count(&self) -> Result<u32>;
        async fn list_history(&self, doctype: &str, name: &str) -> Result<Vec<HistoryEntry>>;
        async fn get_field_value(
            &self,
            doctype: &str,
            name: &str,
            field: &str,
        ) -> Result<Option<String>>;
        async fn get_settings(&self) -> Result<SmsSettings>;
    }
}

static INIT_LOGGER: Once = Once::new();

/// 初始化测试日志（只执行一次）
pub fn init_test_logger() {
    INIT_LOGGER.call_once(|| {
        use tracing_subscriber::prelude::*;
        use tracing_subscriber::EnvFilter;

        // 打开当前 crate 的 debug，关闭底层 HTTP 客户端的 debug 噪音
        let filter_layer =
            EnvFilter::new("info,sms_inbox_client=debug,hyper_util::client=info,reqwest=info");

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_file(true)
            .with_line_number(true)
            .with_target(false)
            .with_test_writer();

        // 其他测试可能已经装好了全局 subscriber
        let _ = tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .try_init();
    });
}

pub fn at(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
}

pub fn conversation(phone: &str, unread_count: u32) -> Conversation {
    Conversation {
        phone_number: phone.to_string(),
        contact_name: None,
        linked_doctype: None,
        linked_name: None,
        last_message: "hello".to_string(),
        last_message_time: Some(at("2024-05-10 09:00:00")),
        unread_count,
        direction: Direction::Inbound,
    }
}

pub fn message(name: &str, direction: Direction, body: &str, sent_at: &str) -> Message {
    Message {
        name: name.to_string(),
        direction,
        body: body.to_string(),
        sent_at: at(sent_at),
        status: match direction {
            Direction::Outbound => DeliveryStatus::Sent,
            Direction::Inbound => DeliveryStatus::Pending,
        },
        sender_full_name: None,
        contact_name: None,
        linked_doctype: None,
        linked_name: None,
        provider_sid: None,
    }
}

pub fn read_state(new_unread_count: u32) -> ReadStateResult {
    ReadStateResult {
        success: true,
        new_unread_count,
    }
}
