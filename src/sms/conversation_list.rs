//! 会话列表视图

use crate::sms::api::MessagingApi;
use crate::sms::error::Result;
use crate::sms::format::{escape_html, relative_time_opt, truncate_preview, PREVIEW_MAX_CHARS};
use crate::sms::generation::{Generation, LoadTicket};
use crate::sms::models::{Conversation, LinkedRecord};
use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

/// 空列表占位文字
pub const EMPTY_PLACEHOLDER: &str = "No SMS conversations yet";

/// 列表中的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationRow {
    pub phone_number: String,
    pub display_name: String,
    /// 方向标记 + 截断后的最后一条消息
    pub preview: String,
    pub time_label: String,
    /// 只有未读数大于 0 时才有角标
    pub badge: Option<u32>,
    pub active: bool,
    pub linked: Option<LinkedRecord>,
}

impl ConversationRow {
    fn build(conv: &Conversation, active: bool, now: NaiveDateTime) -> Self {
        Self {
            phone_number: conv.phone_number.clone(),
            display_name: conv.display_name().to_string(),
            preview: format!(
                "{} {}",
                conv.direction.marker(),
                truncate_preview(&conv.last_message, PREVIEW_MAX_CHARS)
            ),
            time_label: relative_time_opt(conv.last_message_time, now),
            badge: (conv.unread_count > 0).then_some(conv.unread_count),
            active,
            linked: conv.linked_record(),
        }
    }

    pub fn to_html(&self) -> String {
        let mut html = format!(
            r#"<div class="sms-conv-item{}" data-phone="{}">"#,
            if self.active { " active" } else { "" },
            escape_html(&self.phone_number)
        );
        html.push_str(&format!(
            r#"<div class="sms-conv-header"><span class="sms-conv-name">{}</span><span class="sms-conv-time">{}</span></div>"#,
            escape_html(&self.display_name),
            escape_html(&self.time_label)
        ));
        html.push_str(&format!(
            r#"<div class="sms-conv-preview">{}</div>"#,
            escape_html(&self.preview)
        ));
        if let Some(linked) = &self.linked {
            html.push_str(&format!(
                r#"<div class="sms-conv-link">{}: {}</div>"#,
                escape_html(&linked.doctype),
                escape_html(&linked.name)
            ));
        }
        if let Some(count) = self.badge {
            html.push_str(&format!(r#"<span class="sms-unread-badge">{}</span>"#, count));
        }
        html.push_str("</div>");
        html
    }
}

/// 列表渲染结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListRender {
    /// 显示占位文字
    Empty,
    Rows(Vec<ConversationRow>),
}

impl ListRender {
    pub fn to_html(&self) -> String {
        match self {
            ListRender::Empty => format!(r#"<div class="sms-empty">{}</div>"#, EMPTY_PLACEHOLDER),
            ListRender::Rows(rows) => rows.iter().map(ConversationRow::to_html).collect(),
        }
    }
}

/// 会话列表
#[derive(Debug, Default)]
pub struct ConversationListView {
    conversations: Vec<Conversation>,
    selected: Option<String>,
    generation: Generation,
    loading: bool,
}

impl ConversationListView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// 发起一次加载，旧票据全部作废
    pub fn begin_load(&mut self) -> LoadTicket {
        self.loading = true;
        self.generation.advance()
    }

    /// 应用加载结果；过期票据的响应被丢弃并返回 Ok(false)
    ///
    /// 失败时保留原列表
    pub fn finish_load(
        &mut self,
        ticket: LoadTicket,
        result: Result<Vec<Conversation>>,
    ) -> Result<bool> {
        if !self.generation.is_current(ticket) {
            debug!(
                "[ConvList] 丢弃过期响应, 代数: {}",
                ticket.generation()
            );
            return Ok(false);
        }
        self.loading = false;
        match result {
            Ok(conversations) => {
                info!("[ConvList] ✅ 会话列表已更新, 会话数: {}", conversations.len());
                self.set_conversations(conversations);
                Ok(true)
            }
            Err(e) => {
                warn!("[ConvList] ❌ 加载会话列表失败: {}", e);
                Err(e)
            }
        }
    }

    /// 拉取并应用会话列表
    pub async fn load(&mut self, api: &dyn MessagingApi) -> Result<()> {
        let ticket = self.begin_load();
        let result = api.list_conversations().await;
        self.finish_load(ticket, result).map(|_| ())
    }

    /// 替换列表；选中的号码不在新列表中时清除选中
    pub fn set_conversations(&mut self, conversations: Vec<Conversation>) {
        self.conversations = conversations;
        if let Some(phone) = &self.selected {
            if self.find(phone).is_none() {
                self.selected = None;
            }
        }
    }

    pub fn find(&self, phone_number: &str) -> Option<&Conversation> {
        self.conversations
            .iter()
            .find(|c| c.phone_number == phone_number)
    }

    /// 选中一行（互斥），返回被选中的会话
    pub fn select(&mut self, phone_number: &str) -> Option<&Conversation> {
        let index = self
            .conversations
            .iter()
            .position(|c| c.phone_number == phone_number)?;
        self.selected = Some(phone_number.to_string());
        self.conversations.get(index)
    }

    pub fn selected(&self) -> Option<&Conversation> {
        self.selected.as_deref().and_then(|p| self.find(p))
    }

    /// 本地更新某个会话的未读数
    pub fn set_unread(&mut self, phone_number: &str, unread_count: u32) {
        if let Some(conv) = self
            .conversations
            .iter_mut()
            .find(|c| c.phone_number == phone_number)
        {
            conv.unread_count = unread_count;
        }
    }

    pub fn rows_at(&self, now: NaiveDateTime) -> Vec<ConversationRow> {
        self.conversations
            .iter()
            .map(|c| {
                let active = self.selected.as_deref() == Some(c.phone_number.as_str());
                ConversationRow::build(c, active, now)
            })
            .collect()
    }

    pub fn render_at(&self, now: NaiveDateTime) -> ListRender {
        if self.conversations.is_empty() {
            ListRender::Empty
        } else {
            ListRender::Rows(self.rows_at(now))
        }
    }

    pub fn to_html_at(&self, now: NaiveDateTime) -> String {
        self.render_at(now).to_html()
    }
}
