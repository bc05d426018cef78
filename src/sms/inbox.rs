//! 短信收件箱页面
//!
//! 持有会话列表和当前打开的唯一一个会话详情（即"当前会话"）。
//! 详情视图上的操作完成后通过 `sync_thread` 把未读数同步到列表和角标。

use crate::sms::api::MessagingApi;
use crate::sms::badge::NotificationBadge;
use crate::sms::conversation_list::ConversationListView;
use crate::sms::error::{Result, SmsError};
use crate::sms::thread::{AttachOutcome, SendOutcome, ThreadView};
use chrono::NaiveDateTime;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct InboxPage {
    api: Arc<dyn MessagingApi>,
    list: ConversationListView,
    thread: Option<ThreadView>,
    badge: NotificationBadge,
}

impl InboxPage {
    pub fn new(api: Arc<dyn MessagingApi>, badge: NotificationBadge) -> Self {
        Self {
            api,
            list: ConversationListView::new(),
            thread: None,
            badge,
        }
    }

    pub fn list(&self) -> &ConversationListView {
        &self.list
    }

    pub fn thread(&self) -> Option<&ThreadView> {
        self.thread.as_ref()
    }

    /// 直接操作详情视图；操作后应调用 `sync_thread`
    pub fn thread_mut(&mut self) -> Option<&mut ThreadView> {
        self.thread.as_mut()
    }

    pub fn badge(&self) -> &NotificationBadge {
        &self.badge
    }

    /// 重新拉取会话列表
    ///
    /// 打开的会话采用列表中的未读数；有新的未读时自动标记已读
    pub async fn refresh(&mut self) -> Result<()> {
        self.list.load(self.api.as_ref()).await?;
        let Some(thread) = self.thread.as_mut() else {
            return Ok(());
        };
        let needs_mark_read = match self.list.find(thread.phone_number()) {
            Some(latest) => thread.refresh_summary(latest),
            None => false,
        };
        if needs_mark_read {
            if let Err(e) = thread.mark_read().await {
                warn!("[Inbox] 自动标记已读失败: {}", e);
            }
            // 列表刚刚刷新过，本地同步即可
            self.apply_thread_unread();
        }
        Ok(())
    }

    /// 选中会话并打开详情；之前打开的详情被替换
    pub async fn select(&mut self, phone_number: &str) -> Result<()> {
        let conversation = self
            .list
            .select(phone_number)
            .cloned()
            .ok_or_else(|| SmsError::InvalidArgument(format!("未知会话: {}", phone_number)))?;
        info!("[Inbox] 📂 打开会话: {}", conversation.display_name());

        let mut thread = ThreadView::new(self.api.clone(), conversation);
        let loaded = thread.load().await;
        self.thread = Some(thread);
        self.sync_thread().await?;
        loaded
    }

    pub fn close_thread(&mut self) {
        self.thread = None;
    }

    /// 把详情视图的未读变化同步到列表和角标，需要时刷新列表
    pub async fn sync_thread(&mut self) -> Result<()> {
        if self.apply_thread_unread() {
            debug!("[Inbox] 刷新会话列表");
            self.refresh().await?;
        }
        Ok(())
    }

    /// 把详情视图的未读数写入角标和列表行；返回详情是否请求了列表刷新
    fn apply_thread_unread(&mut self) -> bool {
        let Some(thread) = self.thread.as_mut() else {
            return false;
        };
        if let Some(count) = thread.take_inbox_unread() {
            self.badge.set_count(count);
        }
        let refresh = thread.take_list_refresh();
        self.list
            .set_unread(thread.phone_number(), thread.conversation().unread_count);
        refresh
    }

    pub async fn send(&mut self, text: &str) -> Result<SendOutcome> {
        let Some(thread) = self.thread.as_mut() else {
            return Ok(SendOutcome::Skipped);
        };
        thread.set_compose(text);
        let outcome = thread.send().await;
        self.sync_thread().await?;
        Ok(outcome)
    }

    pub async fn toggle_read(&mut self) -> Result<()> {
        let Some(thread) = self.thread.as_mut() else {
            return Ok(());
        };
        let toggled = thread.read_toggle().await;
        self.sync_thread().await?;
        toggled
    }

    pub async fn attach(&mut self, target: &str, target_id: &str) -> Result<AttachOutcome> {
        let thread = self
            .thread
            .as_mut()
            .ok_or_else(|| SmsError::InvalidArgument("没有打开的会话".to_string()))?;
        let outcome = thread.confirm_attach(target, target_id).await;
        self.sync_thread().await?;
        outcome
    }

    pub fn to_html_at(&self, now: NaiveDateTime) -> String {
        let thread_html = self
            .thread
            .as_ref()
            .map(|t| t.to_html_at(now))
            .unwrap_or_else(|| {
                r#"<div class="sms-empty">Select a conversation</div>"#.to_string()
            });
        format!(
            r#"<div class="sms-inbox"><div class="sms-conv-list">{}</div><div class="sms-chat">{}</div></div>"#,
            self.list.to_html_at(now),
            thread_html
        )
    }
}
