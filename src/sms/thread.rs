//! 会话详情视图
//!
//! 状态机：Idle → Loading → Loaded → Sending → Loaded。
//! 加载和发送各自使用独立的票据；发送进行中重新加载不会丢弃发送结果。
//! 已读/未读切换是乐观更新，远程调用失败（任一错误通道）时回滚。

use crate::sms::api::MessagingApi;
use crate::sms::error::{require_non_empty, Result};
use crate::sms::format::{day_label, escape_html, time_of_day};
use crate::sms::generation::{Generation, LoadTicket};
use crate::sms::models::{
    AttachTarget, Conversation, Direction, Message, ReadStateResult, SendRequest, SendResult,
};
use chrono::{NaiveDate, NaiveDateTime};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const SEND_SUCCESS_NOTICE: &str = "SMS sent!";
pub const SEND_FAILURE_FALLBACK: &str = "Failed to send";
pub const ATTACH_FAILURE_FALLBACK: &str = "Error";

/// 视图状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Idle,
    Loading,
    Loaded,
    Sending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// 提示消息；blocking 的需要用户确认，其余为短暂提示
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub blocking: bool,
}

impl Notice {
    pub(crate) fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
            blocking: false,
        }
    }

    pub(crate) fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
            blocking: false,
        }
    }

    pub(crate) fn blocking_error(message: impl Into<String>) -> Self {
        Self {
            blocking: true,
            ..Self::error(message)
        }
    }
}

/// 消息气泡
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bubble {
    pub direction: Direction,
    pub body: String,
    pub time_label: String,
    pub status_glyph: Option<&'static str>,
    pub sender: Option<String>,
}

impl Bubble {
    fn from_message(msg: &Message) -> Self {
        Self {
            direction: msg.direction,
            body: msg.body.clone(),
            time_label: time_of_day(msg.sent_at),
            status_glyph: msg.status_glyph(),
            sender: msg.sender_display().map(str::to_string),
        }
    }

    pub fn to_html(&self) -> String {
        let mut meta = escape_html(&self.time_label);
        if let Some(sender) = &self.sender {
            meta = format!("{} · {}", escape_html(sender), meta);
        }
        if let Some(glyph) = self.status_glyph {
            meta.push(' ');
            meta.push_str(glyph);
        }
        // 保留多行文本
        let body = escape_html(&self.body).replace('\n', "<br>");
        format!(
            r#"<div class="sms-message {}"><div class="sms-bubble">{}</div><div class="sms-meta">{}</div></div>"#,
            self.direction.css_class(),
            body,
            meta
        )
    }
}

/// 渲染条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadItem {
    DateSeparator(String),
    Bubble(Bubble),
}

impl ThreadItem {
    pub fn to_html(&self) -> String {
        match self {
            ThreadItem::DateSeparator(label) => format!(
                r#"<div class="sms-date-separator"><span>{}</span></div>"#,
                escape_html(label)
            ),
            ThreadItem::Bubble(bubble) => bubble.to_html(),
        }
    }
}

/// 当前可见的已读/未读按钮（二者只显示一个）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadAction {
    MarkRead,
    MarkUnread,
}

impl ReadAction {
    pub fn label(self) -> &'static str {
        match self {
            ReadAction::MarkRead => "Mark Read",
            ReadAction::MarkUnread => "Mark Unread",
        }
    }
}

/// 发送结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// 输入为空或已有发送在进行，没有发起远程调用
    Skipped,
    Sent,
    /// 服务商拒绝（带服务端消息或默认文案）
    Rejected(String),
    /// 传输层失败
    Failed(String),
    /// 响应已过期，未应用
    Discarded,
}

/// 关联结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachOutcome {
    Attached(String),
    Rejected(String),
}

/// 关联选择器状态
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachSelector {
    pub open: bool,
    pub error: Option<String>,
}

impl AttachSelector {
    pub fn targets(&self) -> [AttachTarget; 2] {
        AttachTarget::ALL
    }
}

/// 单个会话的详情视图
pub struct ThreadView {
    api: Arc<dyn MessagingApi>,
    conversation: Conversation,
    /// 至少成功加载过一次
    loaded: bool,
    /// 有未返回的加载请求
    loading: bool,
    /// 进行中的发送请求
    sending: Option<LoadTicket>,
    messages: Vec<Message>,
    compose: String,
    generation: Generation,
    send_generation: Generation,
    notices: Vec<Notice>,
    attach: AttachSelector,
    list_refresh_requested: bool,
    /// 最近一次标记已读之前的未读数
    unread_before_read: Option<u32>,
    /// 最近一次已读/未读操作返回的收件箱未读总数
    inbox_unread: Option<u32>,
    /// 已读/未读请求尚未确认
    read_pending: bool,
}

impl ThreadView {
    pub fn new(api: Arc<dyn MessagingApi>, conversation: Conversation) -> Self {
        Self {
            api,
            conversation,
            loaded: false,
            loading: false,
            sending: None,
            messages: Vec::new(),
            compose: String::new(),
            generation: Generation::default(),
            send_generation: Generation::default(),
            notices: Vec::new(),
            attach: AttachSelector::default(),
            list_refresh_requested: false,
            unread_before_read: None,
            inbox_unread: None,
            read_pending: false,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn phone_number(&self) -> &str {
        &self.conversation.phone_number
    }

    /// 发送优先于加载显示
    pub fn state(&self) -> ThreadState {
        if self.sending.is_some() {
            ThreadState::Sending
        } else if self.loading {
            ThreadState::Loading
        } else if self.loaded {
            ThreadState::Loaded
        } else {
            ThreadState::Idle
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn compose(&self) -> &str {
        &self.compose
    }

    pub fn set_compose(&mut self, text: impl Into<String>) {
        self.compose = text.into();
    }

    /// 发送按钮是否可用
    pub fn is_send_enabled(&self) -> bool {
        self.sending.is_none()
    }

    pub fn attach_selector(&self) -> &AttachSelector {
        &self.attach
    }

    /// 取走待显示的提示
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// 是否需要刷新会话列表（读取后复位）
    pub fn take_list_refresh(&mut self) -> bool {
        std::mem::take(&mut self.list_refresh_requested)
    }

    /// 最近一次已读/未读操作返回的收件箱未读总数（读取后复位）
    pub fn take_inbox_unread(&mut self) -> Option<u32> {
        self.inbox_unread.take()
    }

    /// 用列表中的最新数据更新会话摘要
    ///
    /// 已读/未读请求未确认时保留本地未读数，否则采用服务端的值。
    /// 已加载的会话未读数上升时返回 true，调用方应自动标记已读。
    pub fn refresh_summary(&mut self, latest: &Conversation) -> bool {
        let local = self.conversation.unread_count;
        let unread = if self.read_pending {
            local
        } else {
            latest.unread_count
        };
        self.conversation = Conversation {
            unread_count: unread,
            ..latest.clone()
        };
        let needs_mark_read = !self.read_pending
            && self.state() == ThreadState::Loaded
            && unread > local;
        if needs_mark_read {
            debug!(
                "[Thread] 会话有新的未读, 号码: {}, 未读: {} -> {}",
                self.conversation.phone_number, local, unread
            );
        }
        needs_mark_read
    }

    // ---- 加载 ----

    pub fn begin_load(&mut self) -> LoadTicket {
        self.loading = true;
        self.generation.advance()
    }

    /// 应用加载结果；过期响应返回 Ok(false)
    ///
    /// 失败时回到加载前的状态并给出提示
    pub fn finish_load(&mut self, ticket: LoadTicket, result: Result<Vec<Message>>) -> Result<bool> {
        if !self.generation.is_current(ticket) {
            debug!(
                "[Thread] 丢弃过期的消息响应, 号码: {}, 代数: {}",
                self.conversation.phone_number,
                ticket.generation()
            );
            return Ok(false);
        }
        self.loading = false;
        match result {
            Ok(messages) => {
                info!(
                    "[Thread] ✅ 消息已加载, 号码: {}, 消息数: {}",
                    self.conversation.phone_number,
                    messages.len()
                );
                self.messages = messages;
                self.loaded = true;
                Ok(true)
            }
            Err(e) => {
                warn!("[Thread] ❌ 加载消息失败: {}", e);
                self.notices.push(Notice::error("Failed to load messages"));
                Err(e)
            }
        }
    }

    /// 加载消息；有未读时自动标记已读
    pub async fn load(&mut self) -> Result<()> {
        let ticket = self.begin_load();
        let result = self.api.list_messages(&self.conversation.phone_number).await;
        if self.finish_load(ticket, result)? && self.conversation.unread_count > 0 {
            if let Err(e) = self.mark_read().await {
                warn!("[Thread] 自动标记已读失败: {}", e);
            }
        }
        Ok(())
    }

    // ---- 渲染 ----

    /// 渲染条目：每逢日期变化插入一条日期分隔
    pub fn render_at(&self, now: NaiveDateTime) -> Vec<ThreadItem> {
        let today = now.date();
        let mut items = Vec::with_capacity(self.messages.len());
        let mut current_day: Option<NaiveDate> = None;
        for msg in &self.messages {
            let day = msg.sent_at.date();
            if current_day != Some(day) {
                items.push(ThreadItem::DateSeparator(day_label(day, today)));
                current_day = Some(day);
            }
            items.push(ThreadItem::Bubble(Bubble::from_message(msg)));
        }
        items
    }

    pub fn header_html(&self) -> String {
        let mut html = format!(
            r#"<div class="sms-chat-header"><strong>{}</strong> <span class="text-muted">{}</span>"#,
            escape_html(self.conversation.display_name()),
            escape_html(&self.conversation.phone_number)
        );
        if let Some(linked) = self.conversation.linked_record() {
            html.push_str(&format!(
                r#"<div class="sms-linked">Linked: {} {}</div>"#,
                escape_html(&linked.doctype),
                escape_html(&linked.name)
            ));
        }
        html.push_str(&format!(
            r#"<button class="sms-read-toggle">{}</button></div>"#,
            self.read_action().label()
        ));
        html
    }

    pub fn to_html_at(&self, now: NaiveDateTime) -> String {
        let mut html = self.header_html();
        html.push_str(r#"<div class="sms-messages">"#);
        for item in self.render_at(now) {
            html.push_str(&item.to_html());
        }
        html.push_str("</div>");
        html
    }

    // ---- 发送 ----

    /// 准备发送；输入为空或正在发送时返回 None
    pub fn begin_send(&mut self) -> Option<(LoadTicket, SendRequest)> {
        if self.compose.trim().is_empty() || self.sending.is_some() {
            return None;
        }
        let request = SendRequest::new(&self.conversation.phone_number, self.compose.clone())
            .linked_to(self.conversation.linked_record())
            .with_contact_name(self.conversation.contact_name.clone());
        let ticket = self.send_generation.advance();
        self.sending = Some(ticket);
        Some((ticket, request))
    }

    /// 应用发送结果；只有不属于当前发送的票据才会被丢弃
    pub fn finish_send(&mut self, ticket: LoadTicket, result: Result<SendResult>) -> SendOutcome {
        if self.sending != Some(ticket) {
            debug!("[Thread] 丢弃过期的发送响应, 代数: {}", ticket.generation());
            return SendOutcome::Discarded;
        }
        self.sending = None;
        match result {
            Ok(result) if result.success => {
                info!("[Thread] 📤 短信已发送, 号码: {}", self.conversation.phone_number);
                self.compose.clear();
                self.notices.push(Notice::success(SEND_SUCCESS_NOTICE));
                self.list_refresh_requested = true;
                SendOutcome::Sent
            }
            Ok(result) => {
                let reason = result
                    .error
                    .or(result.message)
                    .unwrap_or_else(|| SEND_FAILURE_FALLBACK.to_string());
                warn!("[Thread] ⚠️ 短信被拒绝: {}", reason);
                self.notices.push(Notice::blocking_error(reason.clone()));
                SendOutcome::Rejected(reason)
            }
            Err(e) => {
                warn!("[Thread] ❌ 发送失败: {}", e);
                self.notices.push(Notice::error("Failed to send SMS"));
                SendOutcome::Failed(e.to_string())
            }
        }
    }

    /// 发送输入框中的内容；成功后清空输入框并重新加载整个会话
    pub async fn send(&mut self) -> SendOutcome {
        let Some((ticket, request)) = self.begin_send() else {
            debug!("[Thread] 输入为空，跳过发送");
            return SendOutcome::Skipped;
        };
        let result = self.api.send_message(&request).await;
        let outcome = self.finish_send(ticket, result);
        if outcome == SendOutcome::Sent {
            if let Err(e) = self.load().await {
                warn!("[Thread] 发送后重新加载失败: {}", e);
            }
        }
        outcome
    }

    // ---- 已读/未读 ----

    /// 当前应显示的按钮
    pub fn read_action(&self) -> ReadAction {
        if self.conversation.unread_count > 0 {
            ReadAction::MarkRead
        } else {
            ReadAction::MarkUnread
        }
    }

    /// 执行当前可见的按钮
    pub async fn read_toggle(&mut self) -> Result<()> {
        match self.read_action() {
            ReadAction::MarkRead => self.mark_read().await,
            ReadAction::MarkUnread => self.mark_unread().await,
        }
    }

    pub async fn mark_read(&mut self) -> Result<()> {
        let previous = self.conversation.unread_count;
        self.conversation.unread_count = 0;
        self.read_pending = true;
        let result = self.api.mark_read(&self.conversation.phone_number).await;
        if self.apply_read_state(result, previous, "Failed to mark as read")? {
            self.unread_before_read = Some(previous);
        }
        Ok(())
    }

    /// 恢复到上一次标记已读之前的未读数（至少为 1）
    pub async fn mark_unread(&mut self) -> Result<()> {
        let previous = self.conversation.unread_count;
        self.conversation.unread_count = self.unread_before_read.unwrap_or(1).max(1);
        self.read_pending = true;
        let result = self.api.mark_unread(&self.conversation.phone_number).await;
        if self.apply_read_state(result, previous, "Failed to mark as unread")? {
            self.unread_before_read = None;
        }
        Ok(())
    }

    /// 处理已读/未读结果；失败时回滚到 previous
    fn apply_read_state(
        &mut self,
        result: Result<ReadStateResult>,
        previous: u32,
        failure_message: &str,
    ) -> Result<bool> {
        self.read_pending = false;
        match result {
            Ok(state) if state.success => {
                debug!(
                    "[Thread] 未读状态已更新, 号码: {}, 本地未读: {}, 收件箱未读: {}",
                    self.conversation.phone_number,
                    self.conversation.unread_count,
                    state.new_unread_count
                );
                self.inbox_unread = Some(state.new_unread_count);
                self.list_refresh_requested = true;
                Ok(true)
            }
            Ok(_) => {
                warn!("[Thread] ⚠️ 服务端拒绝更新未读状态，回滚");
                self.conversation.unread_count = previous;
                self.notices.push(Notice::error(failure_message));
                Ok(false)
            }
            Err(e) => {
                warn!("[Thread] ❌ 更新未读状态失败，回滚: {}", e);
                self.conversation.unread_count = previous;
                self.notices.push(Notice::error(failure_message));
                Err(e)
            }
        }
    }

    // ---- 关联 ----

    pub fn open_attach(&mut self) {
        self.attach = AttachSelector {
            open: true,
            error: None,
        };
    }

    pub fn close_attach(&mut self) {
        self.attach = AttachSelector::default();
    }

    /// 把会话关联到业务记录
    ///
    /// 目标类型不在允许集合内时，在发起任何请求之前返回 `AttachTargetNotAllowed`
    pub async fn confirm_attach(&mut self, target: &str, target_id: &str) -> Result<AttachOutcome> {
        let target: AttachTarget = target.parse()?;
        require_non_empty(target_id, "target_name")?;

        let result = self
            .api
            .attach_conversation(&self.conversation.phone_number, target, target_id)
            .await;
        match result {
            Ok(result) if result.success => {
                info!(
                    "[Thread] 🔗 会话已关联, 号码: {}, 目标: {} {}",
                    self.conversation.phone_number, target, target_id
                );
                self.close_attach();
                self.conversation.linked_doctype = Some(target.as_str().to_string());
                self.conversation.linked_name = Some(target_id.trim().to_string());
                self.notices.push(Notice::success(result.message.clone()));
                self.list_refresh_requested = true;
                Ok(AttachOutcome::Attached(result.message))
            }
            Ok(result) => {
                let reason = if result.message.trim().is_empty() {
                    ATTACH_FAILURE_FALLBACK.to_string()
                } else {
                    result.message
                };
                self.attach.open = true;
                self.attach.error = Some(reason.clone());
                self.notices.push(Notice::blocking_error(reason.clone()));
                Ok(AttachOutcome::Rejected(reason))
            }
            Err(e) => {
                warn!("[Thread] ❌ 关联会话失败: {}", e);
                self.attach.open = true;
                self.attach.error = Some(ATTACH_FAILURE_FALLBACK.to_string());
                self.notices.push(Notice::error(ATTACH_FAILURE_FALLBACK));
                Err(e)
            }
        }
    }

    /// 校验关联目标类型（供宿主在选择时调用）
    pub fn validate_attach_target(target: &str) -> Result<AttachTarget> {
        target.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sms::error::SmsError;
    use crate::sms::models::{AttachResult, DeliveryStatus};
    use crate::sms::test_support::{at, conversation, init_test_logger, message, read_state, MockApi};

    fn view(api: MockApi, unread: u32) -> ThreadView {
        ThreadView::new(Arc::new(api), conversation("+61400111222", unread))
    }

    #[tokio::test]
    async fn separators_follow_calendar_days() {
        init_test_logger();
        let mut api = MockApi::new();
        api.expect_list_messages()
            .times(1)
            .withf(|phone| phone == "+61400111222")
            .returning(|_| {
                Ok(vec![
                    message("1", Direction::Inbound, "a", "2024-05-08 09:00:00"),
                    message("2", Direction::Outbound, "b", "2024-05-08 17:30:00"),
                    message("3", Direction::Inbound, "c", "2024-05-09 08:00:00"),
                    message("4", Direction::Inbound, "d", "2024-05-10 10:00:00"),
                    message("5", Direction::Outbound, "e", "2024-05-10 11:00:00"),
                ])
            });
        let mut thread = view(api, 0);
        thread.load().await.unwrap();
        assert_eq!(thread.state(), ThreadState::Loaded);

        let items = thread.render_at(at("2024-05-10 12:00:00"));
        let separators: Vec<_> = items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| match item {
                ThreadItem::DateSeparator(label) => Some((i, label.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(
            separators,
            vec![
                (0, "Wed, 08 May 2024".to_string()),
                (3, "Yesterday".to_string()),
                (5, "Today".to_string()),
            ]
        );
    }

    #[test]
    fn bubble_glyph_and_sender_only_for_outbound() {
        let mut out = message("1", Direction::Outbound, "<b>hi</b>\nthere", "2024-05-10 09:05:00");
        out.sender_full_name = Some("Sam".to_string());
        let mut failed = message("2", Direction::Outbound, "x", "2024-05-10 09:06:00");
        failed.status = DeliveryStatus::Failed;
        let mut inbound = message("3", Direction::Inbound, "y", "2024-05-10 09:07:00");
        inbound.status = DeliveryStatus::Sent;
        inbound.sender_full_name = Some("Ignored".to_string());

        let a = Bubble::from_message(&out);
        assert_eq!(a.status_glyph, Some("✓"));
        assert_eq!(a.sender.as_deref(), Some("Sam"));
        assert_eq!(a.time_label, "09:05");
        let html = a.to_html();
        assert!(html.contains("&lt;b&gt;hi&lt;/b&gt;<br>there"));
        assert!(html.contains("sms-message outbound"));

        assert_eq!(Bubble::from_message(&failed).status_glyph, Some("✗"));
        let c = Bubble::from_message(&inbound);
        assert_eq!(c.status_glyph, None);
        assert_eq!(c.sender, None);
    }

    #[tokio::test]
    async fn whitespace_send_makes_no_call() {
        let mut api = MockApi::new();
        api.expect_list_messages().returning(|_| Ok(vec![]));
        api.expect_send_message().never();
        let mut thread = view(api, 0);
        thread.load().await.unwrap();

        thread.set_compose("   \n\t");
        assert_eq!(thread.send().await, SendOutcome::Skipped);
        assert_eq!(thread.state(), ThreadState::Loaded);
    }

    #[tokio::test]
    async fn successful_send_clears_compose_and_reloads() {
        init_test_logger();
        let mut api = MockApi::new();
        api.expect_list_messages().times(2).returning(|_| Ok(vec![]));
        api.expect_send_message()
            .times(1)
            .withf(|req| req.recipient == "+61400111222" && req.body == "line one\nline two")
            .returning(|_| {
                Ok(SendResult {
                    success: true,
                    sid: Some("SM1".to_string()),
                    ..Default::default()
                })
            });
        let mut thread = view(api, 0);
        thread.load().await.unwrap();

        thread.set_compose("line one\nline two");
        assert_eq!(thread.send().await, SendOutcome::Sent);
        assert_eq!(thread.compose(), "");
        assert_eq!(thread.state(), ThreadState::Loaded);
        assert!(thread.is_send_enabled());
        assert_eq!(thread.take_notices(), vec![Notice::success(SEND_SUCCESS_NOTICE)]);
        assert!(thread.take_list_refresh());
    }

    #[tokio::test]
    async fn rejected_send_keeps_compose_text() {
        let mut api = MockApi::new();
        api.expect_list_messages().times(1).returning(|_| Ok(vec![]));
        let mut seq = mockall::Sequence::new();
        api.expect_send_message()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(SendResult {
                    success: false,
                    error: Some("Invalid 'To' Phone Number".to_string()),
                    ..Default::default()
                })
            });
        api.expect_send_message()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(SendResult::default()));
        api.expect_send_message()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(SmsError::remote("HTTP 错误 502")));
        let mut thread = view(api, 0);
        thread.load().await.unwrap();
        thread.set_compose("hello");

        assert_eq!(
            thread.send().await,
            SendOutcome::Rejected("Invalid 'To' Phone Number".to_string())
        );
        assert_eq!(
            thread.send().await,
            SendOutcome::Rejected(SEND_FAILURE_FALLBACK.to_string())
        );
        assert!(matches!(thread.send().await, SendOutcome::Failed(_)));

        assert_eq!(thread.compose(), "hello");
        assert!(thread.is_send_enabled());
        let notices = thread.take_notices();
        assert_eq!(notices.len(), 3);
        assert!(notices[0].blocking);
        assert!(!notices[2].blocking);
    }

    #[tokio::test]
    async fn auto_mark_read_then_unread_restores_count() {
        init_test_logger();
        let mut api = MockApi::new();
        api.expect_list_messages().returning(|_| Ok(vec![]));
        api.expect_mark_read()
            .times(1)
            .returning(|_| Ok(read_state(4)));
        api.expect_mark_unread()
            .times(1)
            .returning(|_| Ok(read_state(7)));
        let mut thread = view(api, 3);

        thread.load().await.unwrap();
        assert_eq!(thread.conversation().unread_count, 0);
        assert_eq!(thread.read_action(), ReadAction::MarkUnread);
        assert_eq!(thread.take_inbox_unread(), Some(4));
        assert!(thread.take_list_refresh());

        thread.read_toggle().await.unwrap();
        assert_eq!(thread.conversation().unread_count, 3);
        assert_eq!(thread.read_action(), ReadAction::MarkRead);
        assert_eq!(thread.take_inbox_unread(), Some(7));
    }

    #[tokio::test]
    async fn mark_unread_without_prior_read_sets_one() {
        let mut api = MockApi::new();
        api.expect_mark_unread().times(1).returning(|_| Ok(read_state(1)));
        let mut thread = view(api, 0);
        thread.mark_unread().await.unwrap();
        assert_eq!(thread.conversation().unread_count, 1);
    }

    #[tokio::test]
    async fn failed_mark_read_rolls_back() {
        let mut api = MockApi::new();
        let mut seq = mockall::Sequence::new();
        api.expect_mark_read()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(SmsError::remote("timeout")));
        api.expect_mark_read()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ReadStateResult::default()));
        let mut thread = view(api, 2);

        assert!(thread.mark_read().await.is_err());
        assert_eq!(thread.conversation().unread_count, 2);
        thread.mark_read().await.unwrap();
        assert_eq!(thread.conversation().unread_count, 2);
        assert!(!thread.take_list_refresh());
        assert_eq!(thread.take_notices().len(), 2);
    }

    #[tokio::test]
    async fn failed_mark_unread_rolls_back_and_keeps_restore_count() {
        let mut api = MockApi::new();
        api.expect_mark_read().times(1).returning(|_| Ok(read_state(0)));
        let mut seq = mockall::Sequence::new();
        api.expect_mark_unread()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(SmsError::remote("HTTP 错误 503")));
        api.expect_mark_unread()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ReadStateResult::default()));
        api.expect_mark_unread()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(read_state(3)));
        let mut thread = view(api, 3);

        thread.mark_read().await.unwrap();
        assert_eq!(thread.conversation().unread_count, 0);
        thread.take_notices();

        assert!(thread.mark_unread().await.is_err());
        assert_eq!(thread.conversation().unread_count, 0);
        assert_eq!(thread.unread_before_read, Some(3));

        thread.mark_unread().await.unwrap();
        assert_eq!(thread.conversation().unread_count, 0);
        assert_eq!(thread.unread_before_read, Some(3));
        assert_eq!(thread.read_action(), ReadAction::MarkUnread);
        assert_eq!(thread.take_notices().len(), 2);

        thread.mark_unread().await.unwrap();
        assert_eq!(thread.conversation().unread_count, 3);
        assert_eq!(thread.unread_before_read, None);
    }

    #[test]
    fn reload_during_send_keeps_send_result() {
        let mut thread = view(MockApi::new(), 0);
        let first = thread.begin_load();
        assert!(thread.finish_load(first, Ok(vec![])).unwrap());

        thread.set_compose("hello");
        let (send_ticket, request) = thread.begin_send().unwrap();
        assert_eq!(request.body, "hello");
        assert!(!thread.is_send_enabled());

        let reload = thread.begin_load();
        assert_eq!(thread.state(), ThreadState::Sending);
        assert!(!thread.is_send_enabled());
        assert!(thread.begin_send().is_none());

        let outcome = thread.finish_send(
            send_ticket,
            Ok(SendResult {
                success: true,
                ..Default::default()
            }),
        );
        assert_eq!(outcome, SendOutcome::Sent);
        assert_eq!(thread.compose(), "");
        assert_eq!(thread.take_notices(), vec![Notice::success(SEND_SUCCESS_NOTICE)]);
        assert_eq!(thread.state(), ThreadState::Loading);

        assert!(thread
            .finish_load(reload, Err(SmsError::remote("HTTP 错误 500")))
            .is_err());
        assert_eq!(thread.state(), ThreadState::Loaded);
        assert!(thread.is_send_enabled());

        thread.set_compose("again");
        let (second, _) = thread.begin_send().unwrap();
        assert_eq!(thread.finish_send(send_ticket, Ok(SendResult::default())), SendOutcome::Discarded);
        assert_eq!(thread.state(), ThreadState::Sending);
        assert!(matches!(
            thread.finish_send(second, Err(SmsError::remote("timeout"))),
            SendOutcome::Failed(_)
        ));
        assert_eq!(thread.state(), ThreadState::Loaded);
    }

    #[test]
    fn list_refresh_adopts_server_unread_count() {
        let mut thread = view(MockApi::new(), 0);
        let ticket = thread.begin_load();
        assert!(thread.finish_load(ticket, Ok(vec![])).unwrap());

        let mut latest = conversation("+61400111222", 2);
        latest.contact_name = Some("Alex".to_string());
        assert!(thread.refresh_summary(&latest));
        assert_eq!(thread.conversation().unread_count, 2);
        assert_eq!(thread.conversation().contact_name.as_deref(), Some("Alex"));
        assert_eq!(thread.read_action(), ReadAction::MarkRead);

        assert!(!thread.refresh_summary(&latest));

        thread.read_pending = true;
        assert!(!thread.refresh_summary(&conversation("+61400111222", 5)));
        assert_eq!(thread.conversation().unread_count, 2);
    }

    #[tokio::test]
    async fn failed_first_load_returns_to_idle() {
        let mut api = MockApi::new();
        api.expect_list_messages()
            .times(1)
            .returning(|_| Err(SmsError::remote("HTTP 错误 500")));
        let mut thread = view(api, 0);
        assert!(thread.load().await.is_err());
        assert_eq!(thread.state(), ThreadState::Idle);
        assert_eq!(thread.take_notices()[0].level, NoticeLevel::Error);
    }

    #[test]
    fn stale_load_is_dropped() {
        let mut thread = view(MockApi::new(), 0);
        let old = thread.begin_load();
        let new = thread.begin_load();
        assert!(thread
            .finish_load(new, Ok(vec![message("new", Direction::Inbound, "n", "2024-05-10 09:00:00")]))
            .unwrap());
        assert!(!thread
            .finish_load(old, Ok(vec![message("old", Direction::Inbound, "o", "2024-05-10 09:00:00")]))
            .unwrap());
        assert_eq!(thread.messages()[0].name, "new");
    }

    #[tokio::test]
    async fn attach_outside_allowed_set_rejected_before_call() {
        let mut api = MockApi::new();
        api.expect_attach_conversation().never();
        let mut thread = view(api, 0);
        thread.open_attach();

        let err = thread.confirm_attach("Customer", "CUST-1").await.unwrap_err();
        assert_eq!(err, SmsError::AttachTargetNotAllowed("Customer".to_string()));
        assert!(thread.attach_selector().open);
        assert!(ThreadView::validate_attach_target("Task").is_err());
    }

    #[tokio::test]
    async fn attach_success_and_failure() {
        let mut api = MockApi::new();
        let mut seq = mockall::Sequence::new();
        api.expect_attach_conversation()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|_, target, id| *target == AttachTarget::Project && id == "PROJ-0001")
            .returning(|_, _, _| {
                Ok(AttachResult {
                    success: false,
                    message: String::new(),
                })
            });
        api.expect_attach_conversation()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| {
                Ok(AttachResult {
                    success: true,
                    message: "Attached to Project PROJ-0001".to_string(),
                })
            });
        let mut thread = view(api, 0);
        thread.open_attach();

        assert_eq!(
            thread.confirm_attach("Project", "PROJ-0001").await.unwrap(),
            AttachOutcome::Rejected(ATTACH_FAILURE_FALLBACK.to_string())
        );
        assert!(thread.attach_selector().open);
        assert_eq!(thread.attach_selector().error.as_deref(), Some("Error"));

        assert_eq!(
            thread.confirm_attach("Project", "PROJ-0001").await.unwrap(),
            AttachOutcome::Attached("Attached to Project PROJ-0001".to_string())
        );
        assert!(!thread.attach_selector().open);
        assert_eq!(thread.conversation().linked_name.as_deref(), Some("PROJ-0001"));
        assert!(thread.take_list_refresh());
    }
}
