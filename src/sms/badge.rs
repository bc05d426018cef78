//! 未读短信角标
//!
//! 全局共享一个未读计数（无锁，后写者胜）。新短信推送和未读数变更推送都直接覆盖计数，
//! 不在客户端累加。

use crate::sms::api::MessagingApi;
use crate::sms::error::Result;
use crate::sms::format::escape_html;
use crate::sms::listener::SmsListener;
use crate::sms::types::PushEvent;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// 新短信提醒
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessageAlert {
    pub sender: String,
    pub preview: String,
    pub phone: String,
}

impl NewMessageAlert {
    pub fn title(&self) -> String {
        format!("New SMS from {}", self.sender)
    }

    pub fn to_html(&self) -> String {
        format!(
            "<strong>{}</strong><br>{}",
            escape_html(&self.title()),
            escape_html(&self.preview)
        )
    }
}

/// 未读角标
#[derive(Clone, Default)]
pub struct NotificationBadge {
    count: Arc<AtomicU32>,
    /// 每条新短信一条提醒，超过上限时丢弃最旧的
    alerts: Arc<Mutex<VecDeque<NewMessageAlert>>>,
}

/// 未取走的提醒上限
pub const MAX_PENDING_ALERTS: usize = 20;

impl NotificationBadge {
    /// 用启动时下发的值初始化
    pub fn new(boot_count: Option<u32>) -> Self {
        let badge = Self::default();
        badge.set_count(boot_count.unwrap_or(0));
        badge
    }

    /// 没有启动值时，单次从服务端拉取
    pub async fn seed(boot_count: Option<u32>, api: &dyn MessagingApi) -> Result<Self> {
        match boot_count {
            Some(count) => Ok(Self::new(Some(count))),
            None => {
                let badge = Self::new(None);
                badge.refresh(api).await?;
                Ok(badge)
            }
        }
    }

    /// 重新拉取未读总数
    pub async fn refresh(&self, api: &dyn MessagingApi) -> Result<u32> {
        let count = api.get_unread_count().await?;
        self.set_count(count);
        Ok(count)
    }

    pub fn set_count(&self, count: u32) {
        self.count.store(count, Ordering::Relaxed);
        debug!("[Badge] 未读数更新: {}", count);
    }

    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }

    /// 计数为 0 时隐藏
    pub fn is_visible(&self) -> bool {
        self.count() > 0
    }

    /// 角标文字；隐藏时为 None
    pub fn label(&self) -> Option<String> {
        let count = self.count();
        (count > 0).then(|| count.to_string())
    }

    /// 应用一个推送事件
    pub fn apply(&self, event: &PushEvent) {
        if let PushEvent::NewMessage {
            sender,
            preview,
            phone,
            ..
        } = event
        {
            let alert = NewMessageAlert {
                sender: sender.clone(),
                preview: preview.clone(),
                phone: phone.clone(),
            };
            info!("[Badge] 📨 {}", alert.title());
            if let Ok(mut alerts) = self.alerts.lock() {
                if alerts.len() >= MAX_PENDING_ALERTS {
                    alerts.pop_front();
                }
                alerts.push_back(alert);
            }
        }
        self.set_count(event.new_count());
    }

    /// 按到达顺序取走一条新短信提醒
    pub fn take_alert(&self) -> Option<NewMessageAlert> {
        self.alerts.lock().ok().and_then(|mut alerts| alerts.pop_front())
    }

    pub fn to_html(&self) -> String {
        let count = self.count();
        format!(
            r#"<span class="sms-badge" style="display: {}">{}</span>"#,
            if count > 0 { "flex" } else { "none" },
            count
        )
    }
}

#[async_trait]
impl SmsListener for NotificationBadge {
    async fn on_new_message(&self, sender: String, preview: String, phone: String, new_count: u32) {
        self.apply(&PushEvent::NewMessage {
            sender,
            preview,
            phone,
            new_count,
        });
    }

    async fn on_unread_count_changed(&self, new_count: u32) {
        self.apply(&PushEvent::UnreadCountChanged { new_count });
    }

    async fn on_connection_status_changed(&self, _connected: bool, _message: String) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sms::test_support::MockApi;

    #[test]
    fn visibility_follows_count() {
        let badge = NotificationBadge::new(None);
        assert!(!badge.is_visible());
        assert_eq!(badge.label(), None);
        assert!(badge.to_html().contains("display: none"));

        badge.set_count(1);
        assert!(badge.is_visible());
        assert_eq!(badge.label().as_deref(), Some("1"));

        badge.set_count(12);
        assert_eq!(badge.label().as_deref(), Some("12"));
        assert!(badge.to_html().contains(">12<"));
    }

    #[tokio::test]
    async fn push_events_overwrite_shared_counter() {
        let badge = NotificationBadge::new(Some(2));
        let shared = badge.clone();

        badge
            .on_new_message("Alex <b>".to_string(), "Running late".to_string(), "+61400".to_string(), 3)
            .await;
        assert_eq!(shared.count(), 3);

        let alert = shared.take_alert().unwrap();
        assert_eq!(alert.title(), "New SMS from Alex <b>");
        assert!(alert.to_html().contains("Alex &lt;b&gt;"));
        assert_eq!(shared.take_alert(), None);

        badge.on_unread_count_changed(0).await;
        assert_eq!(shared.count(), 0);
        assert!(!shared.is_visible());
    }

    #[tokio::test]
    async fn every_new_message_gets_its_own_alert() {
        let badge = NotificationBadge::new(None);
        badge
            .on_new_message("Alex".to_string(), "first".to_string(), "+61401".to_string(), 1)
            .await;
        badge
            .on_new_message("Sam".to_string(), "second".to_string(), "+61402".to_string(), 2)
            .await;
        assert_eq!(badge.count(), 2);
        assert_eq!(badge.take_alert().unwrap().preview, "first");
        assert_eq!(badge.take_alert().unwrap().preview, "second");
        assert_eq!(badge.take_alert(), None);

        for i in 0..(MAX_PENDING_ALERTS + 3) {
            badge.apply(&PushEvent::NewMessage {
                sender: format!("S{}", i),
                preview: String::new(),
                phone: String::new(),
                new_count: i as u32,
            });
        }
        assert_eq!(badge.take_alert().unwrap().sender, "S3");
    }

    #[tokio::test]
    async fn seeds_from_boot_value_without_fetch() {
        let api = MockApi::new();
        let badge = NotificationBadge::seed(Some(5), &api).await.unwrap();
        assert_eq!(badge.count(), 5);
    }

    #[tokio::test]
    async fn seeds_from_one_shot_fetch() {
        let mut api = MockApi::new();
        api.expect_get_unread_count().times(1).returning(|| Ok(7));
        let badge = NotificationBadge::seed(None, &api).await.unwrap();
        assert_eq!(badge.label().as_deref(), Some("7"));
    }
}
