//! 短信模块
//!
//! 实现短信收件箱：远程 API、会话列表、会话详情、模板、未读角标和记录面板

pub mod api;
pub mod badge;
pub mod client;
pub mod conversation_list;
pub mod error;
pub mod format;
pub mod generation;
pub mod inbox;
pub mod listener;
pub mod models;
pub mod panel;
pub mod push;
pub mod serialization;
pub mod template;
pub mod thread;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

// 重新导出主要类型和函数
pub use api::{HttpMessagingApi, MessagingApi};
pub use badge::NotificationBadge;
pub use client::{ClientConfig, SmsClient};
pub use conversation_list::ConversationListView;
pub use error::{Result, SmsError};
pub use inbox::InboxPage;
pub use listener::{EmptySmsListener, SmsListener};
pub use models::{AttachTarget, Conversation, Message, RecipientOptions, SendRequest, Template};
pub use panel::{EmbeddedPanel, PanelProfile, RecipientChoice, RecordContext};
pub use push::{PushHandle, PushSubscriber};
pub use template::{render, RenderContext};
pub use thread::{SendOutcome, ThreadView};
