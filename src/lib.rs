pub mod sms;

// 重新导出常用类型和函数，方便外部使用
pub use sms::{
    client::{ClientConfig, SmsClient},
    inbox::InboxPage,
    panel::{EmbeddedPanel, RecordContext},
    MessagingApi, SmsError,
};
