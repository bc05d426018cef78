//! 短信推送监听器回调接口

use async_trait::async_trait;

/// 短信推送监听器
#[async_trait]
pub trait SmsListener: Send + Sync {
    /// 收到新短信（发送人、预览、新的未读总数）
    async fn on_new_message(&self, sender: String, preview: String, phone: String, new_count: u32);

    /// 未读总数变更
    async fn on_unread_count_changed(&self, new_count: u32);

    /// 推送连接状态变化
    async fn on_connection_status_changed(&self, connected: bool, message: String);
}

/// 空实现（默认监听器）
pub struct EmptySmsListener;

#[async_trait]
impl SmsListener for EmptySmsListener {
    async fn on_new_message(
        &self,
        _sender: String,
        _preview: String,
        _phone: String,
        _new_count: u32,
    ) {
    }
    async fn on_unread_count_changed(&self, _new_count: u32) {}
    async fn on_connection_status_changed(&self, _connected: bool, _message: String) {}
}
