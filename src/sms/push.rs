//! 短信推送通道（WebSocket）
//!
//! 服务端推送文本帧 `{"event": <name>, "data": {...}}`，解析后分发给所有注册的监听器

use crate::sms::error::{Result, SmsError};
use crate::sms::listener::SmsListener;
use crate::sms::types::PushEvent;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

/// WebSocket 写入端类型别名
pub type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

/// WebSocket 读取端类型别名
pub type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// 默认心跳间隔
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(25);

/// 推送订阅器
pub struct PushSubscriber {
    url: String,
    authorization: Option<String>,
    heartbeat: Duration,
    listeners: Vec<Arc<dyn SmsListener>>,
}

/// 已启动的推送任务句柄
pub struct PushHandle {
    reader: JoinHandle<()>,
    heartbeat: JoinHandle<()>,
}

impl PushHandle {
    /// 停止推送（读取与心跳任务）
    pub fn abort(&self) {
        self.reader.abort();
        self.heartbeat.abort();
    }

    /// 等待读取任务结束（连接关闭）
    pub async fn closed(self) {
        let _ = self.reader.await;
        self.heartbeat.abort();
    }
}

impl PushSubscriber {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            authorization: None,
            heartbeat: DEFAULT_HEARTBEAT,
            listeners: Vec::new(),
        }
    }

    /// 握手时携带的认证头
    pub fn with_authorization(mut self, authorization: impl Into<String>) -> Self {
        self.authorization = Some(authorization.into());
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// 注册监听器
    pub fn add_listener(&mut self, listener: Arc<dyn SmsListener>) {
        self.listeners.push(listener);
    }

    /// 连接到推送服务并在内部启动消息处理
    pub async fn connect(self) -> Result<PushHandle> {
        info!("[Push] 🔗 连接推送服务: {}", self.url);

        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| SmsError::Push(format!("无效的推送地址: {}", e)))?;
        if let Some(auth) = &self.authorization {
            let value = HeaderValue::from_str(auth)
                .map_err(|e| SmsError::Push(format!("无效的认证头: {}", e)))?;
            request.headers_mut().insert("Authorization", value);
        }

        let (ws_stream, response) = connect_async(request)
            .await
            .map_err(|e| SmsError::Push(format!("WebSocket 连接失败: {}", e)))?;
        info!("[Push] ✅ WebSocket 连接成功, 状态: {}", response.status());

        let (write, read) = ws_stream.split();
        let writer = Arc::new(Mutex::new(write));
        let listeners = Arc::new(self.listeners);

        for listener in listeners.iter() {
            listener
                .on_connection_status_changed(true, "连接成功".to_string())
                .await;
        }

        // 启动心跳
        let writer_for_heartbeat = writer.clone();
        let period = self.heartbeat;
        let heartbeat = tokio::spawn(async move {
            let mut ticker = interval(period);
            // 第一次 tick 立即返回，跳过
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let mut w = writer_for_heartbeat.lock().await;
                if w.send(WsMessage::Ping(vec![])).await.is_err() {
                    warn!("[Push] 💓 心跳发送失败，停止心跳");
                    break;
                }
            }
        });

        info!("[Push] 📥 开始监听推送事件");
        let reader = tokio::spawn(async move {
            handle_messages(read, &listeners).await;
            for listener in listeners.iter() {
                listener
                    .on_connection_status_changed(false, "连接已关闭".to_string())
                    .await;
            }
        });

        Ok(PushHandle { reader, heartbeat })
    }
}

/// 处理接收消息（事件循环）
async fn handle_messages(mut read: WsReader, listeners: &[Arc<dyn SmsListener>]) {
    while let Some(msg_result) = read.next().await {
        match msg_result {
            Ok(WsMessage::Text(text)) => handle_text_frame(&text, listeners).await,
            Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => {}
            Ok(WsMessage::Close(frame)) => {
                warn!("[Push] 👋 连接关闭: {:?}", frame);
                break;
            }
            Err(e) => {
                error!("[Push] WebSocket 错误: {}", e);
                break;
            }
            _ => {}
        }
    }
}

/// 解析并分发单个文本帧；解析失败只记日志
pub async fn handle_text_frame(text: &str, listeners: &[Arc<dyn SmsListener>]) {
    match PushEvent::parse(text) {
        Ok(Some(event)) => dispatch_event(listeners, event).await,
        Ok(None) => {}
        Err(e) => error!("[Push] 推送帧解析失败: {}, 原始数据: {}", e, text),
    }
}

/// 把事件分发给所有监听器
pub async fn dispatch_event(listeners: &[Arc<dyn SmsListener>], event: PushEvent) {
    debug!("[Push] 分发事件: {:?}", event);
    for listener in listeners {
        match &event {
            PushEvent::NewMessage {
                sender,
                preview,
                phone,
                new_count,
            } => {
                listener
                    .on_new_message(sender.clone(), preview.clone(), phone.clone(), *new_count)
                    .await;
            }
            PushEvent::UnreadCountChanged { new_count } => {
                listener.on_unread_count_changed(*new_count).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingListener {
        events: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl SmsListener for RecordingListener {
        async fn on_new_message(&self, sender: String, preview: String, _phone: String, new_count: u32) {
            self.events
                .lock()
                .unwrap()
                .push(format!("new:{}:{}:{}", sender, preview, new_count));
        }
        async fn on_unread_count_changed(&self, new_count: u32) {
            self.events.lock().unwrap().push(format!("count:{}", new_count));
        }
        async fn on_connection_status_changed(&self, connected: bool, _message: String) {
            self.events.lock().unwrap().push(format!("conn:{}", connected));
        }
    }

    #[tokio::test]
    async fn frames_reach_every_listener() {
        let a = Arc::new(RecordingListener::default());
        let b = Arc::new(RecordingListener::default());
        let listeners: Vec<Arc<dyn SmsListener>> = vec![a.clone(), b.clone()];

        handle_text_frame(
            r#"{"event": "new_sms", "data": {"sender": "Alex", "preview": "hi", "new_count": 4}}"#,
            &listeners,
        )
        .await;
        handle_text_frame(r#"{"event": "sms_unread_count_update", "data": {"new_count": 1}}"#, &listeners).await;
        // 无法解析和未知事件都被忽略
        handle_text_frame("garbage", &listeners).await;
        handle_text_frame(r#"{"event": "other", "data": {}}"#, &listeners).await;

        for l in [a, b] {
            assert_eq!(
                *l.events.lock().unwrap(),
                vec!["new:Alex:hi:4".to_string(), "count:1".to_string()]
            );
        }
    }

    #[tokio::test]
    async fn rejects_invalid_url() {
        let result = PushSubscriber::new("not a url").connect().await;
        assert!(matches!(result, Err(SmsError::Push(_))));
    }
}
