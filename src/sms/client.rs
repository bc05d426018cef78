//! 短信客户端
//!
//! 负责装配：带认证头的 HTTP 客户端、推送订阅、未读角标，以及收件箱页面和记录面板的创建。

use crate::sms::api::{HttpMessagingApi, MessagingApi, DEFAULT_METHOD_PREFIX};
use crate::sms::badge::NotificationBadge;
use crate::sms::inbox::InboxPage;
use crate::sms::listener::SmsListener;
use crate::sms::models::{SmsSettings, DEFAULT_COUNTRY_CODE};
use crate::sms::panel::{EmbeddedPanel, PanelProfile, DEFAULT_HISTORY_LIMIT};
use crate::sms::push::{PushHandle, PushSubscriber};
use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use tracing::info;

/// 客户端配置
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// HTTP API 基础地址
    pub api_base_url: String,
    pub api_key: String,
    pub api_secret: String,
    /// 推送 WebSocket 地址；为空时不连接推送
    pub push_url: Option<String>,
    /// 远程方法前缀
    pub method_prefix: String,
    /// 号码规范化使用的国家区号
    pub default_country_code: String,
    /// 记录面板显示的历史条数
    pub history_limit: usize,
    /// 模板中的 {company_name}
    pub company_name: String,
}

impl ClientConfig {
    /// 创建默认配置
    pub fn new(api_base_url: String, api_key: String, api_secret: String) -> Self {
        Self {
            api_base_url,
            api_key,
            api_secret,
            push_url: None,
            method_prefix: DEFAULT_METHOD_PREFIX.to_string(),
            default_country_code: DEFAULT_COUNTRY_CODE.to_string(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            company_name: "Probuild".to_string(),
        }
    }

    /// 从环境变量读取配置
    ///
    /// 必需：`SMS_API_BASE_URL`、`SMS_API_KEY`、`SMS_API_SECRET`
    pub fn from_env() -> Result<Self> {
        fn required(key: &str) -> Result<String> {
            std::env::var(key).with_context(|| format!("缺少环境变量 {}", key))
        }
        fn optional(key: &str) -> Option<String> {
            std::env::var(key).ok().filter(|v| !v.trim().is_empty())
        }

        let mut config = Self::new(
            required("SMS_API_BASE_URL")?,
            required("SMS_API_KEY")?,
            required("SMS_API_SECRET")?,
        );
        config.push_url = optional("SMS_PUSH_URL");
        if let Some(prefix) = optional("SMS_METHOD_PREFIX") {
            config.method_prefix = prefix;
        }
        if let Some(code) = optional("SMS_COUNTRY_CODE") {
            config.default_country_code = code;
        }
        if let Some(limit) = optional("SMS_HISTORY_LIMIT") {
            config.history_limit = limit
                .parse()
                .with_context(|| format!("SMS_HISTORY_LIMIT 不是有效数字: {}", limit))?;
        }
        if let Some(company) = optional("SMS_COMPANY_NAME") {
            config.company_name = company;
        }
        Ok(config)
    }

    /// `Authorization` 头的值
    pub fn authorization(&self) -> String {
        format!("token {}:{}", self.api_key, self.api_secret)
    }
}

/// 短信客户端
pub struct SmsClient {
    config: ClientConfig,
    api: Arc<dyn MessagingApi>,
    badge: NotificationBadge,
    listeners: Vec<Arc<dyn SmsListener>>,
}

impl SmsClient {
    /// 创建客户端（认证头通过 default_headers 自动添加）
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http_client = reqwest::ClientBuilder::new()
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::AUTHORIZATION,
                    reqwest::header::HeaderValue::from_str(&config.authorization())
                        .context("无效的 API 凭据")?,
                );
                headers
            })
            .build()
            .context("创建 HTTP 客户端失败")?;
        let api = HttpMessagingApi::new(
            http_client,
            config.api_base_url.clone(),
            config.method_prefix.clone(),
        );
        info!("[Client] 创建短信客户端, API: {}", config.api_base_url);
        Ok(Self::with_api(config, Arc::new(api)))
    }

    /// 使用自定义的 API 实现
    pub fn with_api(config: ClientConfig, api: Arc<dyn MessagingApi>) -> Self {
        Self {
            config,
            api,
            badge: NotificationBadge::new(None),
            listeners: Vec::new(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn api(&self) -> Arc<dyn MessagingApi> {
        self.api.clone()
    }

    pub fn badge(&self) -> &NotificationBadge {
        &self.badge
    }

    /// 注册推送监听器（角标总是会收到推送，无需注册）
    pub fn add_listener(&mut self, listener: Arc<dyn SmsListener>) {
        self.listeners.push(listener);
    }

    /// 初始化角标：有启动值直接用，否则拉取一次
    pub async fn init_badge(&self, boot_count: Option<u32>) -> Result<u32> {
        match boot_count {
            Some(count) => {
                self.badge.set_count(count);
                Ok(count)
            }
            None => self
                .badge
                .refresh(self.api.as_ref())
                .await
                .context("获取未读短信数失败"),
        }
    }

    /// 连接推送服务
    pub async fn connect_push(&self) -> Result<PushHandle> {
        let url = self
            .config
            .push_url
            .as_deref()
            .ok_or_else(|| anyhow!("未配置推送地址"))?;
        let mut subscriber = PushSubscriber::new(url).with_authorization(self.config.authorization());
        subscriber.add_listener(Arc::new(self.badge.clone()));
        for listener in &self.listeners {
            subscriber.add_listener(listener.clone());
        }
        subscriber.connect().await.context("连接推送服务失败")
    }

    pub async fn settings(&self) -> Result<SmsSettings> {
        self.api.get_settings().await.context("获取短信配置失败")
    }

    /// 创建收件箱页面（与客户端共享角标）
    pub fn inbox(&self) -> InboxPage {
        InboxPage::new(self.api.clone(), self.badge.clone())
    }

    /// 为记录类型创建面板；不支持的类型返回 None
    pub fn panel(&self, doctype: &str) -> Option<EmbeddedPanel> {
        PanelProfile::for_doctype(doctype).map(|profile| {
            EmbeddedPanel::new(self.api.clone(), profile)
                .with_company_name(self.config.company_name.clone())
                .with_country_code(self.config.default_country_code.clone())
                .with_history_limit(self.config.history_limit)
        })
    }
}
