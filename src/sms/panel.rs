//! 业务记录上的短信面板
//!
//! 宿主在记录表单上驱动：激活时解析默认号码、拉取模板和历史；
//! 发送对话框支持收件人选项、自定义号码和模板。历史只读。

use crate::sms::api::MessagingApi;
use crate::sms::error::{Result, SmsError};
use crate::sms::format::{
    escape_html, relative_time, truncate_preview, HISTORY_PREVIEW_MAX_CHARS,
};
use crate::sms::models::{
    normalize_phone_number, DeliveryStatus, HistoryEntry, LinkedRecord, RecipientOption,
    SendRequest, Template, DEFAULT_COUNTRY_CODE,
};
use crate::sms::template::{render, segment_info, RenderContext};
use crate::sms::thread::{Notice, SendOutcome};
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 收件人下拉中的"自定义号码"值
pub const CUSTOM_RECIPIENT: &str = "__custom__";
pub const CUSTOM_RECIPIENT_LABEL: &str = "Custom Number";
pub const MISSING_PHONE_MESSAGE: &str = "Please enter a phone number";
pub const NO_NUMBERS_HINT: &str =
    "No phone numbers found. Add a mobile to the Contact or enter a custom number.";
pub const PANEL_SEND_SUCCESS: &str = "SMS sent successfully!";
/// 面板历史默认显示条数
pub const DEFAULT_HISTORY_LIMIT: usize = 5;

/// 宿主传入的记录上下文
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordContext {
    pub doctype: String,
    pub name: String,
    /// 未保存的记录不激活面板
    pub is_new: bool,
    pub fields: HashMap<String, String>,
}

impl RecordContext {
    pub fn new(doctype: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            doctype: doctype.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// 非空字段值
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn linked_record(&self) -> LinkedRecord {
        LinkedRecord {
            doctype: self.doctype.clone(),
            name: self.name.clone(),
        }
    }
}

/// 通过链接字段查另一条记录上的号码
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkLookup {
    pub link_field: String,
    pub doctype: String,
    pub phone_field: String,
}

/// 每种记录类型的面板配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelProfile {
    pub doctype: String,
    /// 是否从服务端拉取收件人选项
    pub use_recipient_options: bool,
    /// 记录自身的号码字段
    pub phone_field: Option<String>,
    pub link_lookup: Option<LinkLookup>,
}

impl PanelProfile {
    pub fn prospect() -> Self {
        Self {
            doctype: "Prospect".to_string(),
            use_recipient_options: false,
            phone_field: Some("probuild_mobile".to_string()),
            link_lookup: None,
        }
    }

    pub fn opportunity() -> Self {
        Self {
            doctype: "Opportunity".to_string(),
            use_recipient_options: true,
            phone_field: None,
            link_lookup: Some(LinkLookup {
                link_field: "prospect".to_string(),
                doctype: "Prospect".to_string(),
                phone_field: "probuild_mobile".to_string(),
            }),
        }
    }

    /// 内置配置
    pub fn for_doctype(doctype: &str) -> Option<Self> {
        match doctype {
            "Prospect" => Some(Self::prospect()),
            "Opportunity" => Some(Self::opportunity()),
            _ => None,
        }
    }
}

/// 收件人选择
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientChoice {
    Option(String),
    Custom,
}

/// 发送对话框状态
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposeDialog {
    pub open: bool,
    pub recipient_options: Vec<RecipientOption>,
    /// 下拉当前值：号码或 `CUSTOM_RECIPIENT`
    pub recipient_select: String,
    pub phone_number: String,
    pub templates: Vec<Template>,
    pub template: Option<String>,
    pub message: String,
}

impl ComposeDialog {
    /// 下拉选项（末尾追加"自定义号码"）
    pub fn recipient_choices(&self) -> Vec<RecipientOption> {
        let mut choices = self.recipient_options.clone();
        choices.push(RecipientOption {
            label: CUSTOM_RECIPIENT_LABEL.to_string(),
            value: CUSTOM_RECIPIENT.to_string(),
        });
        choices
    }

    /// 只有选择自定义号码时才显示号码输入框
    pub fn phone_input_visible(&self) -> bool {
        self.recipient_select == CUSTOM_RECIPIENT
    }

    /// 没有任何收件人选项时的提示
    pub fn hint(&self) -> Option<&'static str> {
        self.recipient_options.is_empty().then_some(NO_NUMBERS_HINT)
    }

    pub fn segment_label(&self) -> String {
        segment_info(&self.message).label()
    }
}

/// 历史列表中的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRow {
    pub marker: &'static str,
    pub phone_number: String,
    pub time_label: String,
    pub preview: String,
    pub failed: bool,
}

impl HistoryRow {
    fn build(entry: &HistoryEntry, now: NaiveDateTime) -> Self {
        Self {
            marker: entry.direction.marker(),
            phone_number: entry.phone_number.clone(),
            time_label: relative_time(entry.sent_at, now),
            preview: truncate_preview(&entry.body, HISTORY_PREVIEW_MAX_CHARS),
            failed: entry.status == DeliveryStatus::Failed,
        }
    }

    pub fn to_html(&self) -> String {
        format!(
            r#"<div class="sms-item"><span>{}</span> <strong>{}</strong> <span class="text-muted small">({})</span>{}<br><small>{}</small></div>"#,
            self.marker,
            escape_html(&self.phone_number),
            escape_html(&self.time_label),
            if self.failed {
                r#" <span class="text-danger">(Failed)</span>"#
            } else {
                ""
            },
            escape_html(&self.preview)
        )
    }
}

/// 嵌入记录表单的短信面板
pub struct EmbeddedPanel {
    api: Arc<dyn MessagingApi>,
    profile: PanelProfile,
    company_name: String,
    default_country_code: String,
    history_limit: usize,
    record: Option<RecordContext>,
    dialog: ComposeDialog,
    history: Vec<HistoryEntry>,
    notices: Vec<Notice>,
}

impl EmbeddedPanel {
    pub fn new(api: Arc<dyn MessagingApi>, profile: PanelProfile) -> Self {
        Self {
            api,
            profile,
            company_name: String::new(),
            default_country_code: DEFAULT_COUNTRY_CODE.to_string(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            record: None,
            dialog: ComposeDialog::default(),
            history: Vec::new(),
            notices: Vec::new(),
        }
    }

    pub fn with_company_name(mut self, company_name: impl Into<String>) -> Self {
        self.company_name = company_name.into();
        self
    }

    pub fn with_country_code(mut self, code: impl Into<String>) -> Self {
        self.default_country_code = code.into();
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn record(&self) -> Option<&RecordContext> {
        self.record.as_ref()
    }

    pub fn dialog(&self) -> &ComposeDialog {
        &self.dialog
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    fn require_record(&self) -> Result<&RecordContext> {
        self.record
            .as_ref()
            .ok_or_else(|| SmsError::InvalidArgument("面板尚未激活".to_string()))
    }

    /// 激活面板：解析默认号码，拉取模板和历史
    ///
    /// 未保存的记录直接跳过，返回 Ok(false)
    pub async fn on_activate(&mut self, record: RecordContext) -> Result<bool> {
        if record.is_new || record.name.trim().is_empty() {
            debug!("[Panel] 记录未保存，跳过激活: {}", record.doctype);
            return Ok(false);
        }
        info!("[Panel] 📋 激活短信面板: {} {}", record.doctype, record.name);

        let mut dialog = ComposeDialog::default();
        let mut default_phone: Option<String> = None;

        if self.profile.use_recipient_options {
            let options = self.api.get_recipient_options(&record.name).await?;
            default_phone = options.default_phone().map(str::to_string);
            dialog.recipient_options = options.options;
        }
        if default_phone.is_none() {
            default_phone = self
                .profile
                .phone_field
                .as_deref()
                .and_then(|f| record.field(f))
                .map(str::to_string);
        }
        if default_phone.is_none() {
            if let Some(lookup) = &self.profile.link_lookup {
                if let Some(linked) = record.field(&lookup.link_field) {
                    default_phone = self
                        .api
                        .get_field_value(&lookup.doctype, linked, &lookup.phone_field)
                        .await?;
                }
            }
        }
        debug!("[Panel]   默认号码: {:?}", default_phone);

        dialog.templates = self.api.list_templates(&record.doctype).await?;
        dialog.recipient_select = default_phone
            .clone()
            .unwrap_or_else(|| CUSTOM_RECIPIENT.to_string());
        dialog.phone_number = default_phone.unwrap_or_default();

        self.dialog = dialog;
        self.record = Some(record);
        self.reload_history().await?;
        Ok(true)
    }

    pub fn open_dialog(&mut self) {
        self.dialog.open = true;
    }

    pub fn close_dialog(&mut self) {
        self.dialog.open = false;
    }

    pub fn on_recipient_selected(&mut self, choice: RecipientChoice) {
        match choice {
            RecipientChoice::Option(phone) => {
                self.dialog.recipient_select = phone.clone();
                self.dialog.phone_number = phone;
            }
            RecipientChoice::Custom => {
                self.dialog.recipient_select = CUSTOM_RECIPIENT.to_string();
                self.dialog.phone_number.clear();
            }
        }
    }

    /// 自定义号码输入
    pub fn set_phone_number(&mut self, phone: impl Into<String>) {
        self.dialog.phone_number = phone.into();
    }

    /// 选择模板并用记录字段渲染到消息框；None 表示自定义消息（不改动消息框）
    ///
    /// 返回是否找到并应用了模板
    pub fn on_template_selected(&mut self, template_name: Option<&str>) -> bool {
        self.dialog.template = template_name.map(str::to_string);
        let (Some(name), Some(record)) = (template_name, self.record.as_ref()) else {
            return false;
        };
        let Some(template) = self.dialog.templates.iter().find(|t| t.name == name) else {
            warn!("[Panel] 未知模板: {}", name);
            return false;
        };
        let context = RenderContext::from_record(&record.name, &record.fields, &self.company_name);
        self.dialog.message = render(&template.body, &context);
        true
    }

    pub fn set_message(&mut self, text: impl Into<String>) {
        self.dialog.message = text.into();
    }

    pub fn segment_label(&self) -> String {
        self.dialog.segment_label()
    }

    /// 发送对话框中的短信
    ///
    /// 没有号码时返回 `InvalidArgument`，不发起请求；消息为空时跳过
    pub async fn on_send(&mut self) -> Result<SendOutcome> {
        let record = self.require_record()?.clone();
        let phone = self.dialog.phone_number.trim().to_string();
        if phone.is_empty() {
            self.notices.push(Notice::blocking_error(MISSING_PHONE_MESSAGE));
            return Err(SmsError::InvalidArgument(MISSING_PHONE_MESSAGE.to_string()));
        }
        if self.dialog.message.trim().is_empty() {
            return Ok(SendOutcome::Skipped);
        }

        let contact_name = record
            .field("customer_name")
            .or_else(|| record.field("party_name"))
            .map(str::to_string);
        let request = SendRequest::new(
            normalize_phone_number(&phone, &self.default_country_code),
            self.dialog.message.clone(),
        )
        .linked_to(Some(record.linked_record()))
        .with_contact_name(contact_name);

        match self.api.send_message(&request).await {
            Ok(result) if result.success => {
                info!("[Panel] 📤 短信已发送: {}", request.recipient);
                self.dialog.open = false;
                self.dialog.message.clear();
                self.dialog.template = None;
                self.notices.push(Notice::success(PANEL_SEND_SUCCESS));
                if let Err(e) = self.reload_history().await {
                    warn!("[Panel] 发送后刷新历史失败: {}", e);
                }
                Ok(SendOutcome::Sent)
            }
            Ok(result) => {
                let reason = result
                    .error
                    .or(result.message)
                    .unwrap_or_else(|| "Unknown error".to_string());
                warn!("[Panel] ⚠️ 短信被拒绝: {}", reason);
                self.notices.push(Notice::blocking_error(reason.clone()));
                Ok(SendOutcome::Rejected(reason))
            }
            Err(e) => {
                warn!("[Panel] ❌ 发送失败: {}", e);
                self.notices.push(Notice::error("Failed to send SMS"));
                Ok(SendOutcome::Failed(e.to_string()))
            }
        }
    }

    /// 重新拉取历史，只保留最新的几条
    pub async fn reload_history(&mut self) -> Result<()> {
        let record = self.require_record()?;
        let mut history = self.api.list_history(&record.doctype, &record.name).await?;
        history.truncate(self.history_limit);
        debug!("[Panel]   历史条数: {}", history.len());
        self.history = history;
        Ok(())
    }

    pub fn history_rows_at(&self, now: NaiveDateTime) -> Vec<HistoryRow> {
        self.history
            .iter()
            .map(|entry| HistoryRow::build(entry, now))
            .collect()
    }

    /// 历史 HTML；没有历史时为空串
    pub fn history_html_at(&self, now: NaiveDateTime) -> String {
        if self.history.is_empty() {
            return String::new();
        }
        let rows: String = self
            .history_rows_at(now)
            .iter()
            .map(HistoryRow::to_html)
            .collect();
        format!(
            r#"<div class="sms-history"><h6 class="text-muted">Recent SMS Messages</h6>{}</div>"#,
            rows
        )
    }
}
