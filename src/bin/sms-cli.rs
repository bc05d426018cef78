//! 短信收件箱 CLI
//!
//! 非交互式 CLI，用于测试和展示短信功能：列出会话、查看会话、发送短信、监听推送

use anyhow::Result;
use chrono::Local;
use clap::{Parser, Subcommand};
use sms_inbox_client::sms::listener::SmsListener;
use sms_inbox_client::sms::thread::ThreadItem;
use sms_inbox_client::{ClientConfig, SmsClient};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

/// 短信收件箱 CLI
#[derive(Parser, Debug)]
#[command(name = "sms-cli")]
#[command(about = "短信收件箱 CLI - 用于测试和展示短信功能", long_about = None)]
struct Args {
    /// HTTP API 基础地址
    #[arg(long, env = "SMS_API_BASE_URL", default_value = "http://localhost:8000")]
    base_url: String,

    #[arg(long, env = "SMS_API_KEY")]
    api_key: String,

    #[arg(long, env = "SMS_API_SECRET")]
    api_secret: String,

    /// 推送 WebSocket 地址
    #[arg(long, env = "SMS_PUSH_URL")]
    push_url: Option<String>,

    /// 日志级别（默认: info,sms_inbox_client=debug）
    #[arg(long, default_value = "info,sms_inbox_client=debug")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 列出会话
    List,
    /// 查看某个号码的会话（有未读时会自动标记已读）
    Thread { phone: String },
    /// 发送短信
    Send { phone: String, message: String },
    /// 切换已读/未读
    ToggleRead { phone: String },
    /// 把会话关联到业务记录（Opportunity / Project）
    Attach {
        phone: String,
        target: String,
        target_id: String,
    },
    /// 未读总数
    Unread,
    /// 记录上的短信历史
    History { doctype: String, name: String },
    /// 监听推送
    Watch {
        /// 运行时长（秒），0 表示持续运行
        #[arg(short, long, default_value = "0")]
        duration: u64,
    },
}

/// 初始化日志（同时输出到 stdout 和文件）
fn init_logger(log_level: &str) -> Result<()> {
    use anyhow::Context;
    use std::fs::OpenOptions;
    use std::io;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    // 优先使用环境变量 RUST_LOG（如果设置了），否则使用命令行参数
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    // 创建日志文件（追加模式）
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("debug.log")
        .context("无法创建日志文件 debug.log")?;

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(true);

    // 文件不需要颜色
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    info!("[CLI] 📝 日志已同时输出到控制台和文件: debug.log");
    Ok(())
}

struct CliListener;

#[async_trait::async_trait]
impl SmsListener for CliListener {
    async fn on_new_message(&self, sender: String, preview: String, phone: String, new_count: u32) {
        info!(
            "[CLI/Push] 📨 New SMS from {} ({}): {} | 未读: {}",
            sender, phone, preview, new_count
        );
    }

    async fn on_unread_count_changed(&self, new_count: u32) {
        info!("[CLI/Push] 📬 未读总数: {}", new_count);
    }

    async fn on_connection_status_changed(&self, connected: bool, message: String) {
        if connected {
            info!("[CLI/Push] 🔗 已连接: {}", message);
        } else {
            error!("[CLI/Push] 🔗 断开连接: {}", message);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(&args.log_level)?;

    let mut config = ClientConfig::new(args.base_url, args.api_key, args.api_secret);
    config.push_url = args.push_url;
    let mut client = SmsClient::new(config)?;
    let now = Local::now().naive_local();

    match args.command {
        Command::List => {
            let mut inbox = client.inbox();
            inbox.refresh().await?;
            let rows = inbox.list().rows_at(now);
            if rows.is_empty() {
                info!("[CLI] No SMS conversations yet");
            }
            for row in rows {
                info!(
                    "[CLI]   - {} | {} | {} | 未读: {}",
                    row.display_name,
                    row.preview,
                    row.time_label,
                    row.badge.unwrap_or(0)
                );
            }
        }
        Command::Thread { phone } => {
            let mut inbox = client.inbox();
            inbox.refresh().await?;
            inbox.select(&phone).await?;
            if let Some(thread) = inbox.thread() {
                for item in thread.render_at(now) {
                    match item {
                        ThreadItem::DateSeparator(label) => info!("[CLI] ── {} ──", label),
                        ThreadItem::Bubble(b) => info!(
                            "[CLI]   {} {} {} {}",
                            b.time_label,
                            b.direction.marker(),
                            b.body,
                            b.status_glyph.unwrap_or("")
                        ),
                    }
                }
            }
            info!("[CLI] 📬 未读总数: {}", inbox.badge().count());
        }
        Command::Send { phone, message } => {
            let mut inbox = client.inbox();
            inbox.refresh().await?;
            inbox.select(&phone).await?;
            let outcome = inbox.send(&message).await?;
            info!("[CLI] 📤 发送结果: {:?}", outcome);
        }
        Command::ToggleRead { phone } => {
            let mut inbox = client.inbox();
            inbox.refresh().await?;
            inbox.select(&phone).await?;
            inbox.toggle_read().await?;
            if let Some(thread) = inbox.thread() {
                info!(
                    "[CLI] ✅ {} 未读: {}",
                    thread.phone_number(),
                    thread.conversation().unread_count
                );
            }
        }
        Command::Attach {
            phone,
            target,
            target_id,
        } => {
            let mut inbox = client.inbox();
            inbox.refresh().await?;
            inbox.select(&phone).await?;
            if let Some(thread) = inbox.thread_mut() {
                thread.open_attach();
            }
            let outcome = inbox.attach(&target, &target_id).await?;
            info!("[CLI] 🔗 关联结果: {:?}", outcome);
        }
        Command::Unread => {
            let count = client.init_badge(None).await?;
            info!("[CLI] 📬 未读总数: {}", count);
        }
        Command::History { doctype, name } => {
            let history = client.api().list_history(&doctype, &name).await?;
            info!("[CLI] 📋 短信历史（共 {} 条）", history.len());
            for entry in history {
                info!(
                    "[CLI]   {} {} {} {}",
                    entry.direction.marker(),
                    entry.phone_number,
                    entry.sent_at,
                    entry.body
                );
            }
        }
        Command::Watch { duration } => {
            client.add_listener(Arc::new(CliListener));
            if let Err(e) = client.init_badge(None).await {
                warn!("[CLI] 获取未读数失败: {:#}", e);
            }
            let handle = client.connect_push().await?;
            info!("[CLI] 📥 开始监听推送...");
            if duration > 0 {
                info!("[CLI] ⏰ {} 秒后自动退出", duration);
                sleep(Duration::from_secs(duration)).await;
                handle.abort();
                info!("[CLI] 👋 程序退出");
            } else {
                info!("[CLI] ⏰ 持续运行中，按 Ctrl+C 退出");
                handle.closed().await;
            }
        }
    }

    Ok(())
}
