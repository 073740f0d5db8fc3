use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::env;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracemoe_bot::handler::SEARCHING_TEXT;
use tracemoe_bot::{Attachment, Command, PluginConfig, TraceMoePlugin};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || matches!(args[1].as_str(), "--help" | "-h") {
        print_help();
        return Ok(());
    }

    let Some(command) = Command::parse(&args[1]) else {
        println!("未知指令: {}", args[1]);
        print_help();
        return Ok(());
    };

    let attachments = match args.get(2) {
        Some(source) => vec![load_attachment(source)?],
        None => vec![],
    };

    let plugin = TraceMoePlugin::new(PluginConfig::from_env()).context("无法初始化插件")?;

    // Ctrl+C 取消進行中的請求
    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let spinner = ProgressBar::new_spinner();
    if matches!(command, Command::Search { .. }) && !attachments.is_empty() {
        spinner.set_style(ProgressStyle::default_spinner().template("{spinner} {msg}")?);
        spinner.set_message(SEARCHING_TEXT);
        spinner.enable_steady_tick(Duration::from_millis(100));
    }

    let reply = plugin.handle(command, &attachments, &cancel).await;
    spinner.finish_and_clear();

    println!("{}", reply);
    Ok(())
}

/// 本機檔案或圖片連結
fn load_attachment(source: &str) -> Result<Attachment> {
    if source.starts_with("http://") || source.starts_with("https://") {
        return Ok(Attachment::Url(source.to_string()));
    }

    let data = std::fs::read(source).with_context(|| format!("无法读取图片: {}", source))?;
    Ok(Attachment::Image(data))
}

fn print_help() {
    println!("TraceMoe - 動畫截圖場景搜尋\n");
    println!("用法:");
    println!("  tracemoe-bot \"/tracemoe\" <圖片路徑或URL>       # 標準搜尋");
    println!("  tracemoe-bot \"/tracemoe cut\" <圖片路徑或URL>   # 裁切黑邊後搜尋");
    println!("  tracemoe-bot \"/tracemoe help\"                  # 外掛說明\n");
    println!("環境變數:");
    println!("  TRACEMOE_API_BASE      # trace.moe API 位址");
    println!("  TRACEMOE_API_KEY       # API key（選填）");
    println!("  ANILIST_ENDPOINT       # AniList GraphQL 位址");
    println!("  TRACEMOE_TIMEOUT_SECS  # 請求超時（秒）");
    println!("  TRACEMOE_ENRICH        # 設為 0 關閉 AniList 補充資料");
    println!("  RUST_LOG               # 日誌等級 (預設 info)");
}
