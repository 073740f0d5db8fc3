//! 指令處理：`/tracemoe`、`/tracemoe cut`、`/tracemoe help`
//!
//! 每次呼叫都是一條直線流程：收到 → (裁切) → 搜尋 → 補充資料 → 排版。
//! 所有錯誤都在這裡轉成一句回覆，不會往宿主拋。

use crate::config::PluginConfig;
use crate::error::{Result, TraceMoeError};
use crate::fetcher::{HttpFetcher, ImageSource};
use crate::formatter;
use crate::preprocess;
use crate::search::{utils, AniListEnricher, MetadataEnricher, SceneSearchService, TraceMoeClient};
use crate::types::{AnimeMetadata, SearchRequest, SearchResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const HELP_TEXT: &str = "🎌 TraceMoe 动漫场景识别插件

📝 功能说明：
通过图片识别动漫截图出处，基于 trace.moe API

🎯 使用方法：
• /tracemoe + 图片 - 标准图片搜索
• /tracemoe cut + 图片 - 自动裁切黑边后搜索

📊 结果说明：
• 相似度 ≥90% - 结果较准确
• 相似度 <90% - 仅供参考
• 显示时间戳、集数、文件名等信息

💡 支持格式：
• 静态图片：jpg, png, gif, webp
• 推荐尺寸：640x360px
• 文件大小限制：25MB

⚙️ 高级选项：
• cut - 自动裁切黑边，提高识别准确度
• 适用于手机截图等包含黑边的图片
";

pub const USAGE_TEXT: &str = "🖼️ 请发送图片来搜索动漫！

使用方法：
• 发送 /tracemoe 并附带图片
• 发送 /tracemoe cut 并附带图片（自动裁切黑边）

💡 支持的图片格式：jpg, png, gif, webp 等
📏 推荐尺寸：640x360px
📦 文件大小限制：25MB
🔧 需要帮助请发送：/tracemoe help";

/// 搜尋開始前可先送出的提示
pub const SEARCHING_TEXT: &str = "🔍 正在搜索动漫场景，请稍候...";

/// 解析後的指令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Help,
    Search { cut: bool },
}

impl Command {
    /// 不是本外掛的指令時回傳 `None`
    pub fn parse(text: &str) -> Option<Self> {
        let mut words = text.split_whitespace();
        let head = words.next()?.to_lowercase();
        if head.trim_start_matches('/') != "tracemoe" {
            return None;
        }

        match words.next().map(|w| w.to_lowercase()).as_deref() {
            Some("help") => Some(Self::Help),
            Some("cut") => Some(Self::Search { cut: true }),
            _ => Some(Self::Search { cut: false }),
        }
    }
}

/// 訊息附帶的圖片
#[derive(Debug, Clone)]
pub enum Attachment {
    /// 已經在記憶體中的圖片
    Image(Vec<u8>),
    /// 需要下載的圖片連結
    Url(String),
}

/// 外掛本體
pub struct TraceMoePlugin {
    config: Arc<PluginConfig>,
    searcher: Arc<dyn SceneSearchService>,
    enricher: Option<Arc<dyn MetadataEnricher>>,
    images: Arc<dyn ImageSource>,
}

impl TraceMoePlugin {
    /// 載入時建立一次，所有服務共用同一個連線池
    pub fn new(config: PluginConfig) -> Result<Self> {
        let config = Arc::new(config);
        let client = utils::build_http_client(&config)?;

        let searcher = Arc::new(TraceMoeClient::with_client(client.clone(), Arc::clone(&config)));
        let enricher: Option<Arc<dyn MetadataEnricher>> = if config.enrich {
            Some(Arc::new(AniListEnricher::with_client(client.clone(), &config)))
        } else {
            None
        };
        let images = Arc::new(HttpFetcher::new(client, config.max_image_bytes));

        info!("TraceMoe plugin initialized (api: {})", config.api_base);
        Ok(Self::from_parts(config, searcher, enricher, images))
    }

    pub fn from_parts(
        config: Arc<PluginConfig>,
        searcher: Arc<dyn SceneSearchService>,
        enricher: Option<Arc<dyn MetadataEnricher>>,
        images: Arc<dyn ImageSource>,
    ) -> Self {
        Self {
            config,
            searcher,
            enricher,
            images,
        }
    }

    /// 解析文字後處理；不是本外掛的指令回傳 `None`
    pub async fn handle_text(
        &self,
        text: &str,
        attachments: &[Attachment],
        cancel: &CancellationToken,
    ) -> Option<String> {
        let command = Command::parse(text)?;
        Some(self.handle(command, attachments, cancel).await)
    }

    /// 執行指令並產生回覆文字
    pub async fn handle(
        &self,
        command: Command,
        attachments: &[Attachment],
        cancel: &CancellationToken,
    ) -> String {
        let cut = match command {
            Command::Help => return HELP_TEXT.to_string(),
            Command::Search { cut } => cut,
        };

        let Some(attachment) = attachments.first() else {
            return USAGE_TEXT.to_string();
        };

        match self.run_search(attachment, cut, cancel).await {
            Ok(reply) => reply,
            Err(TraceMoeError::NoMatch) => formatter::NO_MATCH_MESSAGE.to_string(),
            Err(e) => {
                warn!("TraceMoe search failed: {}", e);
                format!("❌ 搜索失败: {}", e.user_message())
            }
        }
    }

    async fn run_search(
        &self,
        attachment: &Attachment,
        cut: bool,
        cancel: &CancellationToken,
    ) -> Result<String> {
        debug!("stage=received cut={}", cut);
        let data = match attachment {
            Attachment::Image(bytes) => bytes.clone(),
            Attachment::Url(url) => self.images.fetch_image(url, cancel).await?,
        };

        if data.len() > self.config.max_image_bytes {
            return Err(TraceMoeError::PayloadTooLarge {
                size: data.len(),
                limit: self.config.max_image_bytes,
            });
        }

        let data = if cut {
            let cropped = utils::cancellable(cancel, crop_in_background(data)).await?;
            debug!("stage=cropped size={}", cropped.len());
            cropped
        } else {
            data
        };

        let result = {
            let request = SearchRequest::new(data, cut);
            self.searcher.search(&request, cancel).await?
        };
        debug!(
            "stage=searched service={} matches={}",
            self.searcher.name(),
            result.matches.len()
        );

        if result.is_empty() {
            return Err(TraceMoeError::NoMatch);
        }

        let metadata = self.enrich_all(&result, cancel).await;
        if cancel.is_cancelled() {
            return Err(TraceMoeError::Cancelled);
        }
        debug!(
            "stage=enriched resolved={}",
            metadata.iter().filter(|m| m.is_some()).count()
        );

        let reply = formatter::format(&result, &metadata);
        debug!("stage=formatted");
        Ok(reply)
    }

    /// 逐筆補充資料，同一個作品只查一次
    async fn enrich_all(
        &self,
        result: &SearchResult,
        cancel: &CancellationToken,
    ) -> Vec<Option<AnimeMetadata>> {
        let Some(enricher) = &self.enricher else {
            return Vec::new();
        };
        debug!("enriching {} matches via {}", result.matches.len(), enricher.name());

        let mut seen: HashMap<u64, Option<AnimeMetadata>> = HashMap::new();
        let mut metadata = Vec::with_capacity(result.matches.len());

        for anime in &result.matches {
            let entry = match anime.anilist_id {
                Some(id) => match seen.get(&id) {
                    Some(cached) => cached.clone(),
                    None => {
                        let fetched = enricher.enrich(anime, cancel).await;
                        seen.insert(id, fetched.clone());
                        fetched
                    }
                },
                None => enricher.enrich(anime, cancel).await,
            };
            metadata.push(entry);
        }

        metadata
    }
}

/// 解碼與重新編碼放到 blocking 執行緒
async fn crop_in_background(data: Vec<u8>) -> Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || preprocess::crop(&data))
        .await
        .map_err(|e| TraceMoeError::Decode {
            what: "crop task",
            source: Box::new(e),
        })?
}
