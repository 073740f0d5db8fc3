use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// 查不到標題時的顯示名稱
pub const UNKNOWN_TITLE: &str = "未知动漫";

/// 單次搜尋請求，呼叫結束即丟棄
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// 圖片原始資料
    pub image: Vec<u8>,
    /// MIME 類型
    pub content_type: String,
    /// 是否裁切黑邊
    pub cut_borders: bool,
    /// 內容雜湊 (SHA256)，只用於日誌
    pub content_hash: String,
}

impl SearchRequest {
    pub fn new(image: Vec<u8>, cut_borders: bool) -> Self {
        let content_type = image::guess_format(&image)
            .map(|format| format.to_mime_type())
            .unwrap_or("image/jpeg")
            .to_string();

        let mut hasher = Sha256::new();
        hasher.update(&image);
        let content_hash = format!("{:x}", hasher.finalize());

        Self {
            image,
            content_type,
            cut_borders,
            content_hash,
        }
    }

    /// 雜湊前 8 碼
    pub fn short_hash(&self) -> &str {
        &self.content_hash[..8]
    }
}

/// trace.moe 搜尋結果（依 API 排名排序）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub matches: Vec<AnimeMatch>,
    /// 剩餘配額
    pub quota_remaining: Option<u32>,
    /// 搜尋過的影格數
    pub frame_count: u64,
    pub searched_at: DateTime<Utc>,
}

impl SearchResult {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn best(&self) -> Option<&AnimeMatch> {
        self.matches.first()
    }
}

/// 單筆比對結果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnimeMatch {
    /// 動畫標題（可能是羅馬拼音）
    pub title: String,
    /// 相似度 0~1
    pub similarity: f64,
    /// 畫面時間（秒）
    pub at: f64,
    /// 場景起點（秒）
    pub from: f64,
    /// 場景終點（秒）
    pub to: f64,
    pub episode: Option<u32>,
    pub filename: Option<String>,
    pub anilist_id: Option<u64>,
    pub mal_id: Option<u64>,
    pub is_adult: bool,
    /// 預覽影片
    pub video: Option<String>,
    /// 預覽圖
    pub image: Option<String>,
}

/// AniList 補充資料
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnimeMetadata {
    pub anilist_id: u64,
    pub mal_id: Option<u64>,
    pub title: AnimeTitle,
    pub site_url: Option<String>,
    pub format: Option<String>,
    pub episodes: Option<u32>,
    pub season_year: Option<i32>,
}

/// 標題的各種寫法
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnimeTitle {
    pub native: Option<String>,
    pub romaji: Option<String>,
    pub english: Option<String>,
}

impl AnimeTitle {
    /// 依 native → romaji → english 的順序挑選
    pub fn preferred(&self) -> Option<&str> {
        [&self.native, &self.romaji, &self.english]
            .into_iter()
            .flatten()
            .map(|s| s.as_str())
            .find(|s| !s.trim().is_empty())
    }
}
