use std::env;
use std::time::Duration;

/// trace.moe 圖片大小上限（25MB）
pub const MAX_IMAGE_BYTES: usize = 25 * 1024 * 1024;

/// 外掛設定，載入時建立一次，之後唯讀
#[derive(Debug, Clone)]
pub struct PluginConfig {
    /// trace.moe API 位址
    pub api_base: String,
    /// AniList GraphQL 位址
    pub anilist_endpoint: String,
    /// trace.moe API key（選填）
    pub api_key: Option<String>,
    /// 請求超時（秒）
    pub timeout_secs: u64,
    pub user_agent: String,
    /// 圖片大小上限（bytes）
    pub max_image_bytes: usize,
    /// 是否請 trace.moe 一併回傳 AniList 資訊
    pub anilist_info: bool,
    /// 是否另外向 AniList 查詢補充資料
    pub enrich: bool,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.trace.moe".to_string(),
            anilist_endpoint: "https://graphql.anilist.co".to_string(),
            api_key: None,
            timeout_secs: 30,
            user_agent: format!("AstrBot-TraceMoe-Plugin/{}", env!("CARGO_PKG_VERSION")),
            max_image_bytes: MAX_IMAGE_BYTES,
            anilist_info: true,
            enrich: true,
        }
    }
}

impl PluginConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 從環境變數覆寫預設值
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(base) = env::var("TRACEMOE_API_BASE") {
            config.api_base = base;
        }
        if let Ok(key) = env::var("TRACEMOE_API_KEY") {
            if !key.trim().is_empty() {
                config.api_key = Some(key);
            }
        }
        if let Ok(endpoint) = env::var("ANILIST_ENDPOINT") {
            config.anilist_endpoint = endpoint;
        }
        if let Some(secs) = env::var("TRACEMOE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.timeout_secs = secs;
        }
        if let Ok(flag) = env::var("TRACEMOE_ENRICH") {
            config.enrich = !matches!(flag.to_lowercase().as_str(), "0" | "false" | "off");
        }

        config
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_anilist_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.anilist_endpoint = endpoint.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_enrich(mut self, enrich: bool) -> Self {
        self.enrich = enrich;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn search_url(&self) -> String {
        format!("{}/search", self.api_base.trim_end_matches('/'))
    }
}
