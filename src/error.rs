use thiserror::Error;

/// 搜尋流程的錯誤分類
///
/// 每一種錯誤都會在 handler 邊界被轉成一句給使用者看的訊息，
/// 不會讓宿主程式崩潰。
#[derive(Error, Debug)]
pub enum TraceMoeError {
    /// 無法解碼或不支援的圖片格式
    #[error("unsupported image format: {reason}")]
    UnsupportedFormat { reason: String },

    /// 圖片超過大小上限
    #[error("image too large: {size} bytes (limit {limit})")]
    PayloadTooLarge { size: usize, limit: usize },

    /// 連線層失敗（逾時、DNS、連線中斷）
    #[error("network error while {operation}")]
    Network {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// 配額用盡或觸及並發限制
    #[error("trace.moe quota exceeded (HTTP {status})")]
    QuotaExceeded { status: u16 },

    /// 沒有任何結果（正常回覆，不算致命錯誤）
    #[error("no match found")]
    NoMatch,

    /// 伺服器拒絕圖片內容
    #[error("trace.moe rejected the image")]
    InvalidImage,

    #[error("trace.moe unavailable (HTTP {status})")]
    ServiceUnavailable { status: u16 },

    /// API 回傳的其他錯誤
    #[error("trace.moe API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// 附件圖片下載失敗
    #[error("image download failed (HTTP {status})")]
    Download { status: u16 },

    /// 回應內容無法解析
    #[error("failed to decode {what}")]
    Decode {
        what: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// 呼叫被宿主取消
    #[error("request cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, TraceMoeError>;

impl TraceMoeError {
    pub(crate) fn network(operation: &'static str, source: reqwest::Error) -> Self {
        Self::Network { operation, source }
    }

    /// 給聊天室使用者看的訊息
    pub fn user_message(&self) -> String {
        match self {
            Self::UnsupportedFormat { .. } => {
                "不支持的图片格式，请发送 jpg / png / gif / webp 静态图片".to_string()
            }
            Self::PayloadTooLarge { .. } => "图片文件过大（超过25MB）".to_string(),
            Self::Network { source, .. } if source.is_timeout() => {
                "搜索请求超时，请稍后再试".to_string()
            }
            Self::Network { source, .. } => format!("网络连接错误: {}", source),
            Self::QuotaExceeded { status: 429 } => "请求过于频繁，请稍后再试".to_string(),
            Self::QuotaExceeded { .. } => "触及 API 并发限制或配额用尽".to_string(),
            Self::NoMatch => "未找到匹配的动漫场景".to_string(),
            Self::InvalidImage => "无效的图片数据或处理失败".to_string(),
            Self::ServiceUnavailable { status: 503 } => "服务暂时不可用，请稍后再试".to_string(),
            Self::ServiceUnavailable { .. } => "服务器内部错误，请稍后再试".to_string(),
            Self::Api { status: 200, message } => format!("API 错误: {}", message),
            Self::Api { status, .. } => format!("搜索失败，HTTP状态码: {}", status),
            Self::Download { status: 404 } => "图片链接不存在或已失效".to_string(),
            Self::Download { status: 403 } => "无权限访问图片链接".to_string(),
            Self::Download { status } => format!("无法下载图片，HTTP状态码: {}", status),
            Self::Decode { .. } => "无法解析服务返回的数据".to_string(),
            Self::Cancelled => "搜索已取消".to_string(),
        }
    }
}

impl From<image::ImageError> for TraceMoeError {
    fn from(err: image::ImageError) -> Self {
        Self::UnsupportedFormat {
            reason: err.to_string(),
        }
    }
}
