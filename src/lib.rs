//! trace.moe 動畫截圖搜尋外掛核心
//!
//! 宿主把指令文字與附件交給 [`TraceMoePlugin::handle`]，拿回一段可直接送出的回覆。

pub mod config;
pub mod error;
pub mod fetcher;
pub mod formatter;
pub mod handler;
pub mod preprocess;
pub mod search;
pub mod types;

// 重新導出常用項目
pub use config::PluginConfig;
pub use error::{Result, TraceMoeError};
pub use handler::{Attachment, Command, TraceMoePlugin};
pub use types::{AnimeMatch, AnimeMetadata, SearchRequest, SearchResult};
