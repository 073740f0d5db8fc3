// 宣告子模組
pub mod trait_def;
pub mod utils;
pub mod services;

// 重新導出常用項目
pub use trait_def::{MetadataEnricher, SceneSearchService};
pub use services::anilist::AniListEnricher;
pub use services::tracemoe::TraceMoeClient;

/// 回覆中最多顯示的結果數
pub const MAX_MATCHES: usize = 3;
