use crate::error::Result;
use crate::types::{AnimeMatch, AnimeMetadata, SearchRequest, SearchResult};
use tokio_util::sync::CancellationToken;

/// 場景搜尋服務 Trait
#[async_trait::async_trait]
pub trait SceneSearchService: Send + Sync {
    /// 服務名稱
    fn name(&self) -> &str;

    /// 搜尋單張圖片，只嘗試一次
    async fn search(
        &self,
        request: &SearchRequest,
        cancel: &CancellationToken,
    ) -> Result<SearchResult>;
}

/// 補充資料來源 Trait
///
/// 查詢失敗只會回傳 `None`，不會中斷回覆。
#[async_trait::async_trait]
pub trait MetadataEnricher: Send + Sync {
    fn name(&self) -> &str;

    async fn enrich(
        &self,
        anime: &AnimeMatch,
        cancel: &CancellationToken,
    ) -> Option<AnimeMetadata>;
}
