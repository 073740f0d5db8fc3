use crate::config::PluginConfig;
use crate::error::{Result, TraceMoeError};
use crate::search::{trait_def::MetadataEnricher, utils};
use crate::types::{AnimeMatch, AnimeMetadata, AnimeTitle, UNKNOWN_TITLE};
use reqwest::StatusCode;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const QUERY_BY_ID: &str = r#"
query ($id: Int) {
  Media(id: $id, type: ANIME) {
    id idMal title { romaji english native } siteUrl format episodes seasonYear
  }
}"#;

const QUERY_BY_TITLE: &str = r#"
query ($search: String) {
  Media(search: $search, type: ANIME) {
    id idMal title { romaji english native } siteUrl format episodes seasonYear
  }
}"#;

/// AniList 補充資料查詢
pub struct AniListEnricher {
    client: reqwest::Client,
    endpoint: String,
}

impl AniListEnricher {
    pub fn new(config: &PluginConfig) -> Result<Self> {
        let client = utils::build_http_client(config)?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: reqwest::Client, config: &PluginConfig) -> Self {
        Self {
            client,
            endpoint: config.anilist_endpoint.clone(),
        }
    }

    /// 有 id 用 id 查，沒有就用標題搜尋
    async fn lookup(&self, anime: &AnimeMatch) -> Result<Option<AnimeMetadata>> {
        let body = match anime.anilist_id {
            Some(id) => serde_json::json!({
                "query": QUERY_BY_ID,
                "variables": { "id": id },
            }),
            None if !anime.title.trim().is_empty() && anime.title != UNKNOWN_TITLE => {
                serde_json::json!({
                    "query": QUERY_BY_TITLE,
                    "variables": { "search": anime.title },
                })
            }
            None => return Ok(None),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| TraceMoeError::network("querying AniList", e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(TraceMoeError::Api {
                status: status.as_u16(),
                message: "AniList request failed".to_string(),
            });
        }

        let payload: GraphQlResponse =
            response.json().await.map_err(|e| TraceMoeError::Decode {
                what: "AniList response",
                source: Box::new(e),
            })?;

        if let Some(error) = payload.errors.first() {
            warn!("AniList reported: {}", error.message);
        }

        Ok(payload
            .data
            .and_then(|data| data.media)
            .map(AnimeMetadata::from))
    }
}

#[async_trait::async_trait]
impl MetadataEnricher for AniListEnricher {
    fn name(&self) -> &str {
        "anilist"
    }

    async fn enrich(
        &self,
        anime: &AnimeMatch,
        cancel: &CancellationToken,
    ) -> Option<AnimeMetadata> {
        match utils::cancellable(cancel, self.lookup(anime)).await {
            Ok(Some(metadata)) => Some(metadata),
            Ok(None) => {
                debug!("no AniList record for {}", anime.title);
                None
            }
            Err(e) => {
                warn!("AniList enrichment failed for {}: {}", anime.title, e);
                None
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<MediaData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct MediaData {
    #[serde(rename = "Media")]
    media: Option<RawMedia>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMedia {
    id: u64,
    id_mal: Option<u64>,
    #[serde(default)]
    title: AnimeTitle,
    site_url: Option<String>,
    format: Option<String>,
    episodes: Option<u32>,
    season_year: Option<i32>,
}

impl From<RawMedia> for AnimeMetadata {
    fn from(raw: RawMedia) -> Self {
        Self {
            anilist_id: raw.id,
            mal_id: raw.id_mal,
            title: raw.title,
            site_url: raw.site_url,
            format: raw.format,
            episodes: raw.episodes,
            season_year: raw.season_year,
        }
    }
}
