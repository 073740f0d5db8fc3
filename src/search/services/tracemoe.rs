use crate::config::PluginConfig;
use crate::error::{Result, TraceMoeError};
use crate::search::{trait_def::SceneSearchService, utils, MAX_MATCHES};
use crate::types::{AnimeMatch, AnimeTitle, SearchRequest, SearchResult, UNKNOWN_TITLE};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// trace.moe 搜尋客戶端
pub struct TraceMoeClient {
    client: reqwest::Client,
    config: Arc<PluginConfig>,
}

impl TraceMoeClient {
    pub fn new(config: Arc<PluginConfig>) -> Result<Self> {
        let client = utils::build_http_client(&config)?;
        Ok(Self::with_client(client, config))
    }

    /// 共用既有的 HTTP 客戶端
    pub fn with_client(client: reqwest::Client, config: Arc<PluginConfig>) -> Self {
        Self { client, config }
    }

    fn check_size(&self, request: &SearchRequest) -> Result<()> {
        let size = request.image.len();
        if size > self.config.max_image_bytes {
            return Err(TraceMoeError::PayloadTooLarge {
                size,
                limit: self.config.max_image_bytes,
            });
        }
        Ok(())
    }

    async fn upload(&self, request: &SearchRequest) -> Result<SearchResult> {
        let part = Part::bytes(request.image.clone())
            .file_name("image")
            .mime_str(&request.content_type)
            .map_err(|e| TraceMoeError::network("building upload", e))?;
        let form = Form::new().part("image", part);

        let mut query = Vec::new();
        if self.config.anilist_info {
            query.push(("anilistInfo", ""));
        }
        if request.cut_borders {
            query.push(("cutBorders", ""));
        }

        let mut builder = self
            .client
            .post(self.config.search_url())
            .query(&query)
            .multipart(form);
        if let Some(key) = &self.config.api_key {
            builder = builder.header("x-trace-key", key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TraceMoeError::network("uploading image", e))?;

        let status = response.status();
        let quota_remaining = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse().ok());

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(self.status_error(status, request, message));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TraceMoeError::network("reading search response", e))?;
        let raw: RawSearchResponse =
            serde_json::from_slice(&body).map_err(|e| TraceMoeError::Decode {
                what: "trace.moe response",
                source: Box::new(e),
            })?;

        if let Some(message) = raw.error.filter(|e| !e.is_empty()) {
            return Err(TraceMoeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        debug!(
            "trace.moe returned {} results, quota remaining {:?}",
            raw.result.len(),
            quota_remaining
        );

        Ok(SearchResult {
            matches: raw
                .result
                .into_iter()
                .take(MAX_MATCHES)
                .map(AnimeMatch::from)
                .collect(),
            quota_remaining,
            frame_count: raw.frame_count,
            searched_at: chrono::Utc::now(),
        })
    }

    fn status_error(
        &self,
        status: StatusCode,
        request: &SearchRequest,
        message: String,
    ) -> TraceMoeError {
        match status.as_u16() {
            400 => TraceMoeError::InvalidImage,
            402 | 429 => TraceMoeError::QuotaExceeded {
                status: status.as_u16(),
            },
            413 => TraceMoeError::PayloadTooLarge {
                size: request.image.len(),
                limit: self.config.max_image_bytes,
            },
            code if code >= 500 => TraceMoeError::ServiceUnavailable { status: code },
            code => TraceMoeError::Api {
                status: code,
                message,
            },
        }
    }
}

#[async_trait::async_trait]
impl SceneSearchService for TraceMoeClient {
    fn name(&self) -> &str {
        "trace.moe"
    }

    async fn search(
        &self,
        request: &SearchRequest,
        cancel: &CancellationToken,
    ) -> Result<SearchResult> {
        // 超過上限就不浪費上傳
        self.check_size(request)?;

        info!(
            "searching trace.moe image={} size={} cut_borders={}",
            request.short_hash(),
            request.image.len(),
            request.cut_borders
        );
        utils::cancellable(cancel, self.upload(request)).await
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSearchResponse {
    #[serde(default)]
    frame_count: u64,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    result: Vec<RawMatch>,
}

#[derive(Debug, Deserialize)]
struct RawMatch {
    anilist: Option<RawAnilist>,
    filename: Option<String>,
    #[serde(default, deserialize_with = "deserialize_episode")]
    episode: Option<u32>,
    from: Option<f64>,
    to: Option<f64>,
    at: Option<f64>,
    similarity: Option<f64>,
    video: Option<String>,
    image: Option<String>,
}

/// 帶 `anilistInfo` 時是物件，否則只有 id
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawAnilist {
    Id(u64),
    Info(RawAnilistInfo),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAnilistInfo {
    id: u64,
    id_mal: Option<u64>,
    #[serde(default)]
    title: AnimeTitle,
    #[serde(default)]
    is_adult: bool,
}

impl From<RawMatch> for AnimeMatch {
    fn from(raw: RawMatch) -> Self {
        let (title, anilist_id, mal_id, is_adult) = match raw.anilist {
            Some(RawAnilist::Info(info)) => (
                info.title
                    .preferred()
                    .unwrap_or(UNKNOWN_TITLE)
                    .to_string(),
                Some(info.id),
                info.id_mal,
                info.is_adult,
            ),
            Some(RawAnilist::Id(id)) => (format!("AniList ID: {}", id), Some(id), None, false),
            None => (UNKNOWN_TITLE.to_string(), None, None, false),
        };

        Self {
            title,
            similarity: raw.similarity.unwrap_or(0.0),
            at: raw.at.unwrap_or(0.0),
            from: raw.from.unwrap_or(0.0),
            to: raw.to.unwrap_or(0.0),
            episode: raw.episode,
            filename: raw.filename,
            anilist_id,
            mal_id,
            is_adult,
            video: raw.video,
            image: raw.image,
        }
    }
}

/// 集數可能是數字、字串、陣列或 null，取第一個整數
fn deserialize_episode<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(episode_from_value))
}

fn episode_from_value(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| f as u64))
            .and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s
            .split(|c: char| !c.is_ascii_digit())
            .find(|part| !part.is_empty())
            .and_then(|part| part.parse().ok()),
        Value::Array(items) => items.iter().find_map(episode_from_value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const SEARCH_BODY: &str = r#"{
        "frameCount": 745506,
        "error": "",
        "result": [
            {
                "anilist": {"id": 99939, "idMal": 34658, "title": {"native": "ネコぱら", "romaji": "Nekopara", "english": null}, "isAdult": false},
                "filename": "Nekopara - OVA (BD 1280x720 x264 AAC).mp4",
                "episode": null,
                "from": 97.75, "to": 98.92, "at": 98.5,
                "similarity": 0.9440424588727485,
                "video": "https://media.trace.moe/video/99939/x.mp4",
                "image": "https://media.trace.moe/image/99939/x.jpg"
            },
            {"anilist": 12345, "filename": "b.mp4", "episode": "3", "from": 1, "to": 2, "at": 1.5, "similarity": 0.81},
            {"anilist": 23456, "filename": "c.mp4", "episode": [5, 6], "from": 1, "to": 2, "at": 1.5, "similarity": 0.8},
            {"anilist": 34567, "filename": "d.mp4", "episode": 7, "from": 1, "to": 2, "at": 1.5, "similarity": 0.79}
        ]
    }"#;

    fn client_for(server: &mockito::ServerGuard) -> TraceMoeClient {
        let config = PluginConfig::new().with_api_base(server.url()).with_timeout(5);
        TraceMoeClient::new(Arc::new(config)).unwrap()
    }

    fn jpeg_request() -> SearchRequest {
        SearchRequest::new(b"\xff\xd8\xff\xe0fake-jpeg".to_vec(), false)
    }

    #[tokio::test]
    async fn test_search_parses_and_truncates() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/search")
            .match_query(Matcher::UrlEncoded("anilistInfo".into(), "".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_header("x-ratelimit-remaining", "99")
            .with_body(SEARCH_BODY)
            .create_async()
            .await;

        let client = client_for(&server);
        let result = client
            .search(&jpeg_request(), &CancellationToken::new())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result.matches.len(), 3);
        assert_eq!(result.frame_count, 745506);
        assert_eq!(result.quota_remaining, Some(99));

        let best = result.best().unwrap();
        assert_eq!(best.title, "ネコぱら");
        assert_eq!(best.anilist_id, Some(99939));
        assert_eq!(best.mal_id, Some(34658));
        assert_eq!(best.episode, None);
        assert!((best.at - 98.5).abs() < f64::EPSILON);

        assert_eq!(result.matches[1].title, "AniList ID: 12345");
        assert_eq!(result.matches[1].episode, Some(3));
        assert_eq!(result.matches[2].episode, Some(5));

        let sims: Vec<f64> = result.matches.iter().map(|m| m.similarity).collect();
        assert!(sims.windows(2).all(|w| w[0] >= w[1]));
    }

    #[tokio::test]
    async fn test_cut_borders_flag_is_sent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/search")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("anilistInfo".into(), "".into()),
                Matcher::UrlEncoded("cutBorders".into(), "".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"frameCount": 1, "error": "", "result": []}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let request = SearchRequest::new(b"\xff\xd8\xff\xe0fake".to_vec(), true);
        let result = client
            .search(&request, &CancellationToken::new())
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_quota_statuses() {
        for status in [402usize, 429] {
            let mut server = mockito::Server::new_async().await;
            let _mock = server
                .mock("POST", "/search")
                .match_query(Matcher::Any)
                .with_status(status)
                .create_async()
                .await;

            let err = client_for(&server)
                .search(&jpeg_request(), &CancellationToken::new())
                .await
                .unwrap_err();
            assert!(matches!(err, TraceMoeError::QuotaExceeded { .. }), "{:?}", err);
        }
    }

    #[tokio::test]
    async fn test_other_statuses() {
        let cases: [(usize, fn(&TraceMoeError) -> bool); 4] = [
            (400, |e: &TraceMoeError| matches!(e, TraceMoeError::InvalidImage)),
            (413, |e: &TraceMoeError| matches!(e, TraceMoeError::PayloadTooLarge { .. })),
            (503, |e: &TraceMoeError| {
                matches!(e, TraceMoeError::ServiceUnavailable { status: 503 })
            }),
            (404, |e: &TraceMoeError| matches!(e, TraceMoeError::Api { status: 404, .. })),
        ];

        for (status, check) in cases {
            let mut server = mockito::Server::new_async().await;
            let _mock = server
                .mock("POST", "/search")
                .match_query(Matcher::Any)
                .with_status(status)
                .create_async()
                .await;

            let err = client_for(&server)
                .search(&jpeg_request(), &CancellationToken::new())
                .await
                .unwrap_err();
            assert!(check(&err), "status {} gave {:?}", status, err);
        }
    }

    #[tokio::test]
    async fn test_api_error_field() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/search")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"error": "Failed to process image", "result": []}"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .search(&jpeg_request(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.user_message().contains("Failed to process image"));
    }

    #[tokio::test]
    async fn test_null_error_field_is_success() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/search")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"frameCount": 5, "error": null, "result": [
                    {"anilist": 1, "filename": "a.mp4", "from": 1, "to": 2, "at": 1.5, "similarity": 0.93}
                ]}"#,
            )
            .create_async()
            .await;

        let result = client_for(&server)
            .search(&jpeg_request(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.matches.len(), 1);
        assert_eq!(result.frame_count, 5);
    }

    #[tokio::test]
    async fn test_oversized_image_never_hits_network() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/search")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let request = SearchRequest::new(vec![0u8; 30 * 1024 * 1024], false);
        let err = client_for(&server)
            .search(&request, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, TraceMoeError::PayloadTooLarge { .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_connection_failure_is_network_error() {
        let config = PluginConfig::new()
            .with_api_base("http://127.0.0.1:1")
            .with_timeout(5);
        let client = TraceMoeClient::new(Arc::new(config)).unwrap();

        let err = client
            .search(&jpeg_request(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TraceMoeError::Network { .. }));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[tokio::test]
    async fn test_cancelled_before_upload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/search")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = client_for(&server)
            .search(&jpeg_request(), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, TraceMoeError::Cancelled));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_cancel_during_upload() {
        // 只接受連線、永遠不回應
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stalled = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let config = PluginConfig::new()
            .with_api_base(format!("http://{}", addr))
            .with_timeout(30);
        let client = TraceMoeClient::new(Arc::new(config)).unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            client.search(&jpeg_request(), &cancel),
        )
        .await
        .expect("cancellation should end the upload")
        .unwrap_err();

        assert!(matches!(err, TraceMoeError::Cancelled));
        stalled.abort();
    }

    #[test]
    fn test_episode_shapes() {
        assert_eq!(episode_from_value(&serde_json::json!(12)), Some(12));
        assert_eq!(episode_from_value(&serde_json::json!("OVA 2")), Some(2));
        assert_eq!(episode_from_value(&serde_json::json!([])), None);
        assert_eq!(episode_from_value(&serde_json::json!("")), None);
        assert_eq!(episode_from_value(&Value::Null), None);
    }
}
