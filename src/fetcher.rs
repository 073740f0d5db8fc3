use crate::error::{Result, TraceMoeError};
use crate::search::utils;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// 圖片來源 trait - 宿主通常只給附件 URL
#[async_trait::async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch_image(&self, url: &str, cancel: &CancellationToken) -> Result<Vec<u8>>;
}

/// HTTP 實作（不重試）
pub struct HttpFetcher {
    client: Client,
    max_bytes: usize,
}

impl HttpFetcher {
    /// 建立新的 HTTP Fetcher
    pub fn new(client: Client, max_bytes: usize) -> Self {
        Self { client, max_bytes }
    }

    /// 邊下載邊檢查大小，超過上限立即停止
    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TraceMoeError::network("downloading image", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TraceMoeError::Download {
                status: status.as_u16(),
            });
        }

        if let Some(len) = response.content_length() {
            if len as usize > self.max_bytes {
                return Err(self.too_large(len as usize));
            }
        }

        let mut data = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| TraceMoeError::network("downloading image", e))?
        {
            if data.len() + chunk.len() > self.max_bytes {
                return Err(self.too_large(data.len() + chunk.len()));
            }
            data.extend_from_slice(&chunk);
        }

        debug!("downloaded {} bytes from {}", data.len(), url);
        Ok(data)
    }

    fn too_large(&self, size: usize) -> TraceMoeError {
        TraceMoeError::PayloadTooLarge {
            size,
            limit: self.max_bytes,
        }
    }
}

#[async_trait::async_trait]
impl ImageSource for HttpFetcher {
    async fn fetch_image(&self, url: &str, cancel: &CancellationToken) -> Result<Vec<u8>> {
        utils::cancellable(cancel, self.download(url)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher(max_bytes: usize) -> HttpFetcher {
        HttpFetcher::new(Client::new(), max_bytes)
    }

    #[tokio::test]
    async fn test_fetch() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/a.jpg")
            .with_status(200)
            .with_body(b"\xff\xd8\xff\xe0jpeg")
            .create_async()
            .await;

        let url = format!("{}/a.jpg", server.url());
        let data = fetcher(1024)
            .fetch_image(&url, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(data, b"\xff\xd8\xff\xe0jpeg");
    }

    #[tokio::test]
    async fn test_fetch_status_errors() {
        for status in [403usize, 404, 500] {
            let mut server = mockito::Server::new_async().await;
            let _mock = server
                .mock("GET", "/gone.png")
                .with_status(status)
                .create_async()
                .await;

            let url = format!("{}/gone.png", server.url());
            let err = fetcher(1024)
                .fetch_image(&url, &CancellationToken::new())
                .await
                .unwrap_err();
            assert!(
                matches!(err, TraceMoeError::Download { status: s } if s as usize == status),
                "{:?}",
                err
            );
        }
    }

    #[tokio::test]
    async fn test_fetch_rejects_oversized() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/big.png")
            .with_status(200)
            .with_body(vec![7u8; 64])
            .create_async()
            .await;

        let url = format!("{}/big.png", server.url());
        let err = fetcher(16)
            .fetch_image(&url, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TraceMoeError::PayloadTooLarge { limit: 16, .. }));
    }
}
