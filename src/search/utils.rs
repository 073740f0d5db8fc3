use crate::config::PluginConfig;
use crate::error::{Result, TraceMoeError};
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// 建立共用的 HTTP 客戶端（連線池可跨呼叫共用）
pub fn build_http_client(config: &PluginConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.timeout())
        .user_agent(config.user_agent.as_str())
        .build()
        .map_err(|e| TraceMoeError::network("building HTTP client", e))
}

/// 取消時直接丟棄進行中的請求
pub async fn cancellable<T>(
    cancel: &CancellationToken,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TraceMoeError::Cancelled),
        result = future => result,
    }
}
