use std::time::Duration;

use jobtrail_core::error::AppError;
use jobtrail_core::traits::Fetcher;
use reqwest::{Client, StatusCode};

const USER_AGENT: &str = concat!("jobtrail/", env!("CARGO_PKG_VERSION"));

/// HTTP fetcher using reqwest.
///
/// Maps a vanished page (404/410) to [`AppError::NotFound`] so the crawler
/// can record the ad as closed instead of retrying it.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
    timeout_secs: u64,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, AppError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            timeout_secs: timeout.as_secs(),
        })
    }
}

impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(self.timeout_secs)
            } else if e.is_connect() {
                AppError::NetworkError(format!("Connection failed: {e}"))
            } else {
                AppError::HttpError(e.to_string())
            }
        })?;

        check_status(response.status(), url)?;

        response
            .text()
            .await
            .map_err(|e| AppError::NetworkError(format!("Failed to read response body: {e}")))
    }
}

fn check_status(status: StatusCode, url: &str) -> Result<(), AppError> {
    if status.is_success() {
        return Ok(());
    }
    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => Err(AppError::NotFound(url.to_string())),
        _ => Err(AppError::HttpError(format!(
            "HTTP {} for {}",
            status.as_u16(),
            url
        ))),
    }
}
