//! Network seam used by the offline worker.

use async_trait::async_trait;

use super::{CachedResponse, OfflineRequest};
use crate::config::ClientConfig;
use crate::error::Result;

/// Performs a request against the real network.
///
/// An `Err` means no response at all (offline, DNS, timeout). HTTP error
/// statuses are still `Ok` responses.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &OfflineRequest) -> Result<CachedResponse>;
}

/// `reqwest`-backed [`Network`].
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    client: reqwest::Client,
}

impl HttpNetwork {
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &OfflineRequest) -> Result<CachedResponse> {
        let mut builder = self.client.request(request.method.clone(), &request.url);
        if let Some(accept) = &request.accept {
            builder = builder.header(reqwest::header::ACCEPT, accept);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string);
        let body = response.bytes().await?;

        Ok(CachedResponse {
            status,
            content_type,
            body: body.to_vec(),
        })
    }
}
