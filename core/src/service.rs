//! The remote cat service seam and its reqwest-backed implementation.
//!
//! # Design
//! `CatService` is the contract the rest of the crate programs against, so
//! the controller can be driven by a test double. `HttpCatService` pairs a
//! `CatRequests` (pure build/parse) with a `reqwest::Client` that the caller
//! constructs once and hands in.

use async_trait::async_trait;
use tracing::debug;

use crate::config::CatConfig;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::requests::CatRequests;
use crate::types::{CatRecord, ImagePayload, TagList};

const USER_AGENT: &str = concat!("cat-core/", env!("CARGO_PKG_VERSION"));

/// Remote operations offered by the cat API.
#[async_trait]
pub trait CatService: Send + Sync {
    async fn fetch_random_image(&self) -> Result<ImagePayload, ApiError>;

    async fn fetch_image_by_tag(&self, tag: &str) -> Result<ImagePayload, ApiError>;

    async fn fetch_tags(&self) -> Result<TagList, ApiError>;

    async fn fetch_record_by_id(&self, id: &str) -> Result<CatRecord, ApiError>;

    async fn fetch_record_batch(&self, limit: u32) -> Result<Vec<CatRecord>, ApiError>;
}

/// `CatService` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpCatService {
    http: reqwest::Client,
    requests: CatRequests,
}

impl HttpCatService {
    pub fn new(http: reqwest::Client, requests: CatRequests) -> Self {
        Self { http, requests }
    }

    /// Build the HTTP client and request builder described by `config`.
    pub fn from_config(config: &CatConfig) -> Result<Self, ApiError> {
        let requests = CatRequests::new(&config.base_url)?;
        let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self::new(http, requests))
    }

    pub fn requests(&self) -> &CatRequests {
        &self.requests
    }

    /// Execute `request` and return the response as data.
    ///
    /// Non-2xx statuses are returned, not raised; `CatRequests::parse_*`
    /// interprets them.
    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        debug!(method = request.method.as_str(), url = %request.url, "sending request");
        let mut builder = match request.method {
            HttpMethod::Get => self.http.get(&request.url),
        };
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?;
        debug!(status, len = body.len(), url = %request.url, "received response");

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl CatService for HttpCatService {
    async fn fetch_random_image(&self) -> Result<ImagePayload, ApiError> {
        let response = self.execute(self.requests.build_random_image()).await?;
        self.requests.parse_image(response)
    }

    async fn fetch_image_by_tag(&self, tag: &str) -> Result<ImagePayload, ApiError> {
        let response = self.execute(self.requests.build_image_by_tag(tag)).await?;
        self.requests.parse_image(response)
    }

    async fn fetch_tags(&self) -> Result<TagList, ApiError> {
        let response = self.execute(self.requests.build_tags()).await?;
        self.requests.parse_tags(response)
    }

    async fn fetch_record_by_id(&self, id: &str) -> Result<CatRecord, ApiError> {
        let response = self.execute(self.requests.build_record_by_id(id)).await?;
        self.requests.parse_record(response)
    }

    async fn fetch_record_batch(&self, limit: u32) -> Result<Vec<CatRecord>, ApiError> {
        let response = self.execute(self.requests.build_record_batch(limit)).await?;
        self.requests.parse_record_batch(response)
    }
}
