//! Stateless HTTP request builder and response parser for the cat API.
//!
//! # Design
//! `CatRequests` holds only the base URL and carries no mutable state
//! between calls. Each endpoint is split into a `build_*` method that
//! produces an `HttpRequest` and a `parse_*` method that consumes an
//! `HttpResponse`. Whoever executes the round-trip sits in between, which
//! keeps this half deterministic and free of I/O.

use url::Url;

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::types::{CatRecord, ImagePayload, TagList};

/// Request builder and response parser for the five cat endpoints.
#[derive(Debug, Clone)]
pub struct CatRequests {
    base_url: Url,
}

impl CatRequests {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| ApiError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self { base_url })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    pub fn build_random_image(&self) -> HttpRequest {
        self.get(&["cat"], None)
    }

    pub fn build_image_by_tag(&self, tag: &str) -> HttpRequest {
        self.get(&["cat", tag], None)
    }

    pub fn build_tags(&self) -> HttpRequest {
        self.get(&["api", "tags"], None)
    }

    /// `/cat/{id}` serves the image itself; `json=true` asks for the record.
    pub fn build_record_by_id(&self, id: &str) -> HttpRequest {
        self.get(&["cat", id], Some(("json", "true")))
    }

    pub fn build_record_batch(&self, limit: u32) -> HttpRequest {
        self.get(&["api", "cats"], Some(("limit", &limit.to_string())))
    }

    pub fn parse_image(&self, response: HttpResponse) -> Result<ImagePayload, ApiError> {
        check_status(&response)?;
        Ok(ImagePayload {
            content_type: response.header("content-type").map(str::to_string),
            bytes: response.body,
        })
    }

    pub fn parse_tags(&self, response: HttpResponse) -> Result<TagList, ApiError> {
        check_status(&response)?;
        serde_json::from_slice(&response.body).map_err(|e| ApiError::Deserialization(e.to_string()))
    }

    pub fn parse_record(&self, response: HttpResponse) -> Result<CatRecord, ApiError> {
        check_status(&response)?;
        serde_json::from_slice(&response.body).map_err(|e| ApiError::Deserialization(e.to_string()))
    }

    pub fn parse_record_batch(&self, response: HttpResponse) -> Result<Vec<CatRecord>, ApiError> {
        check_status(&response)?;
        serde_json::from_slice(&response.body).map_err(|e| ApiError::Deserialization(e.to_string()))
    }

    fn get(&self, segments: &[&str], query: Option<(&str, &str)>) -> HttpRequest {
        let mut url = self.base_url.clone();
        // `new` rejects cannot-be-a-base URLs, so this always succeeds.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        if let Some((key, value)) = query {
            url.query_pairs_mut().append_pair(key, value);
        }
        HttpRequest {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
        }
    }
}

/// Map non-success status codes to the appropriate `ApiError` variant.
fn check_status(response: &HttpResponse) -> Result<(), ApiError> {
    match response.status {
        200..=299 => Ok(()),
        404 => Err(ApiError::NotFound {
            status: 404,
            body: response.body_text(),
        }),
        status => Err(ApiError::Http {
            status,
            body: response.body_text(),
        }),
    }
}
