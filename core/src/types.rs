//! Domain DTOs for the cat API.
//!
//! # Design
//! `CatRecord` mirrors the JSON the API returns for a cat but is defined
//! independently from the mock-server crate; integration tests catch any
//! schema drift between the two. Every field has a default so sparse
//! records from the live service still deserialize.

use std::io::Cursor;

use bytes::Bytes;
use image::{ImageFormat, ImageReader};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// A cat as described by the JSON endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatRecord {
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub owner: String,
    #[serde(rename = "createdAt", default)]
    pub created_at: String,
    #[serde(rename = "updatedAt", default)]
    pub updated_at: String,
}

/// Tags in the order the server returned them.
pub type TagList = Vec<String>;

/// Encoded image bytes as downloaded. Decoding into pixels is left to the
/// presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

/// Header-level facts about an image payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

impl ImagePayload {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: None,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Read the format and dimensions from the image header.
    ///
    /// Only the header is parsed, so this is cheap enough to run on every
    /// download before the payload is published.
    pub fn probe(&self) -> Result<ImageInfo, ApiError> {
        let reader = ImageReader::new(Cursor::new(self.bytes.as_ref()))
            .with_guessed_format()
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        let format = reader
            .format()
            .ok_or_else(|| ApiError::Decode("unrecognized image format".to_string()))?;
        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(ImageInfo {
            format,
            width,
            height,
        })
    }
}
