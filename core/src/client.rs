//! One-shot stream adapter over a `CatService`.

use std::sync::Arc;

use crate::oneshot::OneShot;
use crate::service::CatService;
use crate::types::{CatRecord, ImagePayload, TagList};

/// Hands out a lazy `OneShot` per remote operation, so callers get the same
/// subscribe/cancel/error contract whichever endpoint they use.
#[derive(Clone)]
pub struct CatClient {
    service: Arc<dyn CatService>,
}

impl CatClient {
    pub fn new(service: Arc<dyn CatService>) -> Self {
        Self { service }
    }

    pub fn random_image(&self) -> OneShot<ImagePayload> {
        let service = Arc::clone(&self.service);
        OneShot::new(move || async move { service.fetch_random_image().await })
    }

    pub fn image_by_tag(&self, tag: impl Into<String>) -> OneShot<ImagePayload> {
        let service = Arc::clone(&self.service);
        let tag = tag.into();
        OneShot::new(move || async move { service.fetch_image_by_tag(&tag).await })
    }

    pub fn tags(&self) -> OneShot<TagList> {
        let service = Arc::clone(&self.service);
        OneShot::new(move || async move { service.fetch_tags().await })
    }

    pub fn record_by_id(&self, id: impl Into<String>) -> OneShot<CatRecord> {
        let service = Arc::clone(&self.service);
        let id = id.into();
        OneShot::new(move || async move { service.fetch_record_by_id(&id).await })
    }

    pub fn record_batch(&self, limit: u32) -> OneShot<Vec<CatRecord>> {
        let service = Arc::clone(&self.service);
        OneShot::new(move || async move { service.fetch_record_batch(limit).await })
    }
}

impl std::fmt::Debug for CatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatClient").finish_non_exhaustive()
    }
}
