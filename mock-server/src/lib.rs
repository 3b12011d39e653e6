use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use image::{ImageFormat, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::debug;
use uuid::Uuid;

pub const NOT_FOUND_BODY: &str = "Cat not found";
const DEFAULT_BATCH_LIMIT: usize = 10;
const BASE_IMAGE_WIDTH: u32 = 8;
const IMAGE_HEIGHT: u32 = 8;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cat {
    #[serde(rename = "_id")]
    pub id: String,
    pub tags: Vec<String>,
    pub owner: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
}

/// Cats and their images. The image for the n-th cat added is a PNG
/// `8 + n` pixels wide, so tests can tell which cat they received.
#[derive(Debug, Default)]
pub struct Gallery {
    cats: Vec<(Cat, Bytes)>,
    next: AtomicUsize,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Three cats tagged `cute`/`orange`, `sleepy`, and `cute`/`box`.
    pub fn seeded() -> Self {
        Self::new()
            .with_cat(&["cute", "orange"])
            .with_cat(&["sleepy"])
            .with_cat(&["cute", "box"])
    }

    pub fn with_cat(self, tags: &[&str]) -> Self {
        let id = Uuid::new_v4().simple().to_string();
        self.with_named_cat(&id, tags)
    }

    pub fn with_named_cat(mut self, id: &str, tags: &[&str]) -> Self {
        let cat = Cat {
            id: id.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            owner: "null".to_string(),
            created_at: "2022-01-01T00:00:00.000Z".to_string(),
            updated_at: "2022-01-01T00:00:00.000Z".to_string(),
        };
        let image = render_png(BASE_IMAGE_WIDTH + self.cats.len() as u32);
        self.cats.push((cat, image));
        self
    }

    /// Distinct tags in sorted order.
    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self
            .cats
            .iter()
            .flat_map(|(cat, _)| cat.tags.iter().cloned())
            .collect();
        tags.sort();
        tags.dedup();
        tags
    }

    /// Match an id first, then the first cat carrying `key` as a tag.
    fn find(&self, key: &str) -> Option<&(Cat, Bytes)> {
        self.cats
            .iter()
            .find(|(cat, _)| cat.id == key)
            .or_else(|| self.cats.iter().find(|(cat, _)| cat.tags.iter().any(|t| t == key)))
    }

    /// Rotates through the cats in insertion order.
    fn next_random(&self) -> Option<&(Cat, Bytes)> {
        if self.cats.is_empty() {
            return None;
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.cats.len();
        self.cats.get(index)
    }
}

pub type SharedGallery = Arc<Gallery>;

fn render_png(width: u32) -> Bytes {
    let img = RgbImage::from_fn(width, IMAGE_HEIGHT, |x, y| {
        Rgb([(x * 31) as u8, (y * 31) as u8, (width * 17) as u8])
    });
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .expect("encoding a PNG into memory cannot fail");
    Bytes::from(out.into_inner())
}

pub fn app() -> Router {
    app_with(Gallery::seeded())
}

pub fn app_with(gallery: Gallery) -> Router {
    let gallery: SharedGallery = Arc::new(gallery);
    Router::new()
        .route("/cat", get(random_cat))
        .route("/cat/{key}", get(cat_by_key))
        .route("/api/tags", get(list_tags))
        .route("/api/cats", get(list_cats))
        .with_state(gallery)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with(listener: TcpListener, gallery: Gallery) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with(gallery)).await
}

#[derive(Debug, Default, Deserialize)]
pub struct CatQuery {
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct BatchQuery {
    pub limit: Option<usize>,
}

fn image_response(image: &Bytes) -> Response {
    ([(header::CONTENT_TYPE, "image/png")], image.clone()).into_response()
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, NOT_FOUND_BODY).into_response()
}

async fn random_cat(State(gallery): State<SharedGallery>) -> Response {
    match gallery.next_random() {
        Some((cat, image)) => {
            debug!(id = %cat.id, "serving random cat");
            image_response(image)
        }
        None => not_found(),
    }
}

async fn cat_by_key(
    State(gallery): State<SharedGallery>,
    Path(key): Path<String>,
    Query(query): Query<CatQuery>,
) -> Response {
    match gallery.find(&key) {
        Some((cat, _)) if query.json => Json(cat.clone()).into_response(),
        Some((_, image)) => image_response(image),
        None => not_found(),
    }
}

async fn list_tags(State(gallery): State<SharedGallery>) -> Json<Vec<String>> {
    Json(gallery.tags())
}

async fn list_cats(
    State(gallery): State<SharedGallery>,
    Query(query): Query<BatchQuery>,
) -> Json<Vec<Cat>> {
    let limit = query.limit.unwrap_or(DEFAULT_BATCH_LIMIT);
    Json(gallery.cats.iter().take(limit).map(|(cat, _)| cat.clone()).collect())
}
