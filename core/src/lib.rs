//! Client core for the cataas.com cat API.
//!
//! # Overview
//! Fetches random cat images, images by tag, and the tag list, and publishes
//! them as observable state for a presentation layer.
//!
//! # Design
//! - `CatRequests` builds `HttpRequest` values and parses `HttpResponse`
//!   values without I/O; `HttpCatService` executes them with reqwest.
//! - `CatService` is the seam between the remote API and everything above
//!   it, so tests can substitute a fake.
//! - `CatClient` turns each service call into a lazy `OneShot` stream.
//! - `CatController` runs commands in background tasks and serializes state
//!   writes through one state task; observers subscribe to `watch` channels.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod http;
pub mod oneshot;
pub mod requests;
pub mod service;
pub mod state;
pub mod types;

pub use client::CatClient;
pub use config::CatConfig;
pub use controller::CatController;
pub use error::ApiError;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use oneshot::OneShot;
pub use requests::CatRequests;
pub use service::{CatService, HttpCatService};
pub use state::{AppState, ErrorKind, ErrorStatus, NOT_FOUND_NOTICE};
pub use types::{CatRecord, ImageInfo, ImagePayload, TagList};
