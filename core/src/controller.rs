//! Application state controller.
//!
//! # Design
//! Every command spawns its own task on the runtime handle the controller
//! was built with; the task drives a `OneShot` from `CatClient` and turns the
//! outcome into a `StateUpdate`. Updates travel over an unbounded channel to
//! a single state task, the only writer of the `watch` channels observers
//! subscribe to. Writes are therefore serialized, but requests are not
//! paired with responses: whichever request completes last wins.
//!
//! All tasks live in a `JoinSet` owned by the controller. Dropping the
//! controller aborts them, which cancels in-flight requests and closes the
//! observers' channels.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, debug_span, error, Instrument};

use crate::client::CatClient;
use crate::config::{CatConfig, DEFAULT_RECORD_BATCH_LIMIT};
use crate::error::ApiError;
use crate::oneshot::OneShot;
use crate::service::HttpCatService;
use crate::state::{AppState, ErrorStatus};
use crate::types::{CatRecord, ImagePayload, TagList};

enum StateUpdate {
    Image(ImagePayload),
    Tags(TagList),
    Failed(ErrorStatus),
}

impl StateUpdate {
    fn field(&self) -> &'static str {
        match self {
            StateUpdate::Image(_) => "image",
            StateUpdate::Tags(_) => "tags",
            StateUpdate::Failed(_) => "last_error",
        }
    }
}

/// Sending halves of the observable fields, owned by the state task.
struct StateWriters {
    image: watch::Sender<Option<ImagePayload>>,
    tags: watch::Sender<Option<TagList>>,
    last_error: watch::Sender<Option<ErrorStatus>>,
    revision: watch::Sender<u64>,
}

impl StateWriters {
    fn apply(&self, update: StateUpdate) {
        match update {
            StateUpdate::Image(payload) => {
                self.image.send_replace(Some(payload));
            }
            StateUpdate::Tags(tags) => {
                self.tags.send_replace(Some(tags));
            }
            StateUpdate::Failed(status) => {
                self.last_error.send_replace(Some(status));
            }
        }
    }

    fn bump_revision(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}

async fn run_state_task(
    mut updates: mpsc::UnboundedReceiver<StateUpdate>,
    writers: StateWriters,
    pending: Arc<AtomicUsize>,
) {
    while let Some(update) = updates.recv().await {
        debug!(field = update.field(), "applying state update");
        writers.apply(update);
        // Revision observers must see the pending count already settled.
        pending.fetch_sub(1, Ordering::SeqCst);
        writers.bump_revision();
    }
}

/// Owns the observable cat state and the commands that refresh it.
pub struct CatController {
    client: CatClient,
    runtime: Handle,
    updates: mpsc::UnboundedSender<StateUpdate>,
    image: watch::Receiver<Option<ImagePayload>>,
    tags: watch::Receiver<Option<TagList>>,
    last_error: watch::Receiver<Option<ErrorStatus>>,
    revision: watch::Receiver<u64>,
    pending: Arc<AtomicUsize>,
    record_batch_limit: u32,
    tasks: Mutex<JoinSet<()>>,
}

impl CatController {
    /// Create the controller and immediately request one random image.
    pub fn new(client: CatClient, runtime: Handle) -> Self {
        let (image_tx, image) = watch::channel(None);
        let (tags_tx, tags) = watch::channel(None);
        let (error_tx, last_error) = watch::channel(None);
        let (revision_tx, revision) = watch::channel(0);
        let (updates, updates_rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));

        let writers = StateWriters {
            image: image_tx,
            tags: tags_tx,
            last_error: error_tx,
            revision: revision_tx,
        };
        let mut tasks = JoinSet::new();
        tasks.spawn_on(
            run_state_task(updates_rx, writers, Arc::clone(&pending)),
            &runtime,
        );

        let controller = Self {
            client,
            runtime,
            updates,
            image,
            tags,
            last_error,
            revision,
            pending,
            record_batch_limit: DEFAULT_RECORD_BATCH_LIMIT,
            tasks: Mutex::new(tasks),
        };
        controller.request_random_image();
        controller
    }

    /// Build an `HttpCatService` from `config` and wrap it in a controller.
    pub fn from_config(config: &CatConfig, runtime: Handle) -> Result<Self, ApiError> {
        let service = HttpCatService::from_config(config)?;
        let client = CatClient::new(Arc::new(service));
        let mut controller = Self::new(client, runtime);
        controller.record_batch_limit = config.record_batch_limit;
        Ok(controller)
    }

    pub fn request_random_image(&self) {
        let stream = self.client.random_image();
        self.spawn("random_image", async move {
            image_update("random_image", stream.single().await)
        });
    }

    pub fn request_tags(&self) {
        let stream = self.client.tags();
        self.spawn("tags", async move {
            match stream.single().await {
                Ok(tags) => {
                    debug!(count = tags.len(), "tags fetched");
                    StateUpdate::Tags(tags)
                }
                Err(e) => failed("tags", &e),
            }
        });
    }

    /// A tag with no matching cat surfaces as a `NotFound` error; the
    /// current image is kept.
    pub fn request_image_by_tag(&self, tag: &str) {
        let stream = self.client.image_by_tag(tag);
        self.spawn("image_by_tag", async move {
            image_update("image_by_tag", stream.single().await)
        });
    }

    /// Look up one cat record. Records are not part of the observable state.
    pub fn fetch_record_by_id(&self, id: &str) -> OneShot<CatRecord> {
        self.client.record_by_id(id)
    }

    /// Fetch `record_batch_limit` cat records. Not part of the observable state.
    pub fn fetch_record_batch(&self) -> OneShot<Vec<CatRecord>> {
        self.client.record_batch(self.record_batch_limit)
    }

    pub fn subscribe_image(&self) -> watch::Receiver<Option<ImagePayload>> {
        self.image.clone()
    }

    pub fn subscribe_tags(&self) -> watch::Receiver<Option<TagList>> {
        self.tags.clone()
    }

    pub fn subscribe_error(&self) -> watch::Receiver<Option<ErrorStatus>> {
        self.last_error.clone()
    }

    pub fn subscribe_revision(&self) -> watch::Receiver<u64> {
        self.revision.clone()
    }

    pub fn snapshot(&self) -> AppState {
        AppState {
            image: self.image.borrow().clone(),
            tags: self.tags.borrow().clone(),
            last_error: self.last_error.borrow().clone(),
            revision: *self.revision.borrow(),
        }
    }

    /// Commands issued whose result has not been applied yet.
    pub fn pending_requests(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    fn spawn<F>(&self, command: &'static str, work: F)
    where
        F: Future<Output = StateUpdate> + Send + 'static,
    {
        let updates = self.updates.clone();
        let pending = Arc::clone(&self.pending);
        pending.fetch_add(1, Ordering::SeqCst);

        let task = async move {
            // Fails only when the state task is gone, i.e. during teardown.
            if updates.send(work.await).is_err() {
                pending.fetch_sub(1, Ordering::SeqCst);
            }
        };

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while tasks.try_join_next().is_some() {}
        tasks.spawn_on(task.instrument(debug_span!("cat_command", command)), &self.runtime);
    }
}

impl Drop for CatController {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut().unwrap_or_else(PoisonError::into_inner);
        debug!(
            pending = self.pending.load(Ordering::SeqCst),
            tasks = tasks.len(),
            "controller dropped; aborting tasks"
        );
        tasks.abort_all();
    }
}

impl std::fmt::Debug for CatController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatController")
            .field("revision", &*self.revision.borrow())
            .field("pending", &self.pending_requests())
            .finish_non_exhaustive()
    }
}

fn image_update(command: &'static str, result: Result<ImagePayload, ApiError>) -> StateUpdate {
    let probed = result.and_then(|payload| {
        let info = payload.probe()?;
        debug!(
            format = ?info.format,
            width = info.width,
            height = info.height,
            bytes = payload.len(),
            "image fetched"
        );
        Ok(payload)
    });
    match probed {
        Ok(payload) => StateUpdate::Image(payload),
        Err(e) => failed(command, &e),
    }
}

fn failed(command: &'static str, err: &ApiError) -> StateUpdate {
    error!(command, error = %err, "cat request failed");
    StateUpdate::Failed(ErrorStatus::from(err))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::service::CatService;
    use crate::state::ErrorKind;

    fn png(width: u32, height: u32) -> ImagePayload {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([90, 90, 90]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        ImagePayload::new(out.into_inner())
    }

    fn not_found() -> ApiError {
        ApiError::NotFound {
            status: 404,
            body: "Cat not found".to_string(),
        }
    }

    /// Canned answers keyed by "random" or tag name, with optional gates
    /// that hold a request until the test releases it.
    #[derive(Default)]
    struct FakeService {
        calls: Mutex<Vec<String>>,
        images: Mutex<HashMap<String, Result<ImagePayload, ApiError>>>,
        tags: Mutex<Option<Result<TagList, ApiError>>>,
        gates: Mutex<HashMap<String, Arc<Notify>>>,
    }

    impl FakeService {
        fn set_image(&self, key: &str, result: Result<ImagePayload, ApiError>) {
            self.images.lock().unwrap().insert(key.to_string(), result);
        }

        fn set_tags(&self, result: Result<TagList, ApiError>) {
            *self.tags.lock().unwrap() = Some(result);
        }

        fn gate(&self, key: &str) -> Arc<Notify> {
            let gate = Arc::new(Notify::new());
            self.gates
                .lock()
                .unwrap()
                .insert(key.to_string(), Arc::clone(&gate));
            gate
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        async fn enter(&self, call: String, key: &str) {
            self.calls.lock().unwrap().push(call);
            let gate = self.gates.lock().unwrap().get(key).cloned();
            if let Some(gate) = gate {
                gate.notified().await;
            }
        }
    }

    #[async_trait]
    impl CatService for FakeService {
        async fn fetch_random_image(&self) -> Result<ImagePayload, ApiError> {
            self.enter("random".to_string(), "random").await;
            self.images
                .lock()
                .unwrap()
                .get("random")
                .cloned()
                .unwrap_or_else(|| Ok(png(1, 1)))
        }

        async fn fetch_image_by_tag(&self, tag: &str) -> Result<ImagePayload, ApiError> {
            self.enter(format!("tag:{tag}"), tag).await;
            self.images
                .lock()
                .unwrap()
                .get(tag)
                .cloned()
                .unwrap_or_else(|| Err(not_found()))
        }

        async fn fetch_tags(&self) -> Result<TagList, ApiError> {
            self.enter("tags".to_string(), "tags").await;
            self.tags.lock().unwrap().clone().unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn fetch_record_by_id(&self, id: &str) -> Result<CatRecord, ApiError> {
            self.enter(format!("record:{id}"), id).await;
            Ok(CatRecord {
                id: id.to_string(),
                ..CatRecord::default()
            })
        }

        async fn fetch_record_batch(&self, limit: u32) -> Result<Vec<CatRecord>, ApiError> {
            self.enter(format!("batch:{limit}"), "batch").await;
            Ok(vec![CatRecord::default(); limit as usize])
        }
    }

    fn controller(service: &Arc<FakeService>) -> CatController {
        CatController::new(CatClient::new(service.clone()), Handle::current())
    }

    async fn wait_for_revision(controller: &CatController, revision: u64) {
        let mut rx = controller.subscribe_revision();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|r| *r >= revision))
            .await
            .expect("timed out waiting for state update")
            .expect("state task stopped");
    }

    #[tokio::test]
    async fn construction_requests_exactly_one_random_image() {
        let service = Arc::new(FakeService::default());
        let gate = service.gate("random");
        let controller = controller(&service);

        assert_eq!(controller.pending_requests(), 1);
        assert_eq!(controller.snapshot(), AppState::default());

        gate.notify_one();
        wait_for_revision(&controller, 1).await;

        assert_eq!(service.calls(), vec!["random"]);
        assert_eq!(controller.pending_requests(), 0);
        let state = controller.snapshot();
        assert_eq!(state.image, Some(png(1, 1)));
        assert!(state.tags.is_none());
        assert!(state.last_error.is_none());
    }

    #[tokio::test]
    async fn random_image_success_keeps_last_error() {
        let service = Arc::new(FakeService::default());
        let controller = controller(&service);
        wait_for_revision(&controller, 1).await;

        controller.request_image_by_tag("missing");
        wait_for_revision(&controller, 2).await;
        let error = controller.snapshot().last_error.unwrap();
        assert!(error.is_not_found());

        service.set_image("random", Ok(png(2, 2)));
        controller.request_random_image();
        wait_for_revision(&controller, 3).await;

        let state = controller.snapshot();
        assert_eq!(state.image, Some(png(2, 2)));
        assert_eq!(state.last_error, Some(error));
    }

    #[tokio::test]
    async fn random_image_failure_keeps_previous_image() {
        let service = Arc::new(FakeService::default());
        service.set_image("random", Ok(png(4, 3)));
        let controller = controller(&service);
        wait_for_revision(&controller, 1).await;

        service.set_image("random", Err(ApiError::Transport("connection reset".to_string())));
        controller.request_random_image();
        wait_for_revision(&controller, 2).await;

        let state = controller.snapshot();
        assert_eq!(state.image, Some(png(4, 3)));
        let error = state.last_error.unwrap();
        assert_eq!(error.kind, ErrorKind::Transport);
        assert_eq!(error.status, None);

        service.set_image(
            "random",
            Err(ApiError::Http {
                status: 503,
                body: "busy".to_string(),
            }),
        );
        controller.request_random_image();
        wait_for_revision(&controller, 3).await;

        let state = controller.snapshot();
        assert_eq!(state.image, Some(png(4, 3)));
        assert_eq!(state.last_error.unwrap().status, Some(503));
    }

    #[tokio::test]
    async fn unmatched_tag_sets_not_found_and_keeps_image() {
        let service = Arc::new(FakeService::default());
        let controller = controller(&service);
        wait_for_revision(&controller, 1).await;
        let before = controller.snapshot().image;

        controller.request_image_by_tag("no-such-tag");
        wait_for_revision(&controller, 2).await;

        let state = controller.snapshot();
        assert_eq!(state.image, before);
        let error = state.last_error.unwrap();
        assert_eq!(error.kind, ErrorKind::NotFound);
        assert_eq!(error.status, Some(404));
        assert!(error.message.contains("404"));
        assert_eq!(error.notice(), Some("No cats could be found"));
        assert_eq!(service.calls(), vec!["random", "tag:no-such-tag"]);
    }

    #[tokio::test]
    async fn matched_tag_replaces_image() {
        let service = Arc::new(FakeService::default());
        service.set_image("cute", Ok(png(3, 1)));
        let controller = controller(&service);
        wait_for_revision(&controller, 1).await;

        let mut images = controller.subscribe_image();
        images.borrow_and_update();
        controller.request_image_by_tag("cute");
        images.changed().await.unwrap();

        assert_eq!(*images.borrow(), Some(png(3, 1)));
        assert!(controller.snapshot().last_error.is_none());
    }

    #[tokio::test]
    async fn empty_tag_list_is_present_not_an_error() {
        let service = Arc::new(FakeService::default());
        service.set_tags(Ok(Vec::new()));
        let controller = controller(&service);
        wait_for_revision(&controller, 1).await;

        controller.request_tags();
        wait_for_revision(&controller, 2).await;

        let state = controller.snapshot();
        assert_eq!(state.tags, Some(Vec::new()));
        assert!(state.last_error.is_none());
    }

    #[tokio::test]
    async fn tag_failure_keeps_previous_tags() {
        let service = Arc::new(FakeService::default());
        service.set_tags(Ok(vec!["cute".to_string(), "orange".to_string()]));
        let controller = controller(&service);
        wait_for_revision(&controller, 1).await;

        controller.request_tags();
        wait_for_revision(&controller, 2).await;

        service.set_tags(Err(ApiError::Http {
            status: 500,
            body: "boom".to_string(),
        }));
        controller.request_tags();
        wait_for_revision(&controller, 3).await;

        let state = controller.snapshot();
        assert_eq!(state.tags, Some(vec!["cute".to_string(), "orange".to_string()]));
        let error = state.last_error.unwrap();
        assert_eq!(error.kind, ErrorKind::Http);
        assert_eq!(error.status, Some(500));
        assert_eq!(error.message, "HTTP 500: boom");
        assert_eq!(error.notice(), None);
    }

    #[tokio::test]
    async fn undecodable_image_is_reported_and_ignored() {
        let service = Arc::new(FakeService::default());
        service.set_image("random", Ok(ImagePayload::new(&b"<html>oops</html>"[..])));
        let controller = controller(&service);
        wait_for_revision(&controller, 1).await;

        let state = controller.snapshot();
        assert!(state.image.is_none());
        assert_eq!(state.last_error.unwrap().kind, ErrorKind::Decode);
    }

    #[tokio::test]
    async fn later_completion_overwrites_earlier_one() {
        let service = Arc::new(FakeService::default());
        service.set_image("a", Ok(png(1, 2)));
        service.set_image("b", Ok(png(2, 1)));
        let gate_a = service.gate("a");
        let gate_b = service.gate("b");
        let controller = controller(&service);
        wait_for_revision(&controller, 1).await;

        controller.request_image_by_tag("a");
        controller.request_image_by_tag("b");
        assert_eq!(controller.pending_requests(), 2);

        gate_b.notify_one();
        wait_for_revision(&controller, 2).await;
        assert_eq!(controller.snapshot().image, Some(png(2, 1)));

        gate_a.notify_one();
        wait_for_revision(&controller, 3).await;
        assert_eq!(controller.snapshot().image, Some(png(1, 2)));
        assert_eq!(controller.pending_requests(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn pending_count_is_settled_when_revision_advances() {
        for _ in 0..200 {
            let service = Arc::new(FakeService::default());
            let controller = controller(&service);
            wait_for_revision(&controller, 1).await;
            assert_eq!(controller.pending_requests(), 0);

            controller.request_tags();
            controller.request_random_image();
            wait_for_revision(&controller, 2).await;
            assert!(controller.pending_requests() <= 1);
            wait_for_revision(&controller, 3).await;
            assert_eq!(controller.pending_requests(), 0);
        }
    }

    #[tokio::test]
    async fn repeated_commands_are_not_coalesced() {
        let service = Arc::new(FakeService::default());
        service.set_image("x", Ok(png(1, 1)));
        let controller = controller(&service);

        controller.request_image_by_tag("x");
        controller.request_image_by_tag("x");
        controller.request_image_by_tag("x");
        wait_for_revision(&controller, 4).await;

        let tagged = service.calls().iter().filter(|c| *c == "tag:x").count();
        assert_eq!(tagged, 3);
        assert_eq!(controller.pending_requests(), 0);
    }

    #[tokio::test]
    async fn record_lookups_bypass_state() {
        let service = Arc::new(FakeService::default());
        let controller = controller(&service);
        wait_for_revision(&controller, 1).await;

        let record = controller.fetch_record_by_id("abc").single().await.unwrap();
        assert_eq!(record.id, "abc");
        let batch = controller.fetch_record_batch().single().await.unwrap();
        assert_eq!(batch.len(), DEFAULT_RECORD_BATCH_LIMIT as usize);

        assert_eq!(controller.snapshot().revision, 1);
        assert!(service.calls().contains(&"batch:10".to_string()));
    }

    #[tokio::test]
    async fn dropping_the_controller_cancels_in_flight_work() {
        let service = Arc::new(FakeService::default());
        let _gate = service.gate("random");
        let controller = controller(&service);
        let mut images = controller.subscribe_image();
        tokio::task::yield_now().await;

        drop(controller);

        let closed = tokio::time::timeout(Duration::from_secs(5), images.changed()).await;
        assert!(closed.expect("channel did not close").is_err());

        for _ in 0..100 {
            if Arc::strong_count(&service) == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(Arc::strong_count(&service), 1);
    }
}
