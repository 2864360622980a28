//! Single-threaded cooperative event loop around the annotation controller.
//!
//! Map clicks, popup actions and fetch completions all arrive on one queue
//! and are processed in arrival order. Fetches run as spawned tasks and post
//! their result back tagged with the request token, so the controller is only
//! ever touched from the loop. There is no cancellation: superseded requests
//! run to completion and are discarded by token.

use std::sync::Arc;
use std::time::Duration;

use annotation::{
    AnnotationController, Command, ControllerEvent, FetchError, FetchRequest, ImageService,
    LocationStore, MapSurface, PopupOptions, SaveRequest,
};
use protocol::SaveLocationResponse;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Default deadline for a single image fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub fetch_timeout: Duration,
    pub popup: PopupOptions,
    /// Most recent events kept in the session's [`EventBus`].
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            popup: PopupOptions::default(),
            event_capacity: crate::DEFAULT_EVENT_CAPACITY,
        }
    }
}

#[derive(Debug)]
enum Incoming {
    Controller(ControllerEvent),
    Saved(Result<SaveLocationResponse, FetchError>),
}

pub struct Session {
    controller: AnnotationController,
    images: Arc<dyn ImageService>,
    store: Option<Arc<dyn LocationStore>>,
    config: SessionConfig,
    tx: mpsc::UnboundedSender<Incoming>,
    rx: mpsc::UnboundedReceiver<Incoming>,
    in_flight: usize,
    started: bool,
    bus: crate::EventBus,
}

impl Session {
    pub fn new(images: Arc<dyn ImageService>, config: SessionConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            controller: AnnotationController::new(config.popup),
            images,
            store: None,
            config,
            tx,
            rx,
            in_flight: 0,
            started: false,
            bus: crate::EventBus::with_capacity(config.event_capacity),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn LocationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn controller(&self) -> &AnnotationController {
        &self.controller
    }

    pub fn events(&self) -> &crate::EventBus {
        &self.bus
    }

    pub fn drain_events(&mut self) -> Vec<crate::Event> {
        self.bus.drain()
    }

    /// Number of spawned fetches and saves not yet reported back.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Wires the surface's click and popup-action handlers to this session.
    ///
    /// Returns `false` if the session was already started.
    pub fn start<S: MapSurface + ?Sized>(&mut self, surface: &mut S) -> bool {
        if self.started {
            return false;
        }
        self.started = true;

        let tx = self.tx.clone();
        surface.on_click(Box::new(move |at| {
            let _ = tx.send(Incoming::Controller(ControllerEvent::Click(at)));
        }));
        let tx = self.tx.clone();
        surface.on_action(Box::new(move |marker, action| {
            let _ = tx.send(Incoming::Controller(ControllerEvent::Action(marker, action)));
        }));
        info!("annotation session started");
        true
    }

    /// Waits for the next event and processes it.
    pub async fn step<S: MapSurface + ?Sized>(&mut self, surface: &mut S) {
        if let Some(incoming) = self.rx.recv().await {
            self.dispatch(surface, incoming);
        }
    }

    /// Processes events forever.
    pub async fn run<S: MapSurface + ?Sized>(&mut self, surface: &mut S) {
        while let Some(incoming) = self.rx.recv().await {
            self.dispatch(surface, incoming);
        }
    }

    /// Processes queued events until the queue is empty and nothing is in flight.
    pub async fn run_until_idle<S: MapSurface + ?Sized>(&mut self, surface: &mut S) {
        loop {
            let incoming = match self.rx.try_recv() {
                Ok(incoming) => incoming,
                Err(_) if self.in_flight > 0 => match self.rx.recv().await {
                    Some(incoming) => incoming,
                    None => return,
                },
                Err(_) => return,
            };
            self.dispatch(surface, incoming);
        }
    }

    fn dispatch<S: MapSurface + ?Sized>(&mut self, surface: &mut S, incoming: Incoming) {
        match incoming {
            Incoming::Controller(ControllerEvent::FetchSucceeded { token, image }) => {
                self.in_flight -= 1;
                let size = image.len();
                let outcome = self.controller.fetch_succeeded(surface, token, image);
                self.bus
                    .emit("fetch_succeeded", format!("{token} {size} bytes {outcome:?}"));
            }
            Incoming::Controller(ControllerEvent::FetchFailed { token, error }) => {
                self.in_flight -= 1;
                let outcome = self.controller.fetch_failed(surface, token, &error);
                self.bus
                    .emit("fetch_failed", format!("{token} {error} {outcome:?}"));
            }
            Incoming::Controller(event) => {
                let kind = match &event {
                    ControllerEvent::Click(_) => "click",
                    ControllerEvent::Action(_, annotation::PopupAction::Rotate) => "rotate",
                    ControllerEvent::Action(_, annotation::PopupAction::Save) => "save",
                    _ => "event",
                };
                self.bus.emit(kind, format!("{event:?}"));
                if let Some(command) = self.controller.handle(surface, event) {
                    self.execute(command);
                }
            }
            Incoming::Saved(result) => {
                self.in_flight -= 1;
                match result {
                    Ok(receipt) => {
                        info!("location saved as {}", receipt.id);
                        self.bus.emit("saved", receipt.id);
                    }
                    Err(err) => {
                        warn!("save failed: {err}");
                        self.bus.emit("save_failed", err.to_string());
                    }
                }
            }
        }
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::Fetch(request) => self.spawn_fetch(request),
            Command::Save(request) => self.spawn_save(request),
        }
    }

    fn spawn_fetch(&mut self, request: FetchRequest) {
        let images = self.images.clone();
        let tx = self.tx.clone();
        let deadline = self.config.fetch_timeout;
        self.in_flight += 1;
        debug!(
            "fetching {} heading {} as {}",
            request.coordinate, request.heading, request.token
        );

        tokio::spawn(async move {
            let result = tokio::time::timeout(
                deadline,
                images.fetch_image(request.coordinate, request.heading),
            )
            .await
            .unwrap_or_else(|_| Err(FetchError::timeout(deadline)));

            let event = match result {
                Ok(image) => ControllerEvent::FetchSucceeded {
                    token: request.token,
                    image,
                },
                Err(error) => {
                    warn!("fetch {} failed: {error}", request.token);
                    ControllerEvent::FetchFailed {
                        token: request.token,
                        error,
                    }
                }
            };
            let _ = tx.send(Incoming::Controller(event));
        });
    }

    fn spawn_save(&mut self, request: SaveRequest) {
        let Some(store) = self.store.clone() else {
            warn!("save requested but no location store is configured");
            self.bus.emit("save_failed", "no location store configured");
            return;
        };
        let tx = self.tx.clone();
        self.in_flight += 1;
        tokio::spawn(async move {
            let result = store.save_location(request).await;
            let _ = tx.send(Incoming::Saved(result));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use annotation::{BoxFuture, FetchErrorKind, HeadlessSurface, Status};
    use bytes::Bytes;
    use foundation::{Coordinate, Heading};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Per-heading scripted responses: delay in ms and image (None = HTTP 500).
    /// Headings without an entry never answer.
    #[derive(Default)]
    struct ScriptedImages {
        frames: HashMap<u16, (u64, Option<&'static [u8]>)>,
    }

    impl ScriptedImages {
        fn frame(mut self, heading: u16, delay_ms: u64, image: Option<&'static [u8]>) -> Self {
            self.frames.insert(heading, (delay_ms, image));
            self
        }
    }

    impl ImageService for ScriptedImages {
        fn fetch_image(
            &self,
            _at: Coordinate,
            heading: Heading,
        ) -> BoxFuture<'_, Result<Bytes, FetchError>> {
            let entry = self.frames.get(&heading.degrees()).copied();
            Box::pin(async move {
                let Some((delay_ms, image)) = entry else {
                    return std::future::pending().await;
                };
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                match image {
                    Some(bytes) => Ok(Bytes::from_static(bytes)),
                    None => Err(FetchError::new(
                        FetchErrorKind::Status(500),
                        "upstream unavailable",
                    )),
                }
            })
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        saved: Mutex<Vec<SaveRequest>>,
    }

    impl LocationStore for RecordingStore {
        fn save_location(
            &self,
            request: SaveRequest,
        ) -> BoxFuture<'_, Result<SaveLocationResponse, FetchError>> {
            Box::pin(async move {
                let mut saved = self.saved.lock().unwrap();
                saved.push(request);
                Ok(SaveLocationResponse {
                    id: format!("loc-{}", saved.len()),
                    saved_at: 0,
                })
            })
        }
    }

    fn nyc() -> Coordinate {
        Coordinate::new(40.7128, -74.0060)
    }

    fn current_marker(session: &Session) -> foundation::MarkerHandle {
        session.controller().view().expect("active view").marker
    }

    #[tokio::test(start_paused = true)]
    async fn click_loads_image_through_the_loop() {
        let images = ScriptedImages::default().frame(0, 50, Some(b"IMG1"));
        let mut session = Session::new(Arc::new(images), SessionConfig::default());
        let mut surface = HeadlessSurface::new();
        assert!(session.start(&mut surface));
        assert!(!session.start(&mut surface));

        surface.click(nyc());
        session.run_until_idle(&mut surface).await;

        let view = session.controller().view().unwrap();
        assert_eq!(view.status, Status::Loaded(Bytes::from_static(b"IMG1")));
        assert_eq!(surface.marker_count(), 1);
        assert_eq!(session.in_flight(), 0);
        assert_eq!(session.events().count("fetch_succeeded"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_superseded_rotation_is_discarded() {
        let images = ScriptedImages::default()
            .frame(0, 10, Some(b"IMG0"))
            .frame(90, 300, Some(b"IMG90"))
            .frame(180, 10, Some(b"IMG180"));
        let mut session = Session::new(Arc::new(images), SessionConfig::default());
        let mut surface = HeadlessSurface::new();
        session.start(&mut surface);

        surface.click(nyc());
        session.run_until_idle(&mut surface).await;
        let marker = current_marker(&session);

        assert!(surface.activate(marker, "rotate-button"));
        assert!(surface.activate(marker, "rotate-button"));
        session.run_until_idle(&mut surface).await;

        let view = session.controller().view().unwrap();
        assert_eq!(view.heading.degrees(), 180);
        assert_eq!(view.image().unwrap().as_ref(), b"IMG180");
        let markup = &surface.marker(marker).unwrap().popup.as_ref().unwrap().content.markup;
        assert!(markup.contains(&protocol::data_url(b"IMG180")));
        assert!(!markup.contains(&protocol::data_url(b"IMG90")));
        assert!(
            session
                .events()
                .events()
                .iter()
                .any(|e| e.kind == "fetch_succeeded" && e.message.ends_with("Stale"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn hung_fetch_times_out_into_failed_state() {
        let config = SessionConfig {
            fetch_timeout: Duration::from_secs(5),
            ..SessionConfig::default()
        };
        let mut session = Session::new(Arc::new(ScriptedImages::default()), config);
        let mut surface = HeadlessSurface::new();
        session.start(&mut surface);

        surface.click(nyc());
        session.run_until_idle(&mut surface).await;

        match &session.controller().view().unwrap().status {
            Status::Failed(message) => assert!(message.contains("5s"), "{message}"),
            other => panic!("expected failure, got {other:?}"),
        }
        let marker = current_marker(&session);
        assert!(surface.activate(marker, "rotate-button"));
    }

    #[tokio::test(start_paused = true)]
    async fn failure_then_new_click_recovers() {
        let images = ScriptedImages::default().frame(0, 10, None);
        let mut session = Session::new(Arc::new(images), SessionConfig::default());
        let mut surface = HeadlessSurface::new();
        session.start(&mut surface);

        surface.click(nyc());
        session.run_until_idle(&mut surface).await;
        assert!(matches!(
            session.controller().view().unwrap().status,
            Status::Failed(_)
        ));

        let elsewhere = Coordinate::new(40.71, -74.00);
        surface.click(elsewhere);
        session.run_until_idle(&mut surface).await;
        assert_eq!(surface.marker_count(), 1);
        assert_eq!(session.controller().view().unwrap().coordinate, elsewhere);
    }

    #[tokio::test(start_paused = true)]
    async fn save_control_persists_loaded_annotation() {
        let images = ScriptedImages::default().frame(0, 10, Some(b"IMG1"));
        let store = Arc::new(RecordingStore::default());
        let mut session =
            Session::new(Arc::new(images), SessionConfig::default()).with_store(store.clone());
        let mut surface = HeadlessSurface::new();
        session.start(&mut surface);

        surface.click(nyc());
        session.run_until_idle(&mut surface).await;
        assert!(surface.activate(current_marker(&session), "save-button"));
        session.run_until_idle(&mut surface).await;

        let saved = store.saved.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].coordinate, nyc());
        assert_eq!(saved[0].image.as_ref(), b"IMG1");
        assert_eq!(session.events().count("saved"), 1);
    }

    #[tokio::test]
    async fn events_without_handlers_do_nothing() {
        let mut session = Session::new(Arc::new(ScriptedImages::default()), SessionConfig::default());
        let mut surface = HeadlessSurface::new();
        surface.click(nyc());
        session.run_until_idle(&mut surface).await;
        assert!(session.controller().view().is_none());
        assert!(session.events().events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn long_sessions_keep_a_bounded_trace() {
        let images = ScriptedImages::default().frame(0, 0, Some(b"IMG"));
        let config = SessionConfig {
            event_capacity: 16,
            ..SessionConfig::default()
        };
        let mut session = Session::new(Arc::new(images), config);
        let mut surface = HeadlessSurface::new();
        session.start(&mut surface);

        for _ in 0..500 {
            surface.click(nyc());
            session.run_until_idle(&mut surface).await;
        }

        let events = session.events().events();
        assert_eq!(events.len(), 16);
        assert_eq!(events.back().map(|e| e.seq), Some(999));
        assert_eq!(surface.marker_count(), 1);
    }
}
