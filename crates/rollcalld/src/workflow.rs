use crate::config::Config;
use crate::overlay;
use crate::status::{self, StatusBoard, StatusMessage, Tone};
use crate::upload::UploadCoordinator;
use chrono::NaiveDate;
use rollcall_core::asset::AssetError;
use rollcall_core::presentation::{self, ChartData, TableRow};
use rollcall_core::{
    reconcile, CaptureBuffer, CapturedImage, DetectParams, DetectorError, FaceDetector, FaceRect,
    RecognitionService, Roster, UploadError, UploadResponse,
};
use rollcall_hw::session::{capture_still, DEFAULT_JPEG_QUALITY};
use rollcall_hw::{
    acquire_with_fallback, CameraError, CameraSession, MediaSource, SessionState,
    StreamConstraints, VideoStream,
};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const CAMERA_UNAVAILABLE: &str = "Could not access the camera.";

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("workflow task exited")]
    ChannelClosed,
    #[error("asset error: {0}")]
    Asset(#[from] AssetError),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("face detector did not load within {0:?}")]
    ModelTimeout(Duration),
}

pub type DetectorResult = Result<Box<dyn FaceDetector>, WorkflowError>;

/// Tunables for the workflow task.
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub preferred: StreamConstraints,
    pub jpeg_quality: u8,
    pub frame_interval: Duration,
    pub status_clear_after: Duration,
    pub model_timeout: Duration,
    pub detect_params: DetectParams,
}

impl WorkflowSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            preferred: StreamConstraints::preferred(config.capture_width, config.capture_height),
            jpeg_quality: config.jpeg_quality,
            frame_interval: config.frame_interval(),
            status_clear_after: config.status_clear_after(),
            model_timeout: config.asset_timeout(),
            detect_params: DetectParams::default(),
        }
    }
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            preferred: StreamConstraints::preferred(1280, 720),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            frame_interval: Duration::from_millis(33),
            status_clear_after: Duration::from_secs(4),
            model_timeout: Duration::from_secs(20),
            detect_params: DetectParams::default(),
        }
    }
}

/// What the workflow task needs from the outside world.
pub struct WorkflowDeps<S> {
    pub roster: Roster,
    pub media: Arc<dyn MediaSource>,
    pub service: Arc<S>,
    /// Calendar day used for same-day attendance deduplication.
    pub today: fn() -> NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorStatus {
    Loading,
    Ready,
    Running,
    Unavailable,
}

/// Snapshot returned by `Status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub camera: SessionState,
    pub detector: DetectorStatus,
    pub buffered: usize,
    pub upload_in_flight: bool,
    /// Whether an upload would be accepted right now.
    pub upload_enabled: bool,
    pub overlay_faces: usize,
    /// Bumped whenever reconciliation changes the roster.
    pub roster_revision: u64,
    pub message: Option<StatusMessage>,
}

enum Request {
    OpenCamera {
        reply: oneshot::Sender<SessionState>,
    },
    CloseCamera {
        reply: oneshot::Sender<bool>,
    },
    Capture {
        reply: oneshot::Sender<usize>,
    },
    Captures {
        reply: oneshot::Sender<Vec<CapturedImage>>,
    },
    Upload {
        reply: oneshot::Sender<bool>,
    },
    Roster {
        reply: oneshot::Sender<Vec<TableRow>>,
    },
    Chart {
        reply: oneshot::Sender<ChartData>,
    },
    Overlay {
        reply: oneshot::Sender<Vec<FaceRect>>,
    },
    Status {
        reply: oneshot::Sender<StatusReport>,
    },
}

/// Completions posted back to the workflow task by the work it spawned.
enum Event {
    DetectorLoaded(DetectorResult),
    StreamAcquired {
        generation: u64,
        result: Result<Box<dyn VideoStream>, CameraError>,
    },
    Captured {
        image: Option<CapturedImage>,
        reply: oneshot::Sender<usize>,
    },
    UploadFinished(Result<UploadResponse, UploadError>),
    ClearStatus {
        generation: u64,
    },
    OverlayFrame {
        generation: u64,
        faces: Vec<FaceRect>,
    },
    OverlayStopped(Option<Box<dyn FaceDetector>>),
}

enum DetectorSlot {
    Loading,
    Ready(Box<dyn FaceDetector>),
    /// Lent to the overlay loop.
    Running,
    Unavailable,
}

impl DetectorSlot {
    fn status(&self) -> DetectorStatus {
        match self {
            Self::Loading => DetectorStatus::Loading,
            Self::Ready(_) => DetectorStatus::Ready,
            Self::Running => DetectorStatus::Running,
            Self::Unavailable => DetectorStatus::Unavailable,
        }
    }
}

struct OverlayRun {
    generation: u64,
    token: CancellationToken,
    handle: JoinHandle<Box<dyn FaceDetector>>,
}

/// Clone-safe handle to the workflow task.
#[derive(Clone)]
pub struct WorkflowHandle {
    tx: mpsc::Sender<Request>,
}

impl WorkflowHandle {
    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Request,
    ) -> Result<T, WorkflowError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| WorkflowError::ChannelClosed)?;
        reply_rx.await.map_err(|_| WorkflowError::ChannelClosed)
    }

    /// Start opening the camera. Returns the session state right after the request.
    pub async fn open_camera(&self) -> Result<SessionState, WorkflowError> {
        self.call(|reply| Request::OpenCamera { reply }).await
    }

    /// Stop the camera and the overlay. `false` if it was already closed.
    pub async fn close_camera(&self) -> Result<bool, WorkflowError> {
        self.call(|reply| Request::CloseCamera { reply }).await
    }

    /// Capture one mirrored still into the buffer. Returns the buffer size.
    pub async fn capture(&self) -> Result<usize, WorkflowError> {
        self.call(|reply| Request::Capture { reply }).await
    }

    /// Stills waiting for the next upload, oldest first.
    pub async fn captures(&self) -> Result<Vec<CapturedImage>, WorkflowError> {
        self.call(|reply| Request::Captures { reply }).await
    }

    /// Submit the buffered batch. `false` if nothing was sent.
    pub async fn upload(&self) -> Result<bool, WorkflowError> {
        self.call(|reply| Request::Upload { reply }).await
    }

    pub async fn roster(&self) -> Result<Vec<TableRow>, WorkflowError> {
        self.call(|reply| Request::Roster { reply }).await
    }

    pub async fn chart(&self) -> Result<ChartData, WorkflowError> {
        self.call(|reply| Request::Chart { reply }).await
    }

    /// Face boxes from the most recent overlay pass.
    pub async fn overlay(&self) -> Result<Vec<FaceRect>, WorkflowError> {
        self.call(|reply| Request::Overlay { reply }).await
    }

    pub async fn status(&self) -> Result<StatusReport, WorkflowError> {
        self.call(|reply| Request::Status { reply }).await
    }
}

/// Spawn the workflow task.
///
/// `detector_loader` runs in the background, bounded by
/// `settings.model_timeout`; until it resolves, camera opens are deferred.
/// If it fails or times out the camera still opens, without the overlay.
pub fn spawn_workflow<S, L>(
    settings: WorkflowSettings,
    deps: WorkflowDeps<S>,
    detector_loader: L,
) -> WorkflowHandle
where
    S: RecognitionService,
    L: Future<Output = DetectorResult> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let model_timeout = settings.model_timeout;
    let loader_events = events_tx.clone();
    tokio::spawn(async move {
        let result = match tokio::time::timeout(model_timeout, detector_loader).await {
            Ok(result) => result,
            Err(_) => Err(WorkflowError::ModelTimeout(model_timeout)),
        };
        let _ = loader_events.send(Event::DetectorLoaded(result));
    });

    let workflow = Workflow {
        session: CameraSession::new(settings.jpeg_quality),
        settings,
        roster: deps.roster,
        buffer: CaptureBuffer::new(),
        media: deps.media,
        uploads: UploadCoordinator::new(deps.service),
        status: StatusBoard::default(),
        detector: DetectorSlot::Loading,
        overlay: None,
        overlay_faces: Vec::new(),
        deferred_open: None,
        roster_revision: 0,
        today: deps.today,
        events: events_tx,
    };
    tokio::spawn(workflow.run(rx, events_rx));

    WorkflowHandle { tx }
}

/// Sole owner of the kiosk state. Requests and completions are handled one
/// at a time; blocking camera and detector work runs on spawned tasks.
struct Workflow<S> {
    settings: WorkflowSettings,
    roster: Roster,
    buffer: CaptureBuffer,
    session: CameraSession,
    media: Arc<dyn MediaSource>,
    uploads: UploadCoordinator<S>,
    status: StatusBoard,
    detector: DetectorSlot,
    overlay: Option<OverlayRun>,
    overlay_faces: Vec<FaceRect>,
    /// Open request parked until the detector finishes loading.
    deferred_open: Option<u64>,
    roster_revision: u64,
    today: fn() -> NaiveDate,
    events: mpsc::UnboundedSender<Event>,
}

impl<S: RecognitionService> Workflow<S> {
    async fn run(
        mut self,
        mut requests: mpsc::Receiver<Request>,
        mut events: mpsc::UnboundedReceiver<Event>,
    ) {
        tracing::info!("workflow task started");
        loop {
            tokio::select! {
                req = requests.recv() => match req {
                    Some(req) => self.handle_request(req),
                    None => break,
                },
                Some(event) = events.recv() => self.handle_event(event),
            }
        }
        self.close_camera();
        tracing::info!("workflow task exiting");
    }

    fn handle_request(&mut self, req: Request) {
        match req {
            Request::OpenCamera { reply } => {
                let _ = reply.send(self.open_camera());
            }
            Request::CloseCamera { reply } => {
                let _ = reply.send(self.close_camera());
            }
            Request::Capture { reply } => self.capture(reply),
            Request::Captures { reply } => {
                let _ = reply.send(self.buffer.images().to_vec());
            }
            Request::Upload { reply } => {
                let _ = reply.send(self.upload());
            }
            Request::Roster { reply } => {
                let _ = reply.send(presentation::table_rows(&self.roster));
            }
            Request::Chart { reply } => {
                let _ = reply.send(presentation::chart_data(&self.roster));
            }
            Request::Overlay { reply } => {
                let _ = reply.send(self.overlay_faces.clone());
            }
            Request::Status { reply } => {
                let _ = reply.send(self.report());
            }
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::DetectorLoaded(result) => self.detector_loaded(result),
            Event::StreamAcquired { generation, result } => {
                self.stream_acquired(generation, result)
            }
            Event::Captured { image, reply } => {
                if let Some(image) = image {
                    self.buffer.append(image);
                    tracing::info!(buffered = self.buffer.len(), "image captured");
                }
                let _ = reply.send(self.buffer.len());
            }
            Event::UploadFinished(result) => self.upload_finished(result),
            Event::ClearStatus { generation } => {
                self.status.clear_if_current(generation);
            }
            Event::OverlayFrame { generation, faces } => {
                if self.overlay.as_ref().is_some_and(|run| run.generation == generation) {
                    self.overlay_faces = faces;
                }
            }
            Event::OverlayStopped(detector) => self.overlay_stopped(detector),
        }
    }

    fn open_camera(&mut self) -> SessionState {
        let Some(generation) = self.session.begin_request() else {
            tracing::debug!(state = self.session.state().as_str(), "camera already open");
            return self.session.state();
        };
        if matches!(self.detector, DetectorSlot::Loading) {
            tracing::info!(generation, "face detector still loading; camera open deferred");
            self.deferred_open = Some(generation);
            self.status.set(status::MODEL_LOADING, Tone::Info);
        } else {
            self.start_acquisition(generation);
        }
        self.session.state()
    }

    fn start_acquisition(&self, generation: u64) {
        let media = Arc::clone(&self.media);
        let preferred = self.settings.preferred.clone();
        let events = self.events.clone();
        tokio::task::spawn_blocking(move || {
            let result = acquire_with_fallback(media.as_ref(), &preferred);
            let _ = events.send(Event::StreamAcquired { generation, result });
        });
    }

    fn stream_acquired(
        &mut self,
        generation: u64,
        result: Result<Box<dyn VideoStream>, CameraError>,
    ) {
        match result {
            Ok(stream) => {
                let stream: Arc<dyn VideoStream> = Arc::from(stream);
                if self.session.attach(generation, Arc::clone(&stream)) {
                    self.start_overlay(generation, stream);
                }
            }
            Err(_) => {
                if self.session.is_pending(generation) {
                    self.status.set(CAMERA_UNAVAILABLE, Tone::Error);
                    self.schedule_status_clear();
                }
                self.session.abandon(generation);
            }
        }
    }

    fn close_camera(&mut self) -> bool {
        if self.deferred_open.take().is_some() {
            self.status.clear_text(status::MODEL_LOADING);
        }
        let was_open = self.session.close();
        self.stop_overlay();
        was_open
    }

    fn capture(&mut self, reply: oneshot::Sender<usize>) {
        let Some(stream) = self.session.live_stream() else {
            tracing::debug!("capture ignored: camera not live");
            let _ = reply.send(self.buffer.len());
            return;
        };
        let quality = self.session.jpeg_quality();
        let events = self.events.clone();
        tokio::task::spawn_blocking(move || {
            let image = match capture_still(stream.as_ref(), quality) {
                Ok(image) => Some(image),
                Err(e) => {
                    tracing::warn!(error = %e, "still capture failed");
                    None
                }
            };
            let _ = events.send(Event::Captured { image, reply });
        });
    }

    fn upload(&mut self) -> bool {
        let Some((count, job)) = self.uploads.begin(&mut self.buffer) else {
            return false;
        };
        tracing::info!(count, "uploading batch");
        self.status.set(status::uploading(count), Tone::Info);

        let events = self.events.clone();
        tokio::spawn(async move {
            let result = job.await;
            let _ = events.send(Event::UploadFinished(result));
        });
        true
    }

    fn upload_finished(&mut self, result: Result<UploadResponse, UploadError>) {
        self.uploads.finish();
        match result {
            Ok(response) => {
                tracing::info!(present = response.present.len(), "upload succeeded; processing records");
                self.status.set(status::PROCESSING, Tone::Success);
                let updated = reconcile(&mut self.roster, &response.present, (self.today)());
                if updated > 0 {
                    self.roster_revision += 1;
                    self.status.set(status::marked_present(updated), Tone::Success);
                } else {
                    self.status.set(status::NO_NEW_RECORDS, Tone::Success);
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "upload failed");
                self.status.set(status::UPLOAD_FAILED, Tone::Error);
            }
        }
        self.schedule_status_clear();
    }

    /// Clear the current message after `status_clear_after`, unless replaced first.
    fn schedule_status_clear(&self) {
        let generation = self.status.generation();
        let delay = self.settings.status_clear_after;
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(Event::ClearStatus { generation });
        });
    }

    fn detector_loaded(&mut self, result: DetectorResult) {
        match result {
            Ok(detector) => {
                tracing::info!("face detector loaded");
                self.detector = DetectorSlot::Ready(detector);
            }
            Err(e) => {
                tracing::warn!(error = %e, "face detection unavailable; camera will run without overlay");
                self.detector = DetectorSlot::Unavailable;
            }
        }

        if let Some(generation) = self.deferred_open.take() {
            self.status.clear_text(status::MODEL_LOADING);
            if self.session.is_pending(generation) {
                self.start_acquisition(generation);
            }
        }
    }

    fn start_overlay(&mut self, generation: u64, stream: Arc<dyn VideoStream>) {
        let detector = match std::mem::replace(&mut self.detector, DetectorSlot::Running) {
            DetectorSlot::Ready(detector) => detector,
            other => {
                tracing::debug!(detector = ?other.status(), "overlay not started");
                self.detector = other;
                return;
            }
        };

        let token = CancellationToken::new();
        let events = self.events.clone();
        let handle = overlay::spawn_overlay(
            stream,
            detector,
            self.settings.detect_params,
            self.settings.frame_interval,
            token.clone(),
            move |faces| events.send(Event::OverlayFrame { generation, faces }).is_ok(),
        );
        tracing::debug!(generation, "overlay started");
        self.overlay = Some(OverlayRun {
            generation,
            token,
            handle,
        });
    }

    fn stop_overlay(&mut self) {
        self.overlay_faces.clear();
        let Some(run) = self.overlay.take() else {
            return;
        };
        run.token.cancel();
        let events = self.events.clone();
        tokio::spawn(async move {
            let detector = match run.handle.await {
                Ok(detector) => Some(detector),
                Err(e) => {
                    tracing::error!(error = %e, "overlay task failed");
                    None
                }
            };
            let _ = events.send(Event::OverlayStopped(detector));
        });
    }

    fn overlay_stopped(&mut self, detector: Option<Box<dyn FaceDetector>>) {
        let Some(detector) = detector else {
            self.detector = DetectorSlot::Unavailable;
            return;
        };
        self.detector = DetectorSlot::Ready(detector);
        // Camera reopened while the previous loop was winding down.
        if self.overlay.is_none() {
            if let Some(stream) = self.session.live_stream() {
                self.start_overlay(self.session.generation(), stream);
            }
        }
    }

    fn report(&self) -> StatusReport {
        StatusReport {
            camera: self.session.state(),
            detector: self.detector.status(),
            buffered: self.buffer.len(),
            upload_in_flight: self.uploads.in_flight(),
            upload_enabled: self.uploads.can_upload(&self.buffer),
            overlay_faces: self.overlay_faces.len(),
            roster_revision: self.roster_revision,
            message: self.status.current().cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::StudentRecord;
    use rollcall_hw::RgbaFrame;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, 26).unwrap()
    }

    struct FakeStream {
        stopped: AtomicBool,
    }

    impl VideoStream for FakeStream {
        fn read_frame(&self) -> Result<RgbaFrame, CameraError> {
            if self.stopped.load(Ordering::SeqCst) {
                return Err(CameraError::Stopped);
            }
            Ok(RgbaFrame::new(vec![200; 8 * 8 * 4], 8, 8, 0).unwrap())
        }
        fn stop(&self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
        fn width(&self) -> u32 {
            8
        }
        fn height(&self) -> u32 {
            8
        }
    }

    #[derive(Default)]
    struct FakeMedia {
        fail_preferred: bool,
        fail_all: bool,
        requests: Mutex<Vec<StreamConstraints>>,
    }

    impl FakeMedia {
        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl MediaSource for FakeMedia {
        fn acquire(&self, c: &StreamConstraints) -> Result<Box<dyn VideoStream>, CameraError> {
            self.requests.lock().unwrap().push(c.clone());
            if self.fail_all || (self.fail_preferred && !c.is_unconstrained()) {
                return Err(CameraError::DeviceNotFound("/dev/video9".into()));
            }
            Ok(Box::new(FakeStream {
                stopped: AtomicBool::new(false),
            }))
        }
    }

    #[derive(Default)]
    struct FakeService {
        responses: Mutex<VecDeque<Result<UploadResponse, UploadError>>>,
        batches: Mutex<Vec<usize>>,
        gate: Option<Arc<Notify>>,
    }

    impl FakeService {
        fn respond(self, result: Result<UploadResponse, UploadError>) -> Self {
            self.responses.lock().unwrap().push_back(result);
            self
        }
    }

    impl RecognitionService for FakeService {
        fn submit(
            &self,
            images: Vec<CapturedImage>,
        ) -> impl Future<Output = Result<UploadResponse, UploadError>> + Send {
            self.batches.lock().unwrap().push(images.len());
            let next = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(UploadResponse::default()));
            let gate = self.gate.clone();
            async move {
                if let Some(gate) = gate {
                    gate.notified().await;
                }
                next
            }
        }
    }

    struct OneFace;

    impl FaceDetector for OneFace {
        fn detect(
            &mut self,
            _gray: &[u8],
            _width: u32,
            _height: u32,
            _params: &DetectParams,
        ) -> Result<Vec<FaceRect>, DetectorError> {
            Ok(vec![FaceRect {
                x: 2,
                y: 2,
                width: 4,
                height: 4,
            }])
        }
    }

    fn settings() -> WorkflowSettings {
        WorkflowSettings {
            frame_interval: Duration::from_millis(5),
            ..WorkflowSettings::default()
        }
    }

    fn roster() -> Roster {
        Roster::new(vec![
            StudentRecord::new("Alice Smith", 80, 78),
            StudentRecord::new("Bob Johnson", 80, 60),
        ])
        .unwrap()
    }

    async fn no_detector() -> DetectorResult {
        Err(WorkflowError::Detector(DetectorError::Unsupported))
    }

    async fn one_face() -> DetectorResult {
        Ok(Box::new(OneFace) as Box<dyn FaceDetector>)
    }

    fn spawn<L>(
        settings: WorkflowSettings,
        media: Arc<FakeMedia>,
        service: Arc<FakeService>,
        loader: L,
    ) -> WorkflowHandle
    where
        L: Future<Output = DetectorResult> + Send + 'static,
    {
        spawn_workflow(
            settings,
            WorkflowDeps {
                roster: roster(),
                media,
                service,
                today,
            },
            loader,
        )
    }

    async fn wait_for(
        handle: &WorkflowHandle,
        what: &str,
        pred: impl Fn(&StatusReport) -> bool,
    ) -> StatusReport {
        for _ in 0..300 {
            let report = handle.status().await.unwrap();
            if pred(&report) {
                return report;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {what}");
    }

    async fn live(handle: &WorkflowHandle) {
        handle.open_camera().await.unwrap();
        wait_for(handle, "camera live", |r| r.camera == SessionState::Live).await;
    }

    fn message(report: &StatusReport) -> Option<&str> {
        report.message.as_ref().map(|m| m.text.as_str())
    }

    #[tokio::test]
    async fn test_open_deferred_until_detector_loads() {
        let media = Arc::new(FakeMedia::default());
        let (loaded_tx, loaded_rx) = oneshot::channel::<()>();
        let handle = spawn(
            settings(),
            media.clone(),
            Arc::new(FakeService::default()),
            async move {
                loaded_rx.await.map_err(|_| WorkflowError::ChannelClosed)?;
                Ok::<_, WorkflowError>(Box::new(OneFace) as Box<dyn FaceDetector>)
            },
        );

        assert_eq!(handle.open_camera().await.unwrap(), SessionState::Requesting);
        let report = handle.status().await.unwrap();
        assert_eq!(report.detector, DetectorStatus::Loading);
        assert_eq!(message(&report), Some(status::MODEL_LOADING));
        assert_eq!(media.request_count(), 0);

        loaded_tx.send(()).unwrap();
        let report = wait_for(&handle, "overlay faces", |r| r.overlay_faces > 0).await;
        assert_eq!(report.camera, SessionState::Live);
        assert_eq!(report.detector, DetectorStatus::Running);
        assert!(report.message.is_none());
        assert_eq!(media.request_count(), 1);
    }

    #[tokio::test]
    async fn test_model_timeout_opens_without_overlay() {
        let media = Arc::new(FakeMedia::default());
        let handle = spawn(
            WorkflowSettings {
                model_timeout: Duration::from_millis(50),
                ..settings()
            },
            media.clone(),
            Arc::new(FakeService::default()),
            std::future::pending(),
        );

        handle.open_camera().await.unwrap();
        let report = wait_for(&handle, "camera live", |r| r.camera == SessionState::Live).await;
        assert_eq!(report.detector, DetectorStatus::Unavailable);
        assert_eq!(report.overlay_faces, 0);
        assert!(handle.overlay().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_falls_back_to_any_camera() {
        let media = Arc::new(FakeMedia {
            fail_preferred: true,
            ..FakeMedia::default()
        });
        let handle = spawn(settings(), media.clone(), Arc::new(FakeService::default()), no_detector());

        live(&handle).await;
        let requests = media.requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 2);
        assert!(!requests[0].is_unconstrained());
        assert!(requests[1].is_unconstrained());
    }

    #[tokio::test]
    async fn test_open_failure_returns_to_idle() {
        let media = Arc::new(FakeMedia {
            fail_all: true,
            ..FakeMedia::default()
        });
        let handle = spawn(settings(), media.clone(), Arc::new(FakeService::default()), no_detector());
        wait_for(&handle, "detector settled", |r| r.detector == DetectorStatus::Unavailable).await;

        handle.open_camera().await.unwrap();
        let report = wait_for(&handle, "camera error", |r| {
            message(r) == Some(CAMERA_UNAVAILABLE)
        })
        .await;
        assert_eq!(report.camera, SessionState::Idle);
        assert_eq!(media.request_count(), 2);
    }

    #[tokio::test]
    async fn test_camera_error_message_clears() {
        let media = Arc::new(FakeMedia {
            fail_all: true,
            ..FakeMedia::default()
        });
        let handle = spawn(
            WorkflowSettings {
                status_clear_after: Duration::from_millis(200),
                ..settings()
            },
            media,
            Arc::new(FakeService::default()),
            no_detector(),
        );
        wait_for(&handle, "detector settled", |r| r.detector == DetectorStatus::Unavailable).await;

        handle.open_camera().await.unwrap();
        wait_for(&handle, "camera error", |r| message(r) == Some(CAMERA_UNAVAILABLE)).await;
        let report = wait_for(&handle, "camera error cleared", |r| r.message.is_none()).await;
        assert_eq!(report.camera, SessionState::Idle);
    }

    #[tokio::test]
    async fn test_capture_requires_live_camera() {
        let handle = spawn(
            settings(),
            Arc::new(FakeMedia::default()),
            Arc::new(FakeService::default()),
            no_detector(),
        );
        assert_eq!(handle.capture().await.unwrap(), 0);

        live(&handle).await;
        assert_eq!(handle.capture().await.unwrap(), 1);
        assert_eq!(handle.capture().await.unwrap(), 2);

        assert!(handle.close_camera().await.unwrap());
        assert!(!handle.close_camera().await.unwrap());
        assert_eq!(handle.capture().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_captures_listed_until_uploaded() {
        let handle = spawn(
            settings(),
            Arc::new(FakeMedia::default()),
            Arc::new(FakeService::default()),
            no_detector(),
        );
        assert!(handle.captures().await.unwrap().is_empty());

        live(&handle).await;
        handle.capture().await.unwrap();
        handle.capture().await.unwrap();

        let captures = handle.captures().await.unwrap();
        assert_eq!(captures.len(), 2);
        assert!(captures
            .iter()
            .all(|c| c.as_data_uri().starts_with("data:image/jpeg;base64,")));

        handle.upload().await.unwrap();
        assert!(handle.captures().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_upload_is_noop() {
        let service = Arc::new(FakeService::default());
        let handle = spawn(settings(), Arc::new(FakeMedia::default()), service.clone(), no_detector());

        assert!(!handle.upload().await.unwrap());
        let report = handle.status().await.unwrap();
        assert!(!report.upload_enabled);
        assert!(report.message.is_none());
        assert!(service.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_marks_present_and_refreshes_views() {
        let service = Arc::new(FakeService::default().respond(Ok(UploadResponse {
            present: vec!["Alice Smith".into(), "Nobody".into()],
        })));
        let handle = spawn(settings(), Arc::new(FakeMedia::default()), service.clone(), no_detector());
        live(&handle).await;
        handle.capture().await.unwrap();
        handle.capture().await.unwrap();

        assert!(handle.upload().await.unwrap());
        let report = wait_for(&handle, "upload outcome", |r| !r.upload_in_flight).await;
        assert_eq!(message(&report), Some("1 student(s) marked present!"));
        assert_eq!(report.buffered, 0);
        assert_eq!(report.roster_revision, 1);
        assert_eq!(*service.batches.lock().unwrap(), vec![2]);

        let rows = handle.roster().await.unwrap();
        let alice = rows.iter().find(|r| r.name == "Alice Smith").unwrap();
        assert_eq!(alice.hours_present, 79);
        let chart = handle.chart().await.unwrap();
        assert_eq!(chart.data.iter().sum::<usize>(), 2);
    }

    #[tokio::test]
    async fn test_missing_present_reports_no_new_records() {
        let service = Arc::new(FakeService::default().respond(Ok(UploadResponse::default())));
        let handle = spawn(settings(), Arc::new(FakeMedia::default()), service, no_detector());
        live(&handle).await;
        handle.capture().await.unwrap();

        handle.upload().await.unwrap();
        let report = wait_for(&handle, "upload outcome", |r| !r.upload_in_flight).await;
        assert_eq!(message(&report), Some(status::NO_NEW_RECORDS));
        assert_eq!(report.roster_revision, 0);
    }

    #[tokio::test]
    async fn test_failed_upload_still_clears_buffer() {
        let service = Arc::new(
            FakeService::default().respond(Err(UploadError::Status("Internal Server Error".into()))),
        );
        let handle = spawn(settings(), Arc::new(FakeMedia::default()), service, no_detector());
        live(&handle).await;
        handle.capture().await.unwrap();
        handle.capture().await.unwrap();

        handle.upload().await.unwrap();
        let report = wait_for(&handle, "upload outcome", |r| !r.upload_in_flight).await;
        assert_eq!(message(&report), Some(status::UPLOAD_FAILED));
        assert_eq!(report.message.unwrap().tone, Tone::Error);
        assert_eq!(report.buffered, 0);

        let rows = handle.roster().await.unwrap();
        assert_eq!(rows[0].hours_present, 78);
    }

    #[tokio::test]
    async fn test_upload_not_reentrant() {
        let gate = Arc::new(Notify::new());
        let service = Arc::new(FakeService {
            gate: Some(gate.clone()),
            ..FakeService::default()
        });
        let handle = spawn(settings(), Arc::new(FakeMedia::default()), service.clone(), no_detector());
        live(&handle).await;
        handle.capture().await.unwrap();

        assert!(handle.upload().await.unwrap());
        let report = handle.status().await.unwrap();
        assert_eq!(message(&report), Some("Uploading 1 images..."));
        assert!(report.upload_in_flight);

        // Captured mid-flight: kept for the next batch.
        assert_eq!(handle.capture().await.unwrap(), 1);
        assert!(!handle.upload().await.unwrap());
        assert!(!handle.status().await.unwrap().upload_enabled);

        gate.notify_one();
        let report = wait_for(&handle, "upload outcome", |r| !r.upload_in_flight).await;
        assert_eq!(report.buffered, 1);
        assert!(report.upload_enabled);
        assert_eq!(*service.batches.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_outcome_message_clears_after_delay() {
        let handle = spawn(
            settings(),
            Arc::new(FakeMedia::default()),
            Arc::new(FakeService::default()),
            no_detector(),
        );
        live(&handle).await;
        handle.capture().await.unwrap();
        handle.close_camera().await.unwrap();

        tokio::time::pause();
        handle.upload().await.unwrap();
        let mut report = handle.status().await.unwrap();
        for _ in 0..100 {
            if !report.upload_in_flight {
                break;
            }
            tokio::task::yield_now().await;
            report = handle.status().await.unwrap();
        }
        assert_eq!(message(&report), Some(status::NO_NEW_RECORDS));

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(message(&handle.status().await.unwrap()), Some(status::NO_NEW_RECORDS));

        tokio::time::advance(Duration::from_secs(2)).await;
        let mut cleared = false;
        for _ in 0..100 {
            if handle.status().await.unwrap().message.is_none() {
                cleared = true;
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(cleared);
    }

    #[tokio::test]
    async fn test_close_stops_overlay_and_reopen_resumes_it() {
        let handle = spawn(
            settings(),
            Arc::new(FakeMedia::default()),
            Arc::new(FakeService::default()),
            one_face(),
        );
        live(&handle).await;
        wait_for(&handle, "overlay faces", |r| r.overlay_faces > 0).await;
        assert_eq!(handle.overlay().await.unwrap().len(), 1);

        handle.close_camera().await.unwrap();
        assert!(handle.overlay().await.unwrap().is_empty());
        wait_for(&handle, "detector returned", |r| r.detector == DetectorStatus::Ready).await;

        live(&handle).await;
        let report = wait_for(&handle, "overlay resumed", |r| r.overlay_faces > 0).await;
        assert_eq!(report.detector, DetectorStatus::Running);
    }
}
