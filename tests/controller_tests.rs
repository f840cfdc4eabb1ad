// SPDX-License-Identifier: MPL-2.0

//! Integration tests for the capture controller

use camkit::app::{
    CaptureController, CaptureSettings, ChannelPresentationSink, EventReceiver, PipelineState,
    SessionEvent,
};
use camkit::backends::camera::types::{
    DeviceError, DeviceResult, Frame, Timestamp, TorchMode, VideoFilter,
};
use camkit::backends::camera::{CaptureSource, FrameCallback};
use camkit::backends::segmentation::ChromaKeyBackend;
use camkit::errors::{AppError, EncoderError, EncoderInitError, RecordingFailedError};
use camkit::pipelines::video::{
    Encoder, MemorySinkFactory, RecordingController, RenderTarget, SinkEvent, SinkProbe,
    VideoCodec,
};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Capture source driven by the test
#[derive(Default)]
struct ManualSource {
    callback: Mutex<Option<FrameCallback>>,
    clock: Mutex<Option<Timestamp>>,
    running: AtomicBool,
    fail_start: AtomicBool,
}

impl ManualSource {
    fn set_clock(&self, clock: Option<Timestamp>) {
        *self.clock.lock().unwrap() = clock;
    }

    fn push(&self, ms: u64) {
        let callback = self.callback.lock().unwrap().clone();
        if let Some(callback) = callback {
            callback(Frame::solid_rgba(
                8,
                8,
                [200, 10, 10, 255],
                Timestamp::from_millis(ms),
            ));
        }
    }
}

impl CaptureSource for ManualSource {
    fn start(&self, on_frame: FrameCallback) -> DeviceResult<()> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(DeviceError::NotAvailable("no camera".into()));
        }
        *self.callback.lock().unwrap() = Some(on_frame);
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.callback.lock().unwrap().take();
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn timestamp_origin(&self) -> Option<Timestamp> {
        *self.clock.lock().unwrap()
    }

    fn toggle_torch(&self) -> DeviceResult<TorchMode> {
        Ok(TorchMode::On)
    }
}

struct Harness {
    controller: CaptureController<MemorySinkFactory>,
    events: EventReceiver,
    source: Arc<ManualSource>,
    probe: SinkProbe,
    preview: mpsc::Receiver<Frame>,
    target: RenderTarget,
    _dir: tempfile::TempDir,
}

fn harness(filter: VideoFilter) -> Harness {
    sized_harness(filter, 8, 8)
}

fn sized_harness(filter: VideoFilter, width: u32, height: u32) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let target = RenderTarget {
        width,
        height,
        frame_rate: 30,
        codec: VideoCodec::H264,
        path: render_path(dir.path()),
    };
    let factory = MemorySinkFactory::new();
    let probe = factory.probe();
    let source = Arc::new(ManualSource::default());
    let (preview_sink, preview) = ChannelPresentationSink::channel(16);
    let recorder = RecordingController::new(Encoder::new(factory)).unwrap();
    let (controller, events) = CaptureController::new(
        source.clone(),
        recorder,
        Arc::new(ChromaKeyBackend::default()),
        Arc::new(preview_sink),
        CaptureSettings {
            target: target.clone(),
            filter,
            mirror_preview: false,
        },
    );
    Harness {
        controller,
        events,
        source,
        probe,
        preview,
        target,
        _dir: dir,
    }
}

fn render_path(dir: &Path) -> std::path::PathBuf {
    dir.join("render.mp4")
}

async fn next_event(events: &mut EventReceiver) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("event timeout")
        .expect("event channel open")
}

#[tokio::test]
async fn test_record_scenario_produces_artifact() {
    let mut h = harness(VideoFilter::None);
    let t0 = Timestamp::from_millis(1000);

    h.controller.restart_capture_session().await;
    assert!(matches!(next_event(&mut h.events).await, SessionEvent::ReadyToRecord));
    assert_eq!(h.controller.state(), PipelineState::ReadyToRecord);

    h.source.set_clock(Some(t0));
    h.controller.record_video_tapped().await;
    assert!(matches!(next_event(&mut h.events).await, SessionEvent::RecordingStarted));
    assert_eq!(h.controller.state(), PipelineState::Recording);

    for ms in [1000, 1033, 1066] {
        h.source.push(ms);
    }

    h.controller.record_video_tapped().await;
    let SessionEvent::VideoCaptured { artifact } = next_event(&mut h.events).await else {
        panic!("expected a video");
    };
    assert!(artifact.duration >= Duration::from_millis(66));
    assert_eq!(artifact.frame_count, 3);
    assert_eq!(artifact.path, h.target.path);
    assert!(artifact.path.exists());
    assert_eq!(h.controller.state(), PipelineState::Initializing);

    // Every frame was also shown on the preview
    let mut shown = 0;
    while h.preview.try_recv().is_ok() {
        shown += 1;
    }
    assert_eq!(shown, 3);
}

#[tokio::test]
async fn test_start_without_clock_does_nothing() {
    let mut h = harness(VideoFilter::None);
    h.controller.restart_capture_session().await;
    next_event(&mut h.events).await;

    h.source.set_clock(None);
    h.controller.record_video_tapped().await;
    h.source.push(10);

    assert_eq!(h.controller.state(), PipelineState::ReadyToRecord);
    assert!(h.events.try_recv().is_err());
    assert!(
        h.probe
            .events()
            .iter()
            .all(|e| matches!(e, SinkEvent::Opened { .. }))
    );
}

#[tokio::test]
async fn test_stop_without_frames_fails_to_idle() {
    let mut h = harness(VideoFilter::None);
    h.controller.restart_capture_session().await;
    next_event(&mut h.events).await;

    h.source.set_clock(Some(Timestamp::ZERO));
    h.controller.record_video_tapped().await;
    next_event(&mut h.events).await;

    h.controller.record_video_tapped().await;
    match next_event(&mut h.events).await {
        SessionEvent::Failed(AppError::Recording(RecordingFailedError::NoFrames)) => {}
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(h.controller.state(), PipelineState::Idle);
    assert!(!h.target.path.exists());
}

#[tokio::test]
async fn test_record_tap_ignored_before_session() {
    let mut h = harness(VideoFilter::None);
    h.source.set_clock(Some(Timestamp::ZERO));

    h.controller.record_video_tapped().await;
    assert_eq!(h.controller.state(), PipelineState::Initializing);
    assert!(h.probe.events().is_empty());
    assert!(h.events.try_recv().is_err());
}

#[tokio::test]
async fn test_source_failure_goes_idle() {
    let mut h = harness(VideoFilter::None);
    h.source.fail_start.store(true, Ordering::SeqCst);

    h.controller.restart_capture_session().await;
    assert!(matches!(
        next_event(&mut h.events).await,
        SessionEvent::Failed(AppError::Device(_))
    ));
    assert_eq!(h.controller.state(), PipelineState::Idle);

    // Stop in idle is a no-op
    h.controller.record_video_tapped().await;
    assert_eq!(h.controller.state(), PipelineState::Idle);
    assert!(h.probe.events().is_empty());
}

#[tokio::test]
async fn test_photo_uses_latest_preview_frame() {
    let mut h = harness(VideoFilter::RemoveBackground);
    h.controller.restart_capture_session().await;
    next_event(&mut h.events).await;

    assert!(!h.controller.take_picture_tapped().await);

    h.source.push(5);
    assert!(h.controller.take_picture_tapped().await);
    let SessionEvent::PhotoCaptured { png } = next_event(&mut h.events).await else {
        panic!("expected a photo");
    };
    let decoded = image::load_from_memory(&png).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (8, 8));
}

#[tokio::test]
async fn test_camera_switch_failure_is_reported() {
    let mut h = harness(VideoFilter::None);
    h.controller.restart_capture_session().await;
    next_event(&mut h.events).await;

    // ManualSource keeps the default, unsupported switch
    h.controller.switch_camera().await;
    assert!(matches!(
        next_event(&mut h.events).await,
        SessionEvent::Failed(AppError::Device(DeviceError::NotAvailable(_)))
    ));
    assert_eq!(h.controller.state(), PipelineState::Idle);

    assert_eq!(h.controller.switch_torch().await, Some(TorchMode::On));
}

#[tokio::test]
async fn test_screen_hidden_finishes_recording() {
    let mut h = harness(VideoFilter::None);
    h.controller.restart_capture_session().await;
    next_event(&mut h.events).await;

    h.source.set_clock(Some(Timestamp::ZERO));
    h.controller.record_video_tapped().await;
    next_event(&mut h.events).await;
    h.source.push(0);
    h.source.push(40);

    h.controller.screen_hidden().await;
    assert!(matches!(
        next_event(&mut h.events).await,
        SessionEvent::VideoCaptured { .. }
    ));
    assert!(!h.source.is_running());
}

#[tokio::test]
async fn test_restart_while_ready_prepares_again() {
    let mut h = harness(VideoFilter::None);
    h.controller.restart_capture_session().await;
    assert!(matches!(next_event(&mut h.events).await, SessionEvent::ReadyToRecord));

    h.controller.restart_capture_session().await;
    assert!(matches!(next_event(&mut h.events).await, SessionEvent::ReadyToRecord));
    assert_eq!(h.controller.state(), PipelineState::ReadyToRecord);
    assert!(h.source.is_running());
}

fn count(probe: &SinkProbe, want: impl Fn(&SinkEvent) -> bool) -> usize {
    probe.events().iter().filter(|e| want(e)).count()
}

#[tokio::test]
async fn test_failure_while_recording_clears_recorder() {
    let mut h = harness(VideoFilter::None);
    h.controller.restart_capture_session().await;
    next_event(&mut h.events).await;

    h.source.set_clock(Some(Timestamp::ZERO));
    h.controller.record_video_tapped().await;
    assert!(matches!(next_event(&mut h.events).await, SessionEvent::RecordingStarted));
    h.source.push(0);

    h.controller
        .report_session_failure(DeviceError::SessionFailed("camera unplugged".into()));
    assert!(matches!(
        next_event(&mut h.events).await,
        SessionEvent::Failed(AppError::Device(DeviceError::SessionFailed(_)))
    ));
    assert_eq!(h.controller.state(), PipelineState::Idle);

    // Frames after the failure are not recorded
    h.source.push(40);
    h.source.push(80);
    h.controller.screen_hidden().await;
    assert!(h.events.try_recv().is_err());

    // The pipeline recovers on the next session
    h.controller.restart_capture_session().await;
    assert!(matches!(next_event(&mut h.events).await, SessionEvent::ReadyToRecord));
    assert_eq!(h.controller.state(), PipelineState::ReadyToRecord);

    assert_eq!(count(&h.probe, |e| matches!(e, SinkEvent::Appended(_))), 1);
    assert_eq!(count(&h.probe, |e| matches!(e, SinkEvent::Finished)), 1);
    assert_eq!(count(&h.probe, |e| matches!(e, SinkEvent::Opened { .. })), 2);
}

#[tokio::test]
async fn test_session_failure_while_ready_recovers() {
    let mut h = harness(VideoFilter::None);
    h.controller.restart_capture_session().await;
    next_event(&mut h.events).await;

    h.controller
        .report_session_failure(DeviceError::NotAvailable("camera busy".into()));
    assert!(matches!(
        next_event(&mut h.events).await,
        SessionEvent::Failed(AppError::Device(DeviceError::NotAvailable(_)))
    ));
    assert_eq!(h.controller.state(), PipelineState::Idle);

    h.source.set_clock(Some(Timestamp::ZERO));
    h.controller.record_video_tapped().await;
    assert_eq!(h.controller.state(), PipelineState::Idle);
    assert!(h.events.try_recv().is_err());

    h.controller.restart_capture_session().await;
    assert!(matches!(next_event(&mut h.events).await, SessionEvent::ReadyToRecord));
}

#[tokio::test]
async fn test_encoder_init_failure_goes_idle() {
    // Odd widths cannot be encoded
    let mut h = sized_harness(VideoFilter::None, 7, 8);
    h.controller.restart_capture_session().await;

    assert!(matches!(
        next_event(&mut h.events).await,
        SessionEvent::Failed(AppError::Encoder(EncoderError::Init(
            EncoderInitError::InvalidTarget(_)
        )))
    ));
    assert_eq!(h.controller.state(), PipelineState::Idle);
    assert!(h.probe.events().is_empty());

    h.source.set_clock(Some(Timestamp::ZERO));
    h.controller.record_video_tapped().await;
    assert_eq!(h.controller.state(), PipelineState::Idle);
}
