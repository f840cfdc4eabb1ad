// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! Both capture commands run the full capture controller against the
//! synthetic test-pattern source:
//! - Recording videos
//! - Taking photos
//! - Listing available encoders

use camkit::Config;
use camkit::app::{
    CaptureController, CaptureSettings, EventReceiver, NullPresentationSink, SessionEvent,
};
use camkit::backends::camera::TestPatternSource;
use camkit::backends::camera::types::VideoFilter;
use camkit::backends::segmentation::ChromaKeyBackend;
use camkit::constants::{BitratePreset, format_bitrate};
use camkit::pipelines::video::{
    Encoder, GstSinkFactory, MemorySinkFactory, RecordingController, SinkFactory, VideoCodec,
    available_encoders,
};
use camkit::storage::{ArtifactStore, DirectoryArtifactStore, default_photo_dir};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Overrides on top of the stored configuration
pub struct VideoArgs {
    pub duration: u64,
    pub output: Option<PathBuf>,
    pub codec: Option<VideoCodec>,
    pub bitrate: Option<BitratePreset>,
    pub filter: VideoFilter,
}

/// List the GStreamer encoders that are installed, best first
pub fn list_encoders() -> CliResult {
    gstreamer::init()?;

    let encoders = available_encoders();
    if encoders.is_empty() {
        println!("No supported video encoders found.");
        return Ok(());
    }

    println!("Available encoders:");
    println!();
    for info in encoders {
        let kind = if info.is_hardware { "hardware" } else { "software" };
        println!(
            "  {:<14} {:<6} {:<9} {}",
            info.element_name,
            info.codec.display_name(),
            kind,
            info.display_name
        );
    }
    Ok(())
}

/// Record from the test pattern until the duration elapses or Ctrl+C
pub fn record_video(args: VideoArgs) -> CliResult {
    gstreamer::init()?;

    let mut config = Config::load_or_default();
    if let Some(codec) = args.codec {
        config.codec = codec;
    }
    if let Some(bitrate) = args.bitrate {
        config.bitrate_preset = bitrate;
    }
    config.video_filter = args.filter;

    let target = config.render_target();
    println!(
        "Recording format: {}x{} @ {}fps ({}, {})",
        target.width,
        target.height,
        target.frame_rate,
        config.codec.display_name(),
        format_bitrate(config.bitrate_preset.bitrate_kbps(target.width, target.height))
    );

    let stop_flag = install_stop_handler()?;
    let (controller, events) =
        build_controller(&config, GstSinkFactory::new(config.bitrate_preset))?;
    let store = DirectoryArtifactStore::new(config.output_dir());

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_recording(controller, events, store, args, stop_flag))
}

async fn run_recording(
    controller: CaptureController<GstSinkFactory>,
    mut events: EventReceiver,
    store: DirectoryArtifactStore,
    args: VideoArgs,
    stop_flag: Arc<AtomicBool>,
) -> CliResult {
    controller.restart_capture_session().await;
    wait_for(&mut events, |e| matches!(e, SessionEvent::ReadyToRecord)).await?;

    controller.record_video_tapped().await;
    wait_for(&mut events, |e| matches!(e, SessionEvent::RecordingStarted)).await?;

    println!();
    println!("Recording... (press Ctrl+C to stop early)");
    let start = Instant::now();
    let target_duration = Duration::from_secs(args.duration);
    while start.elapsed() < target_duration {
        if stop_flag.load(Ordering::SeqCst) {
            println!();
            println!("Stopping early...");
            break;
        }
        let elapsed = start.elapsed().as_secs();
        print!("\rRecording: {:02}:{:02}", elapsed / 60, elapsed % 60);
        std::io::Write::flush(&mut std::io::stdout())?;
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    println!();

    controller.record_video_tapped().await;
    let event = wait_for(&mut events, |e| {
        matches!(e, SessionEvent::VideoCaptured { .. })
    })
    .await;
    controller.screen_hidden().await;

    let SessionEvent::VideoCaptured { artifact } = event? else {
        return Err("Recording produced no video".into());
    };
    println!(
        "Captured {} frames ({} dropped) in {:.1}s",
        artifact.frame_count,
        artifact.dropped_frames,
        artifact.duration.as_secs_f64()
    );

    match args.output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(&artifact.path, &path)?;
            println!("Video saved: {}", path.display());
        }
        None => {
            let saved = store.save_video(&artifact)?;
            println!("Video saved: {}", saved.video.display());
            println!("Thumbnail: {}", saved.thumbnail.display());
        }
    }
    Ok(())
}

/// Take a photo of the (optionally filtered) test pattern
pub fn take_photo(output: Option<PathBuf>, filter: VideoFilter) -> CliResult {
    let mut config = Config::load_or_default();
    config.video_filter = filter;

    // Photos never reach an encoder, so no GStreamer is needed
    let (controller, events) =
        build_controller(&config, MemorySinkFactory::new())?;

    let rt = tokio::runtime::Runtime::new()?;
    let png = rt.block_on(capture_photo(controller, events))?;

    let path = match output {
        Some(path) if !path.is_dir() => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, &png)?;
            path
        }
        Some(dir) => DirectoryArtifactStore::new(dir).save_photo(&png)?,
        None => DirectoryArtifactStore::new(default_photo_dir()).save_photo(&png)?,
    };
    println!("Photo saved: {}", path.display());
    Ok(())
}

async fn capture_photo<F: SinkFactory>(
    controller: CaptureController<F>,
    mut events: EventReceiver,
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    controller.restart_capture_session().await;
    wait_for(&mut events, |e| matches!(e, SessionEvent::ReadyToRecord)).await?;

    // Camera warm-up: wait for the first frames to arrive
    let deadline = Instant::now() + Duration::from_secs(5);
    let result = loop {
        if controller.take_picture_tapped().await {
            let event = wait_for(&mut events, |e| {
                matches!(e, SessionEvent::PhotoCaptured { .. })
            })
            .await;
            match event {
                Ok(SessionEvent::PhotoCaptured { png }) => break Ok(png),
                Ok(_) => {}
                Err(e) => break Err(e),
            }
        }
        if Instant::now() > deadline {
            break Err("Failed to capture frame from camera".into());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    };
    controller.screen_hidden().await;
    result
}

fn install_stop_handler() -> Result<Arc<AtomicBool>, Box<dyn std::error::Error>> {
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;
    Ok(stop_flag)
}

fn build_controller<F: SinkFactory>(
    config: &Config,
    factory: F,
) -> Result<(CaptureController<F>, EventReceiver), Box<dyn std::error::Error>> {
    let target = config.render_target();
    let source = Arc::new(
        TestPatternSource::new(target.width, target.height, target.frame_rate)
            .with_direction(config.camera_direction),
    );
    let recorder = RecordingController::new(Encoder::new(factory))?;
    let settings = CaptureSettings {
        target,
        filter: config.video_filter,
        mirror_preview: config.mirror_preview,
    };
    Ok(CaptureController::new(
        source,
        recorder,
        Arc::new(ChromaKeyBackend::default()),
        Arc::new(NullPresentationSink),
        settings,
    ))
}

/// Wait for the first event matching `want`, failing on a session failure
async fn wait_for(
    events: &mut EventReceiver,
    want: impl Fn(&SessionEvent) -> bool,
) -> Result<SessionEvent, Box<dyn std::error::Error>> {
    while let Some(event) = events.recv().await {
        if let SessionEvent::Failed(e) = event {
            return Err(e.into());
        }
        if want(&event) {
            return Ok(event);
        }
    }
    Err("Capture session ended".into())
}
