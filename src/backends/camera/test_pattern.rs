// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic capture source
//!
//! Renders a subject square sweeping across a green backdrop, paced at the
//! configured frame rate on a dedicated capture thread. The backdrop uses
//! [`GREEN_SCREEN`] so the chroma-key segmentation backend separates subject
//! from background.

use super::frame_loop::PacedCaptureThread;
use super::types::{
    CameraDirection, DeviceError, DeviceResult, Frame, Orientation, PixelFormat, Timestamp,
    TorchMode,
};
use super::{CaptureSource, FrameCallback};
use std::ops::ControlFlow;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Backdrop colour of the test pattern
pub const GREEN_SCREEN: [u8; 3] = [0, 177, 64];

/// Capture source producing a moving test pattern
pub struct TestPatternSource {
    width: u32,
    height: u32,
    frame_rate: u32,
    epoch: Instant,
    clock_available: AtomicBool,
    direction: Mutex<CameraDirection>,
    torch: Mutex<TorchMode>,
    capture_loop: Mutex<Option<PacedCaptureThread>>,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32, frame_rate: u32) -> Self {
        Self {
            width,
            height,
            frame_rate: frame_rate.max(1),
            epoch: Instant::now(),
            clock_available: AtomicBool::new(true),
            direction: Mutex::new(CameraDirection::Front),
            torch: Mutex::new(TorchMode::Off),
            capture_loop: Mutex::new(None),
        }
    }

    /// Start facing `direction` instead of the front camera
    pub fn with_direction(self, direction: CameraDirection) -> Self {
        if let Ok(mut current) = self.direction.lock() {
            *current = direction;
        }
        self
    }

    /// Simulate a session without a synchronization clock
    pub fn set_clock_available(&self, available: bool) {
        self.clock_available.store(available, Ordering::SeqCst);
    }

    pub fn direction(&self) -> CameraDirection {
        self.direction
            .lock()
            .map(|d| *d)
            .unwrap_or(CameraDirection::Front)
    }

    fn now(&self) -> Timestamp {
        Timestamp::from_duration(self.epoch.elapsed())
    }

    fn frame_period(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.frame_rate as u64)
    }
}

/// Render one RGBA test pattern frame for `tick`
pub fn render_pattern(width: u32, height: u32, tick: u64, torch: TorchMode) -> Vec<u8> {
    let mut data = Vec::with_capacity(width as usize * height as usize * 4);
    let side = (width.min(height) / 3).max(1);
    let travel = width.saturating_sub(side).max(1) as u64;
    // Sweep left to right and back
    let phase = tick % (travel * 2);
    let left = (if phase < travel {
        phase
    } else {
        travel * 2 - phase
    }) as u32;
    let top = height.saturating_sub(side) / 2;
    let boost = if torch == TorchMode::On { 40u8 } else { 0 };

    for y in 0..height {
        for x in 0..width {
            let inside = x >= left && x < left + side && y >= top && y < top + side;
            if inside {
                let r = (255 * (x - left) / side) as u8;
                let b = (255 * (y - top) / side) as u8;
                data.extend_from_slice(&[r.saturating_add(boost), 32, b, 255]);
            } else {
                data.extend_from_slice(&[GREEN_SCREEN[0], GREEN_SCREEN[1], GREEN_SCREEN[2], 255]);
            }
        }
    }
    data
}

impl CaptureSource for TestPatternSource {
    fn start(&self, on_frame: FrameCallback) -> DeviceResult<()> {
        let mut guard = self
            .capture_loop
            .lock()
            .map_err(|_| DeviceError::SessionFailed("capture state poisoned".into()))?;
        if guard.as_ref().is_some_and(|c| c.is_running()) {
            debug!("Test pattern already running");
            return Ok(());
        }
        if self.width == 0 || self.height == 0 {
            return Err(DeviceError::SessionFailed(format!(
                "invalid capture size {}x{}",
                self.width, self.height
            )));
        }

        info!(
            width = self.width,
            height = self.height,
            fps = self.frame_rate,
            "Starting test pattern source"
        );

        let (width, height) = (self.width, self.height);
        let epoch = self.epoch;
        let orientation = if self.direction().is_mirrored() {
            Orientation::UpMirrored
        } else {
            Orientation::Up
        };
        let torch = self.torch.lock().map(|t| *t).unwrap_or_default();

        let capture =
            PacedCaptureThread::spawn("test-pattern", self.frame_period(), move |tick| {
                let timestamp = Timestamp::from_duration(epoch.elapsed());
                let data = render_pattern(width, height, tick * 4, torch);
                let Ok(mut frame) = Frame::new(width, height, PixelFormat::RGBA, data, timestamp)
                else {
                    return ControlFlow::Break(());
                };
                frame.orientation = orientation;
                on_frame(frame);
                ControlFlow::Continue(())
            })?;

        *guard = Some(capture);
        Ok(())
    }

    fn stop(&self) {
        let capture = self.capture_loop.lock().ok().and_then(|mut g| g.take());
        if let Some(mut capture) = capture {
            info!("Stopping test pattern source");
            capture.stop();
        }
    }

    fn is_running(&self) -> bool {
        self.capture_loop
            .lock()
            .map(|g| g.as_ref().is_some_and(|c| c.is_running()))
            .unwrap_or(false)
    }

    fn timestamp_origin(&self) -> Option<Timestamp> {
        if self.clock_available.load(Ordering::SeqCst) && self.is_running() {
            Some(self.now())
        } else {
            None
        }
    }

    fn switch_camera(&self) -> DeviceResult<()> {
        let mut direction = self
            .direction
            .lock()
            .map_err(|_| DeviceError::SessionFailed("capture state poisoned".into()))?;
        *direction = direction.toggled();
        info!(direction = ?*direction, "Switched test pattern camera");
        Ok(())
    }

    fn toggle_torch(&self) -> DeviceResult<TorchMode> {
        if !self.is_running() {
            return Err(DeviceError::CurrentCameraNotSet);
        }
        let mut torch = self
            .torch
            .lock()
            .map_err(|_| DeviceError::TorchFailed("torch state poisoned".into()))?;
        *torch = torch.toggled();
        Ok(*torch)
    }
}

impl Drop for TestPatternSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_pattern_has_subject_and_backdrop() {
        let data = render_pattern(30, 30, 0, TorchMode::Off);
        assert_eq!(data.len(), 30 * 30 * 4);
        // Top-left corner is backdrop
        assert_eq!(&data[0..3], &GREEN_SCREEN);
        // Centre-left is inside the subject square at tick 0
        let idx = (15 * 30 + 1) * 4;
        assert_ne!(&data[idx..idx + 3], &GREEN_SCREEN);
    }

    #[test]
    fn test_source_delivers_frames_with_increasing_timestamps() {
        let source = TestPatternSource::new(16, 16, 200);
        let count = Arc::new(AtomicU32::new(0));
        let last = Arc::new(Mutex::new(None::<Timestamp>));
        let (count_cb, last_cb) = (Arc::clone(&count), Arc::clone(&last));

        source
            .start(Arc::new(move |frame: Frame| {
                let mut last = last_cb.lock().unwrap();
                if let Some(prev) = *last {
                    assert!(frame.timestamp > prev);
                }
                *last = Some(frame.timestamp);
                count_cb.fetch_add(1, Ordering::SeqCst);
            }))
            .expect("start");

        std::thread::sleep(Duration::from_millis(60));
        source.stop();
        assert!(count.load(Ordering::SeqCst) > 0);
        assert!(!source.is_running());
    }

    #[test]
    fn test_timestamp_origin_requires_clock_and_running_session() {
        let source = TestPatternSource::new(8, 8, 30);
        assert!(source.timestamp_origin().is_none());

        source.start(Arc::new(|_| {})).expect("start");
        assert!(source.timestamp_origin().is_some());

        source.set_clock_available(false);
        assert!(source.timestamp_origin().is_none());
        source.stop();
    }

    #[test]
    fn test_torch_requires_running_session() {
        let source = TestPatternSource::new(8, 8, 30);
        assert_eq!(
            source.toggle_torch(),
            Err(DeviceError::CurrentCameraNotSet)
        );
    }

    #[test]
    fn test_direction_sets_frame_orientation() {
        let source = TestPatternSource::new(8, 8, 100).with_direction(CameraDirection::Back);
        assert_eq!(source.direction(), CameraDirection::Back);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = Arc::clone(&seen);
        source
            .start(Arc::new(move |frame: Frame| {
                seen_cb.lock().unwrap().push(frame.orientation);
            }))
            .expect("start");
        std::thread::sleep(Duration::from_millis(40));
        source.stop();

        let seen = seen.lock().unwrap();
        assert!(!seen.is_empty());
        assert!(seen.iter().all(|o| *o == Orientation::Up));
    }
}
