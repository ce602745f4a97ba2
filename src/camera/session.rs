use super::driver::{CameraDevice, CameraDriver, StillImage, JPEG_MIME};
use crate::error::CameraError;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, trace, warn};

/// Owns an opened camera and the most recently captured still.
///
/// Every call into the device happens with `device` locked.
pub struct CameraSession {
    driver_name: String,
    device: Mutex<Box<dyn CameraDevice>>,
    still: Mutex<Option<StillImage>>,
    preview_frames: AtomicU64,
    stills: AtomicU64,
}

impl CameraSession {
    /// Probe and open a camera. No session survives a failed probe.
    pub fn init(driver: &dyn CameraDriver) -> Result<Self, CameraError> {
        debug!("Probing camera via {}", driver.name());
        let device = driver.open()?;
        info!("Camera opened via {}", driver.name());

        Ok(Self {
            driver_name: driver.name().to_string(),
            device: Mutex::new(device),
            still: Mutex::new(None),
            preview_frames: AtomicU64::new(0),
            stills: AtomicU64::new(0),
        })
    }

    /// Release the device. Errors are logged, never returned.
    pub fn close(self) {
        let mut device = self.device.lock();
        match device.exit() {
            Ok(()) => info!(
                "Camera closed ({} preview frames, {} stills)",
                self.preview_frames.load(Ordering::Relaxed),
                self.stills.load(Ordering::Relaxed)
            ),
            Err(e) => warn!("Camera exit reported {}", e),
        }
    }

    /// Capture one preview frame into `sink`.
    ///
    /// Frames that are not JPEG are rejected with `UnexpectedMime`.
    pub fn capture_preview_frame(&self, sink: &mut dyn Write) -> Result<u64, CameraError> {
        let mime = {
            let mut device = self.device.lock();
            device.capture_preview(sink)?
        };

        if mime != JPEG_MIME {
            return Err(CameraError::UnexpectedMime { mime });
        }

        let count = self.preview_frames.fetch_add(1, Ordering::Relaxed) + 1;
        trace!("Captured preview frame ({} frames total)", count);
        Ok(count)
    }

    /// Capture a full-resolution still into the session's still buffer.
    ///
    /// The file is removed from device storage once downloaded.
    pub fn capture_still(&self) -> Result<(), CameraError> {
        let mut device = self.device.lock();

        let path = device.capture_image()?;
        debug!("Captured still, path on camera: {}", path);

        let data = match device.file_get(&path) {
            Ok(data) => data,
            Err(e) => {
                if let Err(delete_err) = device.file_delete(&path) {
                    debug!("Cleanup of {} failed: {}", path, delete_err);
                }
                return Err(e);
            }
        };

        if data.is_empty() {
            if let Err(delete_err) = device.file_delete(&path) {
                debug!("Cleanup of {} failed: {}", path, delete_err);
            }
            return Err(CameraError::FileTransfer {
                path: path.to_string(),
                details: "empty file".to_string(),
            });
        }

        if let Err(e) = device.file_delete(&path) {
            warn!("Failed to delete {} from camera storage: {}", path, e);
        }
        drop(device);

        let still = StillImage::new(data, path);
        info!("Still downloaded ({} bytes)", still.len());
        *self.still.lock() = Some(still);
        self.stills.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Hand the last still to the caller. Each capture is taken at most once.
    pub fn take_still(&self) -> Option<StillImage> {
        self.still.lock().take()
    }

    pub fn preview_frame_count(&self) -> u64 {
        self.preview_frames.load(Ordering::Relaxed)
    }

    pub fn still_count(&self) -> u64 {
        self.stills.load(Ordering::Relaxed)
    }

    pub fn driver_name(&self) -> &str {
        &self.driver_name
    }
}
