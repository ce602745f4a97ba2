use super::driver::{CameraDevice, CameraDriver, CameraFilePath, JPEG_MIME};
use crate::error::CameraError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tracing::debug;

/// Behaviour and call log shared between a mock driver and its devices
#[derive(Debug, Default)]
pub struct MockCameraState {
    /// Probes that fail before one succeeds
    pub probe_failures: u32,
    /// MIME reported for preview frames (defaults to JPEG)
    pub preview_mime: Option<String>,
    /// Disconnect once after this many successful preview frames
    pub disconnect_after_frames: Option<u64>,
    /// Fail the next still captures
    pub failing_stills: u32,
    /// Bytes returned for every still
    pub still_data: Vec<u8>,

    pub probes: u32,
    pub opened: u32,
    pub preview_captures: u64,
    pub still_captures: u32,
    pub files_deleted: u32,
    pub exits: u32,
    pub stored: HashMap<CameraFilePath, Vec<u8>>,
}

/// Scripted camera used by tests
#[derive(Clone, Default)]
pub struct MockCameraDriver {
    state: Arc<Mutex<MockCameraState>>,
}

impl MockCameraDriver {
    pub fn new() -> Self {
        let driver = Self::default();
        driver.state.lock().still_data = vec![0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10, 0xff, 0xd9];
        driver
    }

    pub fn state(&self) -> Arc<Mutex<MockCameraState>> {
        Arc::clone(&self.state)
    }

    pub fn with_probe_failures(self, failures: u32) -> Self {
        self.state.lock().probe_failures = failures;
        self
    }

    pub fn with_preview_mime(self, mime: &str) -> Self {
        self.state.lock().preview_mime = Some(mime.to_string());
        self
    }

    pub fn with_disconnect_after(self, frames: u64) -> Self {
        self.state.lock().disconnect_after_frames = Some(frames);
        self
    }

    pub fn with_failing_stills(self, count: u32) -> Self {
        self.state.lock().failing_stills = count;
        self
    }
}

impl CameraDriver for MockCameraDriver {
    fn name(&self) -> &str {
        "mock"
    }

    fn open(&self) -> Result<Box<dyn CameraDevice>, CameraError> {
        let mut state = self.state.lock();
        state.probes += 1;
        if state.probe_failures > 0 {
            state.probe_failures -= 1;
            return Err(CameraError::InitFailed {
                details: "no camera attached".to_string(),
            });
        }
        state.opened += 1;
        debug!("Mock camera opened (probe {})", state.probes);

        Ok(Box::new(MockCameraDevice {
            state: Arc::clone(&self.state),
            frames: 0,
            next_file: 0,
        }))
    }
}

struct MockCameraDevice {
    state: Arc<Mutex<MockCameraState>>,
    frames: u64,
    next_file: u32,
}

impl CameraDevice for MockCameraDevice {
    fn capture_preview(&mut self, sink: &mut dyn Write) -> Result<String, CameraError> {
        let mut state = self.state.lock();
        state.preview_captures += 1;

        if let Some(limit) = state.disconnect_after_frames {
            if self.frames >= limit {
                state.disconnect_after_frames = None;
                return Err(CameraError::disconnected());
            }
        }
        self.frames += 1;

        let frame = [0xff, 0xd8, (self.frames & 0xff) as u8, 0xff, 0xd9];
        sink.write_all(&frame)
            .map_err(|e| CameraError::CaptureFailed {
                details: e.to_string(),
            })?;

        Ok(state
            .preview_mime
            .clone()
            .unwrap_or_else(|| JPEG_MIME.to_string()))
    }

    fn capture_image(&mut self) -> Result<CameraFilePath, CameraError> {
        let mut state = self.state.lock();
        state.still_captures += 1;
        if state.failing_stills > 0 {
            state.failing_stills -= 1;
            return Err(CameraError::CaptureFailed {
                details: "shutter failed".to_string(),
            });
        }

        self.next_file += 1;
        let path = CameraFilePath::new("/", format!("capt{:04}.jpg", self.next_file));
        let data = state.still_data.clone();
        state.stored.insert(path.clone(), data);
        Ok(path)
    }

    fn file_get(&mut self, path: &CameraFilePath) -> Result<Vec<u8>, CameraError> {
        self.state
            .lock()
            .stored
            .get(path)
            .cloned()
            .ok_or_else(|| CameraError::FileTransfer {
                path: path.to_string(),
                details: "no such file".to_string(),
            })
    }

    fn file_delete(&mut self, path: &CameraFilePath) -> Result<(), CameraError> {
        let mut state = self.state.lock();
        match state.stored.remove(path) {
            Some(_) => {
                state.files_deleted += 1;
                Ok(())
            }
            None => Err(CameraError::FileTransfer {
                path: path.to_string(),
                details: "no such file".to_string(),
            }),
        }
    }

    fn exit(&mut self) -> Result<(), CameraError> {
        self.state.lock().exits += 1;
        Ok(())
    }
}
