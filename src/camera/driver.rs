use crate::error::CameraError;
use chrono::{DateTime, Utc};
use std::fmt;
use std::io::Write;

/// MIME type every preview frame must carry
pub const JPEG_MIME: &str = "image/jpeg";

/// Location of a captured image in the camera's own storage
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CameraFilePath {
    pub folder: String,
    pub name: String,
}

impl CameraFilePath {
    pub fn new<F: Into<String>, N: Into<String>>(folder: F, name: N) -> Self {
        Self {
            folder: folder.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for CameraFilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.folder.ends_with('/') {
            write!(f, "{}{}", self.folder, self.name)
        } else {
            write!(f, "{}/{}", self.folder, self.name)
        }
    }
}

/// A full-resolution still downloaded from the camera
#[derive(Clone)]
pub struct StillImage {
    data: Vec<u8>,
    source: CameraFilePath,
    captured_at: DateTime<Utc>,
}

impl StillImage {
    pub fn new(data: Vec<u8>, source: CameraFilePath) -> Self {
        Self {
            data,
            source,
            captured_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn source(&self) -> &CameraFilePath {
        &self.source
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl fmt::Debug for StillImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StillImage")
            .field("len", &self.data.len())
            .field("source", &self.source)
            .field("captured_at", &self.captured_at)
            .finish()
    }
}

/// An opened camera. Calls are not reentrant; callers serialize them.
pub trait CameraDevice: Send {
    /// Capture one preview frame into `sink`, returning its MIME type
    fn capture_preview(&mut self, sink: &mut dyn Write) -> Result<String, CameraError>;

    /// Trigger a full-resolution capture stored on the device
    fn capture_image(&mut self) -> Result<CameraFilePath, CameraError>;

    /// Download a file from device storage
    fn file_get(&mut self, path: &CameraFilePath) -> Result<Vec<u8>, CameraError>;

    /// Delete a file from device storage
    fn file_delete(&mut self, path: &CameraFilePath) -> Result<(), CameraError>;

    /// Release the device
    fn exit(&mut self) -> Result<(), CameraError>;
}

/// Probes for and opens cameras
pub trait CameraDriver: Send {
    fn name(&self) -> &str;

    /// Open the first available camera. Fails with `InitFailed` when none is attached.
    fn open(&self) -> Result<Box<dyn CameraDevice>, CameraError>;
}
