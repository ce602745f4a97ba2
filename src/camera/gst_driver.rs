use super::driver::{CameraDevice, CameraDriver, CameraFilePath};
use crate::config::{CameraConfig, CameraDriverKind};
use crate::error::CameraError;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};

const PULL_TIMEOUT_SECS: u64 = 2;
const START_TIMEOUT_SECS: u64 = 5;

/// Camera driver backed by a GStreamer capture pipeline.
///
/// Preview frames are re-encoded to JPEG at preview size; stills are the next
/// full-resolution frame, encoded at high quality and parked in an in-memory
/// store that stands in for the camera's own storage.
pub struct GstCameraDriver {
    config: CameraConfig,
}

impl GstCameraDriver {
    pub fn new(config: CameraConfig) -> Self {
        Self { config }
    }

    fn source_description(&self) -> String {
        match self.config.driver {
            CameraDriverKind::V4l2 => format!(
                "v4l2src device={} do-timestamp=true ! decodebin",
                self.config.device
            ),
            CameraDriverKind::TestPattern => format!(
                "videotestsrc is-live=true pattern=smpte ! \
                 video/x-raw,width=1920,height=1280,framerate={}/1",
                self.config.preview_fps
            ),
        }
    }

    fn build_pipeline_string(&self) -> String {
        format!(
            "{} ! videoconvert ! tee name=t \
             t. ! queue max-size-buffers=1 leaky=downstream ! videoscale ! videoconvert ! \
             video/x-raw,width={},height={} ! jpegenc quality=85 ! \
             appsink name=preview sync=false max-buffers=1 drop=true \
             t. ! queue max-size-buffers=1 leaky=downstream ! videoconvert ! jpegenc quality=95 ! \
             appsink name=still sync=false max-buffers=1 drop=true",
            self.source_description(),
            self.config.preview_width,
            self.config.preview_height
        )
    }
}

impl CameraDriver for GstCameraDriver {
    fn name(&self) -> &str {
        match self.config.driver {
            CameraDriverKind::V4l2 => "v4l2",
            CameraDriverKind::TestPattern => "test-pattern",
        }
    }

    fn open(&self) -> Result<Box<dyn CameraDevice>, CameraError> {
        if self.config.driver == CameraDriverKind::V4l2 && !Path::new(&self.config.device).exists()
        {
            return Err(CameraError::InitFailed {
                details: format!("{} not present", self.config.device),
            });
        }

        gst::init().map_err(|e| CameraError::InitFailed {
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;

        let pipeline_desc = self.build_pipeline_string();
        debug!("Creating camera pipeline: {}", pipeline_desc);

        let pipeline = gst::parse::launch(&pipeline_desc)
            .map_err(|e| CameraError::InitFailed {
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<gst::Pipeline>()
            .map_err(|_| CameraError::InitFailed {
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        let preview = appsink_by_name(&pipeline, "preview")?;
        let still = appsink_by_name(&pipeline, "still")?;

        if let Err(e) = pipeline.set_state(gst::State::Playing) {
            let _ = pipeline.set_state(gst::State::Null);
            return Err(CameraError::InitFailed {
                details: format!("Failed to start camera pipeline: {}", e),
            });
        }

        let (result, current, _) = pipeline.state(gst::ClockTime::from_seconds(START_TIMEOUT_SECS));
        if result.is_err() || current != gst::State::Playing {
            let _ = pipeline.set_state(gst::State::Null);
            return Err(CameraError::InitFailed {
                details: format!("Camera pipeline stuck in {:?}", current),
            });
        }

        info!("Camera pipeline running ({})", self.name());
        Ok(Box::new(GstCameraDevice {
            pipeline,
            preview,
            still,
            storage: HashMap::new(),
            next_file: 0,
        }))
    }
}

fn appsink_by_name(pipeline: &gst::Pipeline, name: &str) -> Result<AppSink, CameraError> {
    pipeline
        .by_name(name)
        .ok_or_else(|| CameraError::InitFailed {
            details: format!("Failed to get {} appsink", name),
        })?
        .downcast::<AppSink>()
        .map_err(|_| CameraError::InitFailed {
            details: format!("Failed to downcast {} to AppSink", name),
        })
}

struct GstCameraDevice {
    pipeline: gst::Pipeline,
    preview: AppSink,
    still: AppSink,
    storage: HashMap<CameraFilePath, Vec<u8>>,
    next_file: u32,
}

impl GstCameraDevice {
    /// Map a failed pull to a disconnect when the source posted an error
    fn pull_failure(&self, what: &str) -> CameraError {
        if let Some(bus) = self.pipeline.bus() {
            if let Some(msg) = bus.pop_filtered(&[gst::MessageType::Error]) {
                if let gst::MessageView::Error(err) = msg.view() {
                    warn!("Camera pipeline error: {}", err.error());
                }
                return CameraError::disconnected();
            }
        }
        CameraError::CaptureFailed {
            details: format!("no {} sample within {}s", what, PULL_TIMEOUT_SECS),
        }
    }

    fn pull(&self, sink: &AppSink, what: &str) -> Result<(Vec<u8>, String), CameraError> {
        let sample = sink
            .try_pull_sample(gst::ClockTime::from_seconds(PULL_TIMEOUT_SECS))
            .ok_or_else(|| self.pull_failure(what))?;

        let mime = sample
            .caps()
            .and_then(|caps| caps.structure(0))
            .map(|s| s.name().to_string())
            .unwrap_or_default();

        let buffer = sample.buffer().ok_or_else(|| CameraError::CaptureFailed {
            details: format!("{} sample without buffer", what),
        })?;
        let map = buffer.map_readable().map_err(|_| CameraError::CaptureFailed {
            details: format!("Failed to map {} buffer", what),
        })?;

        Ok((map.as_slice().to_vec(), mime))
    }
}

impl CameraDevice for GstCameraDevice {
    fn capture_preview(&mut self, sink: &mut dyn Write) -> Result<String, CameraError> {
        let (data, mime) = self.pull(&self.preview, "preview")?;
        sink.write_all(&data).map_err(|e| CameraError::CaptureFailed {
            details: format!("Failed to write preview frame: {}", e),
        })?;
        Ok(mime)
    }

    fn capture_image(&mut self) -> Result<CameraFilePath, CameraError> {
        let (data, _) = self.pull(&self.still, "still")?;
        self.next_file += 1;
        let path = CameraFilePath::new("/", format!("capt{:04}.jpg", self.next_file));
        self.storage.insert(path.clone(), data);
        Ok(path)
    }

    fn file_get(&mut self, path: &CameraFilePath) -> Result<Vec<u8>, CameraError> {
        self.storage
            .get(path)
            .cloned()
            .ok_or_else(|| CameraError::FileTransfer {
                path: path.to_string(),
                details: "not in camera storage".to_string(),
            })
    }

    fn file_delete(&mut self, path: &CameraFilePath) -> Result<(), CameraError> {
        self.storage
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| CameraError::FileTransfer {
                path: path.to_string(),
                details: "not in camera storage".to_string(),
            })
    }

    fn exit(&mut self) -> Result<(), CameraError> {
        self.storage.clear();
        self.pipeline
            .set_state(gst::State::Null)
            .map(|_| ())
            .map_err(|e| CameraError::CaptureFailed {
                details: format!("Failed to stop camera pipeline: {}", e),
            })
    }
}
