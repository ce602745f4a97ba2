mod driver;
mod gst_driver;
mod mock;
mod session;

pub use driver::{CameraDevice, CameraDriver, CameraFilePath, StillImage, JPEG_MIME};
pub use gst_driver::GstCameraDriver;
pub use mock::{MockCameraDriver, MockCameraState};
pub use session::CameraSession;
