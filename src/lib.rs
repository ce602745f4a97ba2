pub mod app;
pub mod camera;
pub mod capture;
pub mod config;
pub mod control;
pub mod error;
pub mod events;
pub mod graph;
pub mod operator;
pub mod pipe;
pub mod session;

pub use app::{BoothOrchestrator, BoothParts, ComponentState, ShutdownReason};
pub use camera::{CameraDriver, CameraSession, GstCameraDriver, MockCameraDriver, StillImage};
pub use capture::{CaptureState, CaptureWorker, WorkerExit, WorkerTimings};
pub use config::BoothConfig;
pub use control::{ControlCommand, ControlReceiver, ControlSender};
pub use error::{BoothError, CameraError, ControlError, GraphError, Result};
pub use events::{GraphEvent, OperatorInput, SessionEvent, SessionNotifier};
pub use graph::{GraphBackend, GraphCoordinator, GstGraphBackend, RecordingBackend};
pub use operator::OperatorConsole;
pub use pipe::FrameSinkPipe;
pub use session::{Flow, PhotoBooth, SessionState};
