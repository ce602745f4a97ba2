//! Media graph: preview, photo and output sub-graphs and the switching
//! protocols between them.

mod coordinator;
mod geometry;
mod gst_backend;
mod recording;
mod topology;

pub use coordinator::{GraphBackend, GraphCoordinator};
pub use geometry::{center_rect, VideoRect};
pub use gst_backend::GstGraphBackend;
pub use recording::{GraphOp, RecordingBackend};
pub use topology::{SubGraphKind, SubGraphState, SubGraphStatus, Topology};
