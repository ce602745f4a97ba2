use super::coordinator::GraphBackend;
use super::geometry::VideoRect;
use super::topology::SubGraphKind;
use crate::error::GraphError;
use crate::camera::StillImage;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One primitive graph operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphOp {
    StartOutput,
    Start(SubGraphKind),
    Stop(SubGraphKind),
    Block(SubGraphKind),
    Unblock(SubGraphKind),
    Link(SubGraphKind),
    Unlink(SubGraphKind),
    PushStill(usize),
    AttachWriter(PathBuf),
    DetachWriter,
    ResizePreview(VideoRect),
    Shutdown,
}

#[derive(Debug, Default)]
struct Recording {
    ops: Vec<GraphOp>,
    fail_pushes: u32,
}

/// Backend that records operations instead of touching a real pipeline.
///
/// Clones share one log, so a handle kept outside the coordinator can
/// inspect what happened.
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    inner: Arc<Mutex<Recording>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> Vec<GraphOp> {
        self.inner.lock().ops.clone()
    }

    /// Drain the log
    pub fn take_ops(&self) -> Vec<GraphOp> {
        std::mem::take(&mut self.inner.lock().ops)
    }

    /// Make the next `count` still pushes fail
    pub fn fail_next_pushes(&self, count: u32) {
        self.inner.lock().fail_pushes = count;
    }

    pub fn count(&self, op: &GraphOp) -> usize {
        self.inner.lock().ops.iter().filter(|o| *o == op).count()
    }

    fn record(&self, op: GraphOp) {
        self.inner.lock().ops.push(op);
    }
}

impl GraphBackend for RecordingBackend {
    fn start_output(&mut self) -> Result<(), GraphError> {
        self.record(GraphOp::StartOutput);
        Ok(())
    }

    fn start(&mut self, kind: SubGraphKind) -> Result<(), GraphError> {
        self.record(GraphOp::Start(kind));
        Ok(())
    }

    fn stop(&mut self, kind: SubGraphKind) -> Result<(), GraphError> {
        self.record(GraphOp::Stop(kind));
        Ok(())
    }

    fn block_egress(&mut self, kind: SubGraphKind) -> Result<(), GraphError> {
        self.record(GraphOp::Block(kind));
        Ok(())
    }

    fn unblock_egress(&mut self, kind: SubGraphKind) -> Result<(), GraphError> {
        self.record(GraphOp::Unblock(kind));
        Ok(())
    }

    fn link(&mut self, kind: SubGraphKind) -> Result<(), GraphError> {
        self.record(GraphOp::Link(kind));
        Ok(())
    }

    fn unlink(&mut self, kind: SubGraphKind) -> Result<(), GraphError> {
        self.record(GraphOp::Unlink(kind));
        Ok(())
    }

    fn push_still(&mut self, still: StillImage) -> Result<(), GraphError> {
        let mut inner = self.inner.lock();
        if inner.fail_pushes > 0 {
            inner.fail_pushes -= 1;
            return Err(GraphError::Push {
                details: "flushing".to_string(),
            });
        }
        inner.ops.push(GraphOp::PushStill(still.len()));
        Ok(())
    }

    fn attach_writer(&mut self, location: &Path) -> Result<(), GraphError> {
        self.record(GraphOp::AttachWriter(location.to_path_buf()));
        Ok(())
    }

    fn detach_writer(&mut self) -> Result<(), GraphError> {
        self.record(GraphOp::DetachWriter);
        Ok(())
    }

    fn resize_preview(&mut self, rect: VideoRect) -> Result<(), GraphError> {
        self.record(GraphOp::ResizePreview(rect));
        Ok(())
    }

    fn dump_dot(&self, _name: &str) {}

    fn shutdown(&mut self) {
        self.record(GraphOp::Shutdown);
    }
}
