use super::geometry::{center_rect, VideoRect};
use super::topology::{SubGraphKind, SubGraphState, Topology};
use crate::camera::StillImage;
use crate::error::GraphError;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Primitive operations on the media graph.
///
/// The coordinator sequences these into the switch protocols; backends
/// only carry out one step at a time.
pub trait GraphBackend {
    /// Bring the whole pipeline and the output sub-graph up
    fn start_output(&mut self) -> Result<(), GraphError>;

    fn start(&mut self, kind: SubGraphKind) -> Result<(), GraphError>;

    fn stop(&mut self, kind: SubGraphKind) -> Result<(), GraphError>;

    /// Install a drop-everything probe on the egress pad and wait until
    /// no buffer is in flight across it
    fn block_egress(&mut self, kind: SubGraphKind) -> Result<(), GraphError>;

    fn unblock_egress(&mut self, kind: SubGraphKind) -> Result<(), GraphError>;

    fn link(&mut self, kind: SubGraphKind) -> Result<(), GraphError>;

    fn unlink(&mut self, kind: SubGraphKind) -> Result<(), GraphError>;

    /// Push an encoded still into the photo sub-graph's injection point
    fn push_still(&mut self, still: StillImage) -> Result<(), GraphError>;

    /// Hang the encoder and file writer branch off the photo fan-out
    fn attach_writer(&mut self, location: &Path) -> Result<(), GraphError>;

    fn detach_writer(&mut self) -> Result<(), GraphError>;

    /// Re-filter the preview sub-graph and its overlay to `rect`
    fn resize_preview(&mut self, rect: VideoRect) -> Result<(), GraphError>;

    /// Snapshot the graph as a DOT file (no-op unless dumping is enabled)
    fn dump_dot(&self, name: &str);

    /// Tear everything down
    fn shutdown(&mut self);
}

/// Owns the topology model and drives a backend through the switch protocols
pub struct GraphCoordinator<B: GraphBackend> {
    backend: B,
    topology: Topology,
    writer_location: PathBuf,
    video_size: Option<VideoRect>,
}

impl<B: GraphBackend> GraphCoordinator<B> {
    pub fn new<P: Into<PathBuf>>(backend: B, writer_location: P) -> Self {
        Self {
            backend,
            topology: Topology::default(),
            writer_location: writer_location.into(),
            video_size: None,
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn writer_location(&self) -> &Path {
        &self.writer_location
    }

    pub fn video_size(&self) -> Option<VideoRect> {
        self.video_size
    }

    /// Start the output and park both sources behind drop probes
    pub fn start(&mut self) -> Result<(), GraphError> {
        info!("Starting media graph");
        self.backend.start_output()?;
        for kind in [SubGraphKind::Preview, SubGraphKind::Photo] {
            self.quiesce(kind)?;
        }
        Ok(())
    }

    /// Route the live preview to the output
    pub fn show_preview(&mut self) -> Result<(), GraphError> {
        self.switch_to(SubGraphKind::Preview)?;
        self.backend.dump_dot("photo_booth_video_start");
        Ok(())
    }

    /// Route the photo sub-graph to the output
    pub fn show_photo(&mut self) -> Result<(), GraphError> {
        self.backend.dump_dot("photo_booth_pre_snapshot");
        self.switch_to(SubGraphKind::Photo)
    }

    fn switch_to(&mut self, target: SubGraphKind) -> Result<(), GraphError> {
        if self.topology.linked == Some(target) && self.topology.is_consistent() {
            debug!("{} already on the output", target);
            return Ok(());
        }

        debug!("Switching output to {}", target);

        self.quiesce(target.other())?;

        // Leaving the photo always tears the writer down
        if target == SubGraphKind::Preview {
            self.detach_writer()?;
        }

        if self.topology.status(target).blocked {
            self.backend.unblock_egress(target)?;
            self.topology.status_mut(target).blocked = false;
        }

        if self.topology.linked != Some(target) {
            self.backend.link(target)?;
            self.topology.linked = Some(target);
        }

        self.backend.start(target)?;
        self.topology.status_mut(target).state = SubGraphState::Running;

        info!("Output now fed by {}", target);
        Ok(())
    }

    /// Stop `kind`, block its egress and unlink it. Idempotent.
    fn quiesce(&mut self, kind: SubGraphKind) -> Result<(), GraphError> {
        let status = *self.topology.status(kind);
        if status.state != SubGraphState::Stopped {
            self.topology.status_mut(kind).state = SubGraphState::Quiescing;
            self.backend.stop(kind)?;
        }

        if !status.blocked {
            self.backend.block_egress(kind)?;
            self.topology.status_mut(kind).blocked = true;
        }

        if self.topology.linked == Some(kind) {
            self.backend.unlink(kind)?;
            self.topology.linked = None;
        }

        self.topology.status_mut(kind).state = SubGraphState::Stopped;
        debug!("{} quiesced", kind);
        Ok(())
    }

    /// Hand a captured still to the photo sub-graph
    pub fn inject_still(&mut self, still: StillImage) -> Result<(), GraphError> {
        info!("Injecting still ({} bytes)", still.len());
        self.backend.push_still(still)
    }

    /// Attach the encoder and writer once per photo. Returns whether this
    /// call attached it.
    pub fn attach_writer(&mut self) -> Result<bool, GraphError> {
        if self.topology.writer_attached {
            return Ok(false);
        }
        if self.topology.linked != Some(SubGraphKind::Photo) {
            warn!("Photo writer requested while the photo is not on screen");
            return Ok(false);
        }

        info!(
            "Attaching photo writer for {}",
            self.writer_location.display()
        );
        self.backend.attach_writer(&self.writer_location)?;
        self.topology.writer_attached = true;
        self.backend.dump_dot("photo_booth_video_snapshot_taken");
        Ok(true)
    }

    /// Remove the encoder and writer branch if present
    pub fn detach_writer(&mut self) -> Result<(), GraphError> {
        if !self.topology.writer_attached {
            return Ok(());
        }
        self.backend.detach_writer()?;
        self.topology.writer_attached = false;
        debug!("Photo writer detached");
        Ok(())
    }

    /// Fit the preview into the display surface and re-filter it
    pub fn apply_output_size(
        &mut self,
        preferred: (u32, u32),
        allocated: (u32, u32),
    ) -> Result<VideoRect, GraphError> {
        let src = VideoRect::sized(clamp_dim(preferred.0), clamp_dim(preferred.1));
        let dst = VideoRect::sized(clamp_dim(allocated.0), clamp_dim(allocated.1));
        let rect = center_rect(src, dst, true);

        info!(
            "Display preferred {}x{}, allocated {}x{}, output {}x{}",
            src.w, src.h, dst.w, dst.h, rect.w, rect.h
        );

        if rect.is_empty() {
            warn!("Display size not usable yet, keeping previous output size");
            return Ok(self.video_size.unwrap_or(rect));
        }

        self.backend.resize_preview(rect)?;
        self.video_size = Some(rect);
        Ok(rect)
    }

    pub fn dump_dot(&self, name: &str) {
        self.backend.dump_dot(name);
    }

    pub fn shutdown(&mut self) {
        info!("Shutting down media graph");
        self.backend.shutdown();
        self.topology = Topology::default();
    }
}

fn clamp_dim(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
