use super::collaborators::{AudioCue, BoothSurface, PrintOutcome, Printer};
use super::state::{countdown_delay, SessionState};
use crate::camera::StillImage;
use crate::control::{ControlCommand, ControlSender};
use crate::error::GraphError;
use crate::events::{GraphEvent, OperatorInput, SessionEvent, SessionNotifier};
use crate::graph::{GraphBackend, GraphCoordinator, VideoRect};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// What the owner loop should do after an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Orderly shutdown was asked for
    Shutdown(String),
    /// The media graph broke; stop with a failure status
    Failed(String),
}

/// Collaborators the session drives besides the graph
pub struct SessionParts {
    pub surface: Box<dyn BoothSurface>,
    pub printer: Box<dyn Printer>,
    pub audio: Box<dyn AudioCue>,
}

/// Session-level settings
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub countdown_seconds: u32,
    pub print_enabled: bool,
    pub archive_dir: Option<PathBuf>,
}

struct Countdown {
    visit: Uuid,
    timer: JoinHandle<()>,
}

/// The booth's state machine.
///
/// Lives on the owner thread and is the only thing that touches the graph.
/// Worker results, graph bus messages, timers and operator input all reach
/// it as [`SessionEvent`]s through [`PhotoBooth::handle`].
pub struct PhotoBooth<B: GraphBackend> {
    graph: GraphCoordinator<B>,
    control: ControlSender,
    notifier: SessionNotifier,
    parts: SessionParts,
    settings: SessionSettings,
    state: SessionState,
    state_tx: watch::Sender<SessionState>,
    faces_tx: watch::Sender<Vec<VideoRect>>,
    camera_ready: bool,
    countdown: Option<Countdown>,
    visit: Option<Uuid>,
    photo_written: Option<PathBuf>,
}

impl<B: GraphBackend> PhotoBooth<B> {
    pub fn new(
        graph: GraphCoordinator<B>,
        control: ControlSender,
        notifier: SessionNotifier,
        mut parts: SessionParts,
        settings: SessionSettings,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::None);
        let (faces_tx, _) = watch::channel(Vec::new());
        parts.surface.attach(notifier.clone());
        Self {
            graph,
            control,
            notifier,
            parts,
            settings,
            state: SessionState::None,
            state_tx,
            faces_tx,
            camera_ready: false,
            countdown: None,
            visit: None,
            photo_written: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Follow state changes, e.g. for a decorative overlay
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Faces found in the latest preview frame, in preview pixels
    pub fn subscribe_faces(&self) -> watch::Receiver<Vec<VideoRect>> {
        self.faces_tx.subscribe()
    }

    pub fn graph(&self) -> &GraphCoordinator<B> {
        &self.graph
    }

    pub fn camera_ready(&self) -> bool {
        self.camera_ready
    }

    pub fn countdown_pending(&self) -> bool {
        self.countdown.is_some()
    }

    /// Bring the graph up. The spinner stays on until a camera shows up.
    pub fn start(&mut self) -> Result<(), GraphError> {
        self.parts.surface.set_spinner(true);
        self.parts.surface.set_confirm_visible(false);
        self.graph.start()
    }

    /// Apply one event
    pub fn handle(&mut self, event: SessionEvent) -> Flow {
        debug!(state = %self.state, "Handling {}", event.event_type());

        let result = match event {
            SessionEvent::CameraReady => self.on_camera_ready(),
            SessionEvent::CameraLost => self.on_camera_lost(),
            SessionEvent::StillCaptured(still) => self.on_still(still),
            SessionEvent::StillFailed { reason } => self.on_still_failed(&reason),
            SessionEvent::CountdownElapsed { visit } => self.on_countdown_elapsed(visit),
            SessionEvent::Operator(OperatorInput::BackgroundClicked) => self.on_click(),
            SessionEvent::Operator(OperatorInput::ConfirmClicked) => self.on_confirm(),
            SessionEvent::SurfaceResized { width, height } => {
                self.parts.surface.set_allocated_size((width, height));
                let (preferred, _) = self.parts.surface.display_size();
                self.graph
                    .apply_output_size(preferred, (width, height))
                    .map(|_| ())
            }
            SessionEvent::Graph(event) => return self.on_graph(event),
            SessionEvent::ShutdownRequested { reason } => return Flow::Shutdown(reason),
        };

        match result {
            Ok(()) => Flow::Continue,
            Err(e) => {
                error!("Media graph failed: {}", e);
                Flow::Failed(format!("media graph failed: {}", e))
            }
        }
    }

    fn on_graph(&mut self, event: GraphEvent) -> Flow {
        let result = match event {
            GraphEvent::PreviewPlaying => {
                self.send(ControlCommand::StartVideo);
                Ok(())
            }
            GraphEvent::OutputPrerolled => {
                let (preferred, allocated) = self.parts.surface.display_size();
                self.graph.apply_output_size(preferred, allocated).map(|_| ())
            }
            GraphEvent::OutputPlaying => {
                if self.camera_ready && !self.state.is_busy() {
                    self.parts.surface.set_spinner(false);
                }
                Ok(())
            }
            GraphEvent::PhotoBuffer => self.on_photo_buffer(),
            GraphEvent::PhotoWritten { path } => self.on_photo_written(path),
            GraphEvent::Faces(faces) => {
                self.faces_tx.send_replace(faces);
                Ok(())
            }
            GraphEvent::Warning { message } => {
                warn!("Media graph warning: {}", message);
                Ok(())
            }
            GraphEvent::Error { message } => {
                error!("Media graph error: {}", message);
                return Flow::Failed(message);
            }
            GraphEvent::EndOfStream => {
                info!("Media graph reached end of stream");
                return Flow::Failed("end of stream".to_string());
            }
        };

        match result {
            Ok(()) => Flow::Continue,
            Err(e) => {
                error!("Media graph failed: {}", e);
                Flow::Failed(format!("media graph failed: {}", e))
            }
        }
    }

    fn on_camera_ready(&mut self) -> Result<(), GraphError> {
        self.camera_ready = true;
        match self.state {
            // Keep the photo on screen; resume the stream on the way back
            SessionState::WaitingForAnswer | SessionState::Printing => {
                self.send(ControlCommand::Pause);
                Ok(())
            }
            _ => {
                self.parts.surface.set_spinner(false);
                self.enter_preview()
            }
        }
    }

    fn on_camera_lost(&mut self) -> Result<(), GraphError> {
        warn!("Camera lost, waiting for it to come back");
        self.camera_ready = false;
        self.cancel_countdown();

        if self.state.is_busy() {
            self.parts.surface.set_spinner(false);
            self.enter_preview()?;
        }
        Ok(())
    }

    fn on_click(&mut self) -> Result<(), GraphError> {
        match self.state {
            SessionState::Preview => {
                self.start_countdown();
                Ok(())
            }
            SessionState::TakingPhoto | SessionState::ProcessPhoto => {
                debug!("Busy, click ignored");
                Ok(())
            }
            SessionState::WaitingForAnswer | SessionState::Printing => {
                info!(visit = ?self.visit, "Operator asked for a retry");
                self.enter_preview()
            }
            SessionState::None => {
                debug!("No camera yet, click ignored");
                Ok(())
            }
        }
    }

    fn start_countdown(&mut self) {
        if self.countdown.is_some() {
            debug!("Countdown already running");
            return;
        }
        if !self.camera_ready {
            debug!("No camera, countdown not started");
            return;
        }

        let visit = Uuid::new_v4();
        let seconds = self.settings.countdown_seconds;
        let delay = countdown_delay(seconds);
        info!(visit = %visit, "Countdown started ({} s, shutter after {:?})", seconds, delay);

        let notifier = self.notifier.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            notifier.post(SessionEvent::CountdownElapsed { visit });
        });

        self.countdown = Some(Countdown { visit, timer });
        self.visit = Some(visit);
        self.parts.surface.start_countdown(seconds);
        self.parts.audio.play();
    }

    fn cancel_countdown(&mut self) {
        if let Some(countdown) = self.countdown.take() {
            debug!(visit = %countdown.visit, "Countdown cancelled");
            countdown.timer.abort();
            self.parts.audio.stop();
        }
    }

    fn on_countdown_elapsed(&mut self, visit: Uuid) -> Result<(), GraphError> {
        match &self.countdown {
            Some(countdown) if countdown.visit == visit => {}
            _ => {
                debug!(visit = %visit, "Stale countdown ignored");
                return Ok(());
            }
        }
        self.countdown = None;
        self.parts.audio.stop();

        if self.state != SessionState::Preview || !self.camera_ready {
            warn!(visit = %visit, "Countdown ran out but no photo can be taken now");
            return Ok(());
        }

        self.set_state(SessionState::TakingPhoto);
        self.parts.surface.set_spinner(true);
        self.graph.show_photo()?;
        self.send(ControlCommand::StartPhoto);
        Ok(())
    }

    fn on_still(&mut self, still: StillImage) -> Result<(), GraphError> {
        if self.state != SessionState::TakingPhoto {
            warn!(
                "Still from {} arrived in {}, dropped",
                still.source(),
                self.state
            );
            return Ok(());
        }

        info!(visit = ?self.visit, "Still captured: {} ({} bytes)", still.source(), still.len());
        if let Err(e) = self.graph.inject_still(still) {
            warn!("Photo could not be shown: {}", e);
            self.parts.surface.set_spinner(false);
            return self.enter_preview();
        }
        self.send(ControlCommand::Pause);
        Ok(())
    }

    fn on_still_failed(&mut self, reason: &str) -> Result<(), GraphError> {
        warn!(visit = ?self.visit, "Still capture failed: {}", reason);
        self.camera_ready = false;
        self.parts.surface.set_spinner(false);
        if self.state.is_busy() {
            self.enter_preview()?;
        }
        Ok(())
    }

    fn on_photo_buffer(&mut self) -> Result<(), GraphError> {
        match self.state {
            SessionState::TakingPhoto => {
                self.set_state(SessionState::ProcessPhoto);
                self.parts.surface.set_spinner(false);
                self.parts.surface.set_confirm_visible(true);
            }
            SessionState::ProcessPhoto => {
                if self.graph.attach_writer()? || self.graph.topology().writer_attached {
                    self.set_state(SessionState::WaitingForAnswer);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn on_confirm(&mut self) -> Result<(), GraphError> {
        if self.state != SessionState::WaitingForAnswer {
            debug!("Confirm in {} ignored", self.state);
            return Ok(());
        }

        info!(visit = ?self.visit, "Operator accepted the photo");
        self.parts.surface.set_confirm_visible(false);
        self.set_state(SessionState::Printing);
        self.graph.dump_dot("photo_booth_photo_print");

        match self.photo_written.take() {
            Some(path) => self.finish_print(&path),
            None => {
                debug!("Waiting for the photo file");
                Ok(())
            }
        }
    }

    fn on_photo_written(&mut self, path: PathBuf) -> Result<(), GraphError> {
        info!("Photo written to {}", path.display());
        match self.state {
            SessionState::Printing => self.finish_print(&path),
            SessionState::WaitingForAnswer | SessionState::ProcessPhoto => {
                self.photo_written = Some(path);
                Ok(())
            }
            _ => {
                debug!("Photo file arrived after the visit ended");
                Ok(())
            }
        }
    }

    fn finish_print(&mut self, path: &Path) -> Result<(), GraphError> {
        if let Some(dir) = self.settings.archive_dir.clone() {
            archive_photo(&dir, path);
        }

        if self.settings.print_enabled {
            match self.parts.printer.print(path) {
                PrintOutcome::Submitted { job } => {
                    info!(visit = ?self.visit, "Print submitted (job {:?})", job);
                }
                PrintOutcome::Cancelled => info!("Print cancelled"),
                PrintOutcome::Failed { message } => {
                    self.parts
                        .surface
                        .show_error(&format!("Print error: {}", message));
                }
            }
        } else {
            debug!("Printing disabled");
        }

        self.enter_preview()
    }

    fn enter_preview(&mut self) -> Result<(), GraphError> {
        self.parts.surface.set_confirm_visible(false);
        self.photo_written = None;
        self.graph.show_preview()?;
        if self.state != SessionState::Preview {
            self.visit = None;
            self.set_state(SessionState::Preview);
        }
        Ok(())
    }

    fn set_state(&mut self, state: SessionState) {
        info!(visit = ?self.visit, "Session {} -> {}", self.state, state);
        self.state = state;
        self.state_tx.send_replace(state);
    }

    fn send(&self, command: ControlCommand) {
        if !self.control.send(command) {
            warn!("Capture worker did not take {}", command);
        }
    }

    /// Stop timers, sound and the graph
    pub fn shutdown(&mut self) {
        self.cancel_countdown();
        self.parts.audio.stop();
        self.graph.shutdown();
    }
}

fn archive_photo(dir: &Path, photo: &Path) {
    let name = chrono::Local::now()
        .format("photobooth-%Y%m%d-%H%M%S.jpg")
        .to_string();
    let target = dir.join(name);

    let result = std::fs::create_dir_all(dir).and_then(|_| std::fs::copy(photo, &target));
    match result {
        Ok(bytes) => info!("Archived photo to {} ({} bytes)", target.display(), bytes),
        Err(e) => warn!("Could not archive {}: {}", photo.display(), e),
    }
}
