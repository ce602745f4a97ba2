use super::types::ComponentState;
use crate::camera::{CameraDriver, GstCameraDriver};
use crate::capture::CaptureWorker;
use crate::config::BoothConfig;
use crate::control::{self, ControlReceiver, ControlSender};
use crate::error::Result;
use crate::events::{SessionEvent, SessionNotifier};
use crate::graph::{GraphBackend, GraphCoordinator, GstGraphBackend};
use crate::operator::OperatorConsole;
use crate::pipe::FrameSinkPipe;
use crate::session::{
    HeadlessSurface, PhotoBooth, PlaybinCue, SessionParts, SessionSettings, SpoolPrinter,
};
use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::path::PathBuf;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};

/// Pieces an orchestrator is assembled from besides the graph backend
pub struct BoothParts {
    pub driver: Box<dyn CameraDriver>,
    pub session: SessionParts,
}

/// Main application coordinator: owns the pipe, the worker handle and the
/// session state machine, and runs the owner-thread event loop
pub struct BoothOrchestrator<B: GraphBackend> {
    pub(super) config: BoothConfig,
    pub(super) pipe: Option<FrameSinkPipe>,
    pub(super) booth: PhotoBooth<B>,
    pub(super) notifier: SessionNotifier,
    pub(super) events: UnboundedReceiver<SessionEvent>,
    pub(super) control: ControlSender,
    pub(super) control_receiver: Option<ControlReceiver>,
    pub(super) driver: Option<Box<dyn CameraDriver>>,
    pub(super) worker: Option<CaptureWorker>,
    pub(super) console: Option<OperatorConsole>,
    pub(super) component_states: HashMap<String, ComponentState>,
}

impl BoothOrchestrator<GstGraphBackend> {
    /// Build the booth on GStreamer with the configured camera
    pub fn new(config: BoothConfig) -> Result<Self> {
        let sound = config.session.countdown_sound.clone();
        let audio = PlaybinCue::new(sound.as_deref())?;
        let surface = HeadlessSurface::from_config(
            &config.graph,
            (config.camera.preview_width, config.camera.preview_height),
        );

        let parts = BoothParts {
            driver: Box::new(GstCameraDriver::new(config.camera.clone())),
            session: SessionParts {
                surface: Box::new(surface),
                printer: Box::new(SpoolPrinter::from_config(&config.print)),
                audio: Box::new(audio),
            },
        };

        let graph_config = config.graph.clone();
        let camera_config = config.camera.clone();
        Self::assemble(config, parts, move |fd, notifier| {
            Ok(GstGraphBackend::build(
                &graph_config,
                &camera_config,
                fd,
                notifier,
            )?)
        })
    }
}

impl<B: GraphBackend> BoothOrchestrator<B> {
    /// Create the frame pipe and control channel, then build the graph on
    /// the pipe's read side with `make_backend`
    pub fn assemble<F>(config: BoothConfig, parts: BoothParts, make_backend: F) -> Result<Self>
    where
        F: FnOnce(RawFd, SessionNotifier) -> Result<B>,
    {
        info!("Assembling photo booth");

        let pipe = FrameSinkPipe::create(&config.paths.frame_pipe)?;
        let (control, control_receiver) = control::channel()?;
        let (notifier, events) = SessionNotifier::channel();

        let backend = make_backend(pipe.raw_fd(), notifier.clone())?;
        let graph = GraphCoordinator::new(backend, &config.paths.print_output);

        let settings = SessionSettings {
            countdown_seconds: config.session.countdown_seconds,
            print_enabled: config.print.enabled,
            archive_dir: config.paths.archive_dir.as_ref().map(PathBuf::from),
        };
        let booth = PhotoBooth::new(
            graph,
            control.clone(),
            notifier.clone(),
            parts.session,
            settings,
        );

        let mut component_states = HashMap::new();
        for component in ["pipe", "graph", "capture", "console"] {
            component_states.insert(component.to_string(), ComponentState::Stopped);
        }
        component_states.insert("pipe".to_string(), ComponentState::Running);

        Ok(Self {
            config,
            pipe: Some(pipe),
            booth,
            notifier,
            events,
            control,
            control_receiver: Some(control_receiver),
            driver: Some(parts.driver),
            worker: None,
            console: None,
            component_states,
        })
    }

    pub fn booth(&self) -> &PhotoBooth<B> {
        &self.booth
    }

    /// Handle for posting events into the owner loop
    pub fn notifier(&self) -> SessionNotifier {
        self.notifier.clone()
    }

    pub fn config(&self) -> &BoothConfig {
        &self.config
    }

    pub(super) fn set_component_state(&mut self, component: &str, state: ComponentState) {
        self.component_states.insert(component.to_string(), state);
        debug!("Component '{}' state changed to: {:?}", component, state);
    }

    pub fn component_state(&self, component: &str) -> Option<ComponentState> {
        self.component_states.get(component).copied()
    }
}
