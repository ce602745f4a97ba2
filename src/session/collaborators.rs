use crate::config::{GraphConfig, PrintConfig};
use crate::error::GraphError;
use crate::events::{SessionEvent, SessionNotifier};
use gstreamer as gst;
use gstreamer::prelude::*;
use parking_lot::Mutex;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// The booth's screen: spinner, confirm button, countdown and the display
/// widget the output is rendered into
pub trait BoothSurface: Send {
    fn set_spinner(&mut self, visible: bool);

    fn set_confirm_visible(&mut self, visible: bool);

    fn start_countdown(&mut self, seconds: u32);

    /// Preferred and allocated size of the video widget
    fn display_size(&self) -> ((u32, u32), (u32, u32));

    /// Record a new allocation for the video widget
    fn set_allocated_size(&mut self, size: (u32, u32));

    /// Hook for surfaces that report resizes on their own
    fn attach(&mut self, _notifier: SessionNotifier) {}

    /// Modal error, used for print failures only
    fn show_error(&mut self, message: &str);
}

/// What a surface currently shows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SurfaceState {
    pub spinner: bool,
    pub confirm_visible: bool,
    pub countdowns_started: u32,
    pub errors: Vec<String>,
}

/// Surface without a window. Logs what a GUI would show.
///
/// Clones share state, so a copy kept by the caller sees every change and
/// can resize the surface the booth draws on.
#[derive(Clone)]
pub struct HeadlessSurface {
    preferred: (u32, u32),
    allocated: Arc<Mutex<(u32, u32)>>,
    state: Arc<Mutex<SurfaceState>>,
    notifier: Arc<Mutex<Option<SessionNotifier>>>,
}

impl HeadlessSurface {
    pub fn new(preferred: (u32, u32), allocated: (u32, u32)) -> Self {
        Self {
            preferred,
            allocated: Arc::new(Mutex::new(allocated)),
            state: Arc::new(Mutex::new(SurfaceState::default())),
            notifier: Arc::new(Mutex::new(None)),
        }
    }

    /// Preview-sized video in a display-sized window
    pub fn from_config(graph: &GraphConfig, preview: (u32, u32)) -> Self {
        Self::new(preview, (graph.display_width, graph.display_height))
    }

    pub fn snapshot(&self) -> SurfaceState {
        self.state.lock().clone()
    }

    /// The window changed size. Attached surfaces tell the session.
    pub fn resize(&self, width: u32, height: u32) {
        *self.allocated.lock() = (width, height);
        if let Some(notifier) = self.notifier.lock().as_ref() {
            notifier.post(SessionEvent::SurfaceResized { width, height });
        }
    }
}

impl BoothSurface for HeadlessSurface {
    fn set_spinner(&mut self, visible: bool) {
        let mut state = self.state.lock();
        if state.spinner != visible {
            debug!("Spinner {}", if visible { "shown" } else { "hidden" });
        }
        state.spinner = visible;
    }

    fn set_confirm_visible(&mut self, visible: bool) {
        let mut state = self.state.lock();
        if state.confirm_visible != visible {
            info!(
                "Confirm button {}",
                if visible { "shown" } else { "hidden" }
            );
        }
        state.confirm_visible = visible;
    }

    fn start_countdown(&mut self, seconds: u32) {
        info!("Countdown: {} seconds", seconds);
        self.state.lock().countdowns_started += 1;
    }

    fn display_size(&self) -> ((u32, u32), (u32, u32)) {
        (self.preferred, *self.allocated.lock())
    }

    fn set_allocated_size(&mut self, size: (u32, u32)) {
        *self.allocated.lock() = size;
    }

    fn attach(&mut self, notifier: SessionNotifier) {
        *self.notifier.lock() = Some(notifier);
    }

    fn show_error(&mut self, message: &str) {
        error!("{}", message);
        self.state.lock().errors.push(message.to_string());
    }
}

/// Print configuration remembered between jobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintSettings {
    pub printer: Option<String>,
    pub copies: u32,
}

impl Default for PrintSettings {
    fn default() -> Self {
        Self {
            printer: None,
            copies: 1,
        }
    }
}

/// Result of one print submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrintOutcome {
    Submitted { job: Option<String> },
    Cancelled,
    Failed { message: String },
}

/// Sends finished photos to paper
pub trait Printer: Send {
    fn print(&mut self, image: &Path) -> PrintOutcome;
}

/// Printer that hands the image to a spooler command such as `lp`
pub struct SpoolPrinter {
    program: String,
    args: Vec<String>,
    settings: Option<PrintSettings>,
}

impl SpoolPrinter {
    pub fn from_config(config: &PrintConfig) -> Self {
        let mut words = config.command.split_whitespace().map(str::to_string);
        let program = words.next().unwrap_or_else(|| "lp".to_string());
        Self {
            program,
            args: words.collect(),
            settings: Some(PrintSettings {
                printer: config.printer.clone(),
                copies: config.copies.max(1),
            }),
        }
    }

    /// Settings the next job starts from
    pub fn settings(&self) -> Option<&PrintSettings> {
        self.settings.as_ref()
    }

    fn command_for(&self, image: &Path, settings: &PrintSettings) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(printer) = &settings.printer {
            command.arg("-d").arg(printer);
        }
        if settings.copies > 1 {
            command.arg("-n").arg(settings.copies.to_string());
        }
        command.arg(image);
        command
    }

    /// Submit `image` with `settings`, returning the settings to keep
    fn submit(&self, image: &Path, settings: PrintSettings) -> (PrintOutcome, PrintSettings) {
        debug!("Spooling {} via {}", image.display(), self.program);

        match self.command_for(image, &settings).output() {
            Ok(output) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let job = parse_job_id(&stdout);
                info!("Print job submitted: {}", job.as_deref().unwrap_or("unknown"));
                (PrintOutcome::Submitted { job }, settings)
            }
            Ok(output) => {
                let message = String::from_utf8_lossy(&output.stderr).trim().to_string();
                (
                    PrintOutcome::Failed {
                        message: format!("{} failed: {}", self.program, message),
                    },
                    settings,
                )
            }
            Err(e) => (
                PrintOutcome::Failed {
                    message: format!("cannot run {}: {}", self.program, e),
                },
                settings,
            ),
        }
    }
}

impl Printer for SpoolPrinter {
    fn print(&mut self, image: &Path) -> PrintOutcome {
        let settings = self.settings.take().unwrap_or_default();
        let (outcome, settings) = self.submit(image, settings);
        self.settings = Some(settings);
        outcome
    }
}

/// `lp` reports "request id is booth-12 (1 file(s))"
fn parse_job_id(output: &str) -> Option<String> {
    output
        .split("request id is ")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .map(str::to_string)
}

/// Countdown sound
pub trait AudioCue: Send {
    fn play(&mut self);
    fn stop(&mut self);
}

/// Countdown sound played through a `playbin`; silent without a sound file
pub struct PlaybinCue {
    playbin: Option<gst::Element>,
}

impl PlaybinCue {
    pub fn new(sound: Option<&str>) -> Result<Self, GraphError> {
        let Some(sound) = sound else {
            return Ok(Self::silent());
        };

        let path = Path::new(sound);
        if !path.exists() {
            warn!("Countdown sound {} not found, playing nothing", sound);
            return Ok(Self::silent());
        }

        let absolute = path.canonicalize().map_err(|e| GraphError::StateChange {
            element: "audio-playbin".to_string(),
            details: e.to_string(),
        })?;
        let uri = gst::glib::filename_to_uri(&absolute, None)?;

        gst::init()?;
        let playbin = gst::ElementFactory::make("playbin")
            .name("audio-playbin")
            .property("uri", uri.as_str())
            .build()
            .map_err(|_| GraphError::MissingElement {
                factory: "playbin".to_string(),
                name: "audio-playbin".to_string(),
            })?;

        info!("Countdown sound: {}", uri);
        Ok(Self {
            playbin: Some(playbin),
        })
    }

    pub fn silent() -> Self {
        Self { playbin: None }
    }

    fn set_state(&self, state: gst::State) {
        if let Some(playbin) = &self.playbin {
            if let Err(e) = playbin.set_state(state) {
                warn!("Countdown sound {:?} failed: {}", state, e);
            }
        }
    }
}

impl AudioCue for PlaybinCue {
    fn play(&mut self) {
        // Rewind by going through READY
        self.set_state(gst::State::Ready);
        self.set_state(gst::State::Playing);
    }

    fn stop(&mut self) {
        self.set_state(gst::State::Ready);
    }
}

impl Drop for PlaybinCue {
    fn drop(&mut self) {
        self.set_state(gst::State::Null);
    }
}
