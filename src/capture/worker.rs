use crate::camera::{CameraDriver, CameraSession};
use crate::config::CameraConfig;
use crate::control::{ControlCommand, ControlReceiver, ControlSender, PollOutcome};
use crate::error::{BoothError, CameraError, ControlError, Result};
use crate::events::{SessionEvent, SessionNotifier};
use std::fmt;
use std::fs::File;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Mode of the capture worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// No camera yet, probing on a slow timer
    Init,
    /// Streaming preview frames into the frame pipe
    Video,
    /// One still capture requested
    Photo,
    /// Idle, no camera calls
    Paused,
    /// Terminal
    Stop,
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureState::Init => "INIT",
            CaptureState::Video => "VIDEO",
            CaptureState::Photo => "PHOTO",
            CaptureState::Paused => "PAUSED",
            CaptureState::Stop => "STOP",
        };
        f.write_str(name)
    }
}

/// Poll timeouts for each worker mode
#[derive(Debug, Clone, Copy)]
pub struct WorkerTimings {
    pub probe_interval: Duration,
    pub paused_interval: Duration,
    pub frame_interval: Duration,
}

impl WorkerTimings {
    pub fn from_config(config: &CameraConfig) -> Self {
        Self {
            probe_interval: Duration::from_millis(config.probe_interval_ms),
            paused_interval: Duration::from_millis(config.paused_interval_ms),
            frame_interval: Duration::from_millis(1000 / u64::from(config.preview_fps.max(1))),
        }
    }
}

/// What the worker hands back when its thread exits
pub struct WorkerExit {
    pub frames_captured: u64,
    pub stills_captured: u64,
    pub commands_applied: u64,
    /// Still-open camera; the owner closes it after the join
    pub session: Option<CameraSession>,
}

/// Owner-side handle of a running capture worker
pub struct CaptureWorker {
    thread: JoinHandle<WorkerExit>,
    control: ControlSender,
}

impl CaptureWorker {
    /// Spawn the worker thread.
    ///
    /// `sink` is the write side of the frame pipe; `control` is the sender
    /// paired with `receiver`, kept so shutdown can deliver STOP.
    pub fn spawn(
        driver: Box<dyn CameraDriver>,
        sink: File,
        receiver: ControlReceiver,
        control: ControlSender,
        notifier: SessionNotifier,
        timings: WorkerTimings,
    ) -> Result<Self> {
        let worker = WorkerLoop {
            state: CaptureState::Init,
            session: None,
            driver,
            sink,
            receiver,
            notifier,
            timings,
            frames_captured: 0,
            stills_captured: 0,
            commands_applied: 0,
        };

        let thread = thread::Builder::new()
            .name("camera-capture".to_string())
            .spawn(move || worker.run())
            .map_err(|e| BoothError::system(format!("Failed to spawn capture thread: {}", e)))?;

        info!("Capture worker started");
        Ok(Self { thread, control })
    }

    pub fn control(&self) -> &ControlSender {
        &self.control
    }

    /// Deliver STOP, waiting up to `deadline` for room in the channel
    pub fn request_stop(&self, deadline: Duration) -> std::result::Result<(), ControlError> {
        self.control.send_reliable(ControlCommand::Stop, deadline)
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the thread to exit, calling `unblock` between checks.
    ///
    /// `unblock` drains the frame pipe so a worker stalled on a full pipe
    /// can reach its next poll and see STOP.
    pub fn join_with<F: FnMut()>(self, mut unblock: F, tick: Duration) -> Result<WorkerExit> {
        while !self.thread.is_finished() {
            unblock();
            thread::sleep(tick);
        }

        self.thread
            .join()
            .map_err(|_| BoothError::system("Capture thread panicked"))
    }
}

struct WorkerLoop {
    state: CaptureState,
    session: Option<CameraSession>,
    driver: Box<dyn CameraDriver>,
    sink: File,
    receiver: ControlReceiver,
    notifier: SessionNotifier,
    timings: WorkerTimings,
    frames_captured: u64,
    stills_captured: u64,
    commands_applied: u64,
}

impl WorkerLoop {
    fn run(mut self) -> WorkerExit {
        debug!("Capture thread running with driver {}", self.driver.name());

        while self.state != CaptureState::Stop {
            let timeout = self.next_timeout();

            match self.receiver.wait(timeout) {
                Ok(PollOutcome::Timeout) => self.on_timeout(),
                Ok(PollOutcome::Ready) => self.read_command(),
                Ok(PollOutcome::Interrupted) => continue,
                Err(e) => {
                    error!("Control channel poll failed: {}", e);
                    self.state = CaptureState::Stop;
                }
            }
        }

        self.receiver.drain();
        info!(
            "Capture thread exiting, {} frames captured",
            self.frames_captured
        );

        WorkerExit {
            frames_captured: self.frames_captured,
            stills_captured: self.stills_captured,
            commands_applied: self.commands_applied,
            session: self.session.take(),
        }
    }

    /// Probe for a camera if needed and pick the poll timeout for this cycle
    fn next_timeout(&mut self) -> Duration {
        match self.state {
            CaptureState::Init if self.session.is_none() => {
                self.probe();
                // A freshly attached camera streams at the frame cadence
                if self.state == CaptureState::Video {
                    self.timings.frame_interval
                } else {
                    self.timings.probe_interval
                }
            }
            CaptureState::Paused => self.timings.paused_interval,
            _ => self.timings.frame_interval,
        }
    }

    fn probe(&mut self) {
        match CameraSession::init(self.driver.as_ref()) {
            Ok(session) => {
                info!("Camera attached via {}", session.driver_name());
                self.session = Some(session);
                self.state = CaptureState::Video;
                self.notifier.post(SessionEvent::CameraReady);
            }
            Err(e) => debug!("No camera yet: {}", e),
        }
    }

    fn on_timeout(&mut self) {
        match self.state {
            CaptureState::Video => self.capture_preview(),
            CaptureState::Photo => self.capture_still(),
            CaptureState::Paused => trace!("Capture thread paused"),
            CaptureState::Init | CaptureState::Stop => {}
        }
    }

    fn capture_preview(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };

        match session.capture_preview_frame(&mut self.sink) {
            Ok(_) => self.frames_captured += 1,
            Err(e) if e.is_disconnect() => {
                warn!("Camera disconnected during preview");
                self.drop_session();
                self.notifier.post(SessionEvent::CameraLost);
            }
            Err(e) => error!("Preview capture error: {}", e),
        }
    }

    fn capture_still(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };

        let result = session.capture_still().and_then(|()| {
            session
                .take_still()
                .ok_or(CameraError::NotInitialized)
        });

        match result {
            Ok(still) => {
                self.stills_captured += 1;
                info!(
                    "Still captured at {} ({} bytes)",
                    still.captured_at().format("%H:%M:%S%.3f"),
                    still.len()
                );
                // Hold here until the session decides what comes next
                self.state = CaptureState::Paused;
                self.notifier.post(SessionEvent::StillCaptured(still));
            }
            Err(e) => {
                error!("Taking photo failed: {}", e);
                self.drop_session();
                self.notifier.post(SessionEvent::StillFailed {
                    reason: e.to_string(),
                });
            }
        }
    }

    /// Close the camera and go back to probing
    fn drop_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.close();
        }
        self.state = CaptureState::Init;
    }

    /// Apply exactly one pending command
    fn read_command(&mut self) {
        match self.receiver.recv() {
            Ok(Some(command)) => self.apply(command),
            Ok(None) => {}
            Err(ControlError::Closed) => {
                warn!("Control channel closed, stopping capture thread");
                self.state = CaptureState::Stop;
            }
            Err(ControlError::InvalidCommand { byte }) => {
                error!("Illegal control command {:#04x} received", byte);
            }
            Err(e) => {
                error!("Control channel read failed: {}", e);
                self.state = CaptureState::Stop;
            }
        }
    }

    fn apply(&mut self, command: ControlCommand) {
        let next = match command {
            ControlCommand::Stop => {
                self.commands_applied += 1;
                debug!("Control {}: {} -> STOP", command, self.state);
                self.state = CaptureState::Stop;
                return;
            }
            // Without a camera the worker keeps probing; the session is told once one appears
            _ if self.session.is_none() => {
                debug!("{} ignored, no camera attached", command);
                return;
            }
            ControlCommand::Pause => CaptureState::Paused,
            ControlCommand::StartVideo => CaptureState::Video,
            ControlCommand::StartPhoto => CaptureState::Photo,
        };

        debug!("Control {}: {} -> {}", command, self.state, next);
        self.commands_applied += 1;
        self.state = next;
    }
}
