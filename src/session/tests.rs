use super::*;
use crate::camera::{CameraFilePath, StillImage};
use crate::control::{self, ControlCommand, ControlReceiver};
use crate::events::{GraphEvent, OperatorInput, SessionEvent, SessionNotifier};
use crate::graph::{GraphCoordinator, GraphOp, RecordingBackend, SubGraphKind, VideoRect};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

/// Printer that remembers what it was asked to print
#[derive(Clone)]
struct RecordingPrinter {
    jobs: Arc<Mutex<Vec<PathBuf>>>,
    outcome: PrintOutcome,
}

impl RecordingPrinter {
    fn new(outcome: PrintOutcome) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(Vec::new())),
            outcome,
        }
    }

    fn jobs(&self) -> Vec<PathBuf> {
        self.jobs.lock().clone()
    }
}

impl Printer for RecordingPrinter {
    fn print(&mut self, image: &Path) -> PrintOutcome {
        self.jobs.lock().push(image.to_path_buf());
        self.outcome.clone()
    }
}

#[derive(Clone, Default)]
struct CountingCue {
    plays: Arc<Mutex<u32>>,
    stops: Arc<Mutex<u32>>,
}

impl AudioCue for CountingCue {
    fn play(&mut self) {
        *self.plays.lock() += 1;
    }

    fn stop(&mut self) {
        *self.stops.lock() += 1;
    }
}

struct Harness {
    booth: PhotoBooth<RecordingBackend>,
    backend: RecordingBackend,
    surface: HeadlessSurface,
    printer: RecordingPrinter,
    cue: CountingCue,
    worker: ControlReceiver,
    events: UnboundedReceiver<SessionEvent>,
}

impl Harness {
    fn new() -> Self {
        Self::with(PrintOutcome::Submitted { job: None }, None)
    }

    fn with(outcome: PrintOutcome, archive_dir: Option<PathBuf>) -> Self {
        let backend = RecordingBackend::new();
        let graph = GraphCoordinator::new(backend.clone(), "PHOTOBOOTH-PRINT.JPG");
        let (control, worker) = control::channel().unwrap();
        let (notifier, events) = SessionNotifier::channel();
        let surface = HeadlessSurface::new((640, 424), (1280, 800));
        let printer = RecordingPrinter::new(outcome);
        let cue = CountingCue::default();

        let mut booth = PhotoBooth::new(
            graph,
            control,
            notifier,
            SessionParts {
                surface: Box::new(surface.clone()),
                printer: Box::new(printer.clone()),
                audio: Box::new(cue.clone()),
            },
            SessionSettings {
                countdown_seconds: 5,
                print_enabled: true,
                archive_dir,
            },
        );
        booth.start().unwrap();

        Self {
            booth,
            backend,
            surface,
            printer,
            cue,
            worker,
            events,
        }
    }

    fn handle(&mut self, event: SessionEvent) -> Flow {
        self.booth.handle(event)
    }

    fn click(&mut self) {
        assert_eq!(
            self.handle(SessionEvent::Operator(OperatorInput::BackgroundClicked)),
            Flow::Continue
        );
    }

    fn graph_event(&mut self, event: GraphEvent) -> Flow {
        self.handle(SessionEvent::Graph(event))
    }

    /// Commands the worker would have read so far
    fn sent(&self) -> Vec<ControlCommand> {
        let mut commands = Vec::new();
        while let Ok(Some(command)) = self.worker.recv() {
            commands.push(command);
        }
        commands
    }

    /// Camera attached, preview on screen, logs cleared
    fn ready(mut self) -> Self {
        assert_eq!(self.handle(SessionEvent::CameraReady), Flow::Continue);
        self.backend.take_ops();
        self.sent();
        self
    }

    /// Click and let the countdown run out
    async fn take_photo(&mut self) {
        self.click();
        match self.events.recv().await {
            Some(event @ SessionEvent::CountdownElapsed { .. }) => {
                assert_eq!(self.handle(event), Flow::Continue);
            }
            other => panic!("Expected countdown, got {:?}", other),
        }
    }

    /// Drive a visit up to the confirm question
    async fn waiting_for_answer(&mut self) {
        self.take_photo().await;
        self.handle(SessionEvent::StillCaptured(still()));
        self.graph_event(GraphEvent::PhotoBuffer);
        self.graph_event(GraphEvent::PhotoBuffer);
        assert_eq!(self.booth.state(), SessionState::WaitingForAnswer);
    }
}

fn still() -> StillImage {
    StillImage::new(vec![0xff, 0xd8, 0xff, 0xd9], CameraFilePath::new("/", "capt0001.jpg"))
}

#[tokio::test(start_paused = true)]
async fn test_camera_ready_enters_preview() {
    let mut harness = Harness::new();
    assert_eq!(harness.booth.state(), SessionState::None);
    assert!(harness.surface.snapshot().spinner);
    harness.backend.take_ops();

    harness.handle(SessionEvent::CameraReady);

    assert_eq!(harness.booth.state(), SessionState::Preview);
    assert!(!harness.surface.snapshot().spinner);
    assert_eq!(
        harness.backend.ops(),
        vec![
            GraphOp::Unblock(SubGraphKind::Preview),
            GraphOp::Link(SubGraphKind::Preview),
            GraphOp::Start(SubGraphKind::Preview),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_preview_playing_starts_video() {
    let mut harness = Harness::new().ready();
    harness.graph_event(GraphEvent::PreviewPlaying);
    assert_eq!(harness.sent(), vec![ControlCommand::StartVideo]);
}

#[tokio::test(start_paused = true)]
async fn test_countdown_fires_shutter() {
    let mut harness = Harness::new().ready();
    let started = tokio::time::Instant::now();

    harness.take_photo().await;

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(4900) && elapsed < Duration::from_secs(5));
    assert_eq!(harness.booth.state(), SessionState::TakingPhoto);
    assert!(harness.surface.snapshot().spinner);
    assert_eq!(harness.surface.snapshot().countdowns_started, 1);
    assert_eq!(*harness.cue.plays.lock(), 1);
    assert_eq!(*harness.cue.stops.lock(), 1);
    assert_eq!(harness.booth.graph().topology().linked, Some(SubGraphKind::Photo));
    assert_eq!(harness.sent(), vec![ControlCommand::StartPhoto]);
}

#[tokio::test(start_paused = true)]
async fn test_second_click_during_countdown_is_ignored() {
    let mut harness = Harness::new().ready();
    harness.click();
    harness.click();
    assert_eq!(harness.surface.snapshot().countdowns_started, 1);
    assert!(harness.booth.countdown_pending());
}

#[tokio::test(start_paused = true)]
async fn test_click_without_camera_is_ignored() {
    let mut harness = Harness::new();
    harness.click();
    assert!(!harness.booth.countdown_pending());
    assert_eq!(harness.booth.state(), SessionState::None);
}

#[tokio::test(start_paused = true)]
async fn test_click_while_taking_photo_is_noop() {
    let mut harness = Harness::new().ready();
    harness.take_photo().await;
    harness.backend.take_ops();

    harness.click();
    assert_eq!(harness.booth.state(), SessionState::TakingPhoto);
    assert!(!harness.booth.countdown_pending());
    assert!(harness.backend.ops().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_photo_progresses_on_buffers() {
    let mut harness = Harness::new().ready();
    harness.take_photo().await;
    harness.sent();

    harness.handle(SessionEvent::StillCaptured(still()));
    assert_eq!(harness.backend.count(&GraphOp::PushStill(4)), 1);
    assert_eq!(harness.sent(), vec![ControlCommand::Pause]);
    assert_eq!(harness.booth.state(), SessionState::TakingPhoto);

    harness.graph_event(GraphEvent::PhotoBuffer);
    assert_eq!(harness.booth.state(), SessionState::ProcessPhoto);
    let surface = harness.surface.snapshot();
    assert!(!surface.spinner);
    assert!(surface.confirm_visible);

    harness.graph_event(GraphEvent::PhotoBuffer);
    assert_eq!(harness.booth.state(), SessionState::WaitingForAnswer);
    assert!(harness.booth.graph().topology().writer_attached);

    // Further buffers change nothing
    harness.graph_event(GraphEvent::PhotoBuffer);
    assert_eq!(
        harness
            .backend
            .count(&GraphOp::AttachWriter(PathBuf::from("PHOTOBOOTH-PRINT.JPG"))),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_confirm_hides_button_then_prints() {
    let mut harness = Harness::new().ready();
    harness.waiting_for_answer().await;

    harness.handle(SessionEvent::Operator(OperatorInput::ConfirmClicked));
    assert_eq!(harness.booth.state(), SessionState::Printing);
    assert!(!harness.surface.snapshot().confirm_visible);
    assert!(harness.printer.jobs().is_empty());

    harness.graph_event(GraphEvent::PhotoWritten {
        path: PathBuf::from("PHOTOBOOTH-PRINT.JPG"),
    });
    assert_eq!(harness.printer.jobs(), vec![PathBuf::from("PHOTOBOOTH-PRINT.JPG")]);
    assert_eq!(harness.booth.state(), SessionState::Preview);
    assert_eq!(harness.backend.count(&GraphOp::DetachWriter), 1);
    assert!(harness.booth.graph().topology().is_consistent());
}

#[tokio::test(start_paused = true)]
async fn test_confirm_after_photo_written_prints_at_once() {
    let mut harness = Harness::new().ready();
    harness.waiting_for_answer().await;
    harness.graph_event(GraphEvent::PhotoWritten {
        path: PathBuf::from("PHOTOBOOTH-PRINT.JPG"),
    });
    assert!(harness.printer.jobs().is_empty());

    harness.handle(SessionEvent::Operator(OperatorInput::ConfirmClicked));
    assert_eq!(harness.printer.jobs().len(), 1);
    assert_eq!(harness.booth.state(), SessionState::Preview);
}

#[tokio::test(start_paused = true)]
async fn test_retry_restores_preview_without_printing() {
    let mut harness = Harness::new().ready();
    let before = harness.booth.graph().topology().clone();
    harness.waiting_for_answer().await;

    harness.click();
    assert_eq!(harness.booth.state(), SessionState::Preview);
    assert!(!harness.surface.snapshot().confirm_visible);
    assert_eq!(harness.booth.graph().topology(), &before);
    assert_eq!(harness.backend.count(&GraphOp::DetachWriter), 1);
    assert!(harness.printer.jobs().is_empty());

    // A late file from the abandoned visit is not printed
    harness.graph_event(GraphEvent::PhotoWritten {
        path: PathBuf::from("PHOTOBOOTH-PRINT.JPG"),
    });
    assert!(harness.printer.jobs().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_print_failure_is_shown() {
    let mut harness = Harness::with(
        PrintOutcome::Failed {
            message: "no printer".to_string(),
        },
        None,
    )
    .ready();
    harness.waiting_for_answer().await;
    harness.handle(SessionEvent::Operator(OperatorInput::ConfirmClicked));
    harness.graph_event(GraphEvent::PhotoWritten {
        path: PathBuf::from("PHOTOBOOTH-PRINT.JPG"),
    });

    assert_eq!(
        harness.surface.snapshot().errors,
        vec!["Print error: no printer".to_string()]
    );
    assert_eq!(harness.booth.state(), SessionState::Preview);
}

#[tokio::test(start_paused = true)]
async fn test_confirmed_photo_is_archived() {
    let dir = tempfile::tempdir().unwrap();
    let photo = dir.path().join("PHOTOBOOTH-PRINT.JPG");
    std::fs::write(&photo, [0xff, 0xd8, 0xff, 0xd9]).unwrap();
    let archive = dir.path().join("archive");

    let mut harness =
        Harness::with(PrintOutcome::Submitted { job: None }, Some(archive.clone())).ready();
    harness.waiting_for_answer().await;
    harness.graph_event(GraphEvent::PhotoWritten { path: photo });
    harness.handle(SessionEvent::Operator(OperatorInput::ConfirmClicked));

    let archived: Vec<_> = std::fs::read_dir(&archive).unwrap().collect();
    assert_eq!(archived.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stale_countdown_is_ignored() {
    let mut harness = Harness::new().ready();
    harness.handle(SessionEvent::CountdownElapsed {
        visit: uuid::Uuid::new_v4(),
    });
    assert_eq!(harness.booth.state(), SessionState::Preview);
    assert!(harness.backend.ops().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_camera_lost_cancels_countdown() {
    let mut harness = Harness::new().ready();
    harness.click();
    harness.handle(SessionEvent::CameraLost);
    assert!(!harness.booth.countdown_pending());
    assert!(!harness.booth.camera_ready());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(harness.events.try_recv().is_err());
    assert_eq!(harness.booth.state(), SessionState::Preview);
}

#[tokio::test(start_paused = true)]
async fn test_still_failure_returns_to_preview() {
    let mut harness = Harness::new().ready();
    harness.take_photo().await;

    harness.handle(SessionEvent::StillFailed {
        reason: "capture failed".to_string(),
    });
    assert_eq!(harness.booth.state(), SessionState::Preview);
    assert!(!harness.surface.snapshot().spinner);
    assert_eq!(
        harness.booth.graph().topology().linked,
        Some(SubGraphKind::Preview)
    );
}

#[tokio::test(start_paused = true)]
async fn test_injection_failure_returns_to_preview() {
    let mut harness = Harness::new().ready();
    harness.take_photo().await;
    harness.backend.fail_next_pushes(1);

    assert_eq!(
        harness.handle(SessionEvent::StillCaptured(still())),
        Flow::Continue
    );
    assert_eq!(harness.booth.state(), SessionState::Preview);
}

#[tokio::test(start_paused = true)]
async fn test_late_still_is_dropped() {
    let mut harness = Harness::new().ready();
    harness.handle(SessionEvent::StillCaptured(still()));
    assert_eq!(harness.backend.count(&GraphOp::PushStill(4)), 0);
}

#[tokio::test(start_paused = true)]
async fn test_camera_ready_keeps_photo_on_screen() {
    let mut harness = Harness::new().ready();
    harness.waiting_for_answer().await;
    harness.sent();

    harness.handle(SessionEvent::CameraReady);
    assert_eq!(harness.booth.state(), SessionState::WaitingForAnswer);
    assert_eq!(harness.sent(), vec![ControlCommand::Pause]);
}

#[tokio::test(start_paused = true)]
async fn test_output_size_follows_surface() {
    let mut harness = Harness::new().ready();

    harness.graph_event(GraphEvent::OutputPrerolled);
    harness.handle(SessionEvent::SurfaceResized {
        width: 640,
        height: 424,
    });

    let resizes: Vec<_> = harness
        .backend
        .ops()
        .into_iter()
        .filter(|op| matches!(op, GraphOp::ResizePreview(_)))
        .collect();
    assert_eq!(resizes.len(), 2);
    assert_eq!(harness.booth.graph().video_size().map(|r| (r.w, r.h)), Some((640, 424)));
}

#[tokio::test(start_paused = true)]
async fn test_surface_resize_updates_allocation() {
    let mut harness = Harness::new().ready();
    harness.graph_event(GraphEvent::OutputPrerolled);

    harness.surface.resize(800, 600);
    match harness.events.try_recv() {
        Ok(event @ SessionEvent::SurfaceResized { .. }) => {
            assert_eq!(harness.handle(event), Flow::Continue);
        }
        other => panic!("Expected resize, got {:?}", other),
    }
    assert_eq!(harness.surface.display_size().1, (800, 600));
    let resized = harness.booth.graph().video_size();

    // Output re-prerolls after the resize and keeps the new allocation
    harness.graph_event(GraphEvent::OutputPrerolled);
    assert_eq!(harness.booth.graph().video_size(), resized);
    assert_eq!(resized.map(|r| r.w), Some(800));
}

#[tokio::test(start_paused = true)]
async fn test_faces_reach_subscribers() {
    let mut harness = Harness::new().ready();
    let mut faces = harness.booth.subscribe_faces();
    assert!(faces.borrow().is_empty());

    let detected = vec![VideoRect::new(60, 52, 80, 80), VideoRect::new(320, 40, 90, 90)];
    assert_eq!(
        harness.graph_event(GraphEvent::Faces(detected.clone())),
        Flow::Continue
    );
    assert!(faces.has_changed().unwrap());
    assert_eq!(*faces.borrow_and_update(), detected);

    harness.graph_event(GraphEvent::Faces(Vec::new()));
    assert!(faces.borrow_and_update().is_empty());
    assert_eq!(harness.booth.state(), SessionState::Preview);
}

#[tokio::test(start_paused = true)]
async fn test_graph_failures_stop_the_loop() {
    let mut harness = Harness::new().ready();
    assert_eq!(
        harness.graph_event(GraphEvent::Warning {
            message: "late buffer".to_string()
        }),
        Flow::Continue
    );
    assert!(matches!(
        harness.graph_event(GraphEvent::Error {
            message: "sink gone".to_string()
        }),
        Flow::Failed(_)
    ));
    assert!(matches!(
        harness.graph_event(GraphEvent::EndOfStream),
        Flow::Failed(_)
    ));
    assert_eq!(
        harness.handle(SessionEvent::ShutdownRequested {
            reason: "window closed".to_string()
        }),
        Flow::Shutdown("window closed".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn test_state_changes_are_published() {
    let mut harness = Harness::new();
    let mut states = harness.booth.subscribe();

    harness.handle(SessionEvent::CameraReady);
    assert!(states.has_changed().unwrap());
    assert_eq!(*states.borrow_and_update(), SessionState::Preview);
}

#[tokio::test(start_paused = true)]
async fn test_exactly_one_source_linked_through_visits() {
    let mut harness = Harness::new().ready();
    for _ in 0..3 {
        harness.waiting_for_answer().await;
        assert!(harness.booth.graph().topology().is_consistent());
        harness.click();
        assert!(harness.booth.graph().topology().is_consistent());
    }
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_graph() {
    let mut harness = Harness::new().ready();
    harness.click();
    harness.booth.shutdown();
    assert_eq!(harness.backend.ops().last(), Some(&GraphOp::Shutdown));
    assert!(!harness.booth.countdown_pending());
}
