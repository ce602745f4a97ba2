use super::*;
use crate::camera::MockCameraDriver;
use crate::config::BoothConfig;
use crate::control::{self, ControlCommand, ControlSender};
use crate::events::{SessionEvent, SessionNotifier};
use std::fs::File;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::UnboundedReceiver;

fn fast_timings() -> WorkerTimings {
    WorkerTimings {
        probe_interval: Duration::from_millis(30),
        paused_interval: Duration::from_millis(20),
        frame_interval: Duration::from_millis(5),
    }
}

struct Harness {
    worker: CaptureWorker,
    control: ControlSender,
    events: UnboundedReceiver<SessionEvent>,
    sink: File,
}

/// Spawn a worker over `driver`, queueing `commands` before the thread starts
fn spawn_worker(driver: &MockCameraDriver, commands: &[ControlCommand]) -> Harness {
    spawn_worker_with(driver, commands, fast_timings())
}

fn spawn_worker_with(
    driver: &MockCameraDriver,
    commands: &[ControlCommand],
    timings: WorkerTimings,
) -> Harness {
    let (control, receiver) = control::channel().unwrap();
    for command in commands {
        assert!(control.send(*command));
    }

    let (notifier, events) = SessionNotifier::channel();
    let sink = tempfile::tempfile().unwrap();
    let worker = CaptureWorker::spawn(
        Box::new(driver.clone()),
        sink.try_clone().unwrap(),
        receiver,
        control.clone(),
        notifier,
        timings,
    )
    .unwrap();

    Harness {
        worker,
        control,
        events,
        sink,
    }
}

fn next_event(events: &mut UnboundedReceiver<SessionEvent>) -> SessionEvent {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match events.try_recv() {
            Ok(event) => return event,
            Err(TryRecvError::Empty) if Instant::now() < deadline => {
                std::thread::sleep(Duration::from_millis(2))
            }
            Err(e) => panic!("No session event: {:?}", e),
        }
    }
}

fn stop(harness: Harness) -> WorkerExit {
    harness.worker.request_stop(Duration::from_secs(1)).unwrap();
    harness
        .worker
        .join_with(|| {}, Duration::from_millis(2))
        .unwrap()
}

#[test]
fn test_probe_success_posts_camera_ready_once() {
    let driver = MockCameraDriver::new().with_probe_failures(2);
    let mut harness = spawn_worker(&driver, &[]);

    assert!(matches!(
        next_event(&mut harness.events),
        SessionEvent::CameraReady
    ));
    assert_eq!(driver.state().lock().probes, 3);

    // Preview keeps running without further announcements
    std::thread::sleep(Duration::from_millis(60));
    assert!(harness.events.try_recv().is_err());

    let sink = harness.sink.try_clone().unwrap();
    let exit = stop(harness);
    assert!(exit.frames_captured > 0);
    assert_eq!(sink.metadata().unwrap().len(), exit.frames_captured * 5);

    exit.session.expect("camera still open").close();
    assert_eq!(driver.state().lock().exits, 1);
}

#[test]
fn test_preview_starts_at_frame_cadence_after_attach() {
    let driver = MockCameraDriver::new();
    let timings = WorkerTimings {
        probe_interval: Duration::from_secs(5),
        paused_interval: Duration::from_millis(20),
        frame_interval: Duration::from_millis(10),
    };
    let mut harness = spawn_worker_with(&driver, &[], timings);

    assert!(matches!(
        next_event(&mut harness.events),
        SessionEvent::CameraReady
    ));
    std::thread::sleep(Duration::from_millis(500));
    assert!(driver.state().lock().preview_captures > 0);

    let exit = stop(harness);
    assert!(exit.frames_captured > 0);
    exit.session.expect("camera still open").close();
}

#[test]
fn test_stop_terminates_worker() {
    let driver = MockCameraDriver::new();
    let harness = spawn_worker(&driver, &[]);
    assert!(!harness.worker.is_finished());

    let started = Instant::now();
    let exit = stop(harness);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(exit.commands_applied, 1);
}

#[test]
fn test_photo_takes_exactly_one_still() {
    let driver = MockCameraDriver::new();
    let mut harness = spawn_worker(&driver, &[ControlCommand::StartPhoto]);

    assert!(matches!(
        next_event(&mut harness.events),
        SessionEvent::CameraReady
    ));
    match next_event(&mut harness.events) {
        SessionEvent::StillCaptured(still) => {
            assert_eq!(still.data(), driver.state().lock().still_data.as_slice())
        }
        other => panic!("Expected still, got {:?}", other),
    }

    // The worker parks itself after a still
    std::thread::sleep(Duration::from_millis(50));
    {
        let state = driver.state();
        let state = state.lock();
        assert_eq!(state.still_captures, 1);
        assert_eq!(state.preview_captures, 0);
    }

    let exit = stop(harness);
    assert_eq!(exit.stills_captured, 1);
    assert_eq!(exit.frames_captured, 0);
}

#[test]
fn test_commands_applied_in_send_order() {
    // PHOTO then PAUSE: the pause wins before any capture happens
    let driver = MockCameraDriver::new();
    let harness = spawn_worker(
        &driver,
        &[
            ControlCommand::StartPhoto,
            ControlCommand::Pause,
            ControlCommand::Stop,
        ],
    );
    let exit = harness
        .worker
        .join_with(|| {}, Duration::from_millis(2))
        .unwrap();
    assert_eq!(exit.commands_applied, 3);
    assert_eq!(exit.stills_captured, 0);
    assert_eq!(driver.state().lock().preview_captures, 0);

    // PAUSE then PHOTO: the still is taken
    let driver = MockCameraDriver::new();
    let mut harness = spawn_worker(&driver, &[ControlCommand::Pause, ControlCommand::StartPhoto]);
    assert!(matches!(
        next_event(&mut harness.events),
        SessionEvent::CameraReady
    ));
    assert!(matches!(
        next_event(&mut harness.events),
        SessionEvent::StillCaptured(_)
    ));
    let exit = stop(harness);
    assert_eq!(exit.commands_applied, 3);
    assert_eq!(exit.stills_captured, 1);
}

#[test]
fn test_video_after_still_resumes_preview() {
    let driver = MockCameraDriver::new();
    let mut harness = spawn_worker(&driver, &[ControlCommand::StartPhoto]);

    next_event(&mut harness.events);
    assert!(matches!(
        next_event(&mut harness.events),
        SessionEvent::StillCaptured(_)
    ));

    assert!(harness.control.send(ControlCommand::StartVideo));
    std::thread::sleep(Duration::from_millis(50));

    let exit = stop(harness);
    assert!(exit.frames_captured > 0);
}

#[test]
fn test_disconnect_returns_to_probing() {
    let driver = MockCameraDriver::new().with_disconnect_after(3);
    let mut harness = spawn_worker(&driver, &[]);

    assert!(matches!(
        next_event(&mut harness.events),
        SessionEvent::CameraReady
    ));
    assert!(matches!(
        next_event(&mut harness.events),
        SessionEvent::CameraLost
    ));
    assert!(matches!(
        next_event(&mut harness.events),
        SessionEvent::CameraReady
    ));

    {
        let state = driver.state();
        let state = state.lock();
        assert_eq!(state.opened, 2);
        assert_eq!(state.exits, 1);
    }

    let exit = stop(harness);
    assert!(exit.frames_captured >= 3);
    if let Some(session) = exit.session {
        session.close();
    }
}

#[test]
fn test_still_failure_reprobes() {
    let driver = MockCameraDriver::new().with_failing_stills(1);
    let mut harness = spawn_worker(&driver, &[ControlCommand::StartPhoto]);

    assert!(matches!(
        next_event(&mut harness.events),
        SessionEvent::CameraReady
    ));
    match next_event(&mut harness.events) {
        SessionEvent::StillFailed { reason } => assert!(reason.contains("shutter")),
        other => panic!("Expected failure, got {:?}", other),
    }
    assert!(matches!(
        next_event(&mut harness.events),
        SessionEvent::CameraReady
    ));
    assert_eq!(driver.state().lock().exits, 1);

    let exit = stop(harness);
    assert_eq!(exit.stills_captured, 0);
}

#[test]
fn test_commands_ignored_without_camera() {
    let driver = MockCameraDriver::new().with_probe_failures(u32::MAX);
    let harness = spawn_worker(&driver, &[ControlCommand::StartVideo, ControlCommand::StartPhoto]);

    std::thread::sleep(Duration::from_millis(50));
    let exit = stop(harness);

    assert_eq!(exit.commands_applied, 1);
    assert!(exit.session.is_none());
    let state = driver.state();
    let state = state.lock();
    assert_eq!(state.preview_captures, 0);
    assert_eq!(state.still_captures, 0);
    assert!(state.probes >= 1);
}

#[test]
fn test_timings_from_config() {
    let config = BoothConfig::default();
    let timings = WorkerTimings::from_config(&config.camera);
    assert_eq!(timings.probe_interval, Duration::from_millis(5000));
    assert_eq!(timings.paused_interval, Duration::from_millis(1000));
    assert_eq!(timings.frame_interval, Duration::from_millis(40));
}

#[test]
fn test_capture_state_names() {
    assert_eq!(CaptureState::Init.to_string(), "INIT");
    assert_eq!(CaptureState::Photo.to_string(), "PHOTO");
}
