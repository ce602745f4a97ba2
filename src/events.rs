use crate::camera::StillImage;
use crate::graph::VideoRect;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Operator input from the booth surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorInput {
    /// Click anywhere on the preview background
    BackgroundClicked,
    /// The confirm ("print it") button
    ConfirmClicked,
}

/// Lifecycle notifications raised by the media graph
#[derive(Debug, Clone, PartialEq)]
pub enum GraphEvent {
    /// Preview sub-graph went PAUSED -> PLAYING
    PreviewPlaying,
    /// Output sub-graph went READY -> PAUSED; the display size is known
    OutputPrerolled,
    /// Output sub-graph went PAUSED -> PLAYING
    OutputPlaying,
    /// A buffer crossed the photo sub-graph's egress pad
    PhotoBuffer,
    /// The photo writer branch flushed its JPEG
    PhotoWritten { path: PathBuf },
    /// Faces detected in a preview frame, left to right
    Faces(Vec<VideoRect>),
    Warning { message: String },
    Error { message: String },
    EndOfStream,
}

/// Everything that can drive the session state machine
#[derive(Debug)]
pub enum SessionEvent {
    /// The capture worker found a camera and is streaming preview frames
    CameraReady,
    /// The camera went away; the worker is probing again
    CameraLost,
    /// A still capture finished; ownership of the bytes moves to the session
    StillCaptured(StillImage),
    /// A still capture failed; the worker is probing again
    StillFailed { reason: String },
    /// The shutter countdown for the given visit ran out
    CountdownElapsed { visit: uuid::Uuid },
    Graph(GraphEvent),
    Operator(OperatorInput),
    /// The display surface reports a new size
    SurfaceResized { width: u32, height: u32 },
    /// Window closed, signal received or operator quit
    ShutdownRequested { reason: String },
}

impl SessionEvent {
    /// Get the event type as a string for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::CameraReady => "camera_ready",
            SessionEvent::CameraLost => "camera_lost",
            SessionEvent::StillCaptured(_) => "still_captured",
            SessionEvent::StillFailed { .. } => "still_failed",
            SessionEvent::CountdownElapsed { .. } => "countdown_elapsed",
            SessionEvent::Graph(_) => "graph",
            SessionEvent::Operator(_) => "operator",
            SessionEvent::SurfaceResized { .. } => "surface_resized",
            SessionEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Marshals work onto the session thread's event loop.
///
/// Cloneable and `Send`: the capture worker, timers and graph streaming
/// threads post events, and only the session thread consumes them.
#[derive(Clone)]
pub struct SessionNotifier {
    sender: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionNotifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Queue `event` for the session thread. Returns false once the loop is gone.
    pub fn post(&self, event: SessionEvent) -> bool {
        trace!("Posting session event {}", event.event_type());
        match self.sender.send(event) {
            Ok(()) => true,
            Err(e) => {
                debug!("Session loop gone, dropped {}", e.0.event_type());
                false
            }
        }
    }

    pub fn post_graph(&self, event: GraphEvent) -> bool {
        self.post(SessionEvent::Graph(event))
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_post_preserves_order() {
        let (notifier, mut receiver) = SessionNotifier::channel();
        assert!(notifier.post(SessionEvent::CameraReady));
        assert!(notifier.post_graph(GraphEvent::PhotoBuffer));
        assert!(notifier.post(SessionEvent::CameraLost));

        assert!(matches!(receiver.recv().await, Some(SessionEvent::CameraReady)));
        assert!(matches!(
            receiver.recv().await,
            Some(SessionEvent::Graph(GraphEvent::PhotoBuffer))
        ));
        assert!(matches!(receiver.recv().await, Some(SessionEvent::CameraLost)));
    }

    #[test]
    fn test_post_from_other_thread() {
        let (notifier, mut receiver) = SessionNotifier::channel();
        let worker_notifier = notifier.clone();
        std::thread::spawn(move || {
            worker_notifier.post(SessionEvent::StillFailed {
                reason: "test".to_string(),
            })
        })
        .join()
        .unwrap();

        let event = receiver.try_recv().unwrap();
        assert_eq!(event.event_type(), "still_failed");
    }

    #[test]
    fn test_post_after_loop_closed() {
        let (notifier, receiver) = SessionNotifier::channel();
        drop(receiver);
        assert!(notifier.is_closed());
        assert!(!notifier.post(SessionEvent::CameraReady));
    }
}
