use super::{BoothOrchestrator, ComponentState, ShutdownReason};
use crate::error::{BoothError, Result};
use crate::graph::GraphBackend;
use std::time::Duration;
use tracing::{error, info, warn};

/// How long STOP may wait for room in the control channel
const STOP_DEADLINE: Duration = Duration::from_secs(2);

/// Pipe flush cadence while joining the worker
const JOIN_TICK: Duration = Duration::from_millis(10);

impl<B: GraphBackend> BoothOrchestrator<B> {
    /// Stop the worker, close the camera, then take down graph and pipe.
    ///
    /// STOP goes out before the pipe is flushed and the flush keeps running
    /// until the worker has exited, so a worker stuck writing a frame always
    /// gets to see STOP.
    pub async fn shutdown(&mut self, reason: &ShutdownReason) -> Result<i32> {
        info!("Beginning graceful shutdown");
        let mut exit_code = reason.exit_code();

        if let Some(mut console) = self.console.take() {
            self.set_component_state("console", ComponentState::Stopping);
            console.stop().await;
            self.set_component_state("console", ComponentState::Stopped);
        }

        if let Err(e) = self.stop_capture().await {
            error!("Error stopping capture worker: {}", e);
            self.set_component_state("capture", ComponentState::Failed);
            exit_code = 1;
        }

        self.set_component_state("graph", ComponentState::Stopping);
        self.booth.shutdown();
        self.set_component_state("graph", ComponentState::Stopped);

        if let Some(pipe) = self.pipe.take() {
            if let Err(e) = pipe.remove() {
                error!("Error removing frame pipe: {}", e);
                exit_code = 1;
            }
        }
        self.set_component_state("pipe", ComponentState::Stopped);

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    async fn stop_capture(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        self.set_component_state("capture", ComponentState::Stopping);

        if worker.is_finished() {
            warn!("Capture worker exited before STOP");
        } else if let Err(e) = worker.request_stop(STOP_DEADLINE) {
            // Keep going: once the pipe drains the worker will read it
            warn!("STOP not delivered to capture worker: {}", e);
        }

        let pipe = self.pipe.take();
        if let Some(pipe) = &pipe {
            pipe.flush();
        }

        let joined = tokio::task::spawn_blocking(move || {
            let exit = worker.join_with(
                || {
                    if let Some(pipe) = &pipe {
                        pipe.flush();
                    }
                },
                JOIN_TICK,
            );
            (exit, pipe)
        })
        .await
        .map_err(|e| BoothError::system(format!("Capture join task failed: {}", e)))?;

        let (exit, pipe) = joined;
        self.pipe = pipe;
        let exit = exit?;

        info!(
            "Capture worker exited: {} frames, {} stills, {} commands",
            exit.frames_captured, exit.stills_captured, exit.commands_applied
        );

        // The camera is only closed once the worker thread is gone
        if let Some(session) = exit.session {
            info!(
                "Closing camera after {} preview frames and {} stills",
                session.preview_frame_count(),
                session.still_count()
            );
            session.close();
        }

        self.set_component_state("capture", ComponentState::Stopped);
        Ok(())
    }
}
