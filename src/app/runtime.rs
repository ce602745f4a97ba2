use super::{BoothOrchestrator, ShutdownReason};
use crate::error::{BoothError, Result};
use crate::graph::GraphBackend;
use crate::session::Flow;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, info, warn};

impl<B: GraphBackend> BoothOrchestrator<B> {
    /// Run the owner loop until shutdown, then tear down. Returns the exit code.
    pub async fn run(&mut self) -> Result<i32> {
        info!("Photo booth is running");

        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| BoothError::system(format!("Failed to register SIGTERM handler: {}", e)))?;

        let reason = loop {
            tokio::select! {
                flow = self.dispatch_next() => {
                    if let Some(reason) = flow {
                        break reason;
                    }
                }
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        warn!("Failed to listen for SIGINT: {}", e);
                    }
                    info!("Received SIGINT signal (Ctrl+C)");
                    break ShutdownReason::Signal("SIGINT".to_string());
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM signal");
                    break ShutdownReason::Signal("SIGTERM".to_string());
                }
            }
        };

        info!("Shutdown initiated: {}", reason);
        let exit_code = self.shutdown(&reason).await?;
        info!("Photo booth shutdown complete");
        Ok(exit_code)
    }

    /// Wait for one event and apply it. Returns a reason once the loop must end.
    pub async fn dispatch_next(&mut self) -> Option<ShutdownReason> {
        let Some(event) = self.events.recv().await else {
            return Some(ShutdownReason::Error("event channel closed".to_string()));
        };

        debug!("Dispatching {}", event.event_type());
        match self.booth.handle(event) {
            Flow::Continue => None,
            Flow::Shutdown(reason) => Some(ShutdownReason::UserRequest(reason)),
            Flow::Failed(message) => Some(ShutdownReason::Error(message)),
        }
    }
}
