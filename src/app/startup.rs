use super::{BoothOrchestrator, ComponentState};
use crate::capture::{CaptureWorker, WorkerTimings};
use crate::error::{BoothError, Result};
use crate::graph::GraphBackend;
use crate::operator::OperatorConsole;
use tracing::{error, info};

impl<B: GraphBackend> BoothOrchestrator<B> {
    /// Bring the graph up and start the capture worker.
    ///
    /// The headless surface counts as presented as soon as the graph is
    /// built, so setup runs straight away.
    pub fn start(&mut self, with_console: bool) -> Result<()> {
        info!("Starting photo booth");

        self.set_component_state("graph", ComponentState::Starting);
        if let Err(e) = self.booth.start() {
            error!("Failed to start media graph: {}", e);
            self.set_component_state("graph", ComponentState::Failed);
            return Err(e.into());
        }
        self.set_component_state("graph", ComponentState::Running);

        self.set_component_state("capture", ComponentState::Starting);
        let pipe = self
            .pipe
            .as_ref()
            .ok_or_else(|| BoothError::system("Frame pipe already removed"))?;
        let sink = pipe.writer()?;
        let driver = self
            .driver
            .take()
            .ok_or_else(|| BoothError::system("Capture worker already started"))?;
        let receiver = self
            .control_receiver
            .take()
            .ok_or_else(|| BoothError::system("Control receiver already taken"))?;

        let worker = CaptureWorker::spawn(
            driver,
            sink,
            receiver,
            self.control.clone(),
            self.notifier.clone(),
            WorkerTimings::from_config(&self.config.camera),
        )?;
        self.worker = Some(worker);
        self.set_component_state("capture", ComponentState::Running);

        if with_console {
            let mut console = OperatorConsole::new(self.notifier.clone());
            console.start();
            self.console = Some(console);
            self.set_component_state("console", ComponentState::Running);
        }

        info!("Photo booth started");
        Ok(())
    }
}
