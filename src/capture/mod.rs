mod worker;
#[cfg(test)]
mod tests;

pub use worker::{CaptureState, CaptureWorker, WorkerExit, WorkerTimings};
