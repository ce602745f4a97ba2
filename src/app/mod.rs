//! Owner thread: builds the booth, runs its event loop and tears it down in
//! the order the capture worker and frame pipe need.

mod orchestrator;
mod runtime;
mod shutdown;
mod startup;
mod types;


pub use orchestrator::{BoothOrchestrator, BoothParts};
pub use types::{ComponentState, ShutdownReason};
