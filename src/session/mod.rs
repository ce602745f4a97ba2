//! Session state machine and the collaborators it drives.
//!
//! The machine runs on the owner thread. It moves the graph between the
//! preview and photo sub-graphs, tells the capture worker what to do and
//! keeps the surface (spinner, confirm button) in step.

mod collaborators;
mod machine;
mod state;

#[cfg(test)]
mod tests;

pub use collaborators::{
    AudioCue, BoothSurface, HeadlessSurface, PlaybinCue, PrintOutcome, PrintSettings, Printer,
    SpoolPrinter, SurfaceState,
};
pub use machine::{Flow, PhotoBooth, SessionParts, SessionSettings};
pub use state::{countdown_delay, SessionState};
