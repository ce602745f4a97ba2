use std::fmt;
use std::time::Duration;

/// Where the current booth visit stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No camera has shown up yet
    #[default]
    None,
    /// Live preview; a countdown may be pending
    Preview,
    TakingPhoto,
    /// The still reached the photo egress once
    ProcessPhoto,
    WaitingForAnswer,
    Printing,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::None => "NONE",
            SessionState::Preview => "PREVIEW",
            SessionState::TakingPhoto => "TAKING_PHOTO",
            SessionState::ProcessPhoto => "PROCESS_PHOTO",
            SessionState::WaitingForAnswer => "WAITING_FOR_ANSWER",
            SessionState::Printing => "PRINTING",
        }
    }

    /// A photo is somewhere between shutter and answer
    pub fn is_busy(&self) -> bool {
        matches!(self, SessionState::TakingPhoto | SessionState::ProcessPhoto)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Delay between countdown start and the shutter.
///
/// Fires 100 ms early so the still lands on the last tick; countdowns of
/// one second or less use a flat second.
pub fn countdown_delay(seconds: u32) -> Duration {
    if seconds > 1 {
        Duration::from_millis(u64::from(seconds) * 1000 - 100)
    } else {
        Duration::from_millis(1000)
    }
}
