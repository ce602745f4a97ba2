use crate::events::{OperatorInput, SessionEvent, SessionNotifier};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Terminal keys standing in for the booth's touch surface.
///
/// SPACE clicks the background, `y` presses the confirm button and `q` or
/// ESC quits.
pub struct OperatorConsole {
    notifier: SessionNotifier,
    cancellation_token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

/// What a key press means to the session
pub fn translate_key(code: KeyCode) -> Option<SessionEvent> {
    match code {
        KeyCode::Char(' ') | KeyCode::Enter => {
            Some(SessionEvent::Operator(OperatorInput::BackgroundClicked))
        }
        KeyCode::Char('y') | KeyCode::Char('Y') => {
            Some(SessionEvent::Operator(OperatorInput::ConfirmClicked))
        }
        KeyCode::Char('q') | KeyCode::Esc => Some(SessionEvent::ShutdownRequested {
            reason: "Operator quit from the console".to_string(),
        }),
        _ => None,
    }
}

impl OperatorConsole {
    pub fn new(notifier: SessionNotifier) -> Self {
        Self {
            notifier,
            cancellation_token: CancellationToken::new(),
            task: None,
        }
    }

    /// Start listening for key presses
    pub fn start(&mut self) {
        info!("Operator console active - SPACE takes a photo, y prints, q quits");

        let notifier = self.notifier.clone();
        let cancellation_token = self.cancellation_token.clone();

        self.task = Some(task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for the operator console: {}", e);
                return;
            }

            while !cancellation_token.is_cancelled() {
                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        let Ok(Event::Key(key_event)) = event::read() else {
                            continue;
                        };
                        if key_event.kind != KeyEventKind::Press {
                            continue;
                        }

                        match translate_key(key_event.code) {
                            Some(event) => {
                                let quit = matches!(event, SessionEvent::ShutdownRequested { .. });
                                debug!("Key {:?} -> {}", key_event.code, event.event_type());
                                if !notifier.post(event) || quit {
                                    break;
                                }
                            }
                            None => debug!("Key pressed: {:?}", key_event.code),
                        }
                    }
                    Ok(false) => {}
                    Err(e) => warn!("Error polling for keyboard events: {}", e),
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            }
            debug!("Operator console exited");
        }));
    }

    /// Stop listening and give the terminal back
    pub async fn stop(&mut self) {
        self.cancellation_token.cancel();
        if let Some(task) = self.task.take() {
            if tokio::time::timeout(Duration::from_millis(500), task)
                .await
                .is_err()
            {
                warn!("Operator console did not exit in time");
            }
        }
        let _ = disable_raw_mode();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_translation() {
        assert!(matches!(
            translate_key(KeyCode::Char(' ')),
            Some(SessionEvent::Operator(OperatorInput::BackgroundClicked))
        ));
        assert!(matches!(
            translate_key(KeyCode::Char('y')),
            Some(SessionEvent::Operator(OperatorInput::ConfirmClicked))
        ));
        assert!(matches!(
            translate_key(KeyCode::Esc),
            Some(SessionEvent::ShutdownRequested { .. })
        ));
        assert!(translate_key(KeyCode::Char('x')).is_none());
    }

    #[tokio::test]
    async fn test_console_stop_without_start() {
        let (notifier, _events) = SessionNotifier::channel();
        let mut console = OperatorConsole::new(notifier);
        console.stop().await;
        assert!(console.cancellation_token.is_cancelled());
    }
}
