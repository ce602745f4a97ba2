//! Owner-to-worker command channel.
//!
//! A non-blocking Unix socket pair carries single-byte commands from the
//! session thread to the capture worker. Every byte written is read back in
//! order; the worker applies exactly one command per poll cycle.

use crate::error::ControlError;
use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Commands understood by the capture worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlCommand {
    Stop,
    Pause,
    StartVideo,
    StartPhoto,
}

impl ControlCommand {
    pub fn as_byte(self) -> u8 {
        match self {
            ControlCommand::Stop => b'S',
            ControlCommand::Pause => b'P',
            ControlCommand::StartVideo => b'V',
            ControlCommand::StartPhoto => b'C',
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self, ControlError> {
        match byte {
            b'S' => Ok(ControlCommand::Stop),
            b'P' => Ok(ControlCommand::Pause),
            b'V' => Ok(ControlCommand::StartVideo),
            b'C' => Ok(ControlCommand::StartPhoto),
            other => Err(ControlError::InvalidCommand { byte: other }),
        }
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlCommand::Stop => "STOP",
            ControlCommand::Pause => "PAUSE",
            ControlCommand::StartVideo => "START_VIDEO",
            ControlCommand::StartPhoto => "START_PHOTO",
        };
        f.write_str(name)
    }
}

/// Result of waiting on the control socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The timeout elapsed with nothing to read
    Timeout,
    /// At least one byte (or a hangup) is pending
    Ready,
    /// The wait was interrupted by a signal
    Interrupted,
}

/// Create a connected sender/receiver pair
pub fn channel() -> Result<(ControlSender, ControlReceiver), ControlError> {
    let (write_end, read_end) = UnixStream::pair()?;
    write_end.set_nonblocking(true)?;
    read_end.set_nonblocking(true)?;

    Ok((
        ControlSender {
            stream: Arc::new(write_end),
        },
        ControlReceiver { stream: read_end },
    ))
}

/// Session-side end of the control channel
#[derive(Clone)]
pub struct ControlSender {
    stream: Arc<UnixStream>,
}

impl ControlSender {
    /// Best-effort send. Never blocks; a full socket buffer drops the command.
    pub fn send(&self, command: ControlCommand) -> bool {
        match (&*self.stream).write(&[command.as_byte()]) {
            Ok(1) => {
                trace!("Sent control command {}", command);
                true
            }
            Ok(_) => {
                warn!("Control command {} not written", command);
                false
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                warn!("Control channel full, dropped {}", command);
                false
            }
            Err(e) => {
                debug!("Failed to send control command {}: {}", command, e);
                false
            }
        }
    }

    /// Send that waits for socket space until `deadline` elapses. Used for STOP.
    pub fn send_reliable(
        &self,
        command: ControlCommand,
        deadline: Duration,
    ) -> Result<(), ControlError> {
        let started = Instant::now();

        loop {
            match (&*self.stream).write(&[command.as_byte()]) {
                Ok(1) => {
                    debug!("Delivered control command {}", command);
                    return Ok(());
                }
                Ok(_) => return Err(ControlError::Closed),
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    let elapsed = started.elapsed();
                    if elapsed >= deadline {
                        return Err(ControlError::Timeout {
                            command: command.to_string(),
                        });
                    }
                    wait_fd(
                        self.stream.as_raw_fd(),
                        libc::POLLOUT,
                        deadline - elapsed,
                    )?;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::BrokenPipe => return Err(ControlError::Closed),
                Err(e) => return Err(ControlError::Io(e)),
            }
        }
    }
}

/// Worker-side end of the control channel
pub struct ControlReceiver {
    stream: UnixStream,
}

impl ControlReceiver {
    /// Block until a command is pending or `timeout` elapses
    pub fn wait(&self, timeout: Duration) -> Result<PollOutcome, ControlError> {
        wait_fd(
            self.stream.as_raw_fd(),
            libc::POLLIN | libc::POLLERR | libc::POLLHUP | libc::POLLPRI,
            timeout,
        )
    }

    /// Read exactly one pending command, if any.
    ///
    /// Returns `ControlError::Closed` once every sender is gone.
    pub fn recv(&self) -> Result<Option<ControlCommand>, ControlError> {
        let mut byte = [0u8; 1];
        match (&self.stream).read(&mut byte) {
            Ok(0) => Err(ControlError::Closed),
            Ok(_) => ControlCommand::from_byte(byte[0]).map(Some),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(None),
            Err(e) => Err(ControlError::Io(e)),
        }
    }

    /// Discard everything immediately readable, returning the byte count
    pub fn drain(&self) -> usize {
        let mut buf = [0u8; 64];
        let mut total = 0;
        loop {
            match (&self.stream).read(&mut buf) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        if total > 0 {
            debug!("Drained {} pending control bytes", total);
        }
        total
    }
}

fn wait_fd(fd: RawFd, events: libc::c_short, timeout: Duration) -> Result<PollOutcome, ControlError> {
    let mut pfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };
    let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

    // SAFETY: `pfd` is a single valid pollfd living for the duration of the call.
    let ret = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };

    if ret < 0 {
        let err = std::io::Error::last_os_error();
        if err.kind() == ErrorKind::Interrupted {
            return Ok(PollOutcome::Interrupted);
        }
        return Err(ControlError::Io(err));
    }

    if ret == 0 {
        Ok(PollOutcome::Timeout)
    } else {
        Ok(PollOutcome::Ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_bytes() {
        for command in [
            ControlCommand::Stop,
            ControlCommand::Pause,
            ControlCommand::StartVideo,
            ControlCommand::StartPhoto,
        ] {
            assert_eq!(ControlCommand::from_byte(command.as_byte()).unwrap(), command);
        }

        assert!(matches!(
            ControlCommand::from_byte(b'x'),
            Err(ControlError::InvalidCommand { byte: b'x' })
        ));
    }

    #[test]
    fn test_fifo_order() {
        let (sender, receiver) = channel().unwrap();
        let sent = [
            ControlCommand::StartVideo,
            ControlCommand::StartPhoto,
            ControlCommand::Pause,
            ControlCommand::StartVideo,
            ControlCommand::Stop,
        ];
        for command in sent {
            assert!(sender.send(command));
        }

        let mut received = Vec::new();
        while let Some(command) = receiver.recv().unwrap() {
            received.push(command);
        }
        assert_eq!(received, sent);
    }

    #[test]
    fn test_wait_timeout_and_ready() {
        let (sender, receiver) = channel().unwrap();
        assert_eq!(
            receiver.wait(Duration::from_millis(10)).unwrap(),
            PollOutcome::Timeout
        );

        sender.send(ControlCommand::Pause);
        assert_eq!(
            receiver.wait(Duration::from_millis(1000)).unwrap(),
            PollOutcome::Ready
        );
        assert_eq!(receiver.recv().unwrap(), Some(ControlCommand::Pause));
        assert_eq!(receiver.recv().unwrap(), None);
    }

    #[test]
    fn test_closed_sender() {
        let (sender, receiver) = channel().unwrap();
        drop(sender);
        assert_eq!(
            receiver.wait(Duration::from_millis(100)).unwrap(),
            PollOutcome::Ready
        );
        assert!(matches!(receiver.recv(), Err(ControlError::Closed)));
    }

    #[test]
    fn test_full_channel_drops_but_stop_times_out() {
        let (sender, receiver) = channel().unwrap();

        let mut accepted = 0usize;
        while sender.send(ControlCommand::StartVideo) {
            accepted += 1;
            assert!(accepted < 10_000_000, "socket buffer never filled");
        }
        assert!(!sender.send(ControlCommand::Pause));

        let result = sender.send_reliable(ControlCommand::Stop, Duration::from_millis(50));
        assert!(matches!(result, Err(ControlError::Timeout { .. })));

        assert_eq!(receiver.drain(), accepted);
        sender
            .send_reliable(ControlCommand::Stop, Duration::from_millis(50))
            .unwrap();
        assert_eq!(receiver.recv().unwrap(), Some(ControlCommand::Stop));
    }
}
