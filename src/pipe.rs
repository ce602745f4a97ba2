//! Named pipe carrying MJPEG preview frames from the capture worker to the
//! preview sub-graph's file-descriptor source.

use crate::error::{BoothError, Result};
use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub struct FrameSinkPipe {
    path: PathBuf,
    file: File,
}

impl FrameSinkPipe {
    /// Create (or reuse) the FIFO at `path` and open it read-write
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| BoothError::system(format!("Invalid pipe path {}", path.display())))?;

        // SAFETY: `c_path` is a valid NUL-terminated string.
        let ret = unsafe { libc::mkfifo(c_path.as_ptr(), 0o666) };
        if ret == -1 {
            let err = std::io::Error::last_os_error();
            if err.kind() != ErrorKind::AlreadyExists {
                return Err(BoothError::component(
                    "frame_pipe".to_string(),
                    format!("cannot create {}: {}", path.display(), err),
                ));
            }
            debug!("Reusing existing frame pipe {}", path.display());
        }

        // Opening read-write never blocks waiting for a peer
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| {
                BoothError::component(
                    "frame_pipe".to_string(),
                    format!("cannot open {}: {}", path.display(), e),
                )
            })?;

        info!("Frame pipe ready at {}", path.display());
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Descriptor handed to the preview source element
    pub fn raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    /// Independent handle for the capture worker to write frames into
    pub fn writer(&self) -> Result<File> {
        Ok(self.file.try_clone()?)
    }

    /// Read and discard everything pending without blocking.
    ///
    /// Unblocks a writer stalled on a full pipe.
    pub fn flush(&self) -> usize {
        let fd = self.file.as_raw_fd();
        // SAFETY: fcntl on a descriptor we own.
        unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFL);
            if flags != -1 && flags & libc::O_NONBLOCK == 0 {
                libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
            }
        }

        let mut buf = [0u8; 1024];
        let mut total = 0;
        loop {
            match (&self.file).read(&mut buf) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }

        if total > 0 {
            debug!("Flushed {} bytes from frame pipe", total);
        }
        total
    }

    /// Close the pipe and unlink it from the filesystem
    pub fn remove(self) -> Result<()> {
        let FrameSinkPipe { path, file } = self;
        drop(file);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                info!("Removed frame pipe {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!("Failed to remove frame pipe {}: {}", path.display(), e);
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::FileTypeExt;

    #[test]
    fn test_create_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("moviepipe.mjpg");

        let first = FrameSinkPipe::create(&path).unwrap();
        assert!(std::fs::metadata(&path).unwrap().file_type().is_fifo());
        drop(first);

        // Left behind by an unclean shutdown
        let second = FrameSinkPipe::create(&path).unwrap();
        second.remove().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_writer_and_flush() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = FrameSinkPipe::create(dir.path().join("frames")).unwrap();

        let mut writer = pipe.writer().unwrap();
        writer.write_all(&[0xffu8; 4096]).unwrap();

        assert_eq!(pipe.flush(), 4096);
        assert_eq!(pipe.flush(), 0);
        pipe.remove().unwrap();
    }

    #[test]
    fn test_create_in_missing_directory_fails() {
        let result = FrameSinkPipe::create("/nonexistent-dir/moviepipe.mjpg");
        assert!(matches!(result, Err(BoothError::Component { .. })));
    }
}
