use nix::fcntl::OFlag;
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use crate::error::ChannelError;

pub const QUIT_COMMAND: &str = "QUIT";

/// One-way command channel to a subprocess, backed by a FIFO path.
#[derive(Debug, Clone)]
pub struct ControlChannel {
    path: PathBuf,
}

impl ControlChannel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the channel, or truncates it if it is a regular file.
    ///
    /// Opened read-write so an existing named pipe with no reader does not block.
    pub fn reset(&self) -> Result<(), ChannelError> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .map(drop)
            .map_err(|source| ChannelError::Init {
                path: self.path.clone(),
                source,
            })
    }

    /// Appends `command` to the channel.
    ///
    /// Non-blocking: a named pipe with no reader fails with ENXIO instead of hanging.
    pub fn send(&self, command: &str) -> Result<(), ChannelError> {
        let err = |source: std::io::Error| ChannelError::Send {
            path: self.path.clone(),
            command: command.to_string(),
            source,
        };
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .custom_flags(OFlag::O_NONBLOCK.bits())
            .open(&self.path)
            .map_err(err)?;
        file.write_all(command.as_bytes()).map_err(err)?;
        log::debug!("Wrote {:?} to {:?}", command, self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::stat::Mode;
    use std::fs;
    use std::io::Read;

    #[test]
    fn test_reset_creates_and_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let channel = ControlChannel::new(dir.path().join("vegas_fits_control"));

        channel.reset().unwrap();
        assert_eq!(fs::read_to_string(channel.path()).unwrap(), "");

        fs::write(channel.path(), "stale").unwrap();
        channel.reset().unwrap();
        assert_eq!(fs::read_to_string(channel.path()).unwrap(), "");
    }

    #[test]
    fn test_reset_fails_in_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let channel = ControlChannel::new(dir.path().join("missing").join("fake_gpu_control"));
        assert!(matches!(channel.reset(), Err(ChannelError::Init { .. })));
    }

    #[test]
    fn test_send_appends() {
        let dir = tempfile::tempdir().unwrap();
        let channel = ControlChannel::new(dir.path().join("vegas_fits_control"));
        channel.reset().unwrap();

        channel.send(QUIT_COMMAND).unwrap();
        assert_eq!(fs::read_to_string(channel.path()).unwrap(), "QUIT");
        channel.send(QUIT_COMMAND).unwrap();
        assert_eq!(fs::read_to_string(channel.path()).unwrap(), "QUITQUIT");
    }

    #[test]
    fn test_named_pipe_without_reader_does_not_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fifo");
        nix::unistd::mkfifo(&path, Mode::S_IRUSR | Mode::S_IWUSR).unwrap();
        let channel = ControlChannel::new(&path);

        channel.reset().unwrap();
        assert!(matches!(
            channel.send(QUIT_COMMAND),
            Err(ChannelError::Send { .. })
        ));
    }

    #[test]
    fn test_named_pipe_reader_receives_quit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fifo");
        nix::unistd::mkfifo(&path, Mode::S_IRUSR | Mode::S_IWUSR).unwrap();

        // The writer holds the read end open non-blocking, like its control loop does
        let mut reader = OpenOptions::new()
            .read(true)
            .custom_flags(OFlag::O_NONBLOCK.bits())
            .open(&path)
            .unwrap();

        ControlChannel::new(&path).send(QUIT_COMMAND).unwrap();

        let mut received = String::new();
        reader.read_to_string(&mut received).unwrap();
        assert_eq!(received, "QUIT");
    }
}
