//! Transport seam: one command in, a lazy sequence of lines out.

use crate::ClientError;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

/// A finite, lazy sequence of response lines. The sequence ends when the
/// daemon closes the channel; it is not restartable — issuing the same
/// command again opens a new sequence.
pub type LineStream = Box<dyn Iterator<Item = Result<String, ClientError>>>;

/// Sends a command string to the daemon and yields its response lines.
pub trait CommandTransport {
    fn send(&self, command: &str) -> Result<LineStream, ClientError>;
}

impl<T: CommandTransport + ?Sized> CommandTransport for &T {
    fn send(&self, command: &str) -> Result<LineStream, ClientError> {
        (**self).send(command)
    }
}

/// The production transport: a unix stream socket per command.
pub struct UnixSocketTransport {
    socket_path: PathBuf,
}

impl UnixSocketTransport {
    pub fn new(socket_path: &Path) -> Self {
        Self {
            socket_path: socket_path.to_path_buf(),
        }
    }
}

impl CommandTransport for UnixSocketTransport {
    fn send(&self, command: &str) -> Result<LineStream, ClientError> {
        tracing::trace!(command, "sending daemon command");
        let mut stream = UnixStream::connect(&self.socket_path)?;
        stream.write_all(command.as_bytes())?;
        stream.write_all(b"\0")?;

        let reader = BufReader::new(stream);
        Ok(Box::new(
            reader.lines().map(|line| line.map_err(ClientError::from)),
        ))
    }
}
