use std::fs::File;
use std::io::{self, Write};
use std::os::fd::{FromRawFd, RawFd};

/// Private duplicate of the descriptor the orchestrator reads the protocol
/// document from.
///
/// Claiming it points the original descriptor somewhere else, so output that
/// bypasses the host's stream capture (child processes, native extensions)
/// can no longer corrupt the document.
#[derive(Debug)]
pub struct ProtocolChannel {
    file: File,
}

impl ProtocolChannel {
    /// Takes over stdout and sends everything else written to fd 1 to stderr.
    /// Must run before any script code.
    pub fn claim_stdout() -> io::Result<Self> {
        io::stdout().flush()?;
        Self::claim(libc::STDOUT_FILENO, libc::STDERR_FILENO)
    }

    pub fn claim(target: RawFd, divert_to: RawFd) -> io::Result<Self> {
        // Close-on-exec keeps the copy out of every child the script spawns.
        // Safety: fcntl has no memory-safety preconditions.
        let private = unsafe { libc::fcntl(target, libc::F_DUPFD_CLOEXEC, 3) };
        if private < 0 {
            return Err(io::Error::last_os_error());
        }
        // Safety: `private` is a freshly duplicated descriptor owned by nothing else.
        let file = unsafe { File::from_raw_fd(private) };

        // Safety: dup2 has no memory-safety preconditions.
        if unsafe { libc::dup2(divert_to, target) } < 0 {
            return Err(io::Error::last_os_error());
        }
        tracing::debug!("Protocol channel moved from fd {} to fd {}", target, private);
        Ok(Self { file })
    }
}

impl Write for ProtocolChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}
