use std::fmt::Display;
use std::fs::File;
use std::io::{self, Write};
use std::os::fd::FromRawFd;

/// Descriptor the container runtime hands over for the startup handshake.
const PARENT_FD: libc::c_int = 3;

/// Write end of the runtime's startup pipe.
///
/// The runtime blocks on this pipe until the proxy reports `0\n` (ready)
/// or `1\n` followed by an error message.
pub struct ParentPipe {
    file: File,
}

impl ParentPipe {
    /// Claims descriptor 3 if the parent passed one. Call before anything
    /// else in the process can open a file, or 3 may be something else.
    pub fn take() -> Option<Self> {
        // SAFETY: F_GETFD on a closed descriptor only returns -1 with EBADF.
        let flags = unsafe { libc::fcntl(PARENT_FD, libc::F_GETFD) };
        if flags == -1 {
            return None;
        }
        // SAFETY: the descriptor is open and nothing in this process owns it yet.
        let file = unsafe { File::from_raw_fd(PARENT_FD) };
        Some(Self { file })
    }

    pub fn report<E: Display>(mut self, result: Result<(), E>) {
        if let Err(e) = write_status(&mut self.file, result) {
            tracing::warn!(error = %e, "could not report status to parent");
        }
    }
}

pub fn write_status<W: Write, E: Display>(out: &mut W, result: Result<(), E>) -> io::Result<()> {
    match result {
        Ok(()) => out.write_all(b"0\n")?,
        Err(e) => write!(out, "1\n{e}")?,
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready() {
        let mut out = Vec::new();
        write_status::<_, String>(&mut out, Ok(())).unwrap();
        assert_eq!(out, b"0\n");
    }

    #[test]
    fn failure_carries_the_message() {
        let mut out = Vec::new();
        write_status(&mut out, Err("unsupported protocol sctp")).unwrap();
        assert_eq!(out, b"1\nunsupported protocol sctp");
    }
}
