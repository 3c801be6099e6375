// src/channel.rs

//! The two child→parent byte channels of a run.
//!
//! - The **output** channel carries whatever the job writes.
//! - The **control** channel carries exactly one message: the job's result
//!   text followed by [`RESULT_TERMINATOR`], so even an empty result is a
//!   non-empty message.
//!
//! Both are anonymous pipes created close-on-exec in the parent. The write
//! ends are handed to the child by fd number (exported through
//! [`OUTPUT_FD_ENV`] / [`CONTROL_FD_ENV`]); close-on-exec is cleared on them
//! only inside the forked child, right before `exec`, so no other process the
//! parent spawns ever inherits them and the read ends never reach the child.

use std::io::{self, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use tokio::net::unix::pipe;

use crate::errors::{Result, StreamTaskError};

/// Environment variable holding the output channel's write fd in the child.
pub const OUTPUT_FD_ENV: &str = "STREAMTASK_OUTPUT_FD";

/// Environment variable holding the control channel's write fd in the child.
pub const CONTROL_FD_ENV: &str = "STREAMTASK_CONTROL_FD";

/// Last byte of the control message.
pub const RESULT_TERMINATOR: u8 = 0;

/// One anonymous pipe, both ends owned.
#[derive(Debug)]
pub struct Pipe {
    pub read: OwnedFd,
    pub write: OwnedFd,
}

impl Pipe {
    pub fn open() -> io::Result<Self> {
        let mut fds: [RawFd; 2] = [-1; 2];
        // SAFETY: `fds` is a valid, writable array of two descriptors.
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: pipe(2) succeeded, so both descriptors are open and ours.
        let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
        set_cloexec(read.as_raw_fd(), true)?;
        set_cloexec(write.as_raw_fd(), true)?;
        Ok(Self { read, write })
    }
}

/// Both channel pairs of a run, opened output first, then control.
#[derive(Debug)]
pub struct ChannelPairs {
    output: Pipe,
    control: Pipe,
}

impl ChannelPairs {
    pub fn open() -> io::Result<Self> {
        let output = Pipe::open()?;
        let control = Pipe::open()?;
        Ok(Self { output, control })
    }

    /// Separate the read ends (kept by the parent) from the write ends
    /// (handed to the child).
    pub fn split(self) -> (ReadEnds, ChildEnds) {
        (
            ReadEnds {
                output: self.output.read,
                control: self.control.read,
            },
            ChildEnds {
                output: self.output.write,
                control: self.control.write,
            },
        )
    }
}

/// Parent-side read ends before they are registered with the runtime.
#[derive(Debug)]
pub struct ReadEnds {
    pub output: OwnedFd,
    pub control: OwnedFd,
}

impl ReadEnds {
    /// Register both read ends with the Tokio reactor (non-blocking mode).
    ///
    /// Must be called from within a Tokio runtime.
    pub fn into_receivers(self) -> io::Result<ParentChannels> {
        let output = pipe::Receiver::from_owned_fd(self.output)?;
        let control = pipe::Receiver::from_owned_fd(self.control)?;
        Ok(ParentChannels { output, control })
    }
}

/// Write ends of both channels, as seen by whoever writes to them.
#[derive(Debug)]
pub struct ChildEnds {
    pub output: OwnedFd,
    pub control: OwnedFd,
}

impl ChildEnds {
    /// Environment entries that tell the child where its write ends live.
    pub fn env(&self) -> [(&'static str, String); 2] {
        [
            (OUTPUT_FD_ENV, self.output.as_raw_fd().to_string()),
            (CONTROL_FD_ENV, self.control.as_raw_fd().to_string()),
        ]
    }

    pub fn raw_fds(&self) -> (RawFd, RawFd) {
        (self.output.as_raw_fd(), self.control.as_raw_fd())
    }

    /// Adopt the write ends exported by the supervisor (child side).
    ///
    /// Close-on-exec is set again on both so that processes spawned by the
    /// job do not inherit the channels.
    pub fn from_env() -> Result<Self> {
        let output = inherited_fd(OUTPUT_FD_ENV)?;
        let control = inherited_fd(CONTROL_FD_ENV)?;
        if output == control {
            return Err(StreamTaskError::ChannelError(format!(
                "{OUTPUT_FD_ENV} and {CONTROL_FD_ENV} name the same descriptor ({output})"
            )));
        }
        set_cloexec(output, true)?;
        set_cloexec(control, true)?;
        // SAFETY: both descriptors were validated as open by `inherited_fd`,
        // are distinct, and nothing else in this process claims them.
        let (output, control) = unsafe { (OwnedFd::from_raw_fd(output), OwnedFd::from_raw_fd(control)) };
        Ok(Self { output, control })
    }
}

/// Parent-side channels, registered with the runtime.
#[derive(Debug)]
pub struct ParentChannels {
    pub output: pipe::Receiver,
    pub control: pipe::Receiver,
}

impl ParentChannels {
    /// Close both read ends in the order they were opened.
    pub fn close(self) {
        let ParentChannels { output, control } = self;
        drop(output);
        drop(control);
    }
}

/// Zero-timeout readiness check plus bounded read.
///
/// Returns `Ok(None)` when nothing is ready, `Ok(Some(0))` on end of stream.
pub fn read_ready(rx: &pipe::Receiver, buf: &mut [u8]) -> io::Result<Option<usize>> {
    match rx.try_read(buf) {
        Ok(n) => Ok(Some(n)),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(e) => Err(e),
    }
}

/// Write the control message: `result`, the terminator, then flush.
pub fn write_result(control: &mut impl Write, result: &str) -> io::Result<()> {
    control.write_all(result.as_bytes())?;
    control.write_all(&[RESULT_TERMINATOR])?;
    control.flush()
}

/// Toggle `FD_CLOEXEC` on a descriptor.
///
/// Only calls `fcntl`, so it is safe to use between `fork` and `exec`.
pub fn set_cloexec(fd: RawFd, enabled: bool) -> io::Result<()> {
    // SAFETY: F_GETFD only reads descriptor flags; a bad fd yields EBADF.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    let new_flags = if enabled {
        flags | libc::FD_CLOEXEC
    } else {
        flags & !libc::FD_CLOEXEC
    };
    // SAFETY: F_SETFD only changes descriptor flags; a bad fd yields EBADF.
    if unsafe { libc::fcntl(fd, libc::F_SETFD, new_flags) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn inherited_fd(var: &str) -> Result<RawFd> {
    let raw = std::env::var(var).map_err(|_| {
        StreamTaskError::ChannelError(format!("{var} is not set; not running under a supervisor"))
    })?;
    let fd: RawFd = raw
        .trim()
        .parse()
        .map_err(|_| StreamTaskError::ChannelError(format!("{var}={raw:?} is not a descriptor")))?;
    // SAFETY: F_GETFD only reads descriptor flags; a closed fd yields EBADF.
    if fd < 0 || unsafe { libc::fcntl(fd, libc::F_GETFD) } < 0 {
        return Err(StreamTaskError::ChannelError(format!(
            "{var}={fd} does not name an open descriptor"
        )));
    }
    Ok(fd)
}
