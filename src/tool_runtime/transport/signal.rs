//! OS-level process signalling.

use std::io;

/// Asks process `pid` to terminate (SIGTERM).
///
/// A process that no longer exists counts as success.
///
/// # Errors
///
/// Returns an I/O error when the signal cannot be delivered.
pub fn terminate_process(pid: u32) -> io::Result<()> {
    deliver(pid, Delivery::Terminate)
}

/// Kills process `pid` outright (SIGKILL).
///
/// A process that no longer exists counts as success.
///
/// # Errors
///
/// Returns an I/O error when the signal cannot be delivered.
pub fn force_kill_process(pid: u32) -> io::Result<()> {
    deliver(pid, Delivery::Kill)
}

#[derive(Debug, Clone, Copy)]
enum Delivery {
    Terminate,
    Kill,
}

#[cfg(unix)]
fn deliver(pid: u32, delivery: Delivery) -> io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
    let signal = match delivery {
        Delivery::Terminate => Signal::SIGTERM,
        Delivery::Kill => Signal::SIGKILL,
    };
    match kill(Pid::from_raw(raw), signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(io::Error::from(errno)),
    }
}

#[cfg(not(unix))]
fn deliver(pid: u32, delivery: Delivery) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("cannot signal process {pid} ({delivery:?}) on this platform"),
    ))
}
