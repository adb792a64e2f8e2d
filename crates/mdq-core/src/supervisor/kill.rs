//! Process-tree termination.
//!
//! The downloader starts helper processes (ffmpeg and friends), so killing only
//! the direct child leaves orphans writing to the output directory.

use std::io;

/// Kill `pid` and all of its descendants.
///
/// On Unix the downloader is spawned as the leader of its own process group,
/// so the whole group is signalled. Elsewhere the tree is enumerated and
/// killed by `taskkill /T`.
#[cfg(unix)]
pub fn terminate_tree(pid: u32) -> io::Result<()> {
    let pgid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    let r = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if r == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    // Group already gone.
    if err.raw_os_error() == Some(libc::ESRCH) {
        return Ok(());
    }
    Err(err)
}

#[cfg(not(unix))]
pub fn terminate_tree(pid: u32) -> io::Result<()> {
    let status = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .status()?;
    if status.success() {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::Other,
            format!("taskkill exited with {status}"),
        ))
    }
}
