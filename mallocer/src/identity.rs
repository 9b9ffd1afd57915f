use std::{env, ffi::OsStr, os::unix::process::CommandExt, process::Command};

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

// kernel keeps 16 bytes for the task name including the terminating zero
const COMM_LEN: usize = 16;

/// Makes the process show up as `name` in ps and top.
///
/// argv[0] can only be replaced by executing the binary again, so the first call re-executes
/// /proc/self/exe with the same arguments and never returns on success. The re-executed process
/// sees argv[0] == name, skips that step and updates the task name (/proc/<pid>/comm).
pub(crate) fn rename(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("process name must not be empty");
    }
    if env::args_os().next().as_deref() != Some(OsStr::new(name)) {
        return Err(reexec(name));
    }
    set_comm(name)
}

fn reexec(name: &str) -> anyhow::Error {
    let exe = match env::current_exe() {
        Ok(exe) => exe,
        Err(err) => return anyhow::Error::new(err).context("locate own executable"),
    };
    info!("re-executing {} as {}", exe.display(), name);
    let err = Command::new(&exe).arg0(name).args(env::args_os().skip(1)).exec();
    anyhow::Error::new(err).context(format!("re-execute {} as {}", exe.display(), name))
}

/// Task name as the kernel stores it: truncated to 15 bytes on a char boundary, zero padded.
pub(crate) fn comm(name: &str) -> [u8; COMM_LEN] {
    let mut len = name.len().min(COMM_LEN - 1);
    while !name.is_char_boundary(len) {
        len -= 1;
    }
    let mut comm = [0; COMM_LEN];
    comm[..len].copy_from_slice(&name.as_bytes()[..len]);
    comm
}

#[cfg(target_os = "linux")]
fn set_comm(name: &str) -> Result<()> {
    let comm = comm(name);
    if unsafe { libc::prctl(libc::PR_SET_NAME, comm.as_ptr() as libc::c_ulong, 0, 0, 0) } != 0 {
        return Err(std::io::Error::last_os_error()).context("prctl(PR_SET_NAME)");
    }
    debug!("task name set to {}", String::from_utf8_lossy(&comm).trim_end_matches('\0'));
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn set_comm(name: &str) -> Result<()> {
    debug!("task name can't be changed on this platform, keeping argv[0] = {}", name);
    Ok(())
}
