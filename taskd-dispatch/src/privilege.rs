//! Unix privilege drop: run a child process under a different user's identity.

use crate::error::{DispatchError, DispatchResult};

#[cfg(unix)]
pub(crate) fn apply(command: &mut tokio::process::Command, user: &str) -> DispatchResult<()> {
    use std::io;
    use std::os::unix::process::CommandExt;

    // SAFETY: getpwnam_r's C string input must be NUL-terminated; we build it
    // from a Rust String with an explicit NUL and never hold the CStr past
    // this function's scope.
    let c_user = std::ffi::CString::new(user).map_err(|_| DispatchError::PrivilegeDrop {
        user: user.to_owned(),
        reason: "username contains a NUL byte".into(),
    })?;

    let (uid, gid) = unsafe {
        let mut pwd: libc::passwd = std::mem::zeroed();
        let mut buf = vec![0_i8; 16384];
        let mut result: *mut libc::passwd = std::ptr::null_mut();

        let rc = libc::getpwnam_r(
            c_user.as_ptr(),
            &raw mut pwd,
            buf.as_mut_ptr(),
            buf.len(),
            &raw mut result,
        );
        if rc != 0 || result.is_null() {
            return Err(DispatchError::PrivilegeDrop {
                user: user.to_owned(),
                reason: io::Error::from_raw_os_error(rc).to_string(),
            });
        }
        (pwd.pw_uid, pwd.pw_gid)
    };

    unsafe {
        command.pre_exec(move || {
            if libc::setgid(gid) != 0 {
                return Err(io::Error::last_os_error());
            }
            if libc::setuid(uid) != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn apply(_command: &mut tokio::process::Command, user: &str) -> DispatchResult<()> {
    Err(DispatchError::InvalidRequest(format!(
        "running as user `{user}` requires unix privilege drop, unsupported on this platform"
    )))
}
