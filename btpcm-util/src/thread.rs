use std::ffi::CString;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};

/// Name the current thread for `ps`/`top`/core dumps, same pattern the
/// transfer thread and application thread both use.
pub fn set_name(name: &str) {
    let cstr = CString::new(name).expect("thread name must not contain NUL");

    unsafe {
        libc::pthread_setname_np(libc::pthread_self(), cstr.as_ptr());
    }
}

/// Best-effort: give the transfer thread realtime scheduling priority so
/// rate pacing isn't at the mercy of the regular scheduler. Logs and
/// continues on failure rather than treating it as fatal - a plug-in
/// running as an unprivileged user is a completely normal deployment.
pub fn set_realtime_priority() {
    let rc = unsafe {
        libc::sched_setscheduler(
            0,
            libc::SCHED_FIFO,
            &libc::sched_param { sched_priority: 99 },
        )
    };

    if rc < 0 {
        static WARNED: AtomicBool = AtomicBool::new(false);
        let warned = WARNED.swap(true, Ordering::Relaxed);

        if !warned {
            let err = std::io::Error::last_os_error();
            log::warn!("failed to set realtime thread priority: {err}");

            if err.kind() == ErrorKind::PermissionDenied {
                let path = std::env::current_exe()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|_| "path/to/btpcm".to_string());

                log::warn!("fix by running: setcap cap_sys_nice=ep {path}");
            }
        }
    }
}
