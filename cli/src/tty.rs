//! Terminal mode snapshot, taken before the line editor first runs and put
//! back on exit.

#[cfg(unix)]
mod imp {
    use std::sync::OnceLock;

    static SAVED: OnceLock<libc::termios> = OnceLock::new();

    pub(super) fn current() -> Option<libc::termios> {
        let fd = libc::STDIN_FILENO;
        // SAFETY: both calls only read the state of stdin into a zeroed
        // termios owned by this frame.
        unsafe {
            if libc::isatty(fd) != 1 {
                return None;
            }
            let mut mode: libc::termios = std::mem::zeroed();
            (libc::tcgetattr(fd, &mut mode) == 0).then_some(mode)
        }
    }

    pub fn save() {
        if let Some(mode) = current() {
            let _ = SAVED.set(mode);
        }
    }

    pub fn restore() {
        if let Some(mode) = SAVED.get() {
            // SAFETY: `mode` was read from the same descriptor by `save`.
            let rc = unsafe { libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, mode) };
            if rc != 0 {
                tracing::debug!("Failed to restore terminal mode");
            }
        }
    }

    #[cfg(test)]
    pub(super) fn saved_lflag() -> Option<libc::tcflag_t> {
        SAVED.get().map(|mode| mode.c_lflag)
    }
}

#[cfg(not(unix))]
mod imp {
    pub fn save() {}

    pub fn restore() {}
}

pub use imp::{restore, save};
