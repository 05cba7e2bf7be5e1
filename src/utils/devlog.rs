//! Developer trace lines ("level 6").
//!
//! `dev6!` formats a line, forwards it to the `nexusql::dev6` target at TRACE and, when the
//! calling thread has opted in, keeps a copy in a thread-local buffer so tests can assert on it
//! without installing a global logger.
use std::cell::RefCell;

pub const DEV6_TARGET: &str = "nexusql::dev6";

thread_local! {
    static CAPTURE: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

/// Stops capturing on the current thread when dropped.
#[derive(Debug)]
pub struct CaptureGuard;

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        CAPTURE.with(|c| *c.borrow_mut() = None);
    }
}

/// Starts capturing `dev6!` lines emitted on the current thread.
#[must_use]
pub fn enable_thread_sink() -> CaptureGuard {
    CAPTURE.with(|c| *c.borrow_mut() = Some(Vec::new()));
    CaptureGuard
}

pub fn write_str(line: &str) {
    CAPTURE.with(|c| {
        if let Some(buf) = c.borrow_mut().as_mut() {
            buf.push(line.to_owned());
        }
    });
}

/// Takes the captured lines, leaving the buffer empty.
#[must_use]
pub fn drain() -> Vec<String> {
    CAPTURE.with(|c| c.borrow_mut().as_mut().map(std::mem::take).unwrap_or_default())
}

#[must_use]
pub fn snapshot() -> Vec<String> {
    CAPTURE.with(|c| c.borrow().clone().unwrap_or_default())
}

#[macro_export]
macro_rules! dev6 {
    ($($arg:tt)*) => {{
        let line = format!($($arg)*);
        $crate::utils::devlog::write_str(&line);
        log::log!(target: $crate::utils::devlog::DEV6_TARGET, log::Level::Trace, "{}", line);
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_only_while_enabled() {
        crate::dev6!("before");
        let g = enable_thread_sink();
        crate::dev6!("cursor rows={}", 3);
        assert_eq!(snapshot(), vec!["cursor rows=3".to_owned()]);
        assert_eq!(drain().len(), 1);
        assert!(snapshot().is_empty());
        drop(g);
        crate::dev6!("after");
        assert!(drain().is_empty());
    }

    #[test]
    fn other_threads_are_not_captured() {
        let _g = enable_thread_sink();
        let child = std::thread::spawn(|| {
            crate::dev6!("child");
            snapshot()
        })
        .join()
        .unwrap();
        assert!(child.is_empty());
        assert!(snapshot().is_empty());
    }
}
