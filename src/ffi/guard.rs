//! Panic containment for the C entry points.
//!
//! Every `extern "C" fn` in this crate runs its body through one of these
//! helpers so an unwind never crosses into the host.

use std::backtrace::Backtrace;
use std::panic::{self, AssertUnwindSafe};

use tracing::error;

use crate::worker::panic_message;

/// Run `f`, returning `default` if it panics.
pub(crate) fn guard_with_default<T>(
    op: &'static str,
    default: T,
    f: impl FnOnce() -> T,
) -> T {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(payload) => {
            report(op, payload);
            default
        }
    }
}

/// Run `f`, swallowing a panic after logging it.
pub(crate) fn guard_void(
    op: &'static str,
    f: impl FnOnce(),
) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
        report(op, payload);
    }
}

fn report(
    op: &'static str,
    payload: Box<dyn std::any::Any + Send>,
) {
    let msg = panic_message(payload);
    let bt = Backtrace::force_capture();
    error!(op, panic = %msg, "panic in C entry point\nbacktrace:\n{}", bt);
}
