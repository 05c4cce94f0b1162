// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Backtraces for reported panics.
//!
//! By the time a panic is caught with `catch_unwind` the stack has already
//! been unwound, so a backtrace taken at the report site only shows the
//! recovery boundary. [`install_panic_hook`] registers a hook that captures
//! the backtrace at the panic site and stashes it in a thread local, where
//! [`take_backtrace`] picks it up.
//!
//! The stash is keyed by the panic message, so a panic swallowed elsewhere
//! on the same thread never lends its backtrace to a later report.

use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic;
use std::sync::Once;

use crate::panic::panic_message;

struct StashedBacktrace {
    message: String,
    backtrace: String,
}

thread_local! {
    static LAST_PANIC_BACKTRACE: RefCell<Option<StashedBacktrace>> = const { RefCell::new(None) };
}

static REGISTER_HOOK: Once = Once::new();

/// Register the panic hook.
///
/// Registers only once; the previously installed hook keeps running after the
/// backtrace is stashed.
pub fn install_panic_hook() {
    REGISTER_HOOK.call_once(|| {
        let previous_hook = panic::take_hook();
        panic::set_hook(Box::new(move |panic_info| {
            let stashed = StashedBacktrace {
                message: panic_message(panic_info.payload()),
                backtrace: Backtrace::force_capture().to_string(),
            };
            let _ = LAST_PANIC_BACKTRACE.try_with(|slot| {
                if let Ok(mut slot) = slot.try_borrow_mut() {
                    *slot = Some(stashed);
                }
            });
            previous_hook(panic_info);
        }));
    });
}

/// Backtrace of the last panic on this thread if it carried `message`,
/// otherwise of the current stack. The stash is cleared either way.
pub fn take_backtrace(message: &str) -> String {
    LAST_PANIC_BACKTRACE
        .try_with(|slot| slot.try_borrow_mut().ok().and_then(|mut slot| slot.take()))
        .ok()
        .flatten()
        .filter(|stashed| stashed.message == message)
        .map(|stashed| stashed.backtrace)
        .unwrap_or_else(|| Backtrace::force_capture().to_string())
}
