//! Records panics as error messages before the process unwinds
//!
//! [`enable_log_on_panic`] chains onto the existing panic hook, so the usual
//! stderr backtrace still prints. The panic message only reaches disk once
//! the hosting application flushes its stores; a panic that is caught and
//! recovered from shows up in the next snapshot.

use std::collections::BTreeMap;
use std::panic::PanicHookInfo;

use parking_lot::Mutex;

use crate::default::try_default_distributor;
use crate::message::LogKind;

type PanicHook = Box<dyn Fn(&PanicHookInfo<'_>) + Send + Sync + 'static>;

static PREVIOUS_HOOK: Mutex<Option<PanicHook>> = Mutex::new(None);

/// Install a panic hook that logs the panic payload and location as an
/// Error-kind message through the process-wide distributor, then invokes
/// the previously installed hook. Calling it twice is a no-op.
///
/// Nothing is logged for panics that occur before the process-wide
/// distributor exists; the hook never creates it.
pub fn enable_log_on_panic() {
    let mut previous = PREVIOUS_HOOK.lock();
    if previous.is_some() {
        return;
    }
    *previous = Some(std::panic::take_hook());

    std::panic::set_hook(Box::new(|info| {
        log_panic(info);
        if let Some(previous) = &*PREVIOUS_HOOK.lock() {
            previous(info);
        }
    }));
}

/// Restore the panic hook that was installed before
/// [`enable_log_on_panic`]. A no-op when logging on panic is not enabled.
pub fn disable_log_on_panic() {
    let previous = PREVIOUS_HOOK.lock().take();
    if let Some(previous) = previous {
        std::panic::set_hook(previous);
    }
}

fn log_panic(info: &PanicHookInfo<'_>) {
    let Some(distributor) = try_default_distributor() else {
        return;
    };

    let payload = if let Some(text) = info.payload().downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = info.payload().downcast_ref::<String>() {
        text.clone()
    } else {
        "opaque panic payload".to_string()
    };

    let mut parameters = BTreeMap::new();
    if let Some(location) = info.location() {
        parameters.insert("location".to_string(), location.to_string());
    }

    distributor.log_detailed(format!("Panic: {payload}"), None, LogKind::Error, parameters);
}
