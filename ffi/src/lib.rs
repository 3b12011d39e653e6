//! C-ABI wrapper around `cat-core`.
//!
//! # Overview
//! Lets a host UI written in any language with a C FFI drive a
//! `CatController`: create it, issue commands, and poll snapshots of the
//! observable state. The host never links against Rust's async runtime; each
//! controller handle owns a small multi-thread tokio runtime.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - Commands return immediately with an `FfiStatus` describing argument
//!   problems only. Network outcomes arrive through `cat_state_snapshot`;
//!   hosts compare `revision` to detect changes.
//! - The C caller owns all returned pointers and must call the matching
//!   `cat_*_free` function to release them.

pub mod types;

use std::ffi::CStr;
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use cat_core::{CatConfig, CatController};
use tracing::warn;

use types::*;

const RUNTIME_WORKER_THREADS: usize = 2;
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(250);

// ---------------------------------------------------------------------------
// Controller lifecycle
// ---------------------------------------------------------------------------

/// Create a controller bound to `base_url` and start loading a random cat.
///
/// An empty `base_url` uses the configured default (`cat.toml`,
/// `CAT_API_BASE_URL`, or cataas.com). Returns null if `base_url` is null,
/// not UTF-8, not a usable URL, or if the runtime cannot be started. The
/// caller must free the returned pointer with `cat_controller_free`.
#[unsafe(no_mangle)]
pub extern "C" fn cat_controller_new(base_url: *const c_char) -> *mut FfiCatController {
    catch_unwind(|| {
        if base_url.is_null() {
            return std::ptr::null_mut();
        }
        let Ok(url) = unsafe { CStr::from_ptr(base_url) }.to_str() else {
            return std::ptr::null_mut();
        };

        let mut config = CatConfig::load();
        if !url.is_empty() {
            config.base_url = url.trim_end_matches('/').to_string();
        }

        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .worker_threads(RUNTIME_WORKER_THREADS)
            .thread_name("cat-ffi")
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                warn!(error = %e, "failed to start runtime");
                return std::ptr::null_mut();
            }
        };

        let inner = {
            let _guard = runtime.enter();
            match CatController::from_config(&config, runtime.handle().clone()) {
                Ok(controller) => controller,
                Err(e) => {
                    warn!(error = %e, base_url = %config.base_url, "failed to create controller");
                    return std::ptr::null_mut();
                }
            }
        };
        Box::into_raw(Box::new(FfiCatController { inner, runtime }))
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Free a controller created by `cat_controller_new`, cancelling any
/// in-flight requests. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn cat_controller_free(controller: *mut FfiCatController) {
    if controller.is_null() {
        return;
    }
    let _ = catch_unwind(AssertUnwindSafe(|| {
        let FfiCatController { inner, runtime } = *unsafe { Box::from_raw(controller) };
        drop(inner);
        runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
    }));
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Run `f` against the controller behind `controller`, mapping null and
/// panics to status codes.
fn with_controller(
    controller: *const FfiCatController,
    f: impl FnOnce(&CatController) -> FfiStatus,
) -> FfiStatus {
    catch_unwind(AssertUnwindSafe(|| {
        if controller.is_null() {
            return FfiStatus::NullArg;
        }
        let controller = unsafe { &*controller };
        f(&controller.inner)
    }))
    .unwrap_or(FfiStatus::Panic)
}

/// Request a new random cat image.
#[unsafe(no_mangle)]
pub extern "C" fn cat_request_random_image(controller: *const FfiCatController) -> FfiStatus {
    with_controller(controller, |c| {
        c.request_random_image();
        FfiStatus::Ok
    })
}

/// Request the tag list.
#[unsafe(no_mangle)]
pub extern "C" fn cat_request_tags(controller: *const FfiCatController) -> FfiStatus {
    with_controller(controller, |c| {
        c.request_tags();
        FfiStatus::Ok
    })
}

/// Request a cat image matching `tag`.
///
/// Returns `NullArg` if `tag` is null and `InvalidArg` if it is not UTF-8.
/// An unknown tag is not an argument error: it shows up later as a
/// `NotFound` error in the state snapshot.
#[unsafe(no_mangle)]
pub extern "C" fn cat_request_image_by_tag(
    controller: *const FfiCatController,
    tag: *const c_char,
) -> FfiStatus {
    with_controller(controller, |c| {
        if tag.is_null() {
            return FfiStatus::NullArg;
        }
        match unsafe { CStr::from_ptr(tag) }.to_str() {
            Ok(tag) => {
                c.request_image_by_tag(tag);
                FfiStatus::Ok
            }
            Err(_) => FfiStatus::InvalidArg,
        }
    })
}

/// Number of commands whose result has not been applied yet. Returns 0 for
/// a null controller.
#[unsafe(no_mangle)]
pub extern "C" fn cat_pending_requests(controller: *const FfiCatController) -> u32 {
    catch_unwind(AssertUnwindSafe(|| {
        if controller.is_null() {
            return 0;
        }
        let controller = unsafe { &*controller };
        controller.inner.pending_requests() as u32
    }))
    .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Copy the controller's current state.
///
/// Returns null if `controller` is null. The caller must free the returned
/// pointer with `cat_state_free`.
#[unsafe(no_mangle)]
pub extern "C" fn cat_state_snapshot(controller: *const FfiCatController) -> *mut FfiCatState {
    catch_unwind(AssertUnwindSafe(|| {
        if controller.is_null() {
            return std::ptr::null_mut();
        }
        let controller = unsafe { &*controller };
        FfiCatState::from_core(controller.inner.snapshot())
    }))
    .unwrap_or(std::ptr::null_mut())
}

/// Free a snapshot returned by `cat_state_snapshot`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn cat_state_free(state: *mut FfiCatState) {
    if state.is_null() {
        return;
    }
    let _ = catch_unwind(AssertUnwindSafe(|| unsafe { FfiCatState::free(state) }));
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
