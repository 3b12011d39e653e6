//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! Each type mirrors a core type but uses C-compatible representations:
//! `*mut c_char` instead of `String`, raw pointer plus length instead of
//! `Vec`, and tagged enums with explicit discriminants. Conversion and
//! release functions live here to keep `lib.rs` focused on the `extern "C"`
//! surface.

use std::ffi::CString;
use std::os::raw::c_char;

use cat_core::{AppState, CatController, ErrorKind};

/// Opaque handle to a `CatController` and the runtime its tasks run on.
/// C callers receive a pointer to this and pass it back into every FFI
/// function.
pub struct FfiCatController {
    pub(crate) inner: CatController,
    pub(crate) runtime: tokio::runtime::Runtime,
}

/// Outcome of a command call. Command results arrive later through
/// `cat_state_snapshot`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiStatus {
    Ok = 0,
    NullArg = 1,
    InvalidArg = 2,
    Panic = 3,
}

/// Kind of the last error, `None` when no error has been recorded.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiErrorKind {
    None = 0,
    NotFound = 1,
    Http = 2,
    Transport = 3,
    Deserialization = 4,
    Decode = 5,
    Exhausted = 6,
}

impl From<ErrorKind> for FfiErrorKind {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::NotFound => FfiErrorKind::NotFound,
            ErrorKind::Http => FfiErrorKind::Http,
            ErrorKind::Transport => FfiErrorKind::Transport,
            ErrorKind::Deserialization => FfiErrorKind::Deserialization,
            ErrorKind::Decode => FfiErrorKind::Decode,
            ErrorKind::Exhausted => FfiErrorKind::Exhausted,
        }
    }
}

/// Copy of the controller's observable state.
///
/// Absent values are null pointers with zero lengths; `tags_present`
/// distinguishes "never fetched" from "fetched an empty list". The C caller
/// owns the snapshot and must release it with `cat_state_free`.
#[repr(C)]
pub struct FfiCatState {
    pub revision: u64,
    pub image: *mut u8,
    pub image_len: usize,
    pub image_content_type: *mut c_char,
    pub tags_present: bool,
    pub tags: *mut *mut c_char,
    pub tags_len: u32,
    pub error_kind: FfiErrorKind,
    pub error_status: u16,
    pub error_message: *mut c_char,
    /// User-facing notice for the last error, null when none applies.
    pub notice: *mut c_char,
}

impl FfiCatState {
    /// Convert a core `AppState` into a heap-allocated `FfiCatState`.
    pub(crate) fn from_core(state: AppState) -> *mut Self {
        let (image, image_len, image_content_type) = match state.image {
            Some(payload) => {
                let len = payload.bytes.len();
                let bytes: Box<[u8]> = payload.bytes.to_vec().into_boxed_slice();
                let content_type = payload
                    .content_type
                    .as_deref()
                    .map_or(std::ptr::null_mut(), c_string);
                (Box::into_raw(bytes) as *mut u8, len, content_type)
            }
            None => (std::ptr::null_mut(), 0, std::ptr::null_mut()),
        };

        let tags_present = state.tags.is_some();
        let (tags, tags_len) = match state.tags {
            Some(tags) if !tags.is_empty() => {
                let len = tags.len() as u32;
                let items: Box<[*mut c_char]> = tags.iter().map(|t| c_string(t)).collect();
                (Box::into_raw(items) as *mut *mut c_char, len)
            }
            _ => (std::ptr::null_mut(), 0),
        };

        let (error_kind, error_status, error_message, notice) = match &state.last_error {
            Some(error) => (
                FfiErrorKind::from(error.kind),
                error.status.unwrap_or(0),
                c_string(&error.message),
                error.notice().map_or(std::ptr::null_mut(), c_string),
            ),
            None => (
                FfiErrorKind::None,
                0,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            ),
        };

        Box::into_raw(Box::new(FfiCatState {
            revision: state.revision,
            image,
            image_len,
            image_content_type,
            tags_present,
            tags,
            tags_len,
            error_kind,
            error_status,
            error_message,
            notice,
        }))
    }

    /// Release a snapshot built by `from_core`.
    ///
    /// # Safety
    /// `ptr` must come from `from_core` and must not be used afterwards.
    pub(crate) unsafe fn free(ptr: *mut Self) {
        let state = unsafe { Box::from_raw(ptr) };
        if !state.image.is_null() {
            let slice = std::ptr::slice_from_raw_parts_mut(state.image, state.image_len);
            drop(unsafe { Box::from_raw(slice) });
        }
        if !state.tags.is_null() {
            let slice = std::ptr::slice_from_raw_parts_mut(state.tags, state.tags_len as usize);
            let items = unsafe { Box::from_raw(slice) };
            for item in items.iter() {
                unsafe { free_c_string(*item) };
            }
        }
        unsafe {
            free_c_string(state.image_content_type);
            free_c_string(state.error_message);
            free_c_string(state.notice);
        }
    }
}

/// Heap-allocate `s` as a C string. Interior NULs are dropped, since C
/// cannot represent them.
pub(crate) fn c_string(s: &str) -> *mut c_char {
    CString::new(s.replace('\0', ""))
        .unwrap_or_default()
        .into_raw()
}

/// # Safety
/// `ptr` must be null or come from `c_string`.
pub(crate) unsafe fn free_c_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(unsafe { CString::from_raw(ptr) });
    }
}
