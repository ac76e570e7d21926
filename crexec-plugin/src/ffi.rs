// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Argument conversion at the C boundary.

use std::ffi::CStr;
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crexec_core::Engine;

use crate::CrlibConf;

/// Run `f`, turning a panic into `fallback`.
pub(crate) fn guard<R>(function: &'static str, fallback: R, f: impl FnOnce() -> R) -> R {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| {
        tracing::error!(function, "Panic caught at plugin boundary");
        fallback
    })
}

/// Borrow the engine behind a config pointer.
///
/// # Safety
/// `conf` must be null or a pointer returned by `create_conf` that was not
/// destroyed yet.
pub(crate) unsafe fn engine_mut<'a>(conf: *mut CrlibConf) -> Option<&'a mut Engine> {
    match conf.as_mut() {
        Some(conf) => Some(&mut conf.engine),
        None => {
            tracing::error!("Null config pointer");
            None
        }
    }
}

/// Borrow a NUL-terminated UTF-8 argument.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string that outlives `'a`.
pub(crate) unsafe fn str_arg<'a>(ptr: *const c_char, what: &'static str) -> Option<&'a str> {
    if ptr.is_null() {
        tracing::error!(argument = what, "Null string argument");
        return None;
    }
    match CStr::from_ptr(ptr).to_str() {
        Ok(s) => Some(s),
        Err(_) => {
            tracing::error!(argument = what, "String argument is not valid UTF-8");
            None
        }
    }
}

/// Borrow `len` bytes at `ptr`. A null pointer is only accepted with `len == 0`.
///
/// # Safety
/// Unless null, `ptr` must be valid for reads of `len` bytes for `'a`.
pub(crate) unsafe fn bytes_arg<'a>(ptr: *const u8, len: usize) -> Option<&'a [u8]> {
    if ptr.is_null() {
        if len == 0 {
            return Some(&[]);
        }
        tracing::error!(len, "Null buffer with non-zero length");
        return None;
    }
    Some(std::slice::from_raw_parts(ptr, len))
}
