// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Crexec engine library
//!
//! Loadable library exposing the checkpoint/restore shim to a managed
//! runtime. The only exported symbol is [`crlib_api`], which hands out a
//! versioned table of function pointers. Optional capabilities are reached
//! through `get_extension` by name and declared size.

#![allow(clippy::missing_safety_doc)]

use std::os::raw::{c_char, c_int};

use crexec_core::Engine;
use tracing_subscriber::EnvFilter;

mod extensions;
mod ffi;

pub use extensions::{
    get_extension, CrlibDescription, CrlibExtension, CrlibImageConstraints, CrlibImageScore,
    CrlibRestoreData, CrlibUserData, CrlibUserDataStorage, USER_DATA_ERROR, USER_DATA_FOUND,
    USER_DATA_NOT_FOUND,
};

use ffi::{engine_mut, guard, str_arg};

/// The only table version this library serves.
pub const CRLIB_API_VERSION: c_int = 1;

/// Environment variable holding the log filter directives.
pub const LOG_ENV: &str = "CREXEC_LOG";

/// Opaque configuration handle owned by the caller between `create_conf`
/// and `destroy_conf`.
pub struct CrlibConf {
    engine: Engine,
}

/// Top-level function table.
#[repr(C)]
pub struct CrlibApi {
    pub create_conf: extern "C" fn() -> *mut CrlibConf,
    pub destroy_conf: unsafe extern "C" fn(conf: *mut CrlibConf),
    pub checkpoint: unsafe extern "C" fn(conf: *mut CrlibConf) -> c_int,
    pub restore: unsafe extern "C" fn(conf: *mut CrlibConf) -> c_int,
    pub can_configure: unsafe extern "C" fn(conf: *mut CrlibConf, key: *const c_char) -> bool,
    pub configure: unsafe extern "C" fn(
        conf: *mut CrlibConf,
        key: *const c_char,
        value: *const c_char,
    ) -> bool,
    pub get_extension:
        unsafe extern "C" fn(name: *const c_char, size: usize) -> *const CrlibExtension,
}

static API: CrlibApi = CrlibApi {
    create_conf,
    destroy_conf,
    checkpoint,
    restore,
    can_configure,
    configure,
    get_extension,
};

/// Plugin entry point.
///
/// Returns null unless `api_version` is [`CRLIB_API_VERSION`] and the caller
/// expects no more than this library's table size.
#[no_mangle]
pub extern "C" fn crlib_api(api_version: c_int, api_size: usize) -> *const CrlibApi {
    if api_version != CRLIB_API_VERSION {
        return std::ptr::null();
    }
    if api_size > std::mem::size_of::<CrlibApi>() {
        return std::ptr::null();
    }
    &API
}

/// Install the stderr log subscriber unless the host already has one.
fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

extern "C" fn create_conf() -> *mut CrlibConf {
    guard("create_conf", std::ptr::null_mut(), || {
        init_logging();
        Box::into_raw(Box::new(CrlibConf {
            engine: Engine::new(),
        }))
    })
}

unsafe extern "C" fn destroy_conf(conf: *mut CrlibConf) {
    guard("destroy_conf", (), || {
        if !conf.is_null() {
            drop(Box::from_raw(conf));
        }
    })
}

unsafe extern "C" fn checkpoint(conf: *mut CrlibConf) -> c_int {
    guard("checkpoint", -1, || {
        let Some(engine) = engine_mut(conf) else {
            return -1;
        };
        match engine.checkpoint() {
            Ok(_) => 0,
            Err(_) => -1,
        }
    })
}

unsafe extern "C" fn restore(conf: *mut CrlibConf) -> c_int {
    guard("restore", -1, || {
        let Some(engine) = engine_mut(conf) else {
            return -1;
        };
        // Only returns on failure; the error has been logged.
        let _ = engine.restore();
        -1
    })
}

unsafe extern "C" fn can_configure(conf: *mut CrlibConf, key: *const c_char) -> bool {
    guard("can_configure", false, || {
        let (Some(engine), Some(key)) = (engine_mut(conf), str_arg(key, "key")) else {
            return false;
        };
        engine.can_configure(key)
    })
}

unsafe extern "C" fn configure(
    conf: *mut CrlibConf,
    key: *const c_char,
    value: *const c_char,
) -> bool {
    guard("configure", false, || {
        let (Some(engine), Some(key), Some(value)) = (
            engine_mut(conf),
            str_arg(key, "key"),
            str_arg(value, "value"),
        ) else {
            return false;
        };
        engine.configure(key, value).is_ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_and_size_checks() {
        let size = std::mem::size_of::<CrlibApi>();
        assert!(!crlib_api(CRLIB_API_VERSION, size).is_null());
        assert!(!crlib_api(CRLIB_API_VERSION, size - std::mem::size_of::<usize>()).is_null());
        assert!(crlib_api(CRLIB_API_VERSION, size + 1).is_null());
        assert!(crlib_api(2, size).is_null());
        assert!(crlib_api(0, size).is_null());
    }

    #[test]
    fn test_null_conf_is_rejected() {
        let key = b"image_location\0";
        unsafe {
            assert_eq!(checkpoint(std::ptr::null_mut()), -1);
            assert_eq!(restore(std::ptr::null_mut()), -1);
            assert!(!can_configure(std::ptr::null_mut(), key.as_ptr().cast()));
            destroy_conf(std::ptr::null_mut());
        }
    }
}
