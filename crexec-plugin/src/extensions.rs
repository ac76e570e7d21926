// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Optional capabilities reachable through `get_extension`.
//!
//! Every extension struct starts with a [`CrlibExtension`] header carrying
//! its name and its own size. A caller asking for more than that size gets
//! nothing, so extension structs may only grow by appending fields.

use std::ffi::{c_void, CString};
use std::fmt::Display;
use std::os::raw::{c_char, c_int};
use std::sync::OnceLock;

use crexec_core::{BitmapComparison, ConfigStore, KeyedDispatch, RestoreToken, UserDataStorage};

use crate::ffi::{bytes_arg, engine_mut, guard, str_arg};
use crate::CrlibConf;

/// Header shared by every extension.
#[repr(C)]
pub struct CrlibExtension {
    pub name: *const c_char,
    pub size: usize,
}

// `name` only ever points to static NUL-terminated strings.
unsafe impl Sync for CrlibExtension {}

const fn header(name: &'static [u8], size: usize) -> CrlibExtension {
    CrlibExtension {
        name: name.as_ptr() as *const c_char,
        size,
    }
}

/// Self description of the library.
#[repr(C)]
pub struct CrlibDescription {
    pub header: CrlibExtension,
    pub identity: unsafe extern "C" fn(conf: *mut CrlibConf) -> *const c_char,
    pub description: unsafe extern "C" fn(conf: *mut CrlibConf) -> *const c_char,
    pub configuration_doc: unsafe extern "C" fn(conf: *mut CrlibConf) -> *const c_char,
    pub configurable_keys: unsafe extern "C" fn(conf: *mut CrlibConf) -> *const *const c_char,
    pub supported_extensions: unsafe extern "C" fn(conf: *mut CrlibConf) -> *const *const c_char,
}

/// Restore token exchange between the runtime and the shim.
#[repr(C)]
pub struct CrlibRestoreData {
    pub header: CrlibExtension,
    pub set_restore_data:
        unsafe extern "C" fn(conf: *mut CrlibConf, data: *const c_void, size: usize) -> bool,
    pub get_restore_data:
        unsafe extern "C" fn(conf: *mut CrlibConf, data: *mut c_void, size: usize) -> usize,
}

#[repr(C)]
pub struct CrlibImageConstraints {
    pub header: CrlibExtension,
    pub set_label: unsafe extern "C" fn(
        conf: *mut CrlibConf,
        name: *const c_char,
        value: *const c_char,
    ) -> bool,
    pub set_bitmap: unsafe extern "C" fn(
        conf: *mut CrlibConf,
        name: *const c_char,
        data: *const u8,
        size: usize,
    ) -> bool,
    pub require_label: unsafe extern "C" fn(
        conf: *mut CrlibConf,
        name: *const c_char,
        value: *const c_char,
    ) -> bool,
    pub require_bitmap: unsafe extern "C" fn(
        conf: *mut CrlibConf,
        name: *const c_char,
        data: *const u8,
        size: usize,
        comparison: c_int,
    ) -> bool,
    pub is_failed: unsafe extern "C" fn(conf: *mut CrlibConf, name: *const c_char) -> bool,
}

#[repr(C)]
pub struct CrlibImageScore {
    pub header: CrlibExtension,
    pub set_score:
        unsafe extern "C" fn(conf: *mut CrlibConf, name: *const c_char, value: f64) -> bool,
}

/// Opaque handle owning every buffer returned by `lookup_user_data`.
pub struct CrlibUserDataStorage {
    storage: UserDataStorage,
}

/// `lookup_user_data` found the entry.
pub const USER_DATA_FOUND: c_int = 0;
/// `lookup_user_data` found no such entry.
pub const USER_DATA_NOT_FOUND: c_int = 1;
/// `lookup_user_data` failed for another reason.
pub const USER_DATA_ERROR: c_int = -1;

#[repr(C)]
pub struct CrlibUserData {
    pub header: CrlibExtension,
    pub set_user_data: unsafe extern "C" fn(
        conf: *mut CrlibConf,
        name: *const c_char,
        data: *const u8,
        size: usize,
    ) -> bool,
    pub load_user_data: unsafe extern "C" fn(conf: *mut CrlibConf) -> *mut CrlibUserDataStorage,
    pub lookup_user_data: unsafe extern "C" fn(
        storage: *mut CrlibUserDataStorage,
        name: *const c_char,
        data: *mut *const u8,
        size: *mut usize,
    ) -> c_int,
    pub destroy_user_data: unsafe extern "C" fn(storage: *mut CrlibUserDataStorage),
}

static DESCRIPTION: CrlibDescription = CrlibDescription {
    header: header(b"description\0", std::mem::size_of::<CrlibDescription>()),
    identity,
    description,
    configuration_doc,
    configurable_keys,
    supported_extensions,
};

static RESTORE_DATA: CrlibRestoreData = CrlibRestoreData {
    header: header(b"restore_data\0", std::mem::size_of::<CrlibRestoreData>()),
    set_restore_data,
    get_restore_data,
};

static IMAGE_CONSTRAINTS: CrlibImageConstraints = CrlibImageConstraints {
    header: header(
        b"image_constraints\0",
        std::mem::size_of::<CrlibImageConstraints>(),
    ),
    set_label,
    set_bitmap,
    require_label,
    require_bitmap,
    is_failed,
};

static IMAGE_SCORE: CrlibImageScore = CrlibImageScore {
    header: header(b"image_score\0", std::mem::size_of::<CrlibImageScore>()),
    set_score,
};

static USER_DATA: CrlibUserData = CrlibUserData {
    header: header(b"user_data\0", std::mem::size_of::<CrlibUserData>()),
    set_user_data,
    load_user_data,
    lookup_user_data,
    destroy_user_data,
};

static EXTENSIONS: [(&str, &CrlibExtension); 5] = [
    ("description", &DESCRIPTION.header),
    ("restore_data", &RESTORE_DATA.header),
    ("image_constraints", &IMAGE_CONSTRAINTS.header),
    ("image_score", &IMAGE_SCORE.header),
    ("user_data", &USER_DATA.header),
];

fn registry() -> &'static KeyedDispatch<&'static CrlibExtension> {
    static REGISTRY: OnceLock<KeyedDispatch<&'static CrlibExtension>> = OnceLock::new();
    REGISTRY.get_or_init(|| KeyedDispatch::from_entries(&EXTENSIONS))
}

/// Look up an extension by name, provided the caller expects no more than
/// its declared size.
pub unsafe extern "C" fn get_extension(name: *const c_char, size: usize) -> *const CrlibExtension {
    guard("get_extension", std::ptr::null(), || {
        let Some(name) = str_arg(name, "name") else {
            return std::ptr::null();
        };
        match registry().get(name) {
            Some(ext) if size <= ext.size => *ext as *const CrlibExtension,
            Some(ext) => {
                tracing::debug!(
                    name,
                    requested = size,
                    available = ext.size,
                    "Extension smaller than requested"
                );
                std::ptr::null()
            }
            None => {
                tracing::debug!(name, "Unknown extension");
                std::ptr::null()
            }
        }
    })
}

/// Log a failed call and flatten its result for the C side.
fn report<E: Display>(operation: &'static str, result: Result<(), E>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(operation, error = %e, "Extension call failed");
            false
        }
    }
}

// Description

/// NUL-terminated pointer array with owned strings behind it.
struct CStringList {
    _owned: Vec<CString>,
    ptrs: Vec<*const c_char>,
}

// The pointers reference `_owned`, which is never mutated after construction.
unsafe impl Send for CStringList {}
unsafe impl Sync for CStringList {}

impl CStringList {
    fn new<'a>(items: impl IntoIterator<Item = &'a str>) -> Self {
        let owned: Vec<CString> = items
            .into_iter()
            .filter_map(|s| CString::new(s).ok())
            .collect();
        let mut ptrs: Vec<*const c_char> = owned.iter().map(|s| s.as_ptr()).collect();
        ptrs.push(std::ptr::null());
        Self {
            _owned: owned,
            ptrs,
        }
    }
}

unsafe extern "C" fn identity(_conf: *mut CrlibConf) -> *const c_char {
    b"crexec\0".as_ptr().cast()
}

unsafe extern "C" fn description(_conf: *mut CrlibConf) -> *const c_char {
    b"Checkpoint/restore through an external engine executable, \
      with the restore token delivered by a queued realtime signal.\0"
        .as_ptr()
        .cast()
}

unsafe extern "C" fn configuration_doc(_conf: *mut CrlibConf) -> *const c_char {
    static DOC: OnceLock<CString> = OnceLock::new();
    guard("configuration_doc", std::ptr::null(), || {
        DOC.get_or_init(|| CString::new(ConfigStore::new().configuration_doc()).unwrap_or_default())
            .as_ptr()
    })
}

unsafe extern "C" fn configurable_keys(_conf: *mut CrlibConf) -> *const *const c_char {
    static KEYS: OnceLock<CStringList> = OnceLock::new();
    guard("configurable_keys", std::ptr::null(), || {
        KEYS.get_or_init(|| CStringList::new(ConfigStore::new().keys().iter().copied()))
            .ptrs
            .as_ptr()
    })
}

unsafe extern "C" fn supported_extensions(_conf: *mut CrlibConf) -> *const *const c_char {
    static NAMES: OnceLock<CStringList> = OnceLock::new();
    guard("supported_extensions", std::ptr::null(), || {
        NAMES
            .get_or_init(|| CStringList::new(registry().keys().iter().copied()))
            .ptrs
            .as_ptr()
    })
}

// Restore data

unsafe extern "C" fn set_restore_data(conf: *mut CrlibConf, data: *const c_void, size: usize) -> bool {
    guard("set_restore_data", false, || {
        let Some(engine) = engine_mut(conf) else {
            return false;
        };
        if data.is_null() || size != std::mem::size_of::<c_int>() {
            tracing::error!(size, "Restore data must be a single native int");
            return false;
        }
        let value = std::ptr::read_unaligned(data.cast::<c_int>());
        engine.set_restore_token(RestoreToken::new(value));
        true
    })
}

unsafe extern "C" fn get_restore_data(conf: *mut CrlibConf, data: *mut c_void, size: usize) -> usize {
    guard("get_restore_data", 0, || {
        let Some(engine) = engine_mut(conf) else {
            return 0;
        };
        let Some(token) = engine.restore_token() else {
            return 0;
        };
        let bytes = token.value().to_ne_bytes();
        if !data.is_null() {
            let n = size.min(bytes.len());
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), data.cast::<u8>(), n);
        }
        bytes.len()
    })
}

// Image constraints

unsafe extern "C" fn set_label(conf: *mut CrlibConf, name: *const c_char, value: *const c_char) -> bool {
    guard("set_label", false, || {
        let (Some(engine), Some(name), Some(value)) =
            (engine_mut(conf), str_arg(name, "name"), str_arg(value, "value"))
        else {
            return false;
        };
        report("set_label", engine.constraints_mut().set_label(name, value))
    })
}

unsafe extern "C" fn set_bitmap(
    conf: *mut CrlibConf,
    name: *const c_char,
    data: *const u8,
    size: usize,
) -> bool {
    guard("set_bitmap", false, || {
        let (Some(engine), Some(name), Some(data)) =
            (engine_mut(conf), str_arg(name, "name"), bytes_arg(data, size))
        else {
            return false;
        };
        report("set_bitmap", engine.constraints_mut().set_bitmap(name, data))
    })
}

unsafe extern "C" fn require_label(
    conf: *mut CrlibConf,
    name: *const c_char,
    value: *const c_char,
) -> bool {
    guard("require_label", false, || {
        let (Some(engine), Some(name), Some(value)) =
            (engine_mut(conf), str_arg(name, "name"), str_arg(value, "value"))
        else {
            return false;
        };
        report("require_label", engine.constraints_mut().require_label(name, value))
    })
}

unsafe extern "C" fn require_bitmap(
    conf: *mut CrlibConf,
    name: *const c_char,
    data: *const u8,
    size: usize,
    comparison: c_int,
) -> bool {
    guard("require_bitmap", false, || {
        let (Some(engine), Some(name), Some(data)) =
            (engine_mut(conf), str_arg(name, "name"), bytes_arg(data, size))
        else {
            return false;
        };
        let Ok(comparison) = BitmapComparison::try_from(comparison) else {
            tracing::error!(comparison, "Unknown bitmap comparison");
            return false;
        };
        report(
            "require_bitmap",
            engine
                .constraints_mut()
                .require_bitmap(name, data, comparison),
        )
    })
}

unsafe extern "C" fn is_failed(conf: *mut CrlibConf, name: *const c_char) -> bool {
    guard("is_failed", false, || {
        let (Some(engine), Some(name)) = (engine_mut(conf), str_arg(name, "name")) else {
            return false;
        };
        engine.constraints().is_failed(name)
    })
}

// Image score

unsafe extern "C" fn set_score(conf: *mut CrlibConf, name: *const c_char, value: f64) -> bool {
    guard("set_score", false, || {
        let (Some(engine), Some(name)) = (engine_mut(conf), str_arg(name, "name")) else {
            return false;
        };
        report("set_score", engine.score_mut().set_score(name, value))
    })
}

// User data

unsafe extern "C" fn set_user_data(
    conf: *mut CrlibConf,
    name: *const c_char,
    data: *const u8,
    size: usize,
) -> bool {
    guard("set_user_data", false, || {
        let (Some(engine), Some(name), Some(data)) =
            (engine_mut(conf), str_arg(name, "name"), bytes_arg(data, size))
        else {
            return false;
        };
        report("set_user_data", engine.set_user_data(name, data))
    })
}

unsafe extern "C" fn load_user_data(conf: *mut CrlibConf) -> *mut CrlibUserDataStorage {
    guard("load_user_data", std::ptr::null_mut(), || {
        let Some(engine) = engine_mut(conf) else {
            return std::ptr::null_mut();
        };
        match engine.load_user_data() {
            Ok(storage) => Box::into_raw(Box::new(CrlibUserDataStorage { storage })),
            Err(e) => {
                tracing::error!(error = %e, "Cannot load user data");
                std::ptr::null_mut()
            }
        }
    })
}

unsafe extern "C" fn lookup_user_data(
    storage: *mut CrlibUserDataStorage,
    name: *const c_char,
    data: *mut *const u8,
    size: *mut usize,
) -> c_int {
    guard("lookup_user_data", USER_DATA_ERROR, || {
        let Some(handle) = storage.as_mut() else {
            tracing::error!("Null user data storage");
            return USER_DATA_ERROR;
        };
        let Some(name) = str_arg(name, "name") else {
            return USER_DATA_ERROR;
        };
        if data.is_null() || size.is_null() {
            tracing::error!("Null output pointer");
            return USER_DATA_ERROR;
        }

        match handle.storage.lookup(name) {
            Ok(bytes) => {
                *data = bytes.as_ptr();
                *size = bytes.len();
                USER_DATA_FOUND
            }
            Err(crexec_core::CrexecError::Image(e)) if e.is_not_found() => {
                tracing::debug!(name, "No such user data");
                USER_DATA_NOT_FOUND
            }
            Err(e) => {
                tracing::error!(name, error = %e, "Cannot read user data");
                USER_DATA_ERROR
            }
        }
    })
}

unsafe extern "C" fn destroy_user_data(storage: *mut CrlibUserDataStorage) {
    guard("destroy_user_data", (), || {
        if !storage.is_null() {
            drop(Box::from_raw(storage));
        }
    })
}
