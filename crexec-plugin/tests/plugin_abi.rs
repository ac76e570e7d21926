// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Plugin ABI tests driving the library only through `crlib_api`.

use std::ffi::{c_void, CStr, CString};
use std::os::raw::{c_char, c_int};

use crexec::{
    crlib_api, CrlibApi, CrlibConf, CrlibDescription, CrlibImageConstraints, CrlibRestoreData,
    CrlibUserData, CRLIB_API_VERSION, USER_DATA_FOUND, USER_DATA_NOT_FOUND,
};
use crexec_core::ImageConstraints;
use tempfile::TempDir;

fn api() -> &'static CrlibApi {
    let ptr = crlib_api(CRLIB_API_VERSION, std::mem::size_of::<CrlibApi>());
    unsafe { ptr.as_ref() }.expect("Entry point refused the current version")
}

fn c(s: &str) -> CString {
    CString::new(s).unwrap()
}

/// Fetch an extension and view it as `T`.
fn extension<T>(name: &str) -> &'static T {
    let name = c(name);
    let ptr = unsafe { (api().get_extension)(name.as_ptr(), std::mem::size_of::<T>()) };
    unsafe { ptr.cast::<T>().as_ref() }.expect("Extension not available")
}

/// Config handle destroyed on drop.
struct Conf(*mut CrlibConf);

impl Conf {
    fn new() -> Self {
        let conf = (api().create_conf)();
        assert!(!conf.is_null());
        Self(conf)
    }

    fn configure(&self, key: &str, value: &str) -> bool {
        unsafe { (api().configure)(self.0, c(key).as_ptr(), c(value).as_ptr()) }
    }
}

impl Drop for Conf {
    fn drop(&mut self) {
        unsafe { (api().destroy_conf)(self.0) };
    }
}

unsafe fn string_list(mut ptr: *const *const c_char) -> Vec<String> {
    let mut out = Vec::new();
    while !(*ptr).is_null() {
        out.push(CStr::from_ptr(*ptr).to_string_lossy().into_owned());
        ptr = ptr.add(1);
    }
    out
}

#[test]
fn test_configure_through_table() {
    let conf = Conf::new();

    for key in ["image_location", "exec_location", "keep_running", "direct_map", "args"] {
        assert!(unsafe { (api().can_configure)(conf.0, c(key).as_ptr()) }, "{}", key);
    }
    assert!(!unsafe { (api().can_configure)(conf.0, c("bogus").as_ptr()) });

    assert!(conf.configure("exec_location", "/usr/sbin/criu"));
    assert!(!conf.configure("exec_location", "relative/criu"));
    assert!(conf.configure("keep_running", "true"));
    assert!(!conf.configure("keep_running", "yes"));
    assert!(!conf.configure("bogus", "1"));
}

#[test]
fn test_checkpoint_without_locations_fails() {
    let conf = Conf::new();
    assert_eq!(unsafe { (api().checkpoint)(conf.0) }, -1);
}

#[test]
fn test_restore_data_extension() {
    let conf = Conf::new();
    let ext: &CrlibRestoreData = extension("restore_data");

    let mut out: c_int = 0;
    let got = unsafe {
        (ext.get_restore_data)(
            conf.0,
            (&mut out as *mut c_int).cast::<c_void>(),
            std::mem::size_of::<c_int>(),
        )
    };
    assert_eq!(got, 0);

    let value: c_int = 0x1234_5678;
    let set = unsafe {
        (ext.set_restore_data)(
            conf.0,
            (&value as *const c_int).cast::<c_void>(),
            std::mem::size_of::<c_int>(),
        )
    };
    assert!(set);

    let got = unsafe {
        (ext.get_restore_data)(
            conf.0,
            (&mut out as *mut c_int).cast::<c_void>(),
            std::mem::size_of::<c_int>(),
        )
    };
    assert_eq!(got, std::mem::size_of::<c_int>());
    assert_eq!(out, value);

    let wrong = [0u8; 8];
    assert!(!unsafe { (ext.set_restore_data)(conf.0, wrong.as_ptr().cast(), wrong.len()) });
}

#[test]
fn test_user_data_extension() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let conf = Conf::new();
    let ext: &CrlibUserData = extension("user_data");

    let payload = [0xDEu8, 0xAD, 0xBE, 0xEF];
    // No image location yet.
    assert!(!unsafe {
        (ext.set_user_data)(conf.0, c("foo").as_ptr(), payload.as_ptr(), payload.len())
    });

    assert!(conf.configure("image_location", temp_dir.path().to_str().unwrap()));
    assert!(unsafe {
        (ext.set_user_data)(conf.0, c("foo").as_ptr(), payload.as_ptr(), payload.len())
    });

    let storage = unsafe { (ext.load_user_data)(conf.0) };
    assert!(!storage.is_null());

    let mut data: *const u8 = std::ptr::null();
    let mut size: usize = 0;
    let rc = unsafe { (ext.lookup_user_data)(storage, c("foo").as_ptr(), &mut data, &mut size) };
    assert_eq!(rc, USER_DATA_FOUND);
    assert_eq!(unsafe { std::slice::from_raw_parts(data, size) }, &payload);

    let rc =
        unsafe { (ext.lookup_user_data)(storage, c("missing").as_ptr(), &mut data, &mut size) };
    assert_eq!(rc, USER_DATA_NOT_FOUND);

    unsafe { (ext.destroy_user_data)(storage) };
}

#[test]
fn test_constraint_failure_blocks_restore() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mut recorded = ImageConstraints::new();
    recorded.set_label("arch", "x86_64").unwrap();
    recorded.set_bitmap("isa", &[0x07]).unwrap();
    recorded.persist(temp_dir.path()).unwrap();

    let conf = Conf::new();
    let ext: &CrlibImageConstraints = extension("image_constraints");
    assert!(conf.configure("exec_location", "/bin/true"));
    assert!(conf.configure("image_location", temp_dir.path().to_str().unwrap()));

    let isa = [0x03u8];
    unsafe {
        assert!((ext.require_label)(conf.0, c("arch").as_ptr(), c("arm64").as_ptr()));
        assert!((ext.require_bitmap)(conf.0, c("isa").as_ptr(), isa.as_ptr(), isa.len(), 1));
        assert!(!(ext.require_bitmap)(conf.0, c("other").as_ptr(), isa.as_ptr(), isa.len(), 9));

        assert_eq!((api().restore)(conf.0), -1);
        assert!((ext.is_failed)(conf.0, c("arch").as_ptr()));
        assert!(!(ext.is_failed)(conf.0, c("isa").as_ptr()));
    }
}

#[test]
fn test_description_extension() {
    let conf = Conf::new();
    let ext: &CrlibDescription = extension("description");

    unsafe {
        assert_eq!(CStr::from_ptr((ext.identity)(conf.0)).to_str().unwrap(), "crexec");
        assert!(!CStr::from_ptr((ext.description)(conf.0)).to_bytes().is_empty());

        let doc = CStr::from_ptr((ext.configuration_doc)(conf.0)).to_string_lossy();
        assert!(doc.contains("exec_location"));

        let keys = string_list((ext.configurable_keys)(conf.0));
        assert_eq!(
            keys,
            ["image_location", "exec_location", "keep_running", "direct_map", "args"]
        );

        let extensions = string_list((ext.supported_extensions)(conf.0));
        assert!(extensions.iter().any(|e| e == "user_data"));
        assert!(extensions.iter().any(|e| e == "image_score"));
    }
}
