//! Stub native layer shared by the integration tests.
//!
//! Every call is recorded per raw reference, so tests running in parallel
//! stay independent as long as they use distinct references.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::os::raw::c_void;

use handles::{RawHandle, Registry, RegistryOptions, ReleaseOps, ReleaseTable, ResultCode};
use parking_lot::Mutex;

/// References in this range fault when released.
pub const FAULTING: usize = 0xfa00_0000;

const RESULT_OK: ResultCode = 0;

static RELEASES: Mutex<BTreeMap<usize, usize>> = parking_lot::const_mutex(BTreeMap::new());
static USER_DATA: Mutex<BTreeMap<usize, usize>> = parking_lot::const_mutex(BTreeMap::new());
static USER_DATA_CALLS: Mutex<BTreeMap<usize, usize>> =
    parking_lot::const_mutex(BTreeMap::new());

unsafe fn release(raw: RawHandle) -> ResultCode {
    *RELEASES.lock().entry(raw.as_raw()).or_default() += 1;
    if raw.as_raw() & 0xff00_0000 == FAULTING {
        panic!("access violation releasing {}", raw);
    }
    RESULT_OK
}

unsafe fn get_user_data(raw: RawHandle, out: *mut *mut c_void) -> ResultCode {
    *USER_DATA_CALLS.lock().entry(raw.as_raw()).or_default() += 1;
    let data = USER_DATA.lock().get(&raw.as_raw()).copied().unwrap_or(0);
    *out = data as *mut c_void;
    RESULT_OK
}

unsafe fn set_user_data(raw: RawHandle, data: *mut c_void) -> ResultCode {
    *USER_DATA_CALLS.lock().entry(raw.as_raw()).or_default() += 1;
    USER_DATA.lock().insert(raw.as_raw(), data as usize);
    RESULT_OK
}

/// A release table backed by the recording stubs.
pub fn table() -> ReleaseTable {
    let ops = unsafe { ReleaseOps::new(release, get_user_data, set_user_data) };
    ReleaseTable::uniform(ops)
}

/// A fresh registry over the recording stubs.
pub fn registry() -> Registry {
    Registry::new(table())
}

/// A fresh registry with custom options.
pub fn registry_with(options: RegistryOptions) -> Registry {
    Registry::with_options(table(), options)
}

/// Number of native releases issued for `raw`.
pub fn releases(raw: usize) -> usize {
    RELEASES.lock().get(&raw).copied().unwrap_or(0)
}

/// Number of user-data calls forwarded for `raw`.
pub fn user_data_calls(raw: usize) -> usize {
    USER_DATA_CALLS.lock().get(&raw).copied().unwrap_or(0)
}
