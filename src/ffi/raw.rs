//! Raw types shared with the native engine.
//!
//! This module contains the values that cross the FFI boundary unchanged:
//! opaque references, result codes and the function-pointer shapes the
//! binding layer hands to the release table. Users should prefer the safe
//! wrappers in the parent modules.

use std::fmt;
use std::os::raw::{c_int, c_void};

/// Result code returned by native functions.
pub type ResultCode = c_int;

// Result codes
pub const RESULT_OK: ResultCode = 0;
pub const RESULT_ERR_INTERNAL: ResultCode = 28;
pub const RESULT_ERR_INVALID_HANDLE: ResultCode = 30;
pub const RESULT_ERR_INVALID_PARAM: ResultCode = 31;
pub const RESULT_ERR_CHANNEL_STOLEN: ResultCode = 9;
pub const RESULT_ERR_UNSUPPORTED: ResultCode = 67;

// Resource kind tags carried by engine callbacks
pub const KIND_SYSTEM: c_int = 0;
pub const KIND_SOUND: c_int = 1;
pub const KIND_SOUND_GROUP: c_int = 2;
pub const KIND_CHANNEL: c_int = 3;
pub const KIND_CHANNEL_GROUP: c_int = 4;
pub const KIND_DSP: c_int = 5;
pub const KIND_DSP_CONNECTION: c_int = 6;
pub const KIND_GEOMETRY: c_int = 7;
pub const KIND_REVERB_3D: c_int = 8;

// Event tags carried by engine callbacks
pub const EVENT_END: c_int = 0;
pub const EVENT_VIRTUAL_VOICE: c_int = 1;
pub const EVENT_SYNC_POINT: c_int = 2;
pub const EVENT_OCCLUSION: c_int = 3;
pub const EVENT_VOICE_STOLEN: c_int = 4;

/// Opaque reference to a native engine resource.
///
/// Zero is the "no resource" sentinel; no wrapper is ever created for it.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RawHandle(usize);

impl RawHandle {
    /// The null sentinel.
    #[inline]
    pub const fn null() -> Self {
        Self(0)
    }

    /// Create a handle from its integer value.
    #[inline]
    pub const fn from_raw(value: usize) -> Self {
        Self(value)
    }

    /// Create a handle from a pointer returned by the engine.
    #[inline]
    pub fn from_ptr(ptr: *mut c_void) -> Self {
        Self(ptr as usize)
    }

    /// Check whether this is the null sentinel.
    #[inline]
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// The integer value of the reference.
    #[inline]
    pub const fn as_raw(&self) -> usize {
        self.0
    }

    /// The reference as a pointer, for passing back to the engine.
    #[inline]
    pub fn as_ptr(&self) -> *mut c_void {
        self.0 as *mut c_void
    }
}

impl From<usize> for RawHandle {
    fn from(value: usize) -> Self {
        Self(value)
    }
}

impl fmt::Debug for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawHandle({:#x})", self.0)
    }
}

impl fmt::Display for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Release a native resource.
///
/// Rust ABI: the binding layer wraps the `extern "C"` entry point, so a
/// fault raised while releasing unwinds into the release guard instead of
/// aborting at the C boundary.
pub type ReleaseFn = unsafe fn(raw: RawHandle) -> ResultCode;

/// Read the user-data pointer attached to a native resource.
pub type GetUserDataFn = unsafe fn(raw: RawHandle, out: *mut *mut c_void) -> ResultCode;

/// Attach a user-data pointer to a native resource.
pub type SetUserDataFn = unsafe fn(raw: RawHandle, data: *mut c_void) -> ResultCode;

/// Callback signature the engine invokes when a resource changes state
/// outside of any application call.
pub type EngineCallback = unsafe extern "C" fn(
    raw: *mut c_void,
    kind_tag: c_int,
    event_tag: c_int,
    aux_data_1: *mut c_void,
    aux_data_2: *mut c_void,
) -> ResultCode;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sentinel() {
        assert!(RawHandle::null().is_null());
        assert!(RawHandle::default().is_null());
        assert!(RawHandle::from_ptr(std::ptr::null_mut()).is_null());
        assert!(!RawHandle::from_raw(0x1000).is_null());
    }

    #[test]
    fn pointer_conversion_keeps_value() {
        let raw = RawHandle::from_raw(0xdead_b000);
        assert_eq!(RawHandle::from_ptr(raw.as_ptr()), raw);
        assert_eq!(format!("{}", raw), "0xdeadb000");
    }
}
