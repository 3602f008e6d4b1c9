//! Per-kind release and user-data dispatch.
//!
//! The [`ReleaseTable`] holds one [`ReleaseOps`] row for every
//! [`ResourceKind`]. A wrapper copies its row once at construction and
//! calls through it for the rest of its life.

use std::os::raw::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use crate::error::{Error, Result};
use crate::ffi::{
    self, GetUserDataFn, RawHandle, ReleaseFn, ResultCode, SetUserDataFn, RESULT_OK,
};
use crate::handle::{Handle, ResourceKind};

/// What happened when a release was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The engine released the resource.
    Released,
    /// The engine returned a non-success code.
    Failed(ResultCode),
    /// The release call faulted instead of returning.
    Faulted,
}

impl ReleaseOutcome {
    /// Check whether the release succeeded.
    pub fn is_released(&self) -> bool {
        matches!(self, ReleaseOutcome::Released)
    }
}

/// The three operations every native resource supports.
#[derive(Debug, Clone, Copy)]
pub struct ReleaseOps {
    release: ReleaseFn,
    get_user_data: GetUserDataFn,
    set_user_data: SetUserDataFn,
}

unsafe fn release_noop(_raw: RawHandle) -> ResultCode {
    RESULT_OK
}

impl ReleaseOps {
    /// Build a row from the binding layer's functions.
    ///
    /// # Safety
    ///
    /// Each function must be sound to call with any non-null reference of
    /// the kind the row is registered for, as long as the engine still
    /// considers that reference allocated.
    pub const unsafe fn new(
        release: ReleaseFn,
        get_user_data: GetUserDataFn,
        set_user_data: SetUserDataFn,
    ) -> Self {
        Self {
            release,
            get_user_data,
            set_user_data,
        }
    }

    /// Build a row whose release is a successful no-op.
    ///
    /// # Safety
    ///
    /// Same contract as [`new`](Self::new).
    pub const unsafe fn without_release(
        get_user_data: GetUserDataFn,
        set_user_data: SetUserDataFn,
    ) -> Self {
        Self {
            release: release_noop,
            get_user_data,
            set_user_data,
        }
    }

    /// Run the release, converting an unwinding fault into
    /// [`ReleaseOutcome::Faulted`].
    pub(crate) fn release(&self, handle: Handle) -> ReleaseOutcome {
        if handle.is_null() {
            return ReleaseOutcome::Released;
        }
        let release = self.release;
        // SAFETY: `new` requires `release` to accept any allocated reference
        // of this kind; the caller holds the only release right for it.
        let result = panic::catch_unwind(AssertUnwindSafe(|| unsafe { release(handle.raw()) }));
        match result {
            Ok(RESULT_OK) => ReleaseOutcome::Released,
            Ok(code) => {
                log::warn!(
                    "release of {} returned {} ({})",
                    handle,
                    code,
                    ffi::describe(code)
                );
                ReleaseOutcome::Failed(code)
            }
            Err(payload) => {
                log::error!("release of {} faulted: {}", handle, panic_message(&*payload));
                ReleaseOutcome::Faulted
            }
        }
    }

    /// Read the user-data pointer of a live reference.
    pub(crate) fn user_data(&self, raw: RawHandle) -> Result<*mut c_void> {
        let mut data = ptr::null_mut();
        // SAFETY: callers only pass references that are live under the
        // wrapper's access gate.
        let code = unsafe { (self.get_user_data)(raw, &mut data) };
        ffi::check(code, "get user data")?;
        Ok(data)
    }

    /// Set the user-data pointer of a live reference.
    pub(crate) fn set_user_data(&self, raw: RawHandle, data: *mut c_void) -> Result<()> {
        // SAFETY: as for `user_data`.
        let code = unsafe { (self.set_user_data)(raw, data) };
        ffi::check(code, "set user data")
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Closed dispatch table with one row per [`ResourceKind`].
///
/// # Example
///
/// ```no_run
/// use std::os::raw::c_void;
/// use handles::{ReleaseOps, ReleaseTable, ResourceKind, RawHandle, ResultCode};
///
/// unsafe fn release(_raw: RawHandle) -> ResultCode { 0 }
/// unsafe fn get(_raw: RawHandle, _out: *mut *mut c_void) -> ResultCode { 0 }
/// unsafe fn set(_raw: RawHandle, _data: *mut c_void) -> ResultCode { 0 }
///
/// let ops = unsafe { ReleaseOps::new(release, get, set) };
/// let table = ReleaseTable::uniform(ops);
/// let _sound_ops = table.ops(ResourceKind::Sound);
/// ```
#[derive(Debug, Clone)]
pub struct ReleaseTable {
    rows: [ReleaseOps; ResourceKind::COUNT],
}

impl ReleaseTable {
    /// Start building a table row by row.
    pub fn builder() -> ReleaseTableBuilder {
        ReleaseTableBuilder {
            rows: [None; ResourceKind::COUNT],
        }
    }

    /// A table using the same operations for every kind.
    ///
    /// The channel row still gets a no-op release.
    pub fn uniform(ops: ReleaseOps) -> Self {
        let mut rows = [ops; ResourceKind::COUNT];
        rows[ResourceKind::Channel.index()].release = release_noop;
        Self { rows }
    }

    /// The row for a kind.
    pub fn ops(&self, kind: ResourceKind) -> ReleaseOps {
        self.rows[kind.index()]
    }
}

/// Builder for [`ReleaseTable`]. Every kind needs a row before
/// [`build`](Self::build) succeeds.
#[derive(Debug, Clone)]
pub struct ReleaseTableBuilder {
    rows: [Option<ReleaseOps>; ResourceKind::COUNT],
}

impl ReleaseTableBuilder {
    /// Register the row for a kind.
    ///
    /// The release of a [`ResourceKind::Channel`] row is always replaced by
    /// a no-op; voices are reclaimed by the engine's scheduler.
    pub fn kind(mut self, kind: ResourceKind, mut ops: ReleaseOps) -> Self {
        if !kind.is_releasable() {
            ops.release = release_noop;
        }
        self.rows[kind.index()] = Some(ops);
        self
    }

    /// Register the same row for every kind not registered yet.
    pub fn fallback(mut self, ops: ReleaseOps) -> Self {
        for kind in ResourceKind::ALL {
            if self.rows[kind.index()].is_none() {
                self = self.kind(kind, ops);
            }
        }
        self
    }

    /// Finish the table.
    pub fn build(self) -> Result<ReleaseTable> {
        let row = |kind: ResourceKind| {
            self.rows[kind.index()].ok_or(Error::MissingReleaseOps(kind))
        };
        let mut rows = [row(ResourceKind::System)?; ResourceKind::COUNT];
        for kind in ResourceKind::ALL {
            rows[kind.index()] = row(kind)?;
        }
        Ok(ReleaseTable { rows })
    }
}
