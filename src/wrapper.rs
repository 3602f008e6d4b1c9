//! The wrapper bound 1:1 to a native handle.
//!
//! A [`Wrapper`] moves through `Live → Invalidated → Released` and never
//! back. Leaving `Live` is a single compare-and-set, so of all the paths
//! that can end a wrapper (explicit dispose, engine invalidation, drop)
//! exactly one wins and the native release runs at most once.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::os::raw::c_void;
use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::error::{Error, Result};
use crate::ffi::RawHandle;
use crate::handle::{Handle, OwnedHandle, ResourceKind};
use crate::release::ReleaseOps;
use crate::types::EngineEvent;

const LIVE: u8 = 0;
const INVALIDATED: u8 = 1;
const RELEASED: u8 = 2;

/// Lifecycle state of a wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WrapperState {
    /// The handle may be used.
    Live,
    /// The handle must not be used; release may or may not have run.
    Invalidated,
    /// Release has run. Terminal.
    Released,
}

impl WrapperState {
    fn from_u8(value: u8) -> Self {
        match value {
            LIVE => WrapperState::Live,
            INVALIDATED => WrapperState::Invalidated,
            _ => WrapperState::Released,
        }
    }
}

/// How a wrapper left the live state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Departure {
    Released,
    ReleaseFailed,
    Invalidated,
}

/// Called once when the wrapper leaves the live state.
pub(crate) type Observer = Box<dyn FnOnce(Handle, u64, Departure) + Send>;

/// A typed façade over a [`Wrapper`].
///
/// Implemented by every object the [`Registry`](crate::Registry) hands out.
pub trait NativeObject: Send + Sync + 'static {
    /// The wrapper this object is built around.
    fn wrapper(&self) -> &Wrapper;

    /// Notification from the engine, delivered after any invalidation it
    /// implies has been applied.
    fn on_engine_event(&self, event: EngineEvent) {
        let _ = event;
    }
}

/// Managed façade bound to one native reference.
///
/// Equality and hashing use the raw reference only.
pub struct Wrapper {
    handle: Handle,
    ops: ReleaseOps,
    generation: u64,
    release_on_finalize: bool,
    state: AtomicU8,
    // Shared by accessors while they call into the engine, taken
    // exclusively to move the release right out.
    owner: RwLock<Option<OwnedHandle>>,
    observer: Mutex<Option<Observer>>,
}

impl Wrapper {
    pub(crate) fn new(
        handle: Handle,
        ops: ReleaseOps,
        generation: u64,
        release_on_finalize: bool,
        observer: Option<Observer>,
    ) -> Self {
        Self {
            handle,
            ops,
            generation,
            release_on_finalize,
            state: AtomicU8::new(LIVE),
            owner: RwLock::new(Some(OwnedHandle::new(handle, ops))),
            observer: Mutex::new(observer),
        }
    }

    /// The wrapped handle.
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// The raw native reference.
    pub fn raw(&self) -> RawHandle {
        self.handle.raw()
    }

    /// The resource kind.
    pub fn kind(&self) -> ResourceKind {
        self.handle.kind()
    }

    /// Registration generation assigned by the registry.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WrapperState {
        WrapperState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Check whether the wrapper can still be used.
    pub fn is_live(&self) -> bool {
        !self.is_invalid()
    }

    /// `true` once the wrapper has left the live state, or if it was bound
    /// to the null reference.
    pub fn is_invalid(&self) -> bool {
        self.state.load(Ordering::Acquire) != LIVE || self.handle.is_null()
    }

    /// Run `f` with the raw reference while the wrapper is live.
    ///
    /// Fails with [`Error::InvalidResource`] without calling `f` once the
    /// wrapper has left the live state. A concurrent [`dispose`](Self::dispose)
    /// waits for `f` to return before releasing, so `f` must not dispose
    /// this wrapper itself. Nested accessors on the same wrapper are fine,
    /// even while a dispose is waiting.
    pub fn with_live<R>(&self, f: impl FnOnce(RawHandle) -> Result<R>) -> Result<R> {
        // Recursive: a pending writer must not block a reader already
        // holding the gate on this thread.
        let owner = self.owner.read_recursive();
        match owner.as_ref() {
            Some(owned) if !self.is_invalid() => f(owned.handle().raw()),
            _ => Err(self.invalid_resource()),
        }
    }

    /// Read the user-data pointer attached to the native resource.
    pub fn user_data(&self) -> Result<*mut c_void> {
        self.with_live(|raw| self.ops.user_data(raw))
    }

    /// Attach a user-data pointer to the native resource.
    pub fn set_user_data(&self, data: *mut c_void) -> Result<()> {
        self.with_live(|raw| self.ops.set_user_data(raw, data))
    }

    /// Release the native resource.
    ///
    /// Idempotent: only the first call (or the first of any concurrent
    /// calls) reaches the engine. A non-success release code is returned
    /// as [`Error::Native`]; a faulted release is logged and swallowed.
    /// The wrapper ends up [`Released`](WrapperState::Released) either way.
    pub fn dispose(&self) -> Result<()> {
        if !self.leave_live() {
            return Ok(());
        }
        log::debug!("disposing {}", self.handle);
        let owner = self.owner.write().take();
        self.finish(owner, true)
    }

    /// Engine-side invalidation: leave the live state without releasing.
    ///
    /// Returns `false` if the wrapper had already left the live state.
    pub(crate) fn invalidate(&self) -> bool {
        if !self.leave_live() {
            return false;
        }
        log::debug!("{} invalidated by the engine", self.handle);
        // An accessor may still hold the gate; whatever is left in the
        // slot is disarmed on drop.
        let owner = self.owner.try_write().and_then(|mut slot| slot.take());
        if let Some(owner) = owner {
            owner.disarm();
        }
        self.notify(Departure::Invalidated);
        true
    }

    /// Retire a wrapper that lost a construction race. No release, no
    /// notification: another wrapper owns the reference.
    pub(crate) fn abandon(&self) {
        if !self.leave_live() {
            return;
        }
        let owner = self.owner.write().take();
        if let Some(owner) = owner {
            owner.disarm();
        }
        drop(self.observer.lock().take());
    }

    fn leave_live(&self) -> bool {
        self.state
            .compare_exchange(LIVE, INVALIDATED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn finish(&self, owner: Option<OwnedHandle>, release: bool) -> Result<()> {
        let result = match owner {
            Some(owner) if release => owner.release(),
            Some(owner) => {
                owner.disarm();
                Ok(())
            }
            None => Ok(()),
        };

        let departure = match (&result, release) {
            (_, false) => Departure::Invalidated,
            (Ok(()), true) => Departure::Released,
            (Err(_), true) => Departure::ReleaseFailed,
        };
        if release {
            self.state.store(RELEASED, Ordering::Release);
        }
        self.notify(departure);

        match result {
            // Already logged by the release guard.
            Err(err) if err.is_release_fault() => Ok(()),
            other => other,
        }
    }

    fn notify(&self, departure: Departure) {
        let observer = self.observer.lock().take();
        if let Some(observer) = observer {
            observer(self.handle, self.generation, departure);
        }
    }

    fn invalid_resource(&self) -> Error {
        Error::InvalidResource {
            kind: self.handle.kind(),
            raw: self.handle.raw(),
        }
    }
}

impl Drop for Wrapper {
    fn drop(&mut self) {
        let owner = self.owner.get_mut().take();
        if self.leave_live() {
            log::debug!("finalizing {}", self.handle);
            // Ignore errors on drop
            let _ = self.finish(owner, self.release_on_finalize);
        } else if let Some(owner) = owner {
            owner.disarm();
        }
    }
}

impl NativeObject for Wrapper {
    fn wrapper(&self) -> &Wrapper {
        self
    }
}

impl PartialEq for Wrapper {
    fn eq(&self, other: &Self) -> bool {
        self.handle.raw() == other.handle.raw()
    }
}

impl Eq for Wrapper {}

impl Hash for Wrapper {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.handle.raw().hash(state);
    }
}

impl fmt::Debug for Wrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wrapper")
            .field("handle", &self.handle)
            .field("state", &self.state())
            .field("generation", &self.generation)
            .finish()
    }
}
