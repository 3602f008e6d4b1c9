//! Engine-driven invalidation.
//!
//! The engine reports state changes on its own mixer thread through a
//! single C callback per engine instance. [`engine_callback`] is that entry
//! point: it decodes the tags and hands the event to every installed
//! [`InvalidationChannel`], each of which looks the reference up in its
//! registry.

use std::os::raw::{c_int, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Result;
use crate::ffi::{
    EngineCallback, RawHandle, ResultCode, RESULT_ERR_INTERNAL, RESULT_ERR_INVALID_PARAM,
    RESULT_OK,
};
use crate::handle::ResourceKind;
use crate::registry::Registry;
use crate::types::EngineEvent;

struct Installed {
    id: u64,
    channel: Arc<InvalidationChannel>,
}

static INSTALLED: RwLock<Vec<Installed>> = parking_lot::const_rwlock(Vec::new());
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Routes engine notifications to the wrappers of one registry.
#[derive(Debug, Clone)]
pub struct InvalidationChannel {
    registry: Registry,
}

impl InvalidationChannel {
    /// Create a channel delivering into `registry`.
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// The registry this channel delivers into.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Deliver a decoded event for `raw`.
    ///
    /// Returns `false` when no live wrapper is registered for `raw`, which
    /// is the normal case for resources the application never asked for.
    pub fn deliver(&self, raw: RawHandle, kind: ResourceKind, event: EngineEvent) -> bool {
        let Some(object) = self.registry.live_object(raw) else {
            log::trace!("{:?} for unregistered {} {}", event, kind, raw);
            return false;
        };

        let wrapper = object.wrapper();
        if wrapper.kind() != kind {
            log::debug!(
                "{:?} tagged {} delivered to {} registered as {}",
                event,
                kind,
                raw,
                wrapper.kind()
            );
        }
        if event.invalidates() && !wrapper.invalidate() {
            // Disposed or invalidated between lookup and now.
            return false;
        }
        object.on_engine_event(event);
        true
    }

    /// Decode raw callback arguments and deliver them.
    pub fn dispatch(
        &self,
        raw: *mut c_void,
        kind_tag: c_int,
        event_tag: c_int,
        aux_data_1: *mut c_void,
        aux_data_2: *mut c_void,
    ) -> ResultCode {
        match decode(kind_tag, event_tag, aux_data_1, aux_data_2) {
            Ok((kind, event)) => {
                self.deliver(RawHandle::from_ptr(raw), kind, event);
                RESULT_OK
            }
            Err(err) => {
                log::warn!("dropping engine callback for {:p}: {}", raw, err);
                RESULT_ERR_INVALID_PARAM
            }
        }
    }

    /// Make this channel reachable from [`engine_callback`].
    ///
    /// The channel stays installed until the returned guard is dropped.
    pub fn install(self) -> CallbackGuard {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        INSTALLED.write().push(Installed {
            id,
            channel: Arc::new(self),
        });
        log::debug!("installed invalidation channel {}", id);
        CallbackGuard { id }
    }
}

/// Keeps an [`InvalidationChannel`] installed.
#[must_use = "the channel is uninstalled when the guard is dropped"]
#[derive(Debug)]
pub struct CallbackGuard {
    id: u64,
}

impl CallbackGuard {
    /// The callback to register with the engine.
    pub fn callback(&self) -> EngineCallback {
        engine_callback
    }
}

impl Drop for CallbackGuard {
    fn drop(&mut self) {
        let removed = {
            let mut installed = INSTALLED.write();
            installed
                .iter()
                .position(|entry| entry.id == self.id)
                .map(|index| installed.swap_remove(index))
        };
        if removed.is_some() {
            log::debug!("uninstalled invalidation channel {}", self.id);
        }
    }
}

fn decode(
    kind_tag: c_int,
    event_tag: c_int,
    aux_data_1: *mut c_void,
    aux_data_2: *mut c_void,
) -> Result<(ResourceKind, EngineEvent)> {
    let kind = ResourceKind::from_tag(kind_tag)?;
    let event = EngineEvent::from_raw(event_tag, aux_data_1, aux_data_2)?;
    Ok((kind, event))
}

/// Callback registered with the engine for every instance.
///
/// Never unwinds: a panic raised while delivering is logged and reported
/// to the engine as an internal error.
///
/// # Safety
///
/// Called by the engine. The auxiliary pointers are only inspected as
/// integer values and never dereferenced.
pub unsafe extern "C" fn engine_callback(
    raw: *mut c_void,
    kind_tag: c_int,
    event_tag: c_int,
    aux_data_1: *mut c_void,
    aux_data_2: *mut c_void,
) -> ResultCode {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let (kind, event) = match decode(kind_tag, event_tag, aux_data_1, aux_data_2) {
            Ok(decoded) => decoded,
            Err(err) => {
                log::warn!("dropping engine callback for {:p}: {}", raw, err);
                return RESULT_ERR_INVALID_PARAM;
            }
        };

        let channels: Vec<Arc<InvalidationChannel>> = INSTALLED
            .read()
            .iter()
            .map(|entry| Arc::clone(&entry.channel))
            .collect();
        let raw = RawHandle::from_ptr(raw);
        for channel in &channels {
            channel.deliver(raw, kind, event);
        }
        RESULT_OK
    }));

    result.unwrap_or_else(|_| {
        log::error!("panic while delivering engine callback");
        RESULT_ERR_INTERNAL
    })
}
