//! Typed façades for each resource kind.
//!
//! Each façade is a thin newtype over [`Wrapper`] and dereferences to it,
//! so lifecycle operations (`dispose`, `user_data`, `with_live`) are
//! available on every type. Per-kind property wrappers build on these by
//! forwarding their native calls through [`Wrapper::with_live`].

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::handle::ResourceKind;
use crate::types::EngineEvent;
use crate::wrapper::{NativeObject, Wrapper};

/// A façade with a fixed resource kind, buildable from a bare wrapper.
pub trait TypedResource: NativeObject + Sized {
    /// The kind every instance of this type wraps.
    const KIND: ResourceKind;

    /// Build the façade around a freshly registered wrapper.
    fn from_wrapper(wrapper: Wrapper) -> Self;
}

/// Macro to define a façade type for a resource kind.
macro_rules! define_resource {
    ($(#[$meta:meta])* $name:ident, $kind:expr) => {
        $(#[$meta])*
        pub struct $name {
            wrapper: Wrapper,
        }

        impl TypedResource for $name {
            const KIND: ResourceKind = $kind;

            fn from_wrapper(wrapper: Wrapper) -> Self {
                Self { wrapper }
            }
        }

        impl NativeObject for $name {
            fn wrapper(&self) -> &Wrapper {
                &self.wrapper
            }
        }

        impl Deref for $name {
            type Target = Wrapper;

            fn deref(&self) -> &Wrapper {
                &self.wrapper
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.wrapper).finish()
            }
        }
    };
}

define_resource!(
    /// Top-level engine instance.
    System,
    ResourceKind::System
);
define_resource!(
    /// A loaded sample or stream.
    Sound,
    ResourceKind::Sound
);
define_resource!(
    /// A group of sounds sharing playback limits.
    SoundGroup,
    ResourceKind::SoundGroup
);
define_resource!(
    /// A mixing bus.
    ChannelGroup,
    ResourceKind::ChannelGroup
);
define_resource!(
    /// A processing unit.
    Dsp,
    ResourceKind::Dsp
);
define_resource!(
    /// A link between two processing units.
    DspConnection,
    ResourceKind::DspConnection
);
define_resource!(
    /// Occlusion geometry.
    Geometry,
    ResourceKind::Geometry
);
define_resource!(
    /// A positional reverb zone.
    Reverb3D,
    ResourceKind::Reverb3D
);

type EventHandler = Arc<dyn Fn(&Channel, EngineEvent) + Send + Sync>;

/// A playing voice.
///
/// The engine owns a channel's lifetime: disposing it never calls the
/// engine, and the engine invalidates it when playback ends or the voice
/// is stolen.
pub struct Channel {
    wrapper: Wrapper,
    last_event: Mutex<Option<EngineEvent>>,
    handler: Mutex<Option<EventHandler>>,
}

impl Channel {
    /// Install a handler called for every engine notification on this
    /// channel. Replaces any previous handler.
    pub fn set_event_handler<F>(&self, handler: F)
    where
        F: Fn(&Channel, EngineEvent) + Send + Sync + 'static,
    {
        *self.handler.lock() = Some(Arc::new(handler));
    }

    /// Remove the event handler.
    pub fn clear_event_handler(&self) {
        self.handler.lock().take();
    }

    /// The most recent engine notification.
    pub fn last_event(&self) -> Option<EngineEvent> {
        *self.last_event.lock()
    }

    /// Whether the engine reported the end of playback.
    pub fn has_ended(&self) -> bool {
        self.last_event() == Some(EngineEvent::Ended)
    }

    /// Whether the voice was taken over by another sound.
    pub fn was_stolen(&self) -> bool {
        self.last_event() == Some(EngineEvent::VoiceStolen)
    }
}

impl TypedResource for Channel {
    const KIND: ResourceKind = ResourceKind::Channel;

    fn from_wrapper(wrapper: Wrapper) -> Self {
        Self {
            wrapper,
            last_event: Mutex::new(None),
            handler: Mutex::new(None),
        }
    }
}

impl NativeObject for Channel {
    fn wrapper(&self) -> &Wrapper {
        &self.wrapper
    }

    fn on_engine_event(&self, event: EngineEvent) {
        *self.last_event.lock() = Some(event);
        let handler = self.handler.lock().clone();
        if let Some(handler) = handler {
            handler(self, event);
        }
    }
}

impl Deref for Channel {
    type Target = Wrapper;

    fn deref(&self) -> &Wrapper {
        &self.wrapper
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("wrapper", &self.wrapper)
            .field("last_event", &self.last_event())
            .finish()
    }
}
