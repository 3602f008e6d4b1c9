//! Identity cache from native references to live wrappers.
//!
//! The registry guarantees at most one live wrapper per native reference.
//! Entries are weak: dropping the last strong reference to a façade
//! finalizes its wrapper, which evicts the entry.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::ffi::RawHandle;
use crate::handle::{Handle, ResourceKind};
use crate::release::ReleaseTable;
use crate::resources::TypedResource;
use crate::types::RegistryOptions;
use crate::wrapper::{Departure, NativeObject, Observer, Wrapper};

/// Counters describing a registry's activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryReport {
    /// Entries currently in the map.
    pub live: usize,
    /// Wrappers constructed and registered.
    pub created: usize,
    /// Entries removed, for any reason.
    pub evicted: usize,
    /// Wrappers whose release succeeded.
    pub released: usize,
    /// Wrappers whose release returned an error or faulted.
    pub release_failures: usize,
    /// Wrappers that left the live state without a release.
    pub invalidated: usize,
}

struct Entry {
    kind: ResourceKind,
    generation: u64,
    type_id: TypeId,
    object: Weak<dyn NativeObject>,
    any: Weak<dyn Any + Send + Sync>,
}

struct Entries {
    map: HashMap<RawHandle, Entry>,
    next_generation: u64,
}

#[derive(Default)]
struct Stats {
    created: AtomicUsize,
    evicted: AtomicUsize,
    released: AtomicUsize,
    release_failures: AtomicUsize,
    invalidated: AtomicUsize,
}

struct Inner {
    table: ReleaseTable,
    options: RegistryOptions,
    entries: Mutex<Entries>,
    stats: Stats,
}

/// The identity cache.
///
/// Cheap to clone; clones share the same map.
///
/// # Example
///
/// ```no_run
/// # use handles::{Registry, ReleaseTable, RawHandle, ResourceKind};
/// # fn example(table: ReleaseTable) -> handles::Result<()> {
/// let registry = Registry::new(table);
/// let raw = RawHandle::from_raw(0x1000);
///
/// let a = registry.get_or_create(raw, ResourceKind::Sound, |w| w)?.unwrap();
/// let b = registry.get_or_create(raw, ResourceKind::Sound, |w| w)?.unwrap();
/// assert!(std::sync::Arc::ptr_eq(&a, &b));
///
/// a.dispose()?;
/// let c = registry.get_or_create(raw, ResourceKind::Sound, |w| w)?.unwrap();
/// assert!(!std::sync::Arc::ptr_eq(&a, &c));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Inner>,
}

enum Lookup<T> {
    Hit(Arc<T>),
    Miss(u64),
}

impl Registry {
    /// Create a registry with default options.
    pub fn new(table: ReleaseTable) -> Self {
        Self::with_options(table, RegistryOptions::default())
    }

    /// Create a registry with the given options.
    pub fn with_options(table: ReleaseTable, options: RegistryOptions) -> Self {
        let entries = Entries {
            map: HashMap::with_capacity(options.capacity),
            next_generation: 1,
        };
        Self {
            inner: Arc::new(Inner {
                table,
                options,
                entries: Mutex::new(entries),
                stats: Stats::default(),
            }),
        }
    }

    /// The options this registry was created with.
    pub fn options(&self) -> &RegistryOptions {
        &self.inner.options
    }

    /// The release table wrappers are built from.
    pub fn table(&self) -> &ReleaseTable {
        &self.inner.table
    }

    /// Return the live wrapper for `raw`, or build and register one.
    ///
    /// Returns `Ok(None)` for the null reference. `ctor` receives the new
    /// [`Wrapper`] and builds the façade around it; it runs without the
    /// registry lock held. If another thread registers the same reference
    /// while `ctor` runs, that thread's object is returned and ours is
    /// discarded without a release.
    pub fn get_or_create<T, F>(
        &self,
        raw: RawHandle,
        kind: ResourceKind,
        ctor: F,
    ) -> Result<Option<Arc<T>>>
    where
        T: NativeObject,
        F: FnOnce(Wrapper) -> T,
    {
        if raw.is_null() {
            return Ok(None);
        }

        // Strong references pulled out under the lock are parked here so
        // the last one is never dropped while the lock is held.
        let mut parked: Vec<Arc<dyn Any + Send + Sync>> = Vec::new();

        let generation = match self.find_or_reserve::<T>(raw, kind, &mut parked)? {
            Lookup::Hit(object) => {
                log::trace!("registry hit for {} {}", kind, raw);
                return Ok(Some(object));
            }
            Lookup::Miss(generation) => generation,
        };

        let handle = Handle::new(raw, kind);
        let wrapper = Wrapper::new(
            handle,
            self.inner.table.ops(kind),
            generation,
            self.inner.options.release_on_finalize,
            Some(self.observer()),
        );
        let object = Arc::new(ctor(wrapper));

        let existing = {
            let mut entries = self.inner.entries.lock();
            let existing = self.live_entry::<T>(&mut entries, raw, kind, &mut parked);
            if let Ok(None) = existing {
                let entry = Entry {
                    kind,
                    generation,
                    type_id: TypeId::of::<T>(),
                    object: Arc::downgrade(&object) as Weak<dyn NativeObject>,
                    any: Arc::downgrade(&object) as Weak<dyn Any + Send + Sync>,
                };
                entries.map.insert(raw, entry);
                self.inner.stats.created.fetch_add(1, Ordering::Relaxed);
            }
            existing
        };

        match existing {
            Ok(None) => {
                log::debug!("registered {} {} (generation {})", kind, raw, generation);
                Ok(Some(object))
            }
            Ok(Some(existing)) => {
                log::debug!("lost construction race for {} {}", kind, raw);
                object.wrapper().abandon();
                Ok(Some(existing))
            }
            Err(err) => {
                object.wrapper().abandon();
                Err(err)
            }
        }
    }

    /// [`get_or_create`](Self::get_or_create) for a typed façade.
    pub fn wrap<T: TypedResource>(&self, raw: RawHandle) -> Result<Option<Arc<T>>> {
        self.get_or_create(raw, T::KIND, T::from_wrapper)
    }

    /// Return the live object registered for `raw` without constructing.
    pub fn lookup<T: NativeObject>(&self, raw: RawHandle) -> Option<Arc<T>> {
        let any = {
            let entries = self.inner.entries.lock();
            let entry = entries.map.get(&raw)?;
            if entry.type_id != TypeId::of::<T>() {
                return None;
            }
            entry.any.upgrade()?
        };
        let object = any.downcast::<T>().ok()?;
        object.wrapper().is_live().then_some(object)
    }

    /// Force the wrapper registered for `raw` out of the live state
    /// without releasing it. Returns whether a live wrapper was affected.
    pub fn invalidate(&self, raw: RawHandle) -> bool {
        match self.live_object(raw) {
            Some(object) => object.wrapper().invalidate(),
            None => false,
        }
    }

    /// Invalidate every live wrapper without releasing.
    ///
    /// For engine shutdown: the engine frees every child resource together
    /// with the top-level object. Returns the number of wrappers affected.
    pub fn invalidate_all(&self) -> usize {
        let objects: Vec<Arc<dyn NativeObject>> = {
            let entries = self.inner.entries.lock();
            entries
                .map
                .values()
                .filter_map(|entry| entry.object.upgrade())
                .collect()
        };
        let count = objects
            .iter()
            .filter(|object| object.wrapper().invalidate())
            .count();
        log::debug!("invalidated {} wrappers", count);
        count
    }

    /// Number of entries currently registered.
    pub fn len(&self) -> usize {
        self.inner.entries.lock().map.len()
    }

    /// Check whether no entries are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the registry counters.
    pub fn report(&self) -> RegistryReport {
        let stats = &self.inner.stats;
        RegistryReport {
            live: self.len(),
            created: stats.created.load(Ordering::Relaxed),
            evicted: stats.evicted.load(Ordering::Relaxed),
            released: stats.released.load(Ordering::Relaxed),
            release_failures: stats.release_failures.load(Ordering::Relaxed),
            invalidated: stats.invalidated.load(Ordering::Relaxed),
        }
    }

    /// The live object for `raw`, regardless of its façade type.
    pub(crate) fn live_object(&self, raw: RawHandle) -> Option<Arc<dyn NativeObject>> {
        let object = {
            let entries = self.inner.entries.lock();
            let entry = entries.map.get(&raw)?;
            entry.object.upgrade()?
        };
        object.wrapper().is_live().then_some(object)
    }

    /// Remove the entry for `raw` if it still belongs to `generation`.
    #[cfg(test)]
    pub(crate) fn evict(&self, raw: RawHandle, generation: u64) -> bool {
        self.inner.evict_generation(raw, generation)
    }

    fn find_or_reserve<T: NativeObject>(
        &self,
        raw: RawHandle,
        kind: ResourceKind,
        parked: &mut Vec<Arc<dyn Any + Send + Sync>>,
    ) -> Result<Lookup<T>> {
        let mut entries = self.inner.entries.lock();
        if let Some(existing) = self.live_entry::<T>(&mut entries, raw, kind, parked)? {
            return Ok(Lookup::Hit(existing));
        }
        let generation = entries.next_generation;
        entries.next_generation += 1;
        Ok(Lookup::Miss(generation))
    }

    /// Return the live object of type `T` for `raw`, evicting a stale entry.
    fn live_entry<T: NativeObject>(
        &self,
        entries: &mut Entries,
        raw: RawHandle,
        kind: ResourceKind,
        parked: &mut Vec<Arc<dyn Any + Send + Sync>>,
    ) -> Result<Option<Arc<T>>> {
        let Some(entry) = entries.map.get(&raw) else {
            return Ok(None);
        };
        let registered = entry.kind;

        // `any` keeps the allocation alive, so the `object` upgrade below
        // can never be the last strong reference.
        let any = entry.any.upgrade();
        let live = any.is_some()
            && entry
                .object
                .upgrade()
                .is_some_and(|object| object.wrapper().is_live());
        let any = match any {
            Some(any) if live => any,
            stale => {
                parked.extend(stale);
                entries.map.remove(&raw);
                self.inner.stats.evicted.fetch_add(1, Ordering::Relaxed);
                log::debug!("evicted stale entry for {} {}", registered, raw);
                return Ok(None);
            }
        };

        if self.inner.options.strict_kinds && registered != kind {
            parked.push(any);
            return Err(Error::KindMismatch {
                raw,
                registered,
                requested: kind,
            });
        }

        match any.downcast::<T>() {
            Ok(object) => Ok(Some(object)),
            Err(any) => {
                parked.push(any);
                Err(Error::KindMismatch {
                    raw,
                    registered,
                    requested: kind,
                })
            }
        }
    }

    fn observer(&self) -> Observer {
        let inner = Arc::downgrade(&self.inner);
        Box::new(move |handle: Handle, generation: u64, departure: Departure| {
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let counter = match departure {
                Departure::Released => &inner.stats.released,
                Departure::ReleaseFailed => &inner.stats.release_failures,
                Departure::Invalidated => &inner.stats.invalidated,
            };
            counter.fetch_add(1, Ordering::Relaxed);
            inner.evict_generation(handle.raw(), generation);
        })
    }
}

impl Inner {
    fn evict_generation(&self, raw: RawHandle, generation: u64) -> bool {
        let removed = {
            let mut entries = self.entries.lock();
            match entries.map.get(&raw) {
                Some(entry) if entry.generation == generation => entries.map.remove(&raw),
                _ => None,
            }
        };
        match removed {
            Some(_) => {
                self.stats.evicted.fetch_add(1, Ordering::Relaxed);
                log::debug!("evicted {} (generation {})", raw, generation);
                true
            }
            None => {
                log::trace!("stale eviction for {} (generation {})", raw, generation);
                false
            }
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("options", &self.inner.options)
            .field("report", &self.report())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::{ResultCode, RESULT_OK};
    use crate::release::ReleaseOps;
    use crate::resources::{Channel, Sound};
    use crate::wrapper::WrapperState;
    use std::collections::BTreeMap;
    use std::os::raw::c_void;
    use std::ptr;

    static RELEASES: Mutex<BTreeMap<usize, usize>> = parking_lot::const_mutex(BTreeMap::new());

    unsafe fn release(raw: RawHandle) -> ResultCode {
        *RELEASES.lock().entry(raw.as_raw()).or_default() += 1;
        RESULT_OK
    }

    unsafe fn get_user_data(_raw: RawHandle, out: *mut *mut c_void) -> ResultCode {
        *out = ptr::null_mut();
        RESULT_OK
    }

    unsafe fn set_user_data(_raw: RawHandle, _data: *mut c_void) -> ResultCode {
        RESULT_OK
    }

    fn releases(raw: usize) -> usize {
        RELEASES.lock().get(&raw).copied().unwrap_or(0)
    }

    fn registry_with(options: RegistryOptions) -> Registry {
        let ops = unsafe { ReleaseOps::new(release, get_user_data, set_user_data) };
        Registry::with_options(ReleaseTable::uniform(ops), options)
    }

    fn registry() -> Registry {
        registry_with(RegistryOptions::default())
    }

    #[test]
    fn null_reference_registers_nothing() {
        let registry = registry();
        let got = registry
            .get_or_create(RawHandle::null(), ResourceKind::Sound, |w| w)
            .unwrap();
        assert!(got.is_none());
        assert!(registry.is_empty());
        assert_eq!(registry.report().created, 0);
    }

    #[test]
    fn repeat_lookup_returns_same_object() {
        let registry = registry();
        let raw = RawHandle::from_raw(0x2100);
        let a = registry.wrap::<Sound>(raw).unwrap().unwrap();
        let b = registry.wrap::<Sound>(raw).unwrap().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.report().created, 1);
    }

    #[test]
    fn dispose_evicts_and_next_lookup_builds_new() {
        let registry = registry();
        let raw = RawHandle::from_raw(0x2200);
        let first = registry.wrap::<Sound>(raw).unwrap().unwrap();
        first.dispose().unwrap();
        assert!(registry.is_empty());

        let second = registry.wrap::<Sound>(raw).unwrap().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(first.is_invalid());
        assert!(!second.is_invalid());
        assert!(second.generation() > first.generation());
        assert_eq!(releases(0x2200), 1);
    }

    #[test]
    fn dropping_last_reference_finalizes() {
        let registry = registry();
        let raw = RawHandle::from_raw(0x2300);
        let sound = registry.wrap::<Sound>(raw).unwrap().unwrap();
        drop(sound);

        assert_eq!(releases(0x2300), 1);
        assert!(registry.is_empty());
        assert_eq!(registry.report().released, 1);
    }

    #[test]
    fn finalize_without_release_when_disabled() {
        let registry = registry_with(RegistryOptions {
            release_on_finalize: false,
            ..Default::default()
        });
        let sound = registry.wrap::<Sound>(RawHandle::from_raw(0x2400)).unwrap().unwrap();
        drop(sound);

        assert_eq!(releases(0x2400), 0);
        assert!(registry.is_empty());
        assert_eq!(registry.report().invalidated, 1);
    }

    #[test]
    fn kind_mismatch_is_reported() {
        let registry = registry();
        let raw = RawHandle::from_raw(0x2500);
        let _sound = registry.wrap::<Sound>(raw).unwrap().unwrap();

        let err = registry.wrap::<Channel>(raw).unwrap_err();
        assert_eq!(
            err,
            Error::KindMismatch {
                raw,
                registered: ResourceKind::Sound,
                requested: ResourceKind::Channel,
            }
        );
    }

    #[test]
    fn lenient_kinds_still_check_type() {
        let registry = registry_with(RegistryOptions {
            strict_kinds: false,
            ..Default::default()
        });
        let raw = RawHandle::from_raw(0x2600);
        let sound = registry.wrap::<Sound>(raw).unwrap().unwrap();

        let same = registry
            .get_or_create(raw, ResourceKind::Dsp, Sound::from_wrapper)
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&sound, &same));
        assert!(registry.wrap::<Channel>(raw).is_err());
    }

    #[test]
    fn lookup_does_not_construct() {
        let registry = registry();
        let raw = RawHandle::from_raw(0x2700);
        assert!(registry.lookup::<Sound>(raw).is_none());

        let sound = registry.wrap::<Sound>(raw).unwrap().unwrap();
        let found = registry.lookup::<Sound>(raw).unwrap();
        assert!(Arc::ptr_eq(&sound, &found));
        assert!(registry.lookup::<Channel>(raw).is_none());
    }

    #[test]
    fn invalidate_skips_release() {
        let registry = registry();
        let raw = RawHandle::from_raw(0x2800);
        let sound = registry.wrap::<Sound>(raw).unwrap().unwrap();

        assert!(registry.invalidate(raw));
        assert!(!registry.invalidate(raw));
        assert_eq!(sound.state(), WrapperState::Invalidated);
        drop(sound);
        assert_eq!(releases(0x2800), 0);
    }

    #[test]
    fn invalidate_all_clears_registry() {
        let registry = registry();
        let held: Vec<_> = (0..4)
            .map(|i| {
                registry
                    .wrap::<Sound>(RawHandle::from_raw(0x2900 + i))
                    .unwrap()
                    .unwrap()
            })
            .collect();

        assert_eq!(registry.invalidate_all(), 4);
        assert!(registry.is_empty());
        assert!(held.iter().all(|sound| sound.is_invalid()));
        drop(held);
        assert!((0..4).all(|i| releases(0x2900 + i) == 0));
    }

    #[test]
    fn stale_generation_cannot_evict_newer_entry() {
        let registry = registry();
        let raw = RawHandle::from_raw(0x2a00);
        let first = registry.wrap::<Sound>(raw).unwrap().unwrap();
        let old_generation = first.generation();
        first.dispose().unwrap();

        // The engine hands the same reference out again.
        let second = registry.wrap::<Sound>(raw).unwrap().unwrap();
        assert!(!registry.evict(raw, old_generation));

        let again = registry.wrap::<Sound>(raw).unwrap().unwrap();
        assert!(Arc::ptr_eq(&second, &again));
        assert!(registry.evict(raw, second.generation()));
    }

    #[test]
    fn constructor_may_use_other_registry_calls() {
        let registry = registry();
        let raw = RawHandle::from_raw(0x2b00);
        let inner = registry.clone();
        let sound = registry
            .get_or_create(raw, ResourceKind::Sound, move |w| {
                assert!(inner.lookup::<Sound>(raw).is_none());
                Sound::from_wrapper(w)
            })
            .unwrap()
            .unwrap();
        assert!(sound.is_live());
    }

    #[test]
    fn report_counts_transitions() {
        let registry = registry();
        let a = registry.wrap::<Sound>(RawHandle::from_raw(0x2c00)).unwrap().unwrap();
        let b = registry.wrap::<Sound>(RawHandle::from_raw(0x2c01)).unwrap().unwrap();
        a.dispose().unwrap();
        registry.invalidate(b.raw());

        let report = registry.report();
        assert_eq!(report.live, 0);
        assert_eq!(report.created, 2);
        assert_eq!(report.evicted, 2);
        assert_eq!(report.released, 1);
        assert_eq!(report.invalidated, 1);
        assert_eq!(report.release_failures, 0);
    }
}
