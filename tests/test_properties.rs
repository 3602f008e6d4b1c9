//! Property-based tests for registry identity and release accounting.
//!
//! Each case builds its own registry. Releases are counted per thread,
//! since every release in these cases runs on the test thread.

use std::cell::RefCell;
use std::collections::HashMap;
use std::os::raw::c_void;
use std::sync::Arc;

use handles::{RawHandle, Registry, ReleaseOps, ReleaseTable, ResultCode, Sound};
use proptest::prelude::*;

thread_local! {
    static RELEASES: RefCell<HashMap<usize, usize>> = RefCell::new(HashMap::new());
}

unsafe fn release(raw: RawHandle) -> ResultCode {
    RELEASES.with(|map| *map.borrow_mut().entry(raw.as_raw()).or_default() += 1);
    0
}

unsafe fn get_user_data(_raw: RawHandle, out: *mut *mut c_void) -> ResultCode {
    *out = std::ptr::null_mut();
    0
}

unsafe fn set_user_data(_raw: RawHandle, _data: *mut c_void) -> ResultCode {
    0
}

fn registry() -> Registry {
    RELEASES.with(|map| map.borrow_mut().clear());
    let ops = unsafe { ReleaseOps::new(release, get_user_data, set_user_data) };
    Registry::new(ReleaseTable::uniform(ops))
}

fn total_releases() -> usize {
    RELEASES.with(|map| map.borrow().values().sum())
}

fn max_releases() -> usize {
    RELEASES.with(|map| map.borrow().values().copied().max().unwrap_or(0))
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Wrap(usize),
    Dispose(usize),
    Drop(usize),
}

fn step(slots: usize) -> impl Strategy<Value = Step> {
    prop_oneof![
        (0..slots).prop_map(Step::Wrap),
        (0..slots).prop_map(Step::Dispose),
        (0..slots).prop_map(Step::Drop),
    ]
}

const SLOTS: usize = 6;

fn slot_raw(slot: usize) -> RawHandle {
    RawHandle::from_raw(0x4000 + slot * 0x40)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Any set of non-null references maps to one wrapper per distinct
    /// value, and repeat lookups return that same wrapper.
    #[test]
    fn identity_is_stable(values in prop::collection::vec(1usize..0x1_0000, 1..48)) {
        let registry = registry();
        let mut held: HashMap<usize, Arc<Sound>> = HashMap::new();

        for &value in &values {
            let sound = registry.wrap::<Sound>(RawHandle::from_raw(value)).unwrap().unwrap();
            if let Some(first) = held.get(&value) {
                prop_assert!(Arc::ptr_eq(first, &sound), "{:#x} mapped to two wrappers", value);
            } else {
                held.insert(value, sound);
            }
        }
        prop_assert_eq!(registry.len(), held.len());

        drop(held);
        prop_assert!(registry.is_empty());
        prop_assert_eq!(max_releases(), 1);
    }

    /// Under any interleaving of wrap, dispose and drop, every wrapper the
    /// registry created is released exactly once.
    #[test]
    fn release_runs_once_per_wrapper(steps in prop::collection::vec(step(SLOTS), 1..96)) {
        let registry = registry();
        let mut held: Vec<Option<Arc<Sound>>> = vec![None; SLOTS];
        let mut created = 0usize;

        for step in steps {
            match step {
                Step::Wrap(slot) => {
                    let sound = registry.wrap::<Sound>(slot_raw(slot)).unwrap().unwrap();
                    let live = held[slot].as_ref().filter(|previous| previous.is_live());
                    if let Some(previous) = live {
                        prop_assert!(Arc::ptr_eq(previous, &sound));
                    } else {
                        created += 1;
                        held[slot] = Some(sound);
                    }
                }
                Step::Dispose(slot) => {
                    if let Some(sound) = &held[slot] {
                        sound.dispose().unwrap();
                        prop_assert!(sound.is_invalid());
                    }
                }
                Step::Drop(slot) => {
                    held[slot] = None;
                }
            }
            prop_assert!(max_releases() <= created);
        }

        drop(held);
        prop_assert!(registry.is_empty());
        prop_assert_eq!(total_releases(), created);

        let report = registry.report();
        prop_assert_eq!(report.created, created);
        prop_assert_eq!(report.released, created);
        prop_assert_eq!(report.evicted, created);
    }
}
