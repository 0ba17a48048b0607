//! Allocation tracking for leak diagnosis.
//!
//! Disabled by default and gated by a single relaxed atomic, so the hooks in
//! the allocation and deallocation paths cost one load when tracking is off.
//! When enabled, every non-constant object allocation is recorded in a live
//! set keyed by address, and every deallocation removes it again. Constant
//! objects are intentionally exempt; they are never freed.
//!
//! Per-class deallocation counters are kept alongside the live set so tests
//! can assert "exactly one dealloc ran" for a private class without seeing
//! traffic from unrelated code.
//!
//! # Thread Safety
//!
//! State lives behind a `Mutex`; the enable flag is a lone `AtomicBool`.

use crate::runtime::class::ClassId;
use crate::runtime::object::{ObjectFlags, ObjectRef};
use hashbrown::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};

static ENABLED: AtomicBool = AtomicBool::new(false);

static STATE: OnceLock<Mutex<TrackerState>> = OnceLock::new();

#[derive(Default)]
struct TrackerState {
    /// Live non-constant objects, keyed by header address.
    live: HashMap<usize, ClassId>,
    /// Deallocations observed per class since the last reset.
    dealloc_counts: HashMap<ClassId, u64>,
}

fn state() -> &'static Mutex<TrackerState> {
    STATE.get_or_init(|| Mutex::new(TrackerState::default()))
}

/// Turns tracking on or off. Objects allocated while tracking was off are
/// never retroactively recorded.
pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
}

/// Whether tracking is currently on.
#[must_use]
pub fn enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

/// Clears the live set and all per-class counters.
pub fn reset() {
    let mut state = state().lock().unwrap();
    state.live.clear();
    state.dealloc_counts.clear();
}

/// Number of tracked objects currently alive.
#[must_use]
pub fn live_count() -> usize {
    state().lock().unwrap().live.len()
}

/// Number of tracked objects of one class currently alive.
#[must_use]
pub fn live_count_of(class_id: ClassId) -> usize {
    let state = state().lock().unwrap();
    state.live.values().filter(|&&id| id == class_id).count()
}

/// Deallocations observed across all classes since the last reset.
#[must_use]
pub fn dealloc_count() -> u64 {
    let state = state().lock().unwrap();
    state.dealloc_counts.values().sum()
}

/// Deallocations observed for one class since the last reset.
#[must_use]
pub fn dealloc_count_of(class_id: ClassId) -> u64 {
    let state = state().lock().unwrap();
    state.dealloc_counts.get(&class_id).copied().unwrap_or(0)
}

/// Logs every live tracked object at info level.
pub fn dump() {
    let state = state().lock().unwrap();
    cobalt_log::info!("{} tracked object(s) live", state.live.len());
    for (&addr, &class_id) in &state.live {
        let name = crate::runtime::class::id_to_ref(class_id)
            .map_or("<unregistered>", |desc| desc.name());
        cobalt_log::info!("  live {} at {:#x}", name, addr);
    }
}

pub(crate) fn note_alloc(obj: ObjectRef, flags: ObjectFlags) {
    if !enabled() || flags.contains(ObjectFlags::CONSTANT) {
        return;
    }
    let mut state = state().lock().unwrap();
    state.live.insert(obj.addr(), obj.class_id());
}

pub(crate) fn note_dealloc(obj: ObjectRef) {
    if !enabled() {
        return;
    }
    let class_id = obj.class_id();
    let mut state = state().lock().unwrap();
    if state.live.remove(&obj.addr()).is_none() {
        // Either a double dealloc or an object allocated before tracking
        // was enabled.
        cobalt_log::debug!("dealloc of untracked object {:?}", obj);
    }
    *state.dealloc_counts.entry(class_id).or_insert(0) += 1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::class::{self, ClassDescriptor, ClassOps};

    // The enable flag is process-global, so these tests must not interleave.
    static SERIAL: Mutex<()> = Mutex::new(());

    fn tracked_class(name: &'static str) -> ClassId {
        let desc: &'static ClassDescriptor =
            Box::leak(Box::new(ClassDescriptor::new(name, 8, ClassOps::NONE)));
        class::register(desc)
    }

    #[test]
    fn test_alloc_and_dealloc_are_recorded() {
        let _guard = SERIAL.lock().unwrap();
        let id = tracked_class("TrackBasics");
        set_enabled(true);

        let obj = ObjectRef::alloc(id).unwrap();
        assert_eq!(live_count_of(id), 1);

        obj.release();
        assert_eq!(live_count_of(id), 0);
        assert_eq!(dealloc_count_of(id), 1);
    }

    #[test]
    fn test_constant_objects_are_not_tracked() {
        let _guard = SERIAL.lock().unwrap();
        let id = tracked_class("TrackConstant");
        set_enabled(true);

        let obj = ObjectRef::alloc_extra(id, 0, ObjectFlags::CONSTANT).unwrap();
        assert_eq!(live_count_of(id), 0);

        // Constant objects never dealloc either.
        obj.release();
        assert_eq!(dealloc_count_of(id), 0);
    }

    #[test]
    fn test_disabled_tracking_records_nothing() {
        let _guard = SERIAL.lock().unwrap();
        let id = tracked_class("TrackDisabled");
        set_enabled(false);

        let obj = ObjectRef::alloc(id).unwrap();
        assert_eq!(live_count_of(id), 0);
        obj.release();
        assert_eq!(dealloc_count_of(id), 0);
    }

    #[test]
    fn test_dealloc_counts_accumulate_per_class() {
        let _guard = SERIAL.lock().unwrap();
        let id = tracked_class("TrackCounts");
        set_enabled(true);

        for _ in 0..3 {
            ObjectRef::alloc(id).unwrap().release();
        }
        assert_eq!(dealloc_count_of(id), 3);
        assert_eq!(live_count_of(id), 0);
    }

    #[test]
    fn test_total_dealloc_count_spans_classes() {
        let _guard = SERIAL.lock().unwrap();
        let a = tracked_class("TrackTotalA");
        let b = tracked_class("TrackTotalB");
        reset();
        set_enabled(true);

        ObjectRef::alloc(a).unwrap().release();
        ObjectRef::alloc(b).unwrap().release();
        ObjectRef::alloc(b).unwrap().release();

        assert_eq!(dealloc_count_of(a), 1);
        assert_eq!(dealloc_count_of(b), 2);
        // Tests in other modules may dealloc while tracking is on, so the
        // global total is a lower bound here.
        assert!(dealloc_count() >= 3);
    }
}
