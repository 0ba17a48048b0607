//! Autorelease pool behavior observed through built-in classes and the
//! allocation tracker.

use cobalt::runtime::autorelease::{self, AutoreleasePool};
use cobalt::runtime::number::{self, Number};
use cobalt::runtime::track;
use std::sync::Mutex;

// Dealloc counters are process-global and every test here drains numbers,
// so the tests must not interleave.
static SERIAL: Mutex<()> = Mutex::new(());

#[test]
fn pool_drains_deferred_numbers() {
    let _guard = SERIAL.lock().unwrap();
    track::set_enabled(true);
    let class = number::number_class();
    let before = track::dealloc_count_of(class);

    {
        let _pool = AutoreleasePool::new();
        let a = Number::i32(1).unwrap().autorelease();
        let b = Number::i32(2).unwrap().autorelease();
        let c = Number::i32(3).unwrap().autorelease();

        assert_eq!(a.to_i32() + b.to_i32() + c.to_i32(), 6);
        assert_eq!(track::dealloc_count_of(class), before);
    }

    assert_eq!(track::dealloc_count_of(class), before + 3);
}

#[test]
fn pool_survives_segment_overflow() {
    let _guard = SERIAL.lock().unwrap();
    track::set_enabled(true);
    let class = number::number_class();
    let before = track::dealloc_count_of(class);
    let total: i64 = 200; // more than one 128-entry pool segment

    {
        let _pool = AutoreleasePool::new();
        for i in 0..total {
            Number::i64(i).unwrap().autorelease();
        }
        assert_eq!(track::dealloc_count_of(class), before);
    }

    assert_eq!(track::dealloc_count_of(class), before + total as u64);
}

#[test]
fn nested_pools_drain_innermost_first() {
    let _guard = SERIAL.lock().unwrap();
    track::set_enabled(true);
    let class = number::number_class();
    let before = track::dealloc_count_of(class);

    let _outer = AutoreleasePool::new();
    let outer_value = Number::i32(10).unwrap().autorelease();

    {
        let _inner = AutoreleasePool::new();
        Number::i32(20).unwrap().autorelease();
        assert_eq!(autorelease::depth(), 2);
    }

    // The inner pool released only its own entry.
    assert_eq!(track::dealloc_count_of(class), before + 1);
    assert_eq!(outer_value.to_i32(), 10);
    assert_eq!(autorelease::depth(), 1);
}

#[test]
fn retained_objects_outlive_the_pool() {
    let _guard = SERIAL.lock().unwrap();
    track::set_enabled(true);

    let survivor = {
        let _pool = AutoreleasePool::new();
        Number::i32(99).unwrap().autorelease().retain()
    };

    assert_eq!(survivor.to_i32(), 99);
    assert_eq!(survivor.object().refcount(), 1);
    survivor.release();
}

#[test]
fn pools_nest_per_thread() {
    let _guard = SERIAL.lock().unwrap();
    let _pool = AutoreleasePool::new();
    assert!(autorelease::depth() >= 1);

    let handle = std::thread::spawn(|| {
        assert_eq!(autorelease::depth(), 0);
        let _pool = AutoreleasePool::new();
        Number::i32(5).unwrap().autorelease();
        autorelease::depth()
    });
    assert_eq!(handle.join().unwrap(), 1);
}
