//! End-to-end object lifecycle: class registration, allocation, ownership,
//! and per-class behavior working together across module boundaries.

use cobalt::runtime::class::{self, ClassDescriptor, ClassId, ClassOps};
use cobalt::runtime::object::ObjectRef;
use cobalt::runtime::string::Str;
use cobalt::runtime::track;
use cobalt::Result;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

// The dealloc counters below are process-global, so tests that allocate
// points must not interleave.
static SERIAL: Mutex<()> = Mutex::new(());

/// A point class with a real payload and a full operation table, the way an
/// embedding application would define one.
#[repr(C)]
struct PointPayload {
    x: i32,
    y: i32,
}

static POINT_DEALLOCS: AtomicUsize = AtomicUsize::new(0);

fn point_dealloc(_obj: ObjectRef) {
    POINT_DEALLOCS.fetch_add(1, Ordering::SeqCst);
}

fn point_payload(obj: ObjectRef) -> &'static PointPayload {
    // Tests keep the object alive across the borrow.
    unsafe { &*obj.payload_ptr().cast::<PointPayload>() }
}

fn point_hash(obj: ObjectRef) -> u64 {
    let p = point_payload(obj);
    (p.x as u64) << 32 | (p.y as u64 & 0xffff_ffff)
}

fn point_equal(a: ObjectRef, b: ObjectRef) -> bool {
    let (a, b) = (point_payload(a), point_payload(b));
    a.x == b.x && a.y == b.y
}

fn point_to_string(obj: ObjectRef) -> Result<Str> {
    let p = point_payload(obj);
    Str::format(format_args!("({}, {})", p.x, p.y))
}

static POINT_CLASS: ClassDescriptor = ClassDescriptor::new(
    "Point",
    size_of::<PointPayload>(),
    ClassOps {
        dealloc: Some(point_dealloc),
        hash: Some(point_hash),
        equal: Some(point_equal),
        to_string: Some(point_to_string),
        copy: None,
    },
);

fn point_class() -> ClassId {
    class::register(&POINT_CLASS)
}

fn make_point(x: i32, y: i32) -> ObjectRef {
    let obj = ObjectRef::alloc(point_class()).unwrap();
    unsafe {
        obj.payload_ptr()
            .cast::<PointPayload>()
            .write(PointPayload { x, y });
    }
    obj
}

#[test]
fn registry_roundtrips_id_and_descriptor() {
    let id = point_class();
    assert!(id.is_valid());

    let desc = class::id_to_ref(id).unwrap();
    assert_eq!(desc.name(), "Point");
    assert_eq!(class::ref_to_id(desc), id);

    // Registration is idempotent.
    assert_eq!(class::register(&POINT_CLASS), id);
}

#[test]
fn custom_ops_drive_polymorphic_behavior() {
    let _guard = SERIAL.lock().unwrap();
    let a = make_point(3, 4);
    let b = make_point(3, 4);
    let c = make_point(5, 6);

    assert!(a.equal(b));
    assert!(!a.equal(c));
    assert_eq!(a.hash(), b.hash());

    let rendered = a.to_string().unwrap();
    assert_eq!(rendered.as_str(), "(3, 4)");
    rendered.release();

    a.release();
    b.release();
    c.release();
}

#[test]
fn dealloc_runs_exactly_once_per_object() {
    let _guard = SERIAL.lock().unwrap();
    track::set_enabled(true);
    let id = point_class();
    let before_count = track::dealloc_count_of(id);
    let before_deallocs = POINT_DEALLOCS.load(Ordering::SeqCst);

    let obj = make_point(1, 2);
    obj.retain();
    obj.release();
    assert_eq!(POINT_DEALLOCS.load(Ordering::SeqCst), before_deallocs);

    obj.release();
    assert_eq!(POINT_DEALLOCS.load(Ordering::SeqCst), before_deallocs + 1);
    assert_eq!(track::dealloc_count_of(id), before_count + 1);
}

#[test]
fn tracker_sees_lifecycle() {
    let _guard = SERIAL.lock().unwrap();
    track::set_enabled(true);
    let id = point_class();

    let live_before = track::live_count_of(id);
    let obj = make_point(7, 8);
    assert_eq!(track::live_count_of(id), live_before + 1);

    obj.release();
    assert_eq!(track::live_count_of(id), live_before);
}

#[test]
fn default_ops_fall_back_to_identity() {
    static PLAIN: ClassDescriptor = ClassDescriptor::new("PlainLifecycle", 16, ClassOps::NONE);
    let id = class::register(&PLAIN);

    let a = ObjectRef::alloc(id).unwrap();
    let b = ObjectRef::alloc(id).unwrap();

    assert!(a.equal(a));
    assert!(!a.equal(b));
    assert_ne!(a.hash(), b.hash());

    let rendered = a.to_string().unwrap();
    assert!(rendered.as_str().starts_with("<PlainLifecycle@"));
    rendered.release();

    // Default copy is a retain of the same object.
    let copy = a.copy().unwrap();
    assert_eq!(copy, a);
    copy.release();

    a.release();
    b.release();
}
