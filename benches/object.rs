// Object lifecycle benchmarks for the Cobalt runtime
//
// These benchmarks measure the hot paths of the object model: allocation
// and deallocation, the retain/release pair, autorelease pool drains, and
// pooled string lookups.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use cobalt::runtime::class::{self, ClassDescriptor, ClassOps};
use cobalt::runtime::object::ObjectRef;
use cobalt::runtime::{AutoreleasePool, Number, Str};

static BENCH_CLASS: ClassDescriptor = ClassDescriptor::new("Bench", 32, ClassOps::NONE);

/// Benchmark a full allocate/release cycle for a plain 32-byte object.
fn bench_alloc_release(c: &mut Criterion) {
    let id = class::register(&BENCH_CLASS);
    c.bench_function("alloc_release_32b", |b| {
        b.iter(|| {
            let obj = ObjectRef::alloc(black_box(id)).unwrap();
            obj.release();
        });
    });
}

/// Benchmark a retain/release pair on a live object (two atomic RMWs).
fn bench_retain_release(c: &mut Criterion) {
    let id = class::register(&BENCH_CLASS);
    let obj = ObjectRef::alloc(id).unwrap();
    c.bench_function("retain_release_pair", |b| {
        b.iter(|| {
            black_box(obj).retain();
            obj.release();
        });
    });
    obj.release();
}

/// Benchmark draining a pool of 64 autoreleased numbers.
fn bench_autorelease_drain(c: &mut Criterion) {
    c.bench_function("autorelease_drain_64", |b| {
        b.iter(|| {
            let _pool = AutoreleasePool::new();
            for i in 0..64 {
                Number::i64(black_box(i)).unwrap().autorelease();
            }
        });
    });
}

/// Benchmark a pooled string hit: hash, bucket scan, identity return.
fn bench_pooled_string_hit(c: &mut Criterion) {
    Str::pooled("benchmark-key").unwrap();
    c.bench_function("pooled_string_hit", |b| {
        b.iter(|| Str::pooled(black_box("benchmark-key")).unwrap());
    });
}

criterion_group!(
    benches,
    bench_alloc_release,
    bench_retain_release,
    bench_autorelease_drain,
    bench_pooled_string_hit
);
criterion_main!(benches);
