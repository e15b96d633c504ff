//! Hot-path latency benchmark: a remapped key, an unmapped key, and a
//! modifier-qualified rule hit. Sub-millisecond per event is the contract;
//! these keep regressions visible.

use core_config::compile_str;
use core_engine::Processor;
use core_events::KeyInput;
use core_keys::ScanCode;
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

const CONFIG: &str = r#"{
    "version": "2.0",
    "keyboard": { "keys": {
        "A": "0x1E", "H": "0x23", "Tab": "0x0F", "Escape": "0x01",
        "CapsLock": "0x3A", "LShift": "0x2A", "Left": "0xE04B"
    } },
    "virtualModifiers": {
        "M00": { "trigger": "CapsLock", "tap": "Escape", "holdThresholdMs": 200 }
    },
    "mappings": [
        { "from": "A", "to": "Tab" },
        { "from": "M00-H", "to": "Left" },
        { "from": "Shift-H", "to": "Tab" }
    ]
}"#;

fn processor() -> Processor {
    let cfg = Arc::new(compile_str(CONFIG, Path::new("bench.json")).expect("bench config"));
    Processor::new(cfg)
}

fn bench_hot_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("hot_path");

    group.bench_function("remapped_press_release", |b| {
        let mut proc = processor();
        let a = ScanCode::basic(0x1E);
        b.iter(|| {
            let now = Instant::now();
            let press = proc.process(KeyInput::at(a, true, now));
            let release = proc.process(KeyInput::at(a, false, now));
            black_box((press, release));
        });
    });

    group.bench_function("unmapped_passthrough", |b| {
        let mut proc = processor();
        let unmapped = ScanCode::basic(0x10);
        b.iter(|| {
            let now = Instant::now();
            let press = proc.process(KeyInput::at(unmapped, true, now));
            let release = proc.process(KeyInput::at(unmapped, false, now));
            black_box((press, release));
        });
    });

    group.bench_function("modifier_qualified_hit", |b| {
        let mut proc = processor();
        let shift = ScanCode::basic(0x2A);
        let h = ScanCode::basic(0x23);
        b.iter(|| {
            let now = Instant::now();
            proc.process(KeyInput::at(shift, true, now));
            let hit = proc.process(KeyInput::at(h, true, now));
            proc.process(KeyInput::at(h, false, now));
            proc.process(KeyInput::at(shift, false, now));
            black_box(hit);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_hot_path);
criterion_main!(benches);
