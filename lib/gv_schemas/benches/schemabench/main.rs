use criterion::criterion_main;

pub mod zpackbench;

criterion_main!(zpackbench::zpack_benches);
