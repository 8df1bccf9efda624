//! Session overhead benchmarks over the stub engine.
//!
//! The stub does no inference work, so these isolate the cost of the
//! session layer: tokenization, batch staging, sampling and text assembly.

use std::path::Path;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use gg_session::engine::{Session, SessionConfig, SharedBackend, StubBackend, StubScript};

static REGISTRY: SharedBackend<StubBackend> = SharedBackend::new();

fn open(reply: &str, max_length: usize) -> Session<StubBackend> {
    let script = StubScript::bytes(reply);
    let config = SessionConfig { max_length, ..Default::default() };
    match Session::acquire(&REGISTRY, move || Ok(StubBackend::new(script)), Path::new("bench"), &config) {
        Ok(session) => session,
        Err(e) => panic!("stub session failed: {e}"),
    }
}

fn bench_generate(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate");

    for tokens in [16usize, 128, 512] {
        let reply = "a".repeat(tokens);
        let mut session = open(&reply, tokens + 16);
        group.throughput(Throughput::Elements(tokens as u64));
        group.bench_function(BenchmarkId::new("tokens", tokens), |b| {
            b.iter(|| {
                session.clear();
                session.begin(black_box("prompt")).ok();
                while let Ok(out) = session.step() {
                    if out.terminal {
                        break;
                    }
                }
                black_box(session.decoded_count())
            })
        });
    }

    group.finish();
}

fn bench_begin(c: &mut Criterion) {
    let mut group = c.benchmark_group("begin");

    for len in [8usize, 256, 1024] {
        let prompt = "p".repeat(len);
        let mut session = open("", len + 8);
        group.throughput(Throughput::Elements(len as u64));
        group.bench_function(BenchmarkId::new("prompt_bytes", len), |b| {
            b.iter(|| {
                session.clear();
                black_box(session.begin(black_box(&prompt)).is_ok())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_generate, bench_begin);
criterion_main!(benches);
