//! Criterion benchmarks for the discovery and control codecs.
//!
//! Key commands arrive at typing speed when a remote app's keyboard is in
//! use, so key-command decoding sits on the hot path of every connection.
//!
//! Run with:
//! ```bash
//! cargo bench --package ecp-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ecp_core::domain::identity::DeviceIdentity;
use ecp_core::domain::listener::ListenerSpec;
use ecp_core::protocol::control::ControlCommand;
use ecp_core::protocol::discovery::{encode_search_response, SearchRequest};

// ── Fixtures ──────────────────────────────────────────────────────────────────

const COMMANDS: [(&str, &str, &str); 3] = [
    ("keypress", "keypress", "Home"),
    ("literal", "keypress", "Lit_é"),
    ("not-a-command", "launch", "12"),
];

const SEARCH: &str = "M-SEARCH * HTTP/1.1\r\n\
                      Host: 239.255.255.250:1900\r\n\
                      Man: \"ssdp:discover\"\r\n\
                      ST: roku:ecp\r\n\
                      MX: 3\r\n\r\n";

fn spec() -> ListenerSpec {
    ListenerSpec {
        bind_address: "0.0.0.0".parse().unwrap(),
        control_port: 8060,
        advertise_address: "192.168.1.20".parse().unwrap(),
        advertise_port: 8060,
        bind_multicast: false,
    }
}

// ── Benchmark groups ──────────────────────────────────────────────────────────

/// Benchmarks `ControlCommand::parse` for the common path shapes.
fn bench_parse_command(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_command");
    for (name, verb, key) in COMMANDS {
        group.bench_with_input(BenchmarkId::new("path", name), &(verb, key), |b, (verb, key)| {
            b.iter(|| ControlCommand::parse(black_box(verb), black_box(key)).expect("parse must succeed"))
        });
    }
    group.finish();
}

/// Benchmarks the discovery responder's parse + reply path.
fn bench_discovery(c: &mut Criterion) {
    let identity = DeviceIdentity::with_serial("0123456789AB", "Bench");
    let spec = spec();

    c.bench_function("search_parse_and_reply", |b| {
        b.iter(|| {
            let req = SearchRequest::parse(black_box(SEARCH.as_bytes())).unwrap();
            assert!(req.targets_ecp());
            encode_search_response(&identity, &spec)
        })
    });
}

criterion_group!(benches, bench_parse_command, bench_discovery);
criterion_main!(benches);
