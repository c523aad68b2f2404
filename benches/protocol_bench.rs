use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::path::Path;
use zerohttpd_codec::{parse_request_line, FileHeaders};
use zerohttpd_dsa::{BufferLedger, InflightArena};

fn request_line_performance(c: &mut Criterion) {
    let request = b"GET /assets/site.css HTTP/1.1\r\nHost: localhost\r\nAccept: */*\r\n\r\n";

    c.bench_function("parse_request_line", |b| {
        b.iter(|| parse_request_line(black_box(request), 1024).is_ok())
    });
}

fn header_performance(c: &mut Criterion) {
    let path = Path::new("public/assets/site.css");

    c.bench_function("file_headers", |b| {
        b.iter(|| FileHeaders::new(black_box("Server: zerohttpd/0.1\r\n"), black_box(path), 48_213))
    });
}

fn inflight_performance(c: &mut Criterion) {
    let ledger = BufferLedger::new();
    let mut arena = InflightArena::with_capacity(256);

    c.bench_function("inflight_read_cycle", |b| {
        b.iter(|| {
            let token = arena.insert(ledger.zeroed(8192));
            arena.remove(black_box(token)).is_some()
        })
    });
}

criterion_group!(benches, request_line_performance, header_performance, inflight_performance);
criterion_main!(benches);
