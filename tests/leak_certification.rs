//! # Zero-Leak Certification Test
//!
//! Drives full request lifecycles through the dispatcher and certifies that
//! every buffer allocated for a request is released exactly once:
//! - read buffers, after the request line is parsed
//! - header and body buffers, after the write completes
//! - outstanding buffers, when the engine shuts down
//!
//! ## Methodology
//! Every `IoBuffer` registers with a `BufferLedger` on creation and
//! deregisters on drop, so `allocated == released` with `live == 0` means
//! no buffer leaked and none was released twice (a double release panics).

mod common;

use common::{config_for, finish_write, request, scripted_dispatcher};
use std::fs;
use std::time::Instant;
use tempfile::tempdir;
use zerohttpd_core::OpKind;
use zerohttpd_transport::CompletionEngine;

/// Certification 1: file responses.
/// 6 write buffers + 1 read buffer per request, 200 cycles.
#[test]
fn test_file_response_cycle_no_leak() {
    let t = Instant::now();

    let root = tempdir().unwrap();
    fs::write(root.path().join("index.html"), vec![b'z'; 4096]).unwrap();
    let mut dispatcher = scripted_dispatcher(&config_for(root.path()));
    let ledger = dispatcher.engine().ledger().clone();

    for cycle in 0..200 {
        let fd = 100 + cycle;
        request(&mut dispatcher, fd, b"GET / HTTP/1.0\r\n\r\n");
        assert_eq!(ledger.live(), 6, "read buffer released, write buffers in flight");
        finish_write(&mut dispatcher, fd);
        assert_eq!(ledger.live(), 0);
    }

    assert_eq!(ledger.allocated(), 200 * 7);
    assert_eq!(ledger.released(), ledger.allocated());

    let overhead = t.elapsed();
    println!("test_file_response_cycle_no_leak: Testing Overhead = {:?} (200 cycles)", overhead);
}

/// Certification 2: canned responses and empty reads.
#[test]
fn test_error_paths_no_leak() {
    let root = tempdir().unwrap();
    let mut dispatcher = scripted_dispatcher(&config_for(root.path()));
    let ledger = dispatcher.engine().ledger().clone();

    for cycle in 0..50 {
        let fd = 200 + cycle * 3;

        request(&mut dispatcher, fd, b"GET /absent HTTP/1.0\r\n\r\n");
        finish_write(&mut dispatcher, fd);

        request(&mut dispatcher, fd + 1, b"DELETE / HTTP/1.0\r\n\r\n");
        finish_write(&mut dispatcher, fd + 1);

        dispatcher.engine_mut().complete_accept(fd + 2);
        dispatcher.step().unwrap();
        dispatcher.engine_mut().complete_read(fd + 2, b"");
        dispatcher.step().unwrap();
    }

    assert_eq!(ledger.live(), 0);
    // Two canned requests (read + body) and one empty read per cycle.
    assert_eq!(ledger.allocated(), 50 * 5);
    assert_eq!(ledger.released(), 50 * 5);
}

/// Certification 3: shutdown with reads and writes still outstanding.
#[test]
fn test_shutdown_releases_outstanding_buffers() {
    let root = tempdir().unwrap();
    fs::write(root.path().join("a.txt"), b"payload").unwrap();
    let mut dispatcher = scripted_dispatcher(&config_for(root.path()));
    let ledger = dispatcher.engine().ledger().clone();

    request(&mut dispatcher, 300, b"GET /a.txt HTTP/1.0\r\n\r\n");
    dispatcher.engine_mut().complete_accept(301);
    dispatcher.step().unwrap();
    assert_eq!(dispatcher.engine().pending(OpKind::Read), 1);
    assert_eq!(ledger.live(), 7);

    dispatcher.engine_mut().complete_quit();
    dispatcher.step().unwrap();

    assert!(dispatcher.is_terminated());
    assert_eq!(ledger.live(), 0);
    assert_eq!(ledger.released(), ledger.allocated());
}
