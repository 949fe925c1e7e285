//! Integration tests for the handle-based profiler API

use calltree::ChannelGather;
use flat_api::{Handle, HandleTable};
use proptest::prelude::*;
use std::sync::Arc;
use std::thread;

fn recorded(table: &HandleTable) -> Handle {
    let handle = table.new_serial("flat job");
    table.start(handle, "outer").unwrap();
    table.start(handle, "inner").unwrap();
    table.stop(handle, "inner", 7).unwrap();
    table.stop(handle, "outer", 3).unwrap();
    handle
}

#[test]
fn test_start_stop_render() {
    let table = HandleTable::new();
    let handle = recorded(&table);

    let report = table.render(handle, 1, true, 3).unwrap();
    assert!(report.starts_with("Profiler \"flat job\""));
    assert!(report.contains("outer"));
    assert!(report.contains("inner"));

    let profiler = table.profiler(handle).unwrap();
    let snapshot = profiler.lock().snapshot();
    assert_eq!(snapshot.find(&["outer"]).unwrap().operations, 3);
    assert_eq!(snapshot.find(&["outer", "inner"]).unwrap().operations, 7);
}

#[test]
fn test_mismatched_stop_name_still_stops() {
    let table = HandleTable::new();
    let handle = table.new_serial("advisory");
    table.start(handle, "real").unwrap();
    table.stop(handle, "some other name", 0).unwrap();
    assert_eq!(table.profiler(handle).unwrap().lock().get_current_depth(), 0);
}

#[test]
fn test_unbalanced_stop_is_an_error() {
    let table = HandleTable::new();
    let handle = table.new_serial("strict");
    assert!(table.stop(handle, "", 0).is_err());
}

#[test]
fn test_declare_then_report() {
    let table = HandleTable::new();
    let handle = table.new_serial("declared");
    assert!(table.declare(handle, "never run").unwrap());
    let report = table.render(handle, 0, true, 3).unwrap();
    assert!(report.contains("never run"));

    table.set_active(handle, 0, -1).unwrap();
    assert!(!table.declare(handle, "inactive").unwrap());
}

#[test]
fn test_reset_renames_and_clears() {
    let table = HandleTable::new();
    let handle = recorded(&table);
    table.reset(handle, "second run").unwrap();

    let report = table.render(handle, 1, true, 3).unwrap();
    assert!(report.starts_with("Profiler \"second run\""));
    assert!(!report.contains("outer"));
}

#[test]
fn test_render_into_truncates_and_terminates() {
    let table = HandleTable::new();
    let handle = recorded(&table);
    let header = "Profiler \"flat job\"";

    let mut small = [0xffu8; 16];
    let written = table.render_into(handle, &mut small, 1, true, 3).unwrap();
    assert_eq!(written, 15);
    assert_eq!(small[15], 0);
    assert_eq!(&small[..15], &header.as_bytes()[..15]);

    let mut large = vec![0xffu8; 4096];
    let written = table.render_into(handle, &mut large, 1, true, 3).unwrap();
    assert_eq!(large[written], 0);
    let text = std::str::from_utf8(&large[..written]).unwrap();
    assert!(text.starts_with(header));
    assert!(text.ends_with('\n'));
    assert!(text.contains("inner"));

    let mut empty: [u8; 0] = [];
    assert_eq!(table.render_into(handle, &mut empty, 1, true, 3).unwrap(), 0);
}

#[test]
fn test_render_into_respects_char_boundaries() {
    let table = HandleTable::new();
    // "Profiler \"" is 10 bytes; the description's first char is 2 bytes.
    let handle = table.new_serial("éé");
    let mut buffer = [0u8; 12];
    let written = table.render_into(handle, &mut buffer, 0, true, 3).unwrap();
    assert_eq!(written, 10);
    assert_eq!(buffer[10], 0);
}

#[test]
fn test_gathered_handles_report_on_rank_zero() {
    let table = Arc::new(HandleTable::new());
    let mut group = ChannelGather::group(2);
    let worker_endpoint = group.pop().unwrap();
    let root_endpoint = group.pop().unwrap();

    let root = table.new_with_gather("gathered", Arc::new(root_endpoint));
    let worker = table.new_with_gather("gathered", Arc::new(worker_endpoint));
    for handle in [root, worker] {
        table.start(handle, "step").unwrap();
        table.stop(handle, "step", 2).unwrap();
    }

    let worker_table = Arc::clone(&table);
    let worker_report = thread::spawn(move || worker_table.render(worker, 1, true, 3).unwrap());
    let report = table.render(root, 1, true, 3).unwrap();

    assert!(worker_report.join().unwrap().is_empty());
    let step = report.lines().find(|l| l.trim_start().starts_with("step")).unwrap();
    assert!(step.contains("calls=     2"), "{}", step);
}

#[test]
fn test_global_table() {
    let handle = HandleTable::global().new_serial("global");
    assert!(HandleTable::global().contains(handle));
    assert!(HandleTable::global().release(handle));
}

proptest! {
    #[test]
    fn prop_render_into_never_overflows(size in 0usize..200) {
        let table = HandleTable::new();
        let handle = recorded(&table);
        let header = b"Profiler \"flat job\"\n";

        let mut buffer = vec![0xffu8; size];
        let written = table.render_into(handle, &mut buffer, 2, false, 4).unwrap();
        prop_assert!(written <= size.saturating_sub(1));
        let shared = written.min(header.len());
        prop_assert_eq!(&buffer[..shared], &header[..shared]);
        prop_assert!(std::str::from_utf8(&buffer[..written]).is_ok());
        if size > 0 {
            prop_assert_eq!(buffer[written], 0);
        }
    }
}
