//! End-to-end capture and resolve scenarios.

use retrace::{Address, LogicalFrame, Symbolizer};

use similar_asserts::assert_eq;

#[inline(never)]
fn level_three() -> Vec<Address> {
    retrace::capture(0)
}

#[inline(never)]
fn level_two() -> Vec<Address> {
    level_three()
}

#[inline(never)]
fn level_one() -> Vec<Address> {
    level_two()
}

#[inline(always)]
fn inlined_capture() -> Vec<Address> {
    retrace::capture(0)
}

#[inline(never)]
fn physical_host() -> Vec<Address> {
    inlined_capture()
}

fn symbol_of(frames: &[LogicalFrame]) -> String {
    frames
        .iter()
        .map(|frame| frame.symbol.as_str())
        .collect::<Vec<_>>()
        .join(" | ")
}

#[test]
fn test_capture_in_place() {
    let entries = level_one();
    assert!(entries.len() >= 3, "got only {} frames", entries.len());
    assert!(entries.iter().all(|entry| !entry.is_null()));
}

#[test]
fn test_resolve_names_the_call_chain() {
    let entries = level_one();
    let symbolizer = Symbolizer::new();

    let joined: Vec<String> = entries
        .iter()
        .take(4)
        .map(|&entry| symbol_of(&symbolizer.resolve(entry)))
        .collect();
    let joined = joined.join("\n");

    assert!(joined.contains("level_three"), "missing level_three in:\n{}", joined);
    assert!(joined.contains("level_two"), "missing level_two in:\n{}", joined);
    assert!(joined.contains("level_one"), "missing level_one in:\n{}", joined);
}

#[test]
fn test_resolve_physical_is_identity() {
    let entries = level_one();
    let symbolizer = Symbolizer::new();

    for &entry in &entries {
        for frame in symbolizer.resolve(entry) {
            assert_eq!(frame.physical, entry);
        }
    }
}

#[test]
fn test_resolve_is_deterministic() {
    let entries = level_one();
    let symbolizer = Symbolizer::new();

    let first: Vec<_> = entries.iter().map(|&e| symbolizer.resolve(e)).collect();
    let second: Vec<_> = entries.iter().map(|&e| symbolizer.resolve(e)).collect();
    assert_eq!(first, second);
}

#[test]
fn test_resolve_expands_inline_frames() {
    let entries = physical_host();
    let entry = entries[0];

    let symbolizer = Symbolizer::new();
    let frames = symbolizer.resolve(entry);

    assert!(
        frames.len() >= 2,
        "expected an inline expansion, got {:?}",
        frames
    );

    // Innermost first: the inlined helper leads, the enclosing physical
    // function closes the chain.
    assert!(frames[..frames.len() - 1].iter().all(|frame| frame.inlined));
    let last = frames.last().unwrap();
    assert!(!last.inlined);
    assert!(
        last.symbol.contains("physical_host"),
        "unexpected outer frame: {:?}",
        last
    );
    assert!(
        symbol_of(&frames).contains("inlined_capture"),
        "missing inlined frame in {:?}",
        frames
    );
}

#[test]
fn test_resolve_reports_source_lines() {
    let entries = level_one();
    let symbolizer = Symbolizer::new();

    let frames = symbolizer.resolve(entries[0]);
    let frame = frames
        .iter()
        .find(|frame| frame.symbol.contains("level_three"))
        .expect("level_three frame not resolved");

    assert!(frame.source.file.ends_with("e2e.rs"), "{:?}", frame.source);
    assert!(frame.source.line > 0);
}

#[test]
fn test_frames_outlive_the_symbolizer() {
    let entries = level_one();

    let frames = {
        let symbolizer = Symbolizer::new();
        symbolizer.resolve(entries[0])
    };

    assert!(!frames.is_empty());
    assert!(frames.iter().any(|frame| frame.symbol.contains("level_three")));
}

#[test]
fn test_unmapped_address_yields_bare_frame() {
    let symbolizer = Symbolizer::new();
    let entry = Address::from_native_handle(0x10);

    let frames = symbolizer.resolve(entry);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].physical, entry);
    assert!(frames[0].symbol.is_empty());
    assert!(frames[0].source.file.is_empty());
}

#[test]
fn test_resolve_into_single_entry() {
    let entries = physical_host();
    let symbolizer = Symbolizer::new();

    // Even though the address expands into several logical frames, a buffer
    // of one receives exactly one.
    let mut buffer = [LogicalFrame::default()];
    let filled = symbolizer.resolve_into(entries[0], &mut buffer);
    assert_eq!(filled.len(), 1);
    assert_eq!(filled[0].physical, entries[0]);
}

#[test]
fn test_default_symbolizer_roundtrip() {
    let entries = level_one();
    let frames = retrace::resolve(entries[0]);
    assert!(!frames.is_empty());
    assert_eq!(frames[0].physical, entries[0]);
}

#[test]
fn test_foreign_map_on_own_process() {
    let file = std::fs::File::open("/proc/self/maps").unwrap();
    let symbolizer = Symbolizer::from_maps_file(file);

    let entries = level_one();
    let frames = symbolizer.resolve(entries[0]);
    assert!(
        frames.iter().any(|frame| frame.symbol.contains("level_three")),
        "foreign-map resolve produced {:?}",
        frames
    );
}
