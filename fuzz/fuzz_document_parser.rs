//! Fuzz target for the daemon config document parser.
//!
//! Run with: cargo +nightly fuzz run fuzz_document_parser
//!
//! Any document that parses must come out normalized and must survive a
//! trip through its canonical JSON form unchanged.

#![no_main]

use libfuzzer_sys::fuzz_target;
use yggctl_config::ConfigDocument;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(doc) = ConfigDocument::parse(text) else {
        return;
    };

    let routing = &doc.tunnel_routing;
    assert!(!routing.enabled || routing.has_routes());

    let mut unique = doc.peers.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), doc.peers.len());

    let Ok(json) = doc.to_canonical_json() else {
        return;
    };
    let reparsed = ConfigDocument::parse(&json).expect("canonical JSON must parse");
    assert_eq!(reparsed, doc);
});
