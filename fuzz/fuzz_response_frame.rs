//! Fuzz target for the admin response frame decoder.
//!
//! Run with: cargo +nightly fuzz run fuzz_response_frame
//!
//! Arbitrary daemon output must decode to exactly one outcome or a
//! `FrameError`, never a panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use yggctl_core::rpc::AdminResponse;

fuzz_target!(|data: &[u8]| {
    if let Ok(line) = std::str::from_utf8(data) {
        if let Ok(response) = AdminResponse::decode(line) {
            let _ = response.correlation_id();
        }
    }
});
