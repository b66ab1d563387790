//! Fuzz target: `FrameAssembler::feed`
//!
//! The first byte picks a chunk size; the rest is fed as link data.
//! Emitted frames must fit the pool's frame capacity, never be empty,
//! never contain a line feed, and every buffer must be back in the pool
//! once the frames are dropped.
//!
//! cargo fuzz run fuzz_assembler

#![no_main]

use libfuzzer_sys::fuzz_target;
use trackmux::capture::assembler::FrameAssembler;
use trackmux::capture::pool::FramePool;

const FRAME_CAPACITY: usize = 64;

fuzz_target!(|data: &[u8]| {
    let Some((&chunk, stream)) = data.split_first() else {
        return;
    };
    let chunk = usize::from(chunk).max(1);

    let pool = FramePool::new(3, FRAME_CAPACITY).unwrap();
    let mut asm = FrameAssembler::new(pool.clone());

    for piece in stream.chunks(chunk) {
        asm.feed(piece, |raw| {
            assert!(!raw.buf.is_empty(), "empty frame emitted");
            assert!(raw.buf.len() <= FRAME_CAPACITY, "frame exceeds capacity");
            assert!(!raw.buf.contains(&b'\n'), "terminator leaked into frame");
        });
    }

    // At most the partial line is still checked out.
    assert!(pool.in_use() <= 1);
    asm.resync();
    assert_eq!(pool.in_use(), 0);
});
