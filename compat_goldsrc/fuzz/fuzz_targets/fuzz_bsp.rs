#![no_main]

use std::io::Cursor;

use compat_goldsrc::bsp::BspFile;
use compat_goldsrc::lump::{DecodeDepth, LumpOrder};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(bsp) = BspFile::load(&mut Cursor::new(data), LumpOrder::Standard, DecodeDepth::Full) {
        let _ = bsp.to_bytes();
    }
});
