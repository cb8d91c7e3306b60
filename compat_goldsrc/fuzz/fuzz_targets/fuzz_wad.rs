#![no_main]

use std::io::Cursor;

use compat_goldsrc::archive::ArchiveLoad;
use compat_goldsrc::wad::WadFile;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(mut wad) = WadFile::load(&mut Cursor::new(data), ArchiveLoad::Full) {
        let _ = wad.to_packed_bytes();
    }
});
