#![no_main]

use std::io::Cursor;

use compat_goldsrc::archive::ArchiveLoad;
use compat_goldsrc::pak::PakFile;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = PakFile::load(&mut Cursor::new(data), ArchiveLoad::Full);
});
